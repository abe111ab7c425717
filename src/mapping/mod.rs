pub mod store;
pub mod token;

pub use store::{Mapping, MappingEntry, MappingStore};
pub use token::{MintStrategy, TokenMinter, TOKEN_CLOSE, TOKEN_OPEN};
