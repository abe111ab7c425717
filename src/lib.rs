pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod mapping;
pub mod session;
pub mod storage;
pub mod substitute;
pub mod utils;

pub use detect::{AllowList, EntityDetector, PatternDetector, SensitiveSpan};
pub use error::{PseudonymError, Result};
pub use mapping::{Mapping, MappingEntry, MappingStore};
pub use session::{PopulateReport, Session, SessionState, SharedSession};
pub use substitute::{depseudonymize, pseudonymize};
