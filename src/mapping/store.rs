//! Bidirectional literal <-> token table
//!
//! The table is kept sorted by literal length, longest first, after every
//! mutation. Substitution walks entries in that order so a literal that is a
//! substring of another literal never fragments the longer one.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use super::token::{self, MintStrategy, TokenMinter};
use crate::error::{PseudonymError, Result};

/// One literal and the token that stands in for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub literal: String,
    pub token: String,
}

/// Ordered, deduplicated literal -> token table
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: Vec<MappingEntry>,
    by_literal: HashMap<String, usize>,
    by_token: HashMap<String, usize>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from pairs, rejecting anything that breaks the table invariants.
    ///
    /// Pair order is kept for literals of equal length.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut mapping = Self::new();
        for (literal, token) in pairs {
            check_pair(&literal, &token)?;
            if mapping.by_literal.contains_key(&literal) {
                return Err(PseudonymError::malformed(format!(
                    "literal {:?} appears more than once",
                    literal
                )));
            }
            if mapping.by_token.contains_key(&token) {
                return Err(PseudonymError::malformed(format!(
                    "token {:?} is assigned to more than one literal",
                    token
                )));
            }
            mapping.push_unsorted(literal, token);
        }
        mapping.normalize_order();
        Ok(mapping)
    }

    /// Parse a mapping document (a JSON object of literal -> token).
    ///
    /// Nothing is returned unless the whole document parses and validates.
    pub fn parse_document(document: &str) -> Result<Self> {
        serde_json::from_str(document).map_err(|e| PseudonymError::malformed(e.to_string()))
    }

    /// Render the mapping as a human-editable document in normalized order
    pub fn to_document(&self) -> String {
        if self.entries.is_empty() {
            return "{}".to_string();
        }

        let body: Vec<String> = self
            .entries
            .iter()
            .map(|e| {
                format!(
                    "  {}: {}",
                    serde_json::Value::String(e.literal.clone()),
                    serde_json::Value::String(e.token.clone())
                )
            })
            .collect();

        format!("{{\n{}\n}}", body.join(",\n"))
    }

    /// Re-sort by literal length, longest first. Ties keep their relative order.
    pub fn normalize_order(&mut self) {
        self.entries
            .sort_by_key(|e| std::cmp::Reverse(e.literal.chars().count()));
        self.reindex();
    }

    pub fn token_for(&self, literal: &str) -> Option<&str> {
        self.by_literal
            .get(literal)
            .map(|&i| self.entries[i].token.as_str())
    }

    pub fn literal_for(&self, token: &str) -> Option<&str> {
        self.by_token
            .get(token)
            .map(|&i| self.entries[i].literal.as_str())
    }

    pub fn contains_literal(&self, literal: &str) -> bool {
        self.by_literal.contains_key(literal)
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.by_token.contains_key(token)
    }

    /// Entries in normalized order
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_literal.clear();
        self.by_token.clear();
    }

    /// Highest counter index among sequential tokens present
    pub fn highest_sequence(&self) -> Option<u64> {
        self.entries
            .iter()
            .filter_map(|e| token::sequence_of(&e.token))
            .max()
    }

    fn push_unsorted(&mut self, literal: String, token: String) {
        let idx = self.entries.len();
        self.by_literal.insert(literal.clone(), idx);
        self.by_token.insert(token.clone(), idx);
        self.entries.push(MappingEntry { literal, token });
    }

    /// Set the token for a literal. The caller has already validated the pair.
    fn set(&mut self, literal: &str, token: String) -> Option<String> {
        match self.by_literal.get(literal).copied() {
            Some(idx) => {
                let old = std::mem::replace(&mut self.entries[idx].token, token.clone());
                self.by_token.remove(&old);
                self.by_token.insert(token, idx);
                Some(old)
            }
            None => {
                self.push_unsorted(literal.to_string(), token);
                self.normalize_order();
                None
            }
        }
    }

    fn reindex(&mut self) {
        self.by_literal.clear();
        self.by_token.clear();
        for (idx, e) in self.entries.iter().enumerate() {
            self.by_literal.insert(e.literal.clone(), idx);
            self.by_token.insert(e.token.clone(), idx);
        }
    }
}

fn check_pair(literal: &str, token: &str) -> Result<()> {
    if literal.is_empty() {
        return Err(PseudonymError::malformed("empty literal"));
    }
    if token.is_empty() {
        return Err(PseudonymError::malformed(format!(
            "literal {:?} maps to an empty token",
            literal
        )));
    }
    if literal == token {
        return Err(PseudonymError::malformed(format!(
            "literal {:?} maps to itself",
            literal
        )));
    }
    Ok(())
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for e in &self.entries {
            map.serialize_entry(&e.literal, &e.token)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Mapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping literal strings to token strings")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((literal, token)) = access.next_entry::<String, String>()? {
                    pairs.push((literal, token));
                }
                Ok(pairs)
            }
        }

        let pairs = deserializer.deserialize_map(PairsVisitor)?;
        Mapping::from_pairs(pairs).map_err(|e| match e {
            PseudonymError::MalformedMapping { reason } => serde::de::Error::custom(reason),
            other => serde::de::Error::custom(other),
        })
    }
}

/// The session's mapping together with its token counter
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    mapping: Mapping,
    minter: TokenMinter,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted parts
    pub fn from_parts(mapping: Mapping, counter: u64) -> Self {
        Self {
            mapping,
            minter: TokenMinter::with_counter(counter),
        }
    }

    /// Map `literal` to a fresh counter-minted token unless it is already mapped.
    ///
    /// First writer wins: an existing literal keeps its token whatever the label.
    pub fn insert_if_absent(&mut self, literal: &str, label: &str) -> Result<String> {
        if literal.is_empty() {
            return Err(PseudonymError::EmptyLiteral);
        }
        if let Some(existing) = self.mapping.token_for(literal) {
            return Ok(existing.to_string());
        }

        let token = self.mint_unique(literal, label, MintStrategy::Sequential);
        debug!(label, token = %token, "Minted token");
        self.mapping.set(literal, token.clone());
        Ok(token)
    }

    /// Map `literal` to `token`, overwriting any previous token for it.
    ///
    /// Returns the token that was replaced, if any.
    pub fn upsert(&mut self, literal: &str, token: &str) -> Result<Option<String>> {
        if literal.is_empty() {
            return Err(PseudonymError::EmptyLiteral);
        }
        check_pair(literal, token)?;
        if let Some(owner) = self.mapping.literal_for(token) {
            if owner != literal {
                return Err(PseudonymError::malformed(format!(
                    "token {:?} already stands for {:?}",
                    token, owner
                )));
            }
        }
        Ok(self.mapping.set(literal, token.to_string()))
    }

    /// Mint a token with `strategy` and upsert it for `literal`
    pub fn upsert_minted(
        &mut self,
        literal: &str,
        label: &str,
        strategy: MintStrategy,
    ) -> Result<String> {
        if literal.is_empty() {
            return Err(PseudonymError::EmptyLiteral);
        }
        let token = self.mint_unique(literal, label, strategy);
        self.upsert(literal, &token)?;
        Ok(token)
    }

    /// Add or overwrite several entries at once, keeping everything else.
    ///
    /// Applied to a copy first; the store only changes if every entry is valid.
    pub fn merge<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut staged = self.mapping.clone();
        for (literal, token) in entries {
            check_pair(&literal, &token)?;
            if let Some(owner) = staged.literal_for(&token) {
                if owner != literal {
                    return Err(PseudonymError::malformed(format!(
                        "token {:?} already stands for {:?}",
                        token, owner
                    )));
                }
            }
            staged.set(&literal, token);
        }
        staged.normalize_order();
        self.mapping = staged;
        Ok(())
    }

    /// Swap in a whole new mapping. The token counter is left as it is.
    pub fn replace(&mut self, mapping: Mapping) {
        let mut mapping = mapping;
        mapping.normalize_order();
        if let Some(highest) = mapping.highest_sequence() {
            if highest >= self.minter.counter() {
                warn!(
                    highest,
                    counter = self.minter.counter(),
                    "Replaced mapping holds sequence numbers at or above the token counter"
                );
            }
        }
        self.mapping = mapping;
    }

    /// Parse `document` and replace the mapping with it; on error nothing changes
    pub fn replace_document(&mut self, document: &str) -> Result<()> {
        let mapping = Mapping::parse_document(document)?;
        self.replace(mapping);
        Ok(())
    }

    /// Move the counter past every sequential index in the mapping.
    ///
    /// Only runs when asked; replacing a mapping never does this on its own.
    pub fn resync_counter(&mut self) -> u64 {
        if let Some(highest) = self.mapping.highest_sequence() {
            if highest >= self.minter.counter() {
                self.minter.set_counter(highest + 1);
            }
        }
        self.minter.counter()
    }

    /// Empty the mapping and zero the counter
    pub fn reset(&mut self) {
        self.mapping.clear();
        self.minter.reset();
    }

    pub fn normalize_order(&mut self) {
        self.mapping.normalize_order();
    }

    /// The mapping document in normalized order
    pub fn serialize(&self) -> String {
        self.mapping.to_document()
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn counter(&self) -> u64 {
        self.minter.counter()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Mint tokens until one is free; skipped sequential values are logged
    fn mint_unique(&mut self, literal: &str, label: &str, strategy: MintStrategy) -> String {
        loop {
            let candidate = self.minter.mint(label, strategy);
            if !self.mapping.contains_token(&candidate) && candidate != literal {
                return candidate;
            }
            warn!(token = %candidate, "Minted token already in use, skipping");
        }
    }
}
