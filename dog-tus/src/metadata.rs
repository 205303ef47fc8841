//! `Upload-Metadata` parsing.
//!
//! The header is a comma separated list of `key base64value` pairs. Values
//! may be omitted, keys must be unique and may not contain spaces or commas.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::{TusError, TusResult};

/// One decoded metadata value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata(Vec<u8>);

impl Metadata {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The value as UTF-8, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parsed metadata, keyed by name
pub type MetadataMap = BTreeMap<String, Metadata>;

/// Application level checks on parsed metadata, run before a file is created
pub trait MetadataValidator: Send + Sync {
    /// Return one message per problem; an empty list accepts the metadata
    fn validate(&self, metadata: &MetadataMap) -> Vec<String>;
}

/// Requires a fixed set of keys to be present with non-empty values
#[derive(Debug, Clone, Default)]
pub struct RequiredKeysValidator {
    keys: Vec<String>,
}

impl RequiredKeysValidator {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl MetadataValidator for RequiredKeysValidator {
    fn validate(&self, metadata: &MetadataMap) -> Vec<String> {
        self.keys
            .iter()
            .filter(|key| metadata.get(*key).map_or(true, Metadata::is_empty))
            .map(|key| format!("Header Upload-Metadata: Missing required key {}", key))
            .collect()
    }
}

/// Parse an `Upload-Metadata` header value
pub fn parse_metadata(header: &str) -> TusResult<MetadataMap> {
    let mut metadata = MetadataMap::new();

    if header.trim().is_empty() {
        return Ok(metadata);
    }

    for pair in header.split(',') {
        let pair = pair.trim();
        let mut parts = pair.split(' ');
        let key = parts.next().unwrap_or_default();
        let value = parts.next();

        if parts.next().is_some() {
            return Err(TusError::invalid(format!(
                "Header Upload-Metadata: The Upload-Metadata request and response header \
                 must consist of one or more comma-separated key-value pairs. The key and \
                 value must be separated by a space. The key must not contain spaces and \
                 commas and must not be empty. The key must be unique. The value is \
                 optional. Found pair: {}",
                pair
            )));
        }

        if key.is_empty() {
            return Err(TusError::invalid("Header Upload-Metadata: Key must not be empty"));
        }

        if metadata.contains_key(key) {
            return Err(TusError::invalid(format!(
                "Header Upload-Metadata: Duplicate keys are not allowed: {}",
                key
            )));
        }

        let decoded = match value {
            None | Some("") => Metadata::default(),
            Some(encoded) => STANDARD.decode(encoded).map(Metadata).map_err(|_| {
                TusError::invalid(format!(
                    "Header Upload-Metadata: Value for {} is not properly encoded using base64",
                    key
                ))
            })?,
        };

        metadata.insert(key.to_string(), decoded);
    }

    Ok(metadata)
}
