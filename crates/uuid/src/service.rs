//! Internal implementation of [`RecordId`].

use crate::{UuidError, UuidResult};
use std::{fmt, str::FromStr};

use ::uuid::Uuid;

/// MDR's canonical record identifier (32 lowercase hex characters, no hyphens).
///
/// Once constructed, the contained UUID is guaranteed to be valid and is always displayed
/// in canonical form.
///
/// # Construction
/// - [`RecordId::new`] generates a fresh identifier for a new document.
/// - [`RecordId::parse`] validates an externally supplied identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(Uuid);

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordId {
    /// Generates a new identifier in canonical form.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses an identifier that must already be in canonical form.
    ///
    /// Hyphenated or uppercase spellings are **not** normalised.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not in canonical form.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_canonical(input) {
            return Err(UuidError::InvalidInput(format!(
                "record id must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }

        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(format!("record id '{input}': {e}")))
    }

    /// Returns true if `input` is in canonical form.
    ///
    /// This is a purely syntactic check: exactly 32 bytes of `0-9` / `a-f`.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for RecordId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordId::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RecordId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_generates_canonical_id() {
        let id = RecordId::new();
        let canonical = id.to_string();

        assert_eq!(canonical.len(), 32);
        assert!(RecordId::is_canonical(&canonical));
    }

    #[test]
    fn test_new_ids_are_distinct() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn test_parse_valid_canonical_id() {
        let canonical = "550e8400e29b41d4a716446655440000";
        let id = RecordId::parse(canonical).expect("canonical id");

        assert_eq!(id.to_string(), canonical);
    }

    #[test]
    fn test_parse_rejects_hyphenated_id() {
        let result = RecordId::parse("550e8400-e29b-41d4-a716-446655440000");

        match result {
            Err(UuidError::InvalidInput(msg)) => {
                assert!(msg.contains("32 lowercase hex characters"));
            }
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[test]
    fn test_parse_rejects_uppercase_id() {
        assert!(RecordId::parse("550E8400E29B41D4A716446655440000").is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(RecordId::parse("550e8400e29b41d4a71644665544000").is_err());
        assert!(RecordId::parse("550e8400e29b41d4a7164466554400000").is_err());
        assert!(RecordId::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_mongo_object_id() {
        assert!(RecordId::parse("507f1f77bcf86cd799439011").is_err());
    }

    #[test]
    fn test_from_str_matches_parse() {
        let id: RecordId = "90a8d1ea318041d9adb070a834d4e0f6".parse().expect("parse");
        assert_eq!(id.to_string(), "90a8d1ea318041d9adb070a834d4e0f6");
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let id = RecordId::parse("90a8d1ea318041d9adb070a834d4e0f6").expect("parse");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"90a8d1ea318041d9adb070a834d4e0f6\"");

        let back: RecordId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);

        assert!(serde_json::from_str::<RecordId>("\"not-an-id\"").is_err());
    }
}
