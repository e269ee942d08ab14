//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a vending machine (e.g. `"001"`).
///
/// Machine ids are operator-assigned labels rather than generated UUIDs, so the
/// only rule is that they are non-empty once surrounding whitespace is removed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    /// Create an identifier, trimming surrounding whitespace.
    pub fn new(id: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("MachineId: must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for MachineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MachineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for MachineId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<MachineId> for String {
    fn from(value: MachineId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_trims_whitespace() {
        let id = MachineId::new("  001 ").unwrap();
        assert_eq!(id.as_str(), "001");
        assert_eq!(id.to_string(), "001");
    }

    #[test]
    fn empty_id_is_rejected() {
        let err = MachineId::from_str("   ").unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = MachineId::new("testlowevent").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"testlowevent\"");
    }

    proptest! {
        #[test]
        fn non_blank_ids_parse(raw in "[a-z0-9]{1,16}") {
            let id: MachineId = raw.parse().unwrap();
            prop_assert_eq!(id.as_str(), raw.as_str());
        }
    }
}
