//! Update policy enum and its lock-free holder

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::errors::SyncError;

/// How entity mutations reach the search index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(u8)]
pub enum UpdatePolicy {
    /// Do not touch the index
    Disabled = 0,
    /// Write synchronously; visible after the backend's next refresh
    #[default]
    Immediate = 1,
    /// Write synchronously, then force a refresh
    ImmediateWithRefresh = 2,
    /// Push a reindex job; a worker applies it later
    Enqueue = 3,
}

impl UpdatePolicy {
    /// Every accepted policy, in declaration order
    pub const ALL: [UpdatePolicy; 4] = [
        UpdatePolicy::Disabled,
        UpdatePolicy::Immediate,
        UpdatePolicy::ImmediateWithRefresh,
        UpdatePolicy::Enqueue,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpdatePolicy::Disabled => "disabled",
            UpdatePolicy::Immediate => "immediate",
            UpdatePolicy::ImmediateWithRefresh => "immediate_with_refresh",
            UpdatePolicy::Enqueue => "enqueue",
        }
    }

    /// Whether save/delete hooks have any effect at all
    #[inline]
    #[must_use]
    pub fn is_enabled(self) -> bool {
        !matches!(self, UpdatePolicy::Disabled)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => UpdatePolicy::Disabled,
            2 => UpdatePolicy::ImmediateWithRefresh,
            3 => UpdatePolicy::Enqueue,
            _ => UpdatePolicy::Immediate,
        }
    }

    fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdatePolicy {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().trim_start_matches(':') {
            "disabled" | "false" | "none" => Ok(UpdatePolicy::Disabled),
            "immediate" => Ok(UpdatePolicy::Immediate),
            "immediate_with_refresh" => Ok(UpdatePolicy::ImmediateWithRefresh),
            "enqueue" => Ok(UpdatePolicy::Enqueue),
            _ => Err(SyncError::InvalidPolicy {
                value: value.to_string(),
                allowed: Self::allowed_list(),
            }),
        }
    }
}

impl TryFrom<String> for UpdatePolicy {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UpdatePolicy> for String {
    fn from(policy: UpdatePolicy) -> Self {
        policy.as_str().to_string()
    }
}

/// Atomic holder for an entity type's current policy
///
/// Readers on the save/delete hot path never block; assignment is a single
/// store of an already-validated value.
#[derive(Debug)]
pub struct PolicyCell(AtomicU8);

impl PolicyCell {
    #[must_use]
    pub fn new(policy: UpdatePolicy) -> Self {
        Self(AtomicU8::new(policy as u8))
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> UpdatePolicy {
        UpdatePolicy::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, policy: UpdatePolicy) {
        self.0.store(policy as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_enumerated_value() {
        for policy in UpdatePolicy::ALL {
            assert_eq!(policy.as_str().parse::<UpdatePolicy>().ok(), Some(policy));
        }
        assert_eq!("false".parse::<UpdatePolicy>().ok(), Some(UpdatePolicy::Disabled));
        assert_eq!(":enqueue".parse::<UpdatePolicy>().ok(), Some(UpdatePolicy::Enqueue));
    }

    #[test]
    fn rejects_unknown_values() {
        let err = "enqueu".parse::<UpdatePolicy>().expect_err("typo is rejected");
        match err {
            SyncError::InvalidPolicy { value, allowed } => {
                assert_eq!(value, "enqueu");
                assert!(allowed.contains("immediate_with_refresh"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn serde_uses_snake_case_strings() {
        let json = serde_json::to_string(&UpdatePolicy::ImmediateWithRefresh).expect("serialize");
        assert_eq!(json, "\"immediate_with_refresh\"");
        assert!(serde_json::from_str::<UpdatePolicy>("\"sometimes\"").is_err());
    }

    #[test]
    fn cell_round_trips_all_policies() {
        let cell = PolicyCell::new(UpdatePolicy::Immediate);
        for policy in UpdatePolicy::ALL {
            cell.set(policy);
            assert_eq!(cell.get(), policy);
        }
    }
}
