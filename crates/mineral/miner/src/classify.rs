//! Contract error classification.
//!
//! Aborts surface as a free-form message with the numeric abort code
//! embedded somewhere in it. The registry maps symbolic error names to codes
//! and is built once at startup from configuration.

use serde::{Deserialize, Serialize};

/// A contract failure, recognised or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractFailure {
    /// The message carried a registered code
    Known {
        /// Registered error name
        kind: String,
        /// Original message
        raw: String,
    },
    /// No registered code matched
    Unrecognized(String),
}

impl ContractFailure {
    /// Registered name, or the raw message when unrecognised
    pub fn name(&self) -> &str {
        match self {
            Self::Known { kind, .. } => kind,
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Whether the failure maps to a registered contract error
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }
}

impl std::fmt::Display for ContractFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered mapping of contract error names to abort codes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorRegistry {
    codes: Vec<ErrorCode>,
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode {
    /// Symbolic name
    pub name: String,
    /// Abort code
    pub code: u64,
}

impl ErrorRegistry {
    /// Empty registry
    pub const fn new() -> Self {
        Self { codes: Vec::new() }
    }

    /// Add an entry. Earlier entries win when several codes match.
    pub fn with(mut self, name: impl Into<String>, code: u64) -> Self {
        self.codes.push(ErrorCode { name: name.into(), code });
        self
    }

    /// Registered entries in match order
    pub fn entries(&self) -> &[ErrorCode] {
        &self.codes
    }

    /// Map a raw failure message to a registered error.
    ///
    /// Matching is a plain substring test on the decimal code.
    pub fn classify(&self, raw: &str) -> ContractFailure {
        self.codes
            .iter()
            .find(|entry| raw.contains(&entry.code.to_string()))
            .map_or_else(
                || ContractFailure::Unrecognized(raw.to_owned()),
                |entry| ContractFailure::Known { kind: entry.name.clone(), raw: raw.to_owned() },
            )
    }
}
