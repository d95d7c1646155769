//! Transaction mode configuration
//!
//! Frames declare their transaction mode as data so plans can be written in
//! JSON and turned into [`TransactionMode`]s once a factory is known.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransactionError};
use crate::mode::TransactionMode;
use crate::native::TransactionFactory;

/// Transaction mode selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    /// Run without a transaction. Lifecycle events still reach the listener.
    None,

    /// Always start a fresh, parentless transaction.
    CreateRoot,

    /// Nest in the caller's transaction if it has one, otherwise start a
    /// fresh transaction. This is the default.
    #[default]
    CreateChildIfParent,
}

impl std::fmt::Display for ModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeKind::None => write!(f, "None"),
            ModeKind::CreateRoot => write!(f, "CreateRoot"),
            ModeKind::CreateChildIfParent => write!(f, "CreateChildIfParent"),
        }
    }
}

impl ModeKind {
    /// Get a human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            ModeKind::None => "No transaction; commit, rollback and reset are unsupported",
            ModeKind::CreateRoot => "Fresh root transaction from the factory",
            ModeKind::CreateChildIfParent => {
                "Child of the caller's transaction, or a fresh root transaction"
            }
        }
    }

    /// Parse a mode from its name (case-insensitive, `-` and `_` ignored)
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_uppercase();
        match normalized.as_str() {
            "NONE" => Some(ModeKind::None),
            "CREATEROOT" => Some(ModeKind::CreateRoot),
            "CREATECHILDIFPARENT" => Some(ModeKind::CreateChildIfParent),
            _ => None,
        }
    }
}

fn default_auto_commit() -> bool {
    true
}

/// Declared transaction mode of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeConfig {
    #[serde(default)]
    pub kind: ModeKind,
    /// Commit on a successful stop; ignored for [`ModeKind::None`]
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            kind: ModeKind::default(),
            auto_commit: default_auto_commit(),
        }
    }
}

impl ModeConfig {
    pub fn new(kind: ModeKind, auto_commit: bool) -> Self {
        Self { kind, auto_commit }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| TransactionError::Config(format!("Invalid transaction mode: {}", e)))
    }

    /// Build the mode, drawing root transactions from `factory`
    pub fn into_mode(self, factory: Rc<dyn TransactionFactory>) -> TransactionMode {
        match self.kind {
            ModeKind::None => TransactionMode::None,
            ModeKind::CreateRoot => TransactionMode::CreateRoot {
                auto_commit: self.auto_commit,
                factory,
            },
            ModeKind::CreateChildIfParent => TransactionMode::CreateChildIfParent {
                auto_commit: self.auto_commit,
                factory,
            },
        }
    }
}
