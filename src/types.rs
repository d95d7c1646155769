//! Core types for txframe
//!
//! Defines the values exchanged between frames (parameters, variables) and the
//! identifiers the native layer uses for them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Native transaction ID
pub type TxnId = u64;

/// Reference to a persistent domain object.
///
/// `transaction` is the native transaction the object was loaded or created
/// in; `None` means the object is not bound to any transaction yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub class: String,
    pub id: u64,
    #[serde(default)]
    pub transaction: Option<TxnId>,
}

impl ObjectRef {
    pub fn new(class: impl Into<String>, id: u64) -> Self {
        Self {
            class: class.into(),
            id,
            transaction: None,
        }
    }

    /// Same object, bound to the given transaction
    pub fn bound_to(mut self, txn_id: TxnId) -> Self {
        self.transaction = Some(txn_id);
        self
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.class, self.id)
    }
}

/// A parameter or variable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Integer value
    Integer(i64),
    /// String value
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Domain object reference
    Object(ObjectRef),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            Value::Object(o) => write!(f, "{}", o),
        }
    }
}

impl Value {
    /// The domain object this value refers to, if any
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}
