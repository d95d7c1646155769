//! Error types for txframe
//!
//! Defines a unified error type for the strategy tree, the native transaction
//! layer it drives, and the configuration surface around it.

use std::fmt;
use std::io;

/// What a failed compatibility check was validating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incompatibility {
    /// Arbitrary objects passed to `ensure_compatibility`
    Objects,
    /// Input parameters checked when a strategy is created
    InputParameters,
    /// Output parameters checked against the parent transaction on stop
    OutputParameters,
    /// Variables checked against the replacement transaction after a reset
    Variables,
}

impl Incompatibility {
    /// Fixed message prefix; the native error's message is appended to it
    pub fn message_prefix(&self) -> &'static str {
        match self {
            Incompatibility::Objects => {
                "One or more of the objects are incompatible with the transaction. "
            }
            Incompatibility::InputParameters => {
                "One or more of the input parameters passed to the function are incompatible with the function's transaction. "
            }
            Incompatibility::OutputParameters => {
                "One or more of the output parameters returned from the function are incompatible with the function's parent transaction. "
            }
            Incompatibility::Variables => {
                "One or more of the variables of the function are incompatible with the function's new transaction after the reset. "
            }
        }
    }
}

/// Category of a native transaction failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorKind {
    /// Objects cannot be used within the transaction
    Incompatible,
    /// Any other failure of the unit of work
    Failed,
}

/// Error raised by a native transaction, scope or factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    kind: NativeErrorKind,
    message: String,
}

impl NativeError {
    pub fn new(kind: NativeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Objects handed to the transaction do not belong to it
    pub fn incompatible(message: impl Into<String>) -> Self {
        Self::new(NativeErrorKind::Incompatible, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(NativeErrorKind::Failed, message)
    }

    pub fn kind(&self) -> NativeErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for NativeError {}

/// Result type alias for native transaction operations
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Unified error type for txframe operations
#[derive(Debug)]
pub enum TransactionError {
    /// Native transaction failure, passed through unchanged
    Native(NativeError),
    /// Parameters or variables cannot be used with the transaction
    ValidationIncompatibility {
        target: Incompatibility,
        cause: NativeError,
    },
    /// The strategy state machine was driven out of order
    InvalidStateTransition(String),
    /// Operation not available on this strategy variant
    UnsupportedOperation(String),
    /// Two independent steps failed while tearing a strategy down
    CompositeFatal {
        inner: Option<Box<TransactionError>>,
        outer: Box<TransactionError>,
    },
    /// Failure reported by an execution listener or the surrounding engine
    Execution(String),
    /// Invalid configuration or execution plan
    Config(String),
    /// I/O error while loading configuration
    Io(io::Error),
}

impl TransactionError {
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        TransactionError::InvalidStateTransition(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        TransactionError::UnsupportedOperation(message.into())
    }

    /// Translate a native compatibility failure.
    ///
    /// Only `NativeErrorKind::Incompatible` becomes a validation error; any
    /// other native failure is passed through as is.
    pub fn incompatible(target: Incompatibility, cause: NativeError) -> Self {
        match cause.kind() {
            NativeErrorKind::Incompatible => {
                TransactionError::ValidationIncompatibility { target, cause }
            }
            NativeErrorKind::Failed => TransactionError::Native(cause),
        }
    }

    /// Combine a failure of the notification step with a failure of the
    /// teardown that ran after it.
    ///
    /// A fatal error that is already propagating wins and is returned as is.
    pub fn double_fault(inner: TransactionError, outer: TransactionError) -> Self {
        if inner.is_fatal() {
            log::error!(
                "Discarding teardown failure while a fatal error is propagating: {}",
                outer
            );
            return inner;
        }
        TransactionError::CompositeFatal {
            inner: Some(Box::new(inner)),
            outer: Box::new(outer),
        }
    }

    /// Wrap a teardown failure that happened without an earlier failure
    pub fn teardown_fault(outer: TransactionError) -> Self {
        if outer.is_fatal() {
            return outer;
        }
        TransactionError::CompositeFatal {
            inner: None,
            outer: Box::new(outer),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, TransactionError::CompositeFatal { .. })
    }

    /// The inner cause of a composite fatal error
    pub fn fatal_inner(&self) -> Option<&TransactionError> {
        match self {
            TransactionError::CompositeFatal { inner, .. } => inner.as_deref(),
            _ => None,
        }
    }

    /// The outer cause of a composite fatal error
    pub fn fatal_outer(&self) -> Option<&TransactionError> {
        match self {
            TransactionError::CompositeFatal { outer, .. } => Some(outer),
            _ => None,
        }
    }

    /// Stable short code for each error category
    pub fn error_code(&self) -> &'static str {
        match self {
            TransactionError::Native(_) => "native",
            TransactionError::ValidationIncompatibility { .. } => "incompatible",
            TransactionError::InvalidStateTransition(_) => "invalid-state",
            TransactionError::UnsupportedOperation(_) => "unsupported",
            TransactionError::CompositeFatal { .. } => "fatal",
            TransactionError::Execution(_) => "execution",
            TransactionError::Config(_) => "config",
            TransactionError::Io(_) => "io",
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::Native(e) => write!(f, "{}", e),
            TransactionError::ValidationIncompatibility { target, cause } => {
                write!(f, "{}{}", target.message_prefix(), cause.message())
            }
            TransactionError::InvalidStateTransition(msg) => write!(f, "{}", msg),
            TransactionError::UnsupportedOperation(msg) => write!(f, "{}", msg),
            TransactionError::CompositeFatal { inner: Some(inner), outer } => write!(
                f,
                "Fatal error while tearing down a transaction: {} (raised while handling: {})",
                outer, inner
            ),
            TransactionError::CompositeFatal { inner: None, outer } => {
                write!(f, "Fatal error while tearing down a transaction: {}", outer)
            }
            TransactionError::Execution(msg) => write!(f, "{}", msg),
            TransactionError::Config(msg) => write!(f, "{}", msg),
            TransactionError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TransactionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransactionError::Native(e) => Some(e),
            TransactionError::ValidationIncompatibility { cause, .. } => Some(cause),
            TransactionError::CompositeFatal { outer, .. } => Some(outer.as_ref()),
            TransactionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NativeError> for TransactionError {
    fn from(e: NativeError) -> Self {
        TransactionError::Native(e)
    }
}

impl From<io::Error> for TransactionError {
    fn from(e: io::Error) -> Self {
        TransactionError::Io(e)
    }
}

/// Result type alias for txframe operations
pub type Result<T> = std::result::Result<T, TransactionError>;
