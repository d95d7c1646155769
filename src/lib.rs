//! txframe - hierarchical transaction scopes for nested execution frames
//!
//! An execution engine runs frames (functions, steps) that call each other.
//! Each frame declares a transaction mode, and this crate turns that
//! declaration into a transaction strategy that opens, enters, commits and
//! releases native transactions as the frame is played, paused, stopped or
//! failed.
//!
//! Architecture Overview:
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Execution Engine                         │
//! │      (frames, ExecutionContext, ExecutionListener)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Transaction Mode                          │
//! │        (None / CreateRoot / CreateChildIfParent)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Transaction Strategies                      │
//! │   (Null / None / Root / Child, listener adapters)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Native Transactions                         │
//! │     (commit, release, scopes, child transactions)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod listener;
pub mod mode;
pub mod native;
pub mod plan;
pub mod strategy;
pub mod types;

pub use config::{ModeConfig, ModeKind};
pub use context::{ExecutionContext, ParameterContext};
pub use error::{Incompatibility, NativeError, NativeErrorKind, Result, TransactionError};
pub use listener::{
    ChildTransactionExecutionListener, ExecutionListener, NullExecutionListener,
    TransactionExecutionListener,
};
pub use mode::{nearest_transaction_strategy, ExecutionFrame, TransactionMode};
pub use native::{
    MemoryTransaction, MemoryTransactionFactory, NativeTransaction, Operation, TransactionFactory,
    TransactionScope,
};
pub use plan::{ExecutionPlan, FramePlan, PlanRunner};
pub use strategy::{StrategyKind, TransactionStrategy};
pub use types::{ObjectRef, TxnId, Value};
