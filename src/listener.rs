//! Execution listeners
//!
//! The engine reports the lifecycle of every frame (play, stop, pause, fail)
//! to a listener. Transaction strategies hook into that pipeline by wrapping
//! the frame's own listener.

use std::error::Error;
use std::rc::Rc;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::strategy::TransactionStrategy;

/// Lifecycle callbacks of an executing frame
pub trait ExecutionListener {
    /// The frame starts or resumes executing
    fn on_execution_play(&self, context: &dyn ExecutionContext) -> Result<()>;

    /// The frame completed successfully
    fn on_execution_stop(&self, context: &dyn ExecutionContext) -> Result<()>;

    /// The frame is suspended and will be played again later
    fn on_execution_pause(&self, context: &dyn ExecutionContext) -> Result<()>;

    /// The frame was aborted by `error`
    fn on_execution_fail(&self, context: &dyn ExecutionContext, error: &dyn Error) -> Result<()>;
}

/// Listener that ignores every callback
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExecutionListener;

impl ExecutionListener for NullExecutionListener {
    fn on_execution_play(&self, _context: &dyn ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_execution_stop(&self, _context: &dyn ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_execution_pause(&self, _context: &dyn ExecutionContext) -> Result<()> {
        Ok(())
    }

    fn on_execution_fail(&self, _context: &dyn ExecutionContext, _error: &dyn Error) -> Result<()> {
        Ok(())
    }
}

/// Routes every callback through a strategy before it reaches `inner`
pub struct TransactionExecutionListener {
    strategy: TransactionStrategy,
    inner: Rc<dyn ExecutionListener>,
}

impl TransactionExecutionListener {
    pub fn new(strategy: TransactionStrategy, inner: Rc<dyn ExecutionListener>) -> Self {
        Self { strategy, inner }
    }

    pub fn strategy(&self) -> &TransactionStrategy {
        &self.strategy
    }
}

impl ExecutionListener for TransactionExecutionListener {
    fn on_execution_play(&self, context: &dyn ExecutionContext) -> Result<()> {
        self.strategy.on_execution_play(context, self.inner.as_ref())
    }

    fn on_execution_stop(&self, context: &dyn ExecutionContext) -> Result<()> {
        self.strategy.on_execution_stop(context, self.inner.as_ref())
    }

    fn on_execution_pause(&self, context: &dyn ExecutionContext) -> Result<()> {
        self.strategy.on_execution_pause(context, self.inner.as_ref())
    }

    fn on_execution_fail(&self, context: &dyn ExecutionContext, error: &dyn Error) -> Result<()> {
        self.strategy
            .on_execution_fail(context, self.inner.as_ref(), error)
    }
}

/// Listener for frames bound to a child strategy.
///
/// The outer strategy plays and pauses its registered child as part of its
/// own play and pause, so those callbacks only reach `inner` here. Stop and
/// fail end the child and go through the strategy.
pub struct ChildTransactionExecutionListener {
    strategy: TransactionStrategy,
    inner: Rc<dyn ExecutionListener>,
}

impl ChildTransactionExecutionListener {
    pub fn new(strategy: TransactionStrategy, inner: Rc<dyn ExecutionListener>) -> Self {
        Self { strategy, inner }
    }

    pub fn strategy(&self) -> &TransactionStrategy {
        &self.strategy
    }
}

impl ExecutionListener for ChildTransactionExecutionListener {
    fn on_execution_play(&self, context: &dyn ExecutionContext) -> Result<()> {
        self.inner.on_execution_play(context)
    }

    fn on_execution_stop(&self, context: &dyn ExecutionContext) -> Result<()> {
        self.strategy.on_execution_stop(context, self.inner.as_ref())
    }

    fn on_execution_pause(&self, context: &dyn ExecutionContext) -> Result<()> {
        self.inner.on_execution_pause(context)
    }

    fn on_execution_fail(&self, context: &dyn ExecutionContext, error: &dyn Error) -> Result<()> {
        self.strategy
            .on_execution_fail(context, self.inner.as_ref(), error)
    }
}
