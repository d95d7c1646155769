//! Execution context of a frame
//!
//! The surrounding engine owns the parameters and variables of every frame.
//! Strategies only read them to validate them against a transaction.

use std::cell::RefCell;

use crate::types::Value;

/// Parameters and variables of one executing frame
pub trait ExecutionContext {
    /// Values passed into the frame by its caller
    fn in_parameters(&self) -> Vec<Value>;

    /// Values the frame hands back to its caller
    fn out_parameters(&self) -> Vec<Value>;

    /// All values currently held by the frame
    fn variables(&self) -> Vec<Value>;
}

/// Simple `ExecutionContext` backed by vectors
#[derive(Debug, Default)]
pub struct ParameterContext {
    in_parameters: RefCell<Vec<Value>>,
    out_parameters: RefCell<Vec<Value>>,
    variables: RefCell<Vec<Value>>,
}

impl ParameterContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_in_parameters(self, values: Vec<Value>) -> Self {
        *self.in_parameters.borrow_mut() = values;
        self
    }

    pub fn set_out_parameters(&self, values: Vec<Value>) {
        *self.out_parameters.borrow_mut() = values;
    }

    pub fn set_variables(&self, values: Vec<Value>) {
        *self.variables.borrow_mut() = values;
    }
}

impl ExecutionContext for ParameterContext {
    fn in_parameters(&self) -> Vec<Value> {
        self.in_parameters.borrow().clone()
    }

    fn out_parameters(&self) -> Vec<Value> {
        self.out_parameters.borrow().clone()
    }

    fn variables(&self) -> Vec<Value> {
        self.variables.borrow().clone()
    }
}
