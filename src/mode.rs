//! Transaction modes
//!
//! A frame declares how it wants to take part in transactions; the mode turns
//! that declaration into a strategy when the frame is created.

use std::fmt;
use std::rc::Rc;

use crate::config::ModeKind;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::native::TransactionFactory;
use crate::strategy::TransactionStrategy;

/// Node of the engine's frame tree
pub trait ExecutionFrame {
    /// The frame that called this one; `None` at the top of the tree
    fn parent_frame(&self) -> Option<&dyn ExecutionFrame>;

    /// The strategy bound to this frame, once it has been created
    fn transaction_strategy(&self) -> Option<TransactionStrategy>;
}

/// The strategy of the closest ancestor of `frame` that has one, or the Null
/// sentinel
pub fn nearest_transaction_strategy(frame: &dyn ExecutionFrame) -> TransactionStrategy {
    let mut current = frame.parent_frame();
    while let Some(ancestor) = current {
        if let Some(strategy) = ancestor.transaction_strategy() {
            return strategy;
        }
        current = ancestor.parent_frame();
    }
    TransactionStrategy::null()
}

/// How a frame takes part in transactions
#[derive(Clone)]
pub enum TransactionMode {
    /// Run without a transaction
    None,
    /// Always start a fresh transaction
    CreateRoot {
        auto_commit: bool,
        factory: Rc<dyn TransactionFactory>,
    },
    /// Nest in the caller's transaction if it has one, otherwise start a
    /// fresh transaction
    CreateChildIfParent {
        auto_commit: bool,
        factory: Rc<dyn TransactionFactory>,
    },
}

impl TransactionMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            TransactionMode::None => ModeKind::None,
            TransactionMode::CreateRoot { .. } => ModeKind::CreateRoot,
            TransactionMode::CreateChildIfParent { .. } => ModeKind::CreateChildIfParent,
        }
    }

    pub fn auto_commit(&self) -> bool {
        match self {
            TransactionMode::None => false,
            TransactionMode::CreateRoot { auto_commit, .. }
            | TransactionMode::CreateChildIfParent { auto_commit, .. } => *auto_commit,
        }
    }

    /// Create the strategy for a newly created frame
    pub fn create_transaction_strategy(
        &self,
        frame: &dyn ExecutionFrame,
        context: Rc<dyn ExecutionContext>,
    ) -> Result<TransactionStrategy> {
        let outer = nearest_transaction_strategy(frame);
        match self {
            TransactionMode::None => Ok(TransactionStrategy::none(&outer)),
            TransactionMode::CreateRoot {
                auto_commit,
                factory,
            } => TransactionStrategy::root(*auto_commit, &outer, context, Rc::clone(factory)),
            TransactionMode::CreateChildIfParent {
                auto_commit,
                factory,
            } => {
                if outer.has_transaction() {
                    outer.create_child_transaction_strategy(*auto_commit, context)
                } else {
                    TransactionStrategy::root(*auto_commit, &outer, context, Rc::clone(factory))
                }
            }
        }
    }
}

impl fmt::Debug for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionMode")
            .field("kind", &self.kind())
            .field("auto_commit", &self.auto_commit())
            .finish()
    }
}
