//! Execution plans
//!
//! A plan is a tree of frames, written in JSON, that is executed against the
//! in-memory backend. Each frame receives its parameters, is played, runs its
//! children in order, optionally resets its transaction, returns an object,
//! pauses and resumes, and finally stops or fails. This drives the strategies
//! exactly the way an execution engine would.
//!
//! ```json
//! {
//!   "root": {
//!     "name": "checkout",
//!     "mode": { "kind": "create_root" },
//!     "children": [
//!       { "name": "reserve", "mode": { "kind": "create_child_if_parent", "auto_commit": false } },
//!       { "name": "charge", "fail": "card declined" }
//!     ]
//!   }
//! }
//! ```

use std::cell::RefCell;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::ModeConfig;
use crate::context::{ExecutionContext, ParameterContext};
use crate::error::{Result, TransactionError};
use crate::listener::ExecutionListener;
use crate::mode::ExecutionFrame;
use crate::native::{JournalEntry, MemoryTransaction, MemoryTransactionFactory, Operation};
use crate::strategy::TransactionStrategy;
use crate::types::{ObjectRef, Value};

/// Root of a plan file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub root: FramePlan,
}

impl ExecutionPlan {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| TransactionError::Config(format!("Invalid execution plan: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Native failure to inject into a frame's transaction once it exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultPlan {
    pub op: Operation,
    pub message: String,
}

/// One frame of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramePlan {
    pub name: String,
    #[serde(default)]
    pub mode: ModeConfig,
    /// Values passed in by the caller, validated against the new transaction
    #[serde(default)]
    pub parameters: Vec<Value>,
    #[serde(default)]
    pub children: Vec<FramePlan>,
    /// Reset the transaction after the children ran
    #[serde(default)]
    pub reset: bool,
    /// Return an object bound to the frame's transaction
    #[serde(default)]
    pub return_object: bool,
    /// Pause and resume before completing
    #[serde(default)]
    pub pause: bool,
    /// Fail with this message instead of completing
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(default)]
    pub faults: Vec<FaultPlan>,
}

impl FramePlan {
    pub fn new(name: impl Into<String>, mode: ModeConfig) -> Self {
        Self {
            name: name.into(),
            mode,
            parameters: Vec::new(),
            children: Vec::new(),
            reset: false,
            return_object: false,
            pause: false,
            fail: None,
            faults: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: FramePlan) -> Self {
        self.children.push(child);
        self
    }
}

/// Frame of a running plan
struct PlanFrame<'a> {
    parent: Option<&'a PlanFrame<'a>>,
    strategy: RefCell<Option<TransactionStrategy>>,
}

impl ExecutionFrame for PlanFrame<'_> {
    fn parent_frame(&self) -> Option<&dyn ExecutionFrame> {
        self.parent.map(|frame| frame as &dyn ExecutionFrame)
    }

    fn transaction_strategy(&self) -> Option<TransactionStrategy> {
        self.strategy.borrow().clone()
    }
}

/// Frame listener that logs and records lifecycle events
struct TraceListener {
    frame: String,
    trace: Rc<RefCell<Vec<String>>>,
}

impl TraceListener {
    fn record(&self, event: String) {
        info!("{}", event);
        self.trace.borrow_mut().push(event);
    }
}

impl ExecutionListener for TraceListener {
    fn on_execution_play(&self, _context: &dyn ExecutionContext) -> Result<()> {
        self.record(format!("{}: play", self.frame));
        Ok(())
    }

    fn on_execution_stop(&self, _context: &dyn ExecutionContext) -> Result<()> {
        self.record(format!("{}: stop", self.frame));
        Ok(())
    }

    fn on_execution_pause(&self, _context: &dyn ExecutionContext) -> Result<()> {
        self.record(format!("{}: pause", self.frame));
        Ok(())
    }

    fn on_execution_fail(&self, _context: &dyn ExecutionContext, error: &dyn Error) -> Result<()> {
        self.record(format!("{}: fail ({})", self.frame, error));
        Ok(())
    }
}

/// Executes plans against an in-memory transaction backend
pub struct PlanRunner {
    factory: MemoryTransactionFactory,
    trace: Rc<RefCell<Vec<String>>>,
}

impl Default for PlanRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanRunner {
    pub fn new() -> Self {
        Self::with_factory(MemoryTransactionFactory::new())
    }

    pub fn with_factory(factory: MemoryTransactionFactory) -> Self {
        Self {
            factory,
            trace: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn factory(&self) -> &MemoryTransactionFactory {
        &self.factory
    }

    /// Native operations performed so far
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.factory.journal()
    }

    /// Listener events seen by the frames so far, e.g. `"checkout: play"`
    pub fn trace(&self) -> Vec<String> {
        self.trace.borrow().clone()
    }

    /// Execute the plan; the error is whatever the top frame ended with
    pub fn run(&self, plan: &ExecutionPlan) -> Result<()> {
        info!("Running plan '{}'", plan.root.name);
        self.execute(&plan.root, None)
    }

    fn execute<'a>(&self, plan: &'a FramePlan, parent: Option<&'a PlanFrame<'a>>) -> Result<()> {
        let context =
            Rc::new(ParameterContext::new().with_in_parameters(plan.parameters.clone()));
        let frame = PlanFrame {
            parent,
            strategy: RefCell::new(None),
        };

        let mode = plan.mode.into_mode(Rc::new(self.factory.clone()));
        let strategy = mode.create_transaction_strategy(&frame, context.clone())?;
        *frame.strategy.borrow_mut() = Some(strategy.clone());
        info!("Frame '{}' runs in a {} transaction strategy", plan.name, strategy.kind());
        self.inject_faults(plan, &strategy);

        let listener = strategy.create_execution_listener(Rc::new(TraceListener {
            frame: plan.name.clone(),
            trace: Rc::clone(&self.trace),
        }));

        listener.on_execution_play(&*context)?;
        match self.run_body(plan, &frame, &strategy, &context, &*listener) {
            Ok(()) => listener.on_execution_stop(&*context),
            Err(error) => match listener.on_execution_fail(&*context, &error) {
                Ok(()) => Err(error),
                // The teardown did not know what the frame failed with.
                Err(TransactionError::CompositeFatal { inner: None, outer }) => {
                    Err(TransactionError::double_fault(error, *outer))
                }
                Err(fail_error) if fail_error.is_fatal() => {
                    log::error!("Frame '{}' failed with: {}", plan.name, error);
                    Err(fail_error)
                }
                Err(fail_error) => Err(TransactionError::double_fault(error, fail_error)),
            },
        }
    }

    fn run_body(
        &self,
        plan: &FramePlan,
        frame: &PlanFrame<'_>,
        strategy: &TransactionStrategy,
        context: &ParameterContext,
        listener: &dyn ExecutionListener,
    ) -> Result<()> {
        for child in &plan.children {
            self.execute(child, Some(frame))?;
        }

        if plan.reset {
            strategy.reset()?;
        }

        if plan.return_object {
            let object = ObjectRef::new(plan.name.as_str(), 1);
            let value = match strategy.native_transaction::<MemoryTransaction>() {
                Some(transaction) => transaction.bind(object),
                None => object.into(),
            };
            context.set_out_parameters(vec![value]);
        }

        if plan.pause {
            listener.on_execution_pause(context)?;
            listener.on_execution_play(context)?;
        }

        match &plan.fail {
            Some(message) => Err(TransactionError::Execution(message.clone())),
            None => Ok(()),
        }
    }

    fn inject_faults(&self, plan: &FramePlan, strategy: &TransactionStrategy) {
        if plan.faults.is_empty() {
            return;
        }
        let txn_id = strategy
            .native_transaction::<MemoryTransaction>()
            .map(|transaction| transaction.id());
        match txn_id {
            Some(txn_id) => {
                for fault in &plan.faults {
                    self.factory.inject_fault(txn_id, fault.op, fault.message.as_str());
                }
            }
            None => log::warn!(
                "Frame '{}' has no transaction; ignoring {} injected fault(s)",
                plan.name,
                plan.faults.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModeKind;

    fn entries(runner: &PlanRunner) -> Vec<String> {
        runner.journal().iter().map(|entry| entry.to_string()).collect()
    }

    #[test]
    fn test_plan_from_json_defaults() {
        let plan = ExecutionPlan::from_json(r#"{"root": {"name": "main"}}"#).unwrap();
        assert_eq!(plan.root.name, "main");
        assert_eq!(plan.root.mode.kind, ModeKind::CreateChildIfParent);
        assert!(plan.root.mode.auto_commit);
        assert!(plan.root.children.is_empty());
        assert!(plan.root.fail.is_none());
    }

    #[test]
    fn test_plan_from_json_rejects_missing_root() {
        let err = ExecutionPlan::from_json(r#"{"frames": []}"#).unwrap_err();
        assert_eq!(err.error_code(), "config");
        assert!(err.to_string().starts_with("Invalid execution plan"));
    }

    #[test]
    fn test_single_root_frame() {
        let runner = PlanRunner::new();
        let plan = ExecutionPlan {
            root: FramePlan::new("main", ModeConfig::new(ModeKind::CreateRoot, true)),
        };

        runner.run(&plan).unwrap();

        assert_eq!(
            entries(&runner),
            vec![
                "txn 1: BEGIN",
                "txn 1: ENSURE COMPATIBILITY",
                "txn 1: ENTER SCOPE",
                "txn 1: COMMIT",
                "txn 1: LEAVE SCOPE",
                "txn 1: RELEASE",
            ]
        );
        assert_eq!(runner.trace(), vec!["main: play", "main: stop"]);
    }

    #[test]
    fn test_child_frame_nests_scope() {
        let runner = PlanRunner::new();
        let plan = ExecutionPlan {
            root: FramePlan::new("outer", ModeConfig::new(ModeKind::CreateRoot, false))
                .with_child(FramePlan::new("inner", ModeConfig::default())),
        };

        runner.run(&plan).unwrap();

        let factory = runner.factory();
        assert_eq!(factory.count(1, Operation::CreateChild), 1);
        assert_eq!(factory.count(1, Operation::Commit), 0);
        assert_eq!(factory.count(2, Operation::Commit), 1);
        assert!(factory.active_scopes().is_empty());
        assert_eq!(
            runner.trace(),
            vec!["outer: play", "inner: play", "inner: stop", "outer: stop"]
        );
    }

    #[test]
    fn test_failing_child_fails_parent() {
        let runner = PlanRunner::new();
        let mut child = FramePlan::new("inner", ModeConfig::default());
        child.fail = Some("boom".to_string());
        let plan = ExecutionPlan {
            root: FramePlan::new("outer", ModeConfig::new(ModeKind::CreateRoot, true))
                .with_child(child),
        };

        let err = runner.run(&plan).unwrap_err();

        assert_eq!(err.error_code(), "execution");
        assert_eq!(err.to_string(), "boom");
        let factory = runner.factory();
        assert_eq!(factory.count(1, Operation::Commit), 0);
        assert_eq!(factory.count(2, Operation::Commit), 0);
        assert_eq!(factory.count(1, Operation::Release), 1);
        assert_eq!(factory.count(2, Operation::Release), 1);
        assert_eq!(
            runner.trace(),
            vec!["outer: play", "inner: play", "inner: fail (boom)", "outer: fail (boom)"]
        );
    }

    #[test]
    fn test_pause_leaves_and_reenters_scope() {
        let runner = PlanRunner::new();
        let mut root = FramePlan::new("main", ModeConfig::new(ModeKind::CreateRoot, false));
        root.pause = true;

        runner.run(&ExecutionPlan { root }).unwrap();

        let factory = runner.factory();
        assert_eq!(factory.count(1, Operation::EnterScope), 2);
        assert_eq!(factory.count(1, Operation::LeaveScope), 2);
        assert_eq!(
            runner.trace(),
            vec!["main: play", "main: pause", "main: play", "main: stop"]
        );
    }

    #[test]
    fn test_injected_fault_surfaces_as_fatal() {
        let runner = PlanRunner::new();
        let mut root = FramePlan::new("main", ModeConfig::new(ModeKind::CreateRoot, true));
        root.faults.push(FaultPlan {
            op: Operation::Release,
            message: "disk gone".to_string(),
        });

        let err = runner.run(&ExecutionPlan { root }).unwrap_err();

        assert!(err.is_fatal());
        assert!(err.fatal_inner().is_none());
        assert_eq!(err.fatal_outer().unwrap().to_string(), "disk gone");
    }

    #[test]
    fn test_none_frame_has_no_transaction() {
        let runner = PlanRunner::new();
        let mut root = FramePlan::new("main", ModeConfig::new(ModeKind::None, true));
        root.return_object = true;
        root.faults.push(FaultPlan {
            op: Operation::Commit,
            message: "unused".to_string(),
        });

        runner.run(&ExecutionPlan { root }).unwrap();

        assert!(runner.journal().is_empty());
        assert_eq!(runner.trace(), vec!["main: play", "main: stop"]);
    }
}
