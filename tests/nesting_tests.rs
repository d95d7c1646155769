use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;

use txframe::{
    ExecutionContext, ExecutionFrame, ExecutionListener, MemoryTransaction,
    MemoryTransactionFactory, ModeConfig, ModeKind, ObjectRef, Operation, ParameterContext,
    StrategyKind, TransactionMode, TransactionStrategy,
};

struct Frame<'a> {
    parent: Option<&'a Frame<'a>>,
    strategy: RefCell<Option<TransactionStrategy>>,
    context: Rc<ParameterContext>,
}

impl<'a> Frame<'a> {
    fn start(parent: Option<&'a Frame<'a>>, mode: &TransactionMode) -> Self {
        let frame = Frame {
            parent,
            strategy: RefCell::new(None),
            context: Rc::new(ParameterContext::new()),
        };
        let strategy = mode
            .create_transaction_strategy(&frame, frame.context.clone())
            .unwrap();
        *frame.strategy.borrow_mut() = Some(strategy);
        frame
    }

    fn strategy(&self) -> TransactionStrategy {
        self.strategy.borrow().clone().unwrap()
    }

    fn txn_id(&self) -> u64 {
        self.strategy()
            .native_transaction::<MemoryTransaction>()
            .map(|txn| txn.id())
            .unwrap()
    }
}

impl ExecutionFrame for Frame<'_> {
    fn parent_frame(&self) -> Option<&dyn ExecutionFrame> {
        self.parent.map(|frame| frame as &dyn ExecutionFrame)
    }

    fn transaction_strategy(&self) -> Option<TransactionStrategy> {
        self.strategy.borrow().clone()
    }
}

#[derive(Default)]
struct Events(RefCell<Vec<String>>);

struct NamedListener {
    name: &'static str,
    events: Rc<Events>,
}

impl NamedListener {
    fn new(name: &'static str, events: &Rc<Events>) -> Rc<dyn ExecutionListener> {
        Rc::new(NamedListener {
            name,
            events: Rc::clone(events),
        })
    }

    fn push(&self, event: &str) {
        self.events.0.borrow_mut().push(format!("{} {}", self.name, event));
    }
}

impl ExecutionListener for NamedListener {
    fn on_execution_play(&self, _context: &dyn ExecutionContext) -> txframe::Result<()> {
        self.push("play");
        Ok(())
    }

    fn on_execution_stop(&self, _context: &dyn ExecutionContext) -> txframe::Result<()> {
        self.push("stop");
        Ok(())
    }

    fn on_execution_pause(&self, _context: &dyn ExecutionContext) -> txframe::Result<()> {
        self.push("pause");
        Ok(())
    }

    fn on_execution_fail(
        &self,
        _context: &dyn ExecutionContext,
        _error: &dyn Error,
    ) -> txframe::Result<()> {
        self.push("fail");
        Ok(())
    }
}

fn modes(factory: &MemoryTransactionFactory) -> (TransactionMode, TransactionMode) {
    let root = ModeConfig::new(ModeKind::CreateRoot, false).into_mode(Rc::new(factory.clone()));
    let child = ModeConfig::default().into_mode(Rc::new(factory.clone()));
    (root, child)
}

#[test]
fn test_three_levels_nest_scopes_strictly() {
    let factory = MemoryTransactionFactory::new();
    let (root_mode, child_mode) = modes(&factory);
    let events = Rc::new(Events::default());

    let top = Frame::start(None, &root_mode);
    let top_listener = top
        .strategy()
        .create_execution_listener(NamedListener::new("top", &events));
    top_listener.on_execution_play(&*top.context).unwrap();

    let middle = Frame::start(Some(&top), &child_mode);
    let middle_listener = middle
        .strategy()
        .create_execution_listener(NamedListener::new("middle", &events));
    middle_listener.on_execution_play(&*middle.context).unwrap();

    let leaf = Frame::start(Some(&middle), &child_mode);
    let leaf_listener = leaf
        .strategy()
        .create_execution_listener(NamedListener::new("leaf", &events));
    leaf_listener.on_execution_play(&*leaf.context).unwrap();

    assert_eq!(middle.strategy().kind(), StrategyKind::Child);
    assert_eq!(leaf.strategy().kind(), StrategyKind::Child);
    assert_eq!(
        factory.active_scopes(),
        vec![top.txn_id(), middle.txn_id(), leaf.txn_id()]
    );

    leaf_listener.on_execution_stop(&*leaf.context).unwrap();
    assert!(middle.strategy().child_transaction_strategy().is_none());
    middle_listener.on_execution_stop(&*middle.context).unwrap();
    top_listener.on_execution_stop(&*top.context).unwrap();

    assert!(factory.active_scopes().is_empty());
    assert_eq!(
        events.0.borrow().clone(),
        vec![
            "top play",
            "middle play",
            "leaf play",
            "leaf stop",
            "middle stop",
            "top stop",
        ]
    );
}

#[test]
fn test_pause_takes_child_out_of_scope_and_play_restores_it() {
    let factory = MemoryTransactionFactory::new();
    let (root_mode, child_mode) = modes(&factory);
    let events = Rc::new(Events::default());

    let top = Frame::start(None, &root_mode);
    let top_listener = top
        .strategy()
        .create_execution_listener(NamedListener::new("top", &events));
    top_listener.on_execution_play(&*top.context).unwrap();
    let child = Frame::start(Some(&top), &child_mode);
    let child_listener = child
        .strategy()
        .create_execution_listener(NamedListener::new("child", &events));
    child_listener.on_execution_play(&*child.context).unwrap();

    // The engine suspends the whole stack through the outermost frame; the
    // child relays the events to the listener it was handed.
    top_listener.on_execution_pause(&*top.context).unwrap();
    assert!(factory.active_scopes().is_empty());
    assert!(!child.strategy().is_playing());
    assert!(top.strategy().child_transaction_strategy().is_some());

    top_listener.on_execution_play(&*top.context).unwrap();
    assert_eq!(factory.active_scopes(), vec![top.txn_id(), child.txn_id()]);

    child_listener.on_execution_stop(&*child.context).unwrap();
    top_listener.on_execution_stop(&*top.context).unwrap();

    assert_eq!(
        events.0.borrow().clone(),
        vec![
            "top play",
            "child play",
            "top pause",
            "top play",
            "child stop",
            "top stop",
        ]
    );
}

#[test]
fn test_outer_fail_tears_down_registered_child_first() {
    let factory = MemoryTransactionFactory::new();
    let (root_mode, child_mode) = modes(&factory);
    let events = Rc::new(Events::default());

    let top = Frame::start(None, &root_mode);
    let top_listener = top
        .strategy()
        .create_execution_listener(NamedListener::new("top", &events));
    top_listener.on_execution_play(&*top.context).unwrap();
    let child = Frame::start(Some(&top), &child_mode);
    let (top_txn, child_txn) = (top.txn_id(), child.txn_id());

    let cause = std::io::Error::new(std::io::ErrorKind::Other, "aborted");
    top_listener.on_execution_fail(&*top.context, &cause).unwrap();

    assert_eq!(factory.count(child_txn, Operation::Release), 1);
    assert_eq!(factory.count(top_txn, Operation::Release), 1);
    assert_eq!(factory.count(child_txn, Operation::Commit), 0);
    assert!(top.strategy().child_transaction_strategy().is_none());
    let journal = factory.journal();
    let position = |txn, op| {
        journal
            .iter()
            .position(|entry| entry.txn_id == txn && entry.op == op)
            .unwrap()
    };
    assert!(position(child_txn, Operation::Release) < position(top_txn, Operation::LeaveScope));
    // The failure is reported once, to the top frame's listener.
    assert_eq!(events.0.borrow().clone(), vec!["top play", "top fail"]);
}

#[test]
fn test_object_loaded_by_outer_is_usable_in_child() {
    let factory = MemoryTransactionFactory::new();
    let (root_mode, child_mode) = modes(&factory);

    let top = Frame::start(None, &root_mode);
    let object = top
        .strategy()
        .native_transaction::<MemoryTransaction>()
        .map(|txn| txn.bind(ObjectRef::new("Order", 7)))
        .unwrap();
    top.strategy()
        .on_execution_play(&*top.context, &txframe::NullExecutionListener)
        .unwrap();
    let child = Frame::start(Some(&top), &child_mode);

    child.strategy().ensure_compatibility(&[object.clone()]).unwrap();
    child.context.set_out_parameters(vec![object]);
    child
        .strategy()
        .on_execution_stop(&*child.context, &txframe::NullExecutionListener)
        .unwrap();
}
