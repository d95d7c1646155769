use super::*;
use crate::error::NativeErrorKind;

#[test]
fn test_begin_allocates_sequential_ids() {
    let factory = MemoryTransactionFactory::new();
    assert_eq!(factory.next_txn_id(), 1);

    let first = factory.begin().unwrap();
    let second = factory.begin().unwrap();
    assert_eq!(first.id(), 1);
    assert_eq!(second.id(), 2);
    assert_eq!(first.parent_id(), None);
    assert_eq!(factory.state(1), Some(TxnState::Active));
}

#[test]
fn test_journal_records_operations_in_order() {
    let factory = MemoryTransactionFactory::new();
    let mut txn = factory.begin().unwrap();

    let scope = txn.enter_scope().unwrap();
    txn.commit().unwrap();
    scope.leave().unwrap();
    txn.release().unwrap();

    assert_eq!(
        factory.operations(txn.id()),
        vec![
            Operation::Begin,
            Operation::EnterScope,
            Operation::Commit,
            Operation::LeaveScope,
            Operation::Release,
        ]
    );
    assert_eq!(factory.state(txn.id()), Some(TxnState::Released));
    assert_eq!(factory.journal()[1].to_string(), "txn 1: ENTER SCOPE");
}

#[test]
fn test_released_transaction_rejects_operations() {
    let factory = MemoryTransactionFactory::new();
    let mut txn = factory.begin().unwrap();
    txn.release().unwrap();

    let err = txn.commit().unwrap_err();
    assert_eq!(err.kind(), NativeErrorKind::Failed);
    assert!(err.message().contains("already been released"));
    assert!(txn.release().is_err());
    assert_eq!(factory.count(txn.id(), Operation::Release), 1);
}

#[test]
fn test_scopes_must_nest() {
    let factory = MemoryTransactionFactory::new();
    let mut outer = factory.begin().unwrap();
    let mut inner = outer.create_child().unwrap();

    let outer_scope = outer.enter_scope().unwrap();
    let inner_scope = inner.enter_scope().unwrap();
    assert_eq!(factory.active_scopes(), vec![1, 2]);

    let err = outer_scope.leave().unwrap_err();
    assert!(err.message().contains("not the innermost"));

    inner_scope.leave().unwrap();
    assert_eq!(factory.active_scopes(), vec![1]);
}

#[test]
fn test_child_sees_parent_objects_but_not_the_reverse() {
    let factory = MemoryTransactionFactory::new();
    let mut parent = factory.begin().unwrap();
    let child = parent.create_child().unwrap();
    let child_id = child
        .as_any()
        .downcast_ref::<MemoryTransaction>()
        .map(MemoryTransaction::id)
        .unwrap();
    assert_eq!(child_id, 2);

    let parent_object = parent.bind(ObjectRef::new("Order", 1));
    let child_object = Value::Object(ObjectRef::new("Order", 2).bound_to(child_id));

    child
        .ensure_compatibility(&[parent_object.clone(), Value::Integer(5)])
        .unwrap();
    parent.ensure_compatibility(&[parent_object]).unwrap();

    let err = parent.ensure_compatibility(&[child_object]).unwrap_err();
    assert_eq!(err.kind(), NativeErrorKind::Incompatible);
    assert_eq!(
        err.message(),
        "The object 'Order|2' is bound to transaction 2 and cannot be used in transaction 1."
    );
}

#[test]
fn test_commit_hands_child_objects_to_parent() {
    let factory = MemoryTransactionFactory::new();
    let mut parent = factory.begin().unwrap();
    let mut child = parent.create_child().unwrap();
    let mut grandchild = child.create_child().unwrap();
    let unrelated = factory.begin().unwrap();
    let object = Value::Object(ObjectRef::new("Order", 3).bound_to(3));

    grandchild.commit().unwrap();
    child.ensure_compatibility(&[object.clone()]).unwrap();
    // The child has not committed yet, so the object stops one level up.
    assert!(parent.ensure_compatibility(&[object.clone()]).is_err());

    child.commit().unwrap();
    parent.ensure_compatibility(&[object.clone()]).unwrap();
    let err = unrelated.ensure_compatibility(&[object]).unwrap_err();
    assert_eq!(err.kind(), NativeErrorKind::Incompatible);
}

#[test]
fn test_injected_fault_fires_once() {
    let factory = MemoryTransactionFactory::new();
    let mut txn = factory.begin().unwrap();
    factory.inject_fault(txn.id(), Operation::Commit, "commit refused");

    let err = txn.commit().unwrap_err();
    assert_eq!(err.message(), "commit refused");
    assert_eq!(factory.count(txn.id(), Operation::Commit), 0);

    txn.commit().unwrap();
    assert_eq!(factory.count(txn.id(), Operation::Commit), 1);
}

#[test]
fn test_begin_fault_fails_creation() {
    let factory = MemoryTransactionFactory::new();
    factory.inject_fault(factory.next_txn_id(), Operation::Begin, "no connection");

    assert!(factory.create().is_err());
    assert_eq!(factory.next_txn_id(), 1);
    assert!(factory.create().is_ok());
}

#[test]
fn test_leave_fault_still_removes_scope() {
    let factory = MemoryTransactionFactory::new();
    let mut txn = factory.begin().unwrap();
    let scope = txn.enter_scope().unwrap();
    factory.inject_fault(txn.id(), Operation::LeaveScope, "leave refused");

    assert!(scope.leave().is_err());
    assert!(factory.active_scopes().is_empty());
}
