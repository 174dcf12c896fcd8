//! Tests for the process-wide store stack.
//!
//! Every case lives in one test function: the stack is shared process
//! state, and interleaving pushes from parallel tests would make the
//! assertions meaningless.

use std::sync::Arc;

use quarry_orm::{activate, current_store, pop_store, push_store, remove_store, Context, OrmError, Store};

#[test]
fn stack_resolution_and_guards() {
    // Empty stack: nothing resolves.
    assert!(current_store(None).is_none());
    match Context::new().store() {
        Err(OrmError::StoreNotFound(None)) => {}
        other => panic!("expected StoreNotFound, got {other:?}"),
    }

    let primary = Arc::new(Store::new("primary"));
    let replica = Arc::new(Store::new("replica"));

    push_store(Arc::clone(&primary));
    push_store(Arc::clone(&replica));

    // Unnamed resolution takes the top of the stack.
    let top = current_store(None).unwrap();
    assert!(Arc::ptr_eq(&top, &replica));

    // Named resolution scans from the top down.
    let found = current_store(Some("primary")).unwrap();
    assert!(Arc::ptr_eq(&found, &primary));
    assert!(current_store(Some("missing")).is_none());

    // A second store under an existing name shadows the first.
    let shadow = Arc::new(Store::new("primary"));
    push_store(Arc::clone(&shadow));
    let found = current_store(Some("primary")).unwrap();
    assert!(Arc::ptr_eq(&found, &shadow));
    pop_store();

    // Context resolution against the stack.
    let resolved = Context::new().store().unwrap();
    assert!(Arc::ptr_eq(&resolved, &replica));
    let resolved = Context::build().store("primary").finish().store().unwrap();
    assert!(Arc::ptr_eq(&resolved, &primary));
    match Context::build().store("missing").finish().store() {
        Err(OrmError::StoreNotFound(Some(name))) => assert_eq!(name, "missing"),
        other => panic!("expected StoreNotFound, got {other:?}"),
    }

    // Guards pop on drop, in LIFO order.
    let scoped = Arc::new(Store::new("scoped"));
    {
        let _guard = activate(&scoped);
        let top = current_store(None).unwrap();
        assert!(Arc::ptr_eq(&top, &scoped));
    }
    let top = current_store(None).unwrap();
    assert!(Arc::ptr_eq(&top, &replica));

    // Targeted removal, wherever the store sits.
    assert!(remove_store(&primary).is_some());
    assert!(remove_store(&primary).is_none());
    let top = pop_store().unwrap();
    assert!(Arc::ptr_eq(&top, &replica));
    assert!(pop_store().is_none());
}
