//! Property tests for the in-memory host's native commit.
//!
//! - every applied key is readable afterwards at its path
//! - a subtree observer fires whenever the exact observer on the same path does
//! - the catch-all observer fires on every commit
//! - the commit log records payloads in order

use std::cell::RefCell;
use std::rc::Rc;

use optbridge_core::host::{self, Behavior, HostDefinition};
use optbridge_core::{HostInstance, State, Value};
use optbridge_harness::Instance;
use proptest::prelude::*;

fn key_segment() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c"]).prop_map(str::to_owned)
}

fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(key_segment(), 1..4).prop_map(|segments| segments.join("."))
}

fn counting(key: &str, hits: &Rc<RefCell<Vec<String>>>) -> Behavior {
    let hits = Rc::clone(hits);
    let label = key.to_owned();
    Behavior::new(key).observe(
        key,
        host::observer(move |_, _| {
            hits.borrow_mut().push(label.clone());
            Ok(())
        }),
    )
}

proptest! {
    #[test]
    fn applied_keys_are_readable(path in path_strategy(), n in 0i64..100) {
        let mut instance = Instance::create(&HostDefinition::new()).unwrap();
        let mut payload = State::new();
        payload.insert(path.clone(), Value::from(n));
        instance.commit(payload).unwrap();
        prop_assert_eq!(instance.get_path(&path).unwrap(), Some(&Value::from(n)));
    }

    #[test]
    fn subtree_covers_exact(observed in path_strategy(), changed in path_strategy()) {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut definition = HostDefinition::new();
        definition.append_behavior(counting(&observed, &hits));
        definition.append_behavior(counting(&format!("{}.**", observed), &hits));
        definition.append_behavior(counting("**", &hits));

        let mut instance = Instance::create(&definition).unwrap();
        let mut payload = State::new();
        payload.insert(changed, Value::from(1));
        instance.commit(payload).unwrap();

        let hits = hits.borrow();
        prop_assert!(hits.contains(&"**".to_owned()));
        if hits.contains(&observed) {
            let nested = format!("{observed}.**");
            prop_assert!(hits.contains(&nested));
        }
    }

    #[test]
    fn commit_log_keeps_order(values in prop::collection::vec(0i64..10, 1..8)) {
        let mut instance = Instance::create(&HostDefinition::new()).unwrap();
        for value in &values {
            let mut payload = State::new();
            payload.insert("x".into(), Value::from(*value));
            instance.commit(payload).unwrap();
        }
        let logged: Vec<i64> = instance
            .commit_log()
            .iter()
            .map(|p| p["x"].as_i64().unwrap())
            .collect();
        prop_assert_eq!(logged, values.clone());
        let expected = values.last().map(|v| Value::from(*v));
        prop_assert_eq!(instance.data().get("x"), expected.as_ref());
    }
}
