//! Property tests for the reactive commit path.
//!
//! - a computed entry always mirrors the state it derives from
//! - a static watcher fires exactly once per actual change, with the previous value as `old`

use std::cell::RefCell;
use std::rc::Rc;

use optbridge_core::{State, Value};
use optbridge_harness::Instance;
use optbridge_runtime::{ComponentOptions, ComputedSpec, Extender, WatchSpec};
use proptest::prelude::*;
use serde_json::json;

type Seen = Rc<RefCell<Vec<(i64, i64)>>>;

fn component(seen: &Seen) -> ComponentOptions {
    let seen = Rc::clone(seen);
    ComponentOptions::new()
        .data(json!({"count": 0}))
        .computed(
            "double",
            ComputedSpec::getter(|scope| {
                let count = scope.get("count")?.and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(count * 2))
            }),
        )
        .watch(
            "count",
            WatchSpec::handler(move |_, new, old| {
                let as_int = |v: Option<&Value>| v.and_then(Value::as_i64).unwrap_or(-1);
                seen.borrow_mut().push((as_int(new), as_int(old)));
                Ok(())
            }),
        )
}

fn payload(count: i64) -> State {
    let mut state = State::new();
    state.insert("count".to_owned(), json!(count));
    state
}

proptest! {
    #[test]
    fn computed_tracks_source_and_watcher_sees_every_change(
        values in prop::collection::vec(0i64..4, 0..24),
    ) {
        let seen: Seen = Rc::new(RefCell::new(Vec::new()));
        let definition = Extender::new().build(&component(&seen)).unwrap();
        let mut instance = Instance::create(&definition).unwrap();
        instance.mount().unwrap();

        let mut expected = Vec::new();
        let mut previous = 0;
        for value in values {
            instance.commit(payload(value)).unwrap();
            prop_assert_eq!(instance.get("double"), Some(&json!(value * 2)));
            if value != previous {
                expected.push((value, previous));
                previous = value;
            }
        }
        prop_assert_eq!(&*seen.borrow(), &expected);
    }
}
