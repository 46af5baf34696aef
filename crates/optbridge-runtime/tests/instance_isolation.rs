//! Instances built from one definition share nothing per instance, and
//! teardown releases every per-instance table entry.

use std::cell::RefCell;
use std::rc::Rc;

use optbridge_core::{HostInstance, InstanceId, State, Value};
use optbridge_harness::Instance;
use optbridge_runtime::{ComponentOptions, ComputedSpec, Extender, WatchOptions, WatchSpec};
use serde_json::json;

type Fired = Rc<RefCell<Vec<(InstanceId, &'static str, Option<Value>, Option<Value>)>>>;

fn state(value: Value) -> State {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn counter(fired: &Fired) -> ComponentOptions {
    let (on_static, on_dynamic) = (Rc::clone(fired), Rc::clone(fired));
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
            WatchSpec::handler(move |vm, new, old| {
                let entry = (vm.id(), "static", new.cloned(), old.cloned());
                on_static.borrow_mut().push(entry);
                Ok(())
            }),
        )
        .mounted(move |vm| {
            let sink = Rc::clone(&on_dynamic);
            vm.watch(
                "count",
                move |vm, new, old| {
                    let entry = (vm.id(), "dynamic", new.cloned(), old.cloned());
                    sink.borrow_mut().push(entry);
                    Ok(())
                },
                WatchOptions::default(),
            )?;
            Ok(())
        })
}

#[test]
fn commits_on_one_instance_never_reach_another() {
    let fired: Fired = Rc::new(RefCell::new(Vec::new()));
    let definition = Extender::new().build(&counter(&fired)).unwrap();
    let mut first = Instance::create(&definition).unwrap();
    let mut second = Instance::create(&definition).unwrap();
    first.mount().unwrap();
    second.mount().unwrap();
    let (a, b) = (first.id(), second.id());

    first.commit(state(json!({"count": 1}))).unwrap();
    assert_eq!(
        *fired.borrow(),
        [
            (a, "static", Some(json!(1)), Some(json!(0))),
            (a, "dynamic", Some(json!(1)), Some(json!(0))),
        ]
    );
    assert_eq!(second.get("double"), Some(&json!(0)));

    // The second instance still compares against its own old value.
    fired.borrow_mut().clear();
    second.commit(state(json!({"count": 7}))).unwrap();
    first.commit(state(json!({"count": 2}))).unwrap();
    assert_eq!(
        *fired.borrow(),
        [
            (b, "static", Some(json!(7)), Some(json!(0))),
            (b, "dynamic", Some(json!(7)), Some(json!(0))),
            (a, "static", Some(json!(2)), Some(json!(1))),
            (a, "dynamic", Some(json!(2)), Some(json!(1))),
        ]
    );
    assert_eq!(first.get("double"), Some(&json!(4)));
    assert_eq!(second.get("double"), Some(&json!(14)));
}

#[test]
fn detaching_an_instance_leaves_its_sibling_running() {
    let fired: Fired = Rc::new(RefCell::new(Vec::new()));
    let definition = Extender::new().build(&counter(&fired)).unwrap();
    let mut first = Instance::create(&definition).unwrap();
    let mut second = Instance::create(&definition).unwrap();
    first.mount().unwrap();
    second.mount().unwrap();

    first.detach().unwrap();
    second.commit(state(json!({"count": 3}))).unwrap();
    let ids: Vec<InstanceId> = fired.borrow().iter().map(|entry| entry.0).collect();
    assert_eq!(ids, [second.id(), second.id()]);
}

#[test]
fn repeated_create_and_detach_releases_every_table_entry() {
    let fired: Fired = Rc::new(RefCell::new(Vec::new()));
    let (definition, tables) = Extender::new()
        .build_with_tables(&counter(&fired))
        .unwrap();

    for round in 0..8 {
        let mut instance = Instance::create(&definition).unwrap();
        instance.mount().unwrap();
        assert_eq!(
            tables.counts(),
            [
                ("dynamic watcher", 1),
                ("static watcher", 1),
                ("commit interceptor", 1),
            ],
            "round {round}"
        );
        instance.commit(state(json!({"count": round + 1}))).unwrap();
        instance.detach().unwrap();
        assert_eq!(tables.tracked(), 0, "round {round}");
    }

    let mut live: Vec<Instance> = (0..3)
        .map(|_| Instance::create(&definition).unwrap())
        .collect();
    assert_eq!(tables.tracked(), 9);
    for instance in &mut live {
        instance.detach().unwrap();
    }
    assert_eq!(tables.tracked(), 0);
}
