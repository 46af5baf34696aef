//! Installer pipeline and lifecycle chains, driven through the in-memory host.

use std::cell::RefCell;
use std::rc::Rc;

use optbridge_core::host::{Behavior, HostDefinition};
use optbridge_core::{Error, PropertySpec, PropertyType, State, Value};
use optbridge_harness::Instance;
use optbridge_runtime::{BuildCx, ComponentOptions, Extender, Installer, Mixin, WatchSpec};
use serde_json::json;

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn push(log: &Log, entry: &str) {
    log.borrow_mut().push(entry.to_owned());
}

fn state(value: Value) -> State {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn recording_mixin(name: &'static str, log: &Log) -> Mixin {
    let created = Rc::clone(log);
    let attached = Rc::clone(log);
    Mixin::new(name)
        .on_created(move |_| {
            push(&created, &format!("{name}.created"));
            Ok(())
        })
        .on_attached(move |_| {
            push(&attached, &format!("{name}.attached"));
            Ok(())
        })
}

#[test]
fn created_chain_runs_native_then_translated() {
    let log = log();
    let (created, before_mount) = (Rc::clone(&log), Rc::clone(&log));
    let options = ComponentOptions::new()
        .created(move |_| {
            push(&created, "created");
            Ok(())
        })
        .before_mount(move |_| {
            push(&before_mount, "beforeMount");
            Ok(())
        });
    let definition = Extender::new()
        .install(recording_mixin("A", &log))
        .install(recording_mixin("B", &log))
        .build(&options)
        .unwrap();

    let mut instance = Instance::create(&definition).unwrap();
    assert_eq!(
        *log.borrow(),
        ["A.created", "B.created", "created", "beforeMount"]
    );

    instance.mount().unwrap();
    assert_eq!(&log.borrow()[4..], ["A.attached", "B.attached"]);
}

#[test]
fn translated_hooks_from_installers_precede_options_hooks() {
    let log = log();
    let (from_mixin, from_options) = (Rc::clone(&log), Rc::clone(&log));
    let mixin = Mixin::new("base").with_options(ComponentOptions::new().mounted(move |_| {
        push(&from_mixin, "base.mounted");
        Ok(())
    }));
    let options = ComponentOptions::new().mounted(move |_| {
        push(&from_options, "mounted");
        Ok(())
    });
    let definition = Extender::new().install(mixin).build(&options).unwrap();
    let mut instance = Instance::create(&definition).unwrap();
    instance.mount().unwrap();
    assert_eq!(*log.borrow(), ["base.mounted", "mounted"]);
}

#[test]
fn before_create_runs_first_without_instance() {
    let log = log();
    let (before, created) = (Rc::clone(&log), Rc::clone(&log));
    let options = ComponentOptions::new()
        .data(json!({"ready": true}))
        .before_create(move || {
            push(&before, "beforeCreate");
            Ok(())
        })
        .created(move |vm| {
            assert_eq!(vm.get("ready"), Some(&json!(true)));
            push(&created, "created");
            Ok(())
        });
    let definition = Extender::new().build(&options).unwrap();
    Instance::create(&definition).unwrap();
    assert_eq!(*log.borrow(), ["beforeCreate", "created"]);
}

#[test]
fn destroy_hooks_run_in_order_on_detach() {
    let log = log();
    let (before, after) = (Rc::clone(&log), Rc::clone(&log));
    let options = ComponentOptions::new()
        .destroyed(move |_| {
            push(&after, "destroyed");
            Ok(())
        })
        .before_destroy(move |_| {
            push(&before, "beforeDestroy");
            Ok(())
        });
    let definition = Extender::new().build(&options).unwrap();
    let mut instance = Instance::create(&definition).unwrap();
    instance.mount().unwrap();
    instance.detach().unwrap();
    assert_eq!(*log.borrow(), ["beforeDestroy", "destroyed"]);
}

#[test]
fn page_events_ready_and_moved() {
    let log = log();
    let (show, hide, resize, ready, moved) = (
        Rc::clone(&log),
        Rc::clone(&log),
        Rc::clone(&log),
        Rc::clone(&log),
        Rc::clone(&log),
    );
    let mixin = Mixin::new("page")
        .on_show(move |_| {
            push(&show, "show");
            Ok(())
        })
        .on_hide(move |_| {
            push(&hide, "hide");
            Ok(())
        })
        .on_resize(move |_| {
            push(&resize, "resize");
            Ok(())
        })
        .on_ready(move |_| {
            push(&ready, "ready");
            Ok(())
        })
        .on_moved(move |_| {
            push(&moved, "moved");
            Ok(())
        });
    let definition = Extender::new()
        .install(mixin)
        .build(&ComponentOptions::new())
        .unwrap();
    let mut instance = Instance::create(&definition).unwrap();
    instance.mount().unwrap();
    instance.show().unwrap();
    instance.resize().unwrap();
    instance.moved().unwrap();
    instance.hide().unwrap();
    assert_eq!(*log.borrow(), ["ready", "show", "resize", "moved", "hide"]);
}

#[test]
fn malformed_watch_path_aborts_build() {
    let options = ComponentOptions::new().watch("a b", WatchSpec::handler(|_, _, _| Ok(())));
    let err = Extender::new().build(&options).unwrap_err();
    assert!(err.is_path_syntax(), "{err}");
}

#[test]
fn malformed_observer_key_aborts_build() {
    let options = ComponentOptions::new().observer("a..b", |_, _| Ok(()));
    let err = Extender::new().build(&options).unwrap_err();
    assert!(err.is_path_syntax(), "{err}");
}

#[test]
fn data_factory_and_property_views() {
    let seen: Rc<RefCell<Vec<(State, State)>>> = Rc::new(RefCell::new(Vec::new()));
    let (at_created, at_mounted) = (Rc::clone(&seen), Rc::clone(&seen));
    let options = ComponentOptions::new()
        .prop(
            "size",
            PropertySpec::new(PropertyType::Number).with_default(json!(2)),
        )
        .data_fn(|defaults| {
            let size = defaults.get("size").and_then(Value::as_i64).unwrap_or(0);
            Ok(state(json!({"area": size * size})))
        })
        .created(move |vm| {
            at_created.borrow_mut().push((vm.props(), vm.own_data()));
            Ok(())
        })
        .mounted(move |vm| {
            at_mounted.borrow_mut().push((vm.props(), vm.own_data()));
            Ok(())
        });
    let definition = Extender::new().build(&options).unwrap();
    let mut instance = Instance::create(&definition).unwrap();
    instance.mount_with(state(json!({"size": 3}))).unwrap();

    let seen = seen.borrow();
    assert_eq!(seen[0].0, state(json!({"size": 2})));
    assert_eq!(seen[0].1, state(json!({"area": 4})));
    assert_eq!(seen[1].0, state(json!({"size": 3})));
    assert_eq!(seen[1].1, state(json!({"area": 4})));
}

#[test]
fn methods_are_callable_from_the_host_and_from_each_other() {
    let options = ComponentOptions::new()
        .data(json!({"count": 2}))
        .method("double", |vm, _| {
            let count = vm.get("count").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(count * 2))
        })
        .method("quadruple", |vm, args| {
            let doubled = vm.call("double", args)?;
            Ok(json!(doubled.as_i64().unwrap_or(0) * 2))
        })
        .method("broken", |vm, _| vm.call("missing", &[]));
    let definition = Extender::new().build(&options).unwrap();
    let mut instance = Instance::create(&definition).unwrap();

    assert_eq!(instance.call_method("quadruple", &[]).unwrap(), json!(8));
    let err = instance.call_method("broken", &[]).unwrap_err();
    assert!(matches!(err, Error::UnknownMethod { ref name } if name == "missing"));
}

#[test]
fn native_observers_run_before_watchers_on_the_same_key() {
    let log = log();
    let (observer, watcher) = (Rc::clone(&log), Rc::clone(&log));
    let options = ComponentOptions::new()
        .data(json!({"x": 0}))
        .watch(
            "x",
            WatchSpec::handler(move |_, _, _| {
                push(&watcher, "watch");
                Ok(())
            }),
        )
        .observer("x", move |_, value| {
            push(&observer, &format!("observer {}", value.cloned().unwrap_or_default()));
            Ok(())
        });
    let definition = Extender::new().build(&options).unwrap();
    let mut instance = Instance::create(&definition).unwrap();
    instance.mount().unwrap();
    instance.commit(state(json!({"x": 1}))).unwrap();
    assert_eq!(*log.borrow(), ["observer 1", "watch"]);
}

#[test]
fn installer_observers_merge_with_options_observers() {
    let log = log();
    let (base_a, base_b, own_b) = (Rc::clone(&log), Rc::clone(&log), Rc::clone(&log));
    let mixin = Mixin::new("base").with_options(
        ComponentOptions::new()
            .observer("a", move |_, _| {
                push(&base_a, "base.a");
                Ok(())
            })
            .observer("b", move |_, _| {
                push(&base_b, "base.b");
                Ok(())
            }),
    );
    let options = ComponentOptions::new().observer("b", move |_, _| {
        push(&own_b, "own.b");
        Ok(())
    });
    let definition = Extender::new().install(mixin).build(&options).unwrap();
    let mut instance = Instance::create(&definition).unwrap();
    instance.mount().unwrap();
    instance.commit(state(json!({"a": 1, "b": 1}))).unwrap();
    assert_eq!(*log.borrow(), ["base.a", "own.b"]);
}

/// Counts instances through the context store and a bound behaviour.
struct InstanceCounter {
    created: Rc<RefCell<u32>>,
}

impl Installer for InstanceCounter {
    fn name(&self) -> &str {
        "instance-counter"
    }

    fn install(&self, cx: &mut BuildCx<'_>) -> optbridge_core::Result<()> {
        let names: Vec<String> = cx.installers().iter().map(|i| i.name().to_owned()).collect();
        cx.context.set("installer-names", names);
        Ok(())
    }

    fn definition_filter(
        &self,
        cx: &mut BuildCx<'_>,
        definition: &mut HostDefinition,
    ) -> optbridge_core::Result<()> {
        let names = cx.context.get::<Vec<String>>("installer-names").cloned().unwrap_or_default();
        assert_eq!(names.last().map(String::as_str), Some("instance-counter"));

        let created = Rc::clone(&self.created);
        let hook = cx.bind(optbridge_runtime::options::hook(move |vm| {
            *created.borrow_mut() += 1;
            vm.set("counted", json!(true))
        }));
        definition.append_behavior(Behavior::new("instance-counter").on_created(hook));
        Ok(())
    }
}

#[test]
fn custom_installer_attaches_bound_behaviour() {
    let created = Rc::new(RefCell::new(0));
    let extender = Extender::new().install(InstanceCounter {
        created: Rc::clone(&created),
    });
    let definition = extender.build(&ComponentOptions::new()).unwrap();
    assert_eq!(
        definition.behavior_names(),
        ["update", "computed", "watcher", "lifecycle", "instance-counter", "closing"]
    );

    let first = Instance::create(&definition).unwrap();
    let second = Instance::create(&definition).unwrap();
    assert_eq!(*created.borrow(), 2);
    assert_eq!(first.get("counted"), Some(&json!(true)));
    assert_eq!(second.get("counted"), Some(&json!(true)));
}
