#![forbid(unsafe_code)]

//! State shared by every instance of one built definition.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::AdapterConfig;
use crate::installers::watcher::DynamicWatchers;
use crate::options::Method;
use crate::side_table::{InstanceTable, InstanceTables, TrackedTable};

pub(crate) struct RuntimeShared {
    config: AdapterConfig,
    /// Merged methods; filled during the install stage.
    methods: RefCell<Vec<(String, Method)>>,
    /// Imperative watchers, attached by the watcher engine at `created`.
    pub(crate) dynamic: Rc<InstanceTable<DynamicWatchers>>,
    tables: InstanceTables,
}

impl RuntimeShared {
    pub(crate) fn new(config: AdapterConfig) -> Self {
        let dynamic = Rc::new(InstanceTable::new("dynamic watcher"));
        let tables = InstanceTables::default();
        tables.register(Rc::clone(&dynamic) as Rc<dyn TrackedTable>);
        Self {
            config,
            methods: RefCell::new(Vec::new()),
            dynamic,
            tables,
        }
    }

    pub(crate) fn tables(&self) -> &InstanceTables {
        &self.tables
    }

    pub(crate) fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub(crate) fn set_methods(&self, methods: Vec<(String, Method)>) {
        *self.methods.borrow_mut() = methods;
    }

    pub(crate) fn method(&self, name: &str) -> Option<Method> {
        self.methods
            .borrow()
            .iter()
            .find_map(|(key, method)| (key == name).then(|| Method::clone(method)))
    }

    pub(crate) fn has_method(&self, name: &str) -> bool {
        self.methods.borrow().iter().any(|(key, _)| key == name)
    }
}

impl fmt::Debug for RuntimeShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<String> = self
            .methods
            .borrow()
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        f.debug_struct("RuntimeShared")
            .field("config", &self.config)
            .field("methods", &methods)
            .field("tables", &self.tables)
            .finish()
    }
}
