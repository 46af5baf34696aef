#![forbid(unsafe_code)]

//! Per-instance metadata kept outside the host instance.
//!
//! Engines never attach fields to host instances. Whatever they need per
//! instance lives in an [`InstanceTable`] keyed by [`InstanceId`]: an entry is
//! attached by a `created` hook and detached by the teardown chain.
//!
//! Closures passed to [`with`](InstanceTable::with) and
//! [`with_mut`](InstanceTable::with_mut) run while the table is borrowed. They
//! must not call user code; copy what is needed out and call afterwards.
//!
//! Every table an engine creates while a definition is built is registered in
//! that definition's [`InstanceTables`], which reports how many instances are
//! still tracked.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use optbridge_core::{Error, InstanceId, Result};

pub struct InstanceTable<T> {
    name: &'static str,
    entries: RefCell<AHashMap<InstanceId, T>>,
}

impl<T> InstanceTable<T> {
    /// `name` appears in [`Error::InstanceNotTracked`].
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RefCell::new(AHashMap::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Attach `value`, returning the entry it replaced.
    pub fn attach(&self, id: InstanceId, value: T) -> Option<T> {
        self.entries.borrow_mut().insert(id, value)
    }

    pub fn detach(&self, id: InstanceId) -> Option<T> {
        self.entries.borrow_mut().remove(&id)
    }

    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn with<R>(&self, id: InstanceId, f: impl FnOnce(&T) -> R) -> Result<R> {
        let entries = self.entries.borrow();
        entries.get(&id).map(f).ok_or(Error::InstanceNotTracked {
            id,
            table: self.name,
        })
    }

    pub fn with_mut<R>(&self, id: InstanceId, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut entries = self.entries.borrow_mut();
        entries.get_mut(&id).map(f).ok_or(Error::InstanceNotTracked {
            id,
            table: self.name,
        })
    }
}

/// Occupancy of a table, independent of its entry type.
pub trait TrackedTable {
    fn name(&self) -> &'static str;
    /// Number of instances with an entry.
    fn tracked(&self) -> usize;
}

impl<T> TrackedTable for InstanceTable<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn tracked(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Tables registered while building one definition.
#[derive(Clone, Default)]
pub struct InstanceTables {
    tables: Rc<RefCell<Vec<Rc<dyn TrackedTable>>>>,
}

impl InstanceTables {
    pub(crate) fn register(&self, table: Rc<dyn TrackedTable>) {
        self.tables.borrow_mut().push(table);
    }

    /// `(name, tracked instances)` per table, in registration order.
    #[must_use]
    pub fn counts(&self) -> Vec<(&'static str, usize)> {
        self.tables
            .borrow()
            .iter()
            .map(|table| (table.name(), table.tracked()))
            .collect()
    }

    /// Entries across all tables; zero once every instance has been torn down.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.tables.borrow().iter().map(|table| table.tracked()).sum()
    }
}

impl fmt::Debug for InstanceTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.counts()).finish()
    }
}

impl<T> fmt::Debug for InstanceTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceTable")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}
