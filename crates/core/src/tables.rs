//! Registry of named cache tables.
//!
//! Cache tables are identified by name so that a restarting partition can
//! detect that a previous incarnation's tables have not been reclaimed yet.
//! Creation against a taken name fails; the partition retries at
//! [`crate::config::TABLE_RETRY`] until the name frees up.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::error::TableError;

#[derive(Default)]
pub struct TableRegistry {
    names: Mutex<HashSet<String>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name`, failing if a table with that name still exists.
    pub fn create(&self, name: &str) -> Result<(), TableError> {
        let mut names = self.names.lock();
        if names.insert(name.to_owned()) {
            Ok(())
        } else {
            Err(TableError::Exists(name.to_owned()))
        }
    }

    /// Releases `name`. Releasing a name that was never created is swallowed;
    /// it happens when terminate races a failed init.
    pub fn release(&self, name: &str) {
        if !self.names.lock().remove(name) {
            log::trace!("released table `{name}` was not registered");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().contains(name)
    }
}
