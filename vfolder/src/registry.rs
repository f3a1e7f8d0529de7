//! # Registry
//!
//! Module dedicated to the lookup of the virtual folders watching a
//! given source folder. The core structure of the module is the
//! [`Registry`].

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

/// The registry of virtual folders, keyed by source identifier.
///
/// Several virtual folders can watch the same source.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Registry {
    watchers: HashMap<String, BTreeSet<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the given virtual folder as a watcher of the given
    /// source.
    pub fn register(&mut self, source: impl ToString, vfolder: impl ToString) {
        let source = source.to_string();
        let vfolder = vfolder.to_string();
        trace!(source = source.as_str(), vfolder = vfolder.as_str(), "register vfolder");
        self.watchers.entry(source).or_default().insert(vfolder);
    }

    /// Unregisters the given virtual folder from the given source.
    /// Returns `false` if it was not registered.
    pub fn unregister(&mut self, source: &str, vfolder: &str) -> bool {
        let Some(names) = self.watchers.get_mut(source) else {
            return false;
        };

        let removed = names.remove(vfolder);
        if names.is_empty() {
            self.watchers.remove(source);
        }

        trace!(source, vfolder, removed, "unregister vfolder");
        removed
    }

    /// Moves the watchers of the `from` source to the `to` source.
    /// Returns the moved watchers.
    pub fn rekey(&mut self, from: &str, to: impl ToString) -> BTreeSet<String> {
        let Some(names) = self.watchers.remove(from) else {
            return BTreeSet::new();
        };

        let to = to.to_string();
        trace!(from, to = to.as_str(), ?names, "rekey vfolders");
        self.watchers.entry(to).or_default().extend(names.clone());
        names
    }

    /// Removes the given source. Returns its former watchers.
    pub fn remove_source(&mut self, source: &str) -> BTreeSet<String> {
        self.watchers.remove(source).unwrap_or_default()
    }

    /// Returns the names of the virtual folders watching the given
    /// source, in name order.
    pub fn watchers(&self, source: &str) -> Vec<String> {
        self.watchers
            .get(source)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_watched(&self, source: &str) -> bool {
        self.watchers.contains_key(source)
    }

    /// Returns the watched source identifiers.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.watchers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    pub fn clear(&mut self) {
        self.watchers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::Registry;

    #[test]
    fn register_and_rekey() {
        let mut registry = Registry::new();
        registry.register("inbox", "invoices");
        registry.register("inbox", "alerts");
        registry.register("archive", "old");

        assert_eq!(registry.watchers("inbox"), vec!["alerts", "invoices"]);
        assert!(registry.watchers("sent").is_empty());

        let moved = registry.rekey("inbox", "INBOX");
        assert_eq!(moved.len(), 2);
        assert!(!registry.is_watched("inbox"));
        assert_eq!(registry.watchers("INBOX"), vec!["alerts", "invoices"]);

        assert!(registry.unregister("INBOX", "alerts"));
        assert!(!registry.unregister("INBOX", "alerts"));
        assert!(registry.unregister("INBOX", "invoices"));
        assert!(!registry.is_watched("INBOX"));

        assert_eq!(registry.remove_source("archive").len(), 1);
        assert!(registry.is_empty());
    }
}
