//! Minimal, non-overlapping set of pending field changes.
//!
//! Every tracked write on an [`Entity`](crate::entity::Entity) is recorded here.
//! The set never holds two keys where one is a prefix of the other: a store
//! update naming both `a` and `a.b` is conflicting, so writes below an already
//! pending key collapse into it, and a new key swallows any pending key below it.

use bson::{Bson, Document};

use crate::{
    backend::Update,
    path::{self, FieldPath},
};

/// A single pending change.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    /// Replace the value at the key.
    Set(Bson),
    /// Remove the key.
    Unset,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingUpdates {
    entries: Vec<(String, FieldChange)>,
}

impl PendingUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FieldChange> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, change)| change)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Pending keys in the order they were first recorded.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldChange)> {
        self.entries.iter().map(|(key, change)| (key.as_str(), change))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Records a write that has already been applied to `tree`.
    ///
    /// `boundary` is the length of the shortest prefix of `path` the write
    /// created or replaced (see [`path::SetOutcome`]). Recording at that prefix
    /// keeps the update valid even when the store holds a scalar where the new
    /// branch starts.
    pub fn record_set(&mut self, tree: &Document, path: &FieldPath, boundary: usize) {
        if self.collapse_into_pending_prefix(tree, path) {
            return;
        }

        let key = path.prefix(boundary.clamp(1, path.len()));
        let change = current_change(tree, &key);
        self.put(key, change);
    }

    /// Records a removal that has already been applied to `tree`.
    pub fn record_unset(&mut self, tree: &Document, path: &FieldPath) {
        if self.collapse_into_pending_prefix(tree, path) {
            return;
        }

        self.put(path.as_str().to_string(), FieldChange::Unset);
    }

    /// Renders the pending set as a `$set` / `$unset` pair.
    ///
    /// The identifier is immutable in the store and is never part of `$set`.
    pub fn to_update(&self) -> Update {
        let mut update = Update::default();

        for (key, change) in &self.entries {
            if key == "_id" {
                continue;
            }
            match change {
                FieldChange::Set(value) => {
                    update.set.insert(key.clone(), value.clone());
                }
                FieldChange::Unset => update.unset.push(key.clone()),
            }
        }

        update
    }

    /// Forgets changes at or below `path` after the store was written there directly.
    ///
    /// A pending ancestor stays pending and is refreshed from `tree`.
    pub(crate) fn settle(&mut self, tree: &Document, path: &FieldPath) {
        let ancestor = path
            .prefixes()
            .take(path.len().saturating_sub(1))
            .find(|prefix| self.contains_key(prefix));

        match ancestor {
            Some(prefix) => {
                let change = current_change(tree, &prefix);
                self.put(prefix, change);
            }
            None => {
                let key = path.as_str();
                self.entries
                    .retain(|(existing, _)| existing != key && !path::is_descendant(existing, key));
            }
        }
    }

    /// Refreshes the first pending prefix of `path` from `tree`, if there is one.
    fn collapse_into_pending_prefix(&mut self, tree: &Document, path: &FieldPath) -> bool {
        let Some(prefix) = path.prefixes().find(|prefix| self.contains_key(prefix)) else {
            return false;
        };

        let change = current_change(tree, &prefix);
        self.put(prefix, change);
        true
    }

    fn put(&mut self, key: String, change: FieldChange) {
        self.entries
            .retain(|(existing, _)| !path::is_descendant(existing, &key));

        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = change,
            None => self.entries.push((key, change)),
        }
    }
}

fn current_change(tree: &Document, key: &str) -> FieldChange {
    FieldPath::parse(key)
        .ok()
        .and_then(|path| path::get_path(tree, &path).cloned())
        .map(FieldChange::Set)
        .unwrap_or(FieldChange::Unset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use proptest::prelude::*;

    use crate::path::{set_path, unset_path};

    fn write(tree: &mut Document, pending: &mut PendingUpdates, path: &str, value: impl Into<Bson>) {
        let path = FieldPath::parse(path).unwrap();
        let outcome = set_path(tree, &path, value.into());
        pending.record_set(tree, &path, outcome.boundary);
    }

    fn remove(tree: &mut Document, pending: &mut PendingUpdates, path: &str) {
        let path = FieldPath::parse(path).unwrap();
        unset_path(tree, &path);
        pending.record_unset(tree, &path);
    }

    #[test]
    fn new_branch_is_recorded_at_its_root() {
        let mut tree = doc! {};
        let mut pending = PendingUpdates::new();

        write(&mut tree, &mut pending, "address.planet.name", "Tatooine");

        assert_eq!(pending.keys().collect::<Vec<_>>(), ["address"]);
        assert_eq!(
            pending.get("address"),
            Some(&FieldChange::Set(Bson::Document(doc! { "planet": { "name": "Tatooine" } })))
        );
    }

    #[test]
    fn existing_branch_records_leaf_only() {
        let mut tree = doc! { "address": { "city": "Mos Eisley", "zip": 1 } };
        let mut pending = PendingUpdates::new();

        write(&mut tree, &mut pending, "address.city", "Anchorhead");

        assert_eq!(pending.keys().collect::<Vec<_>>(), ["address.city"]);
    }

    #[test]
    fn later_write_below_pending_key_collapses_into_it() {
        let mut tree = doc! {};
        let mut pending = PendingUpdates::new();

        write(&mut tree, &mut pending, "address", doc! { "city": "Mos Eisley" });
        write(&mut tree, &mut pending, "address.zip", 42);

        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending.get("address"),
            Some(&FieldChange::Set(Bson::Document(doc! { "city": "Mos Eisley", "zip": 42 })))
        );
    }

    #[test]
    fn ancestor_write_swallows_pending_descendants() {
        let mut tree = doc! { "address": { "city": "Mos Eisley", "zip": 1 } };
        let mut pending = PendingUpdates::new();

        write(&mut tree, &mut pending, "address.city", "Anchorhead");
        write(&mut tree, &mut pending, "address.zip", 2);
        write(&mut tree, &mut pending, "address", doc! { "city": "Bestine" });

        assert_eq!(pending.keys().collect::<Vec<_>>(), ["address"]);
    }

    #[test]
    fn unset_below_pending_key_refreshes_it() {
        let mut tree = doc! {};
        let mut pending = PendingUpdates::new();

        write(&mut tree, &mut pending, "address", doc! { "city": "Mos Eisley", "zip": 1 });
        remove(&mut tree, &mut pending, "address.zip");

        assert_eq!(
            pending.get("address"),
            Some(&FieldChange::Set(Bson::Document(doc! { "city": "Mos Eisley" })))
        );
    }

    #[test]
    fn unset_of_pending_key_becomes_unset() {
        let mut tree = doc! {};
        let mut pending = PendingUpdates::new();

        write(&mut tree, &mut pending, "rank", "padawan");
        remove(&mut tree, &mut pending, "rank");

        assert_eq!(pending.get("rank"), Some(&FieldChange::Unset));
        assert_eq!(pending.to_update().unset, vec!["rank".to_string()]);
    }

    #[test]
    fn update_never_sets_identifier() {
        let mut tree = doc! {};
        let mut pending = PendingUpdates::new();

        write(&mut tree, &mut pending, "_id", 7);
        write(&mut tree, &mut pending, "name", "Yoda");

        let update = pending.to_update();
        assert_eq!(update.set, doc! { "name": "Yoda" });
        assert!(update.unset.is_empty());
    }

    #[test]
    fn settle_drops_exact_and_refreshes_ancestor() {
        let mut tree = doc! {};
        let mut pending = PendingUpdates::new();

        write(&mut tree, &mut pending, "deleted_at", 1);
        write(&mut tree, &mut pending, "name", "Yoda");
        pending.settle(&tree, &FieldPath::parse("deleted_at").unwrap());
        assert_eq!(pending.keys().collect::<Vec<_>>(), ["name"]);

        write(&mut tree, &mut pending, "meta", doc! { "rank": "master" });
        set_path(&mut tree, &FieldPath::parse("meta.gone").unwrap(), Bson::from(true));
        pending.settle(&tree, &FieldPath::parse("meta.gone").unwrap());
        assert_eq!(
            pending.get("meta"),
            Some(&FieldChange::Set(Bson::Document(doc! { "rank": "master", "gone": true })))
        );
    }

    fn segment() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "c"]).prop_map(str::to_string)
    }

    fn field_path() -> impl Strategy<Value = String> {
        prop::collection::vec(segment(), 1..4).prop_map(|segments| segments.join("."))
    }

    proptest! {
        #[test]
        fn pending_keys_never_overlap(ops in prop::collection::vec((field_path(), any::<bool>(), any::<i32>()), 1..40)) {
            let mut tree = doc! {};
            let mut pending = PendingUpdates::new();

            for (path, is_unset, value) in ops {
                if is_unset {
                    remove(&mut tree, &mut pending, &path);
                } else {
                    write(&mut tree, &mut pending, &path, value);
                }
            }

            let keys = pending.keys().collect::<Vec<_>>();
            for left in &keys {
                for right in &keys {
                    prop_assert!(!path::is_descendant(left, right), "{left} overlaps {right}");
                }
            }
        }

        #[test]
        fn applying_pending_set_reproduces_tree(ops in prop::collection::vec((field_path(), any::<i32>()), 1..40)) {
            let mut tree = doc! {};
            let mut pending = PendingUpdates::new();

            for (path, value) in ops {
                write(&mut tree, &mut pending, &path, value);
            }

            let mut replayed = doc! {};
            for (key, value) in &pending.to_update().set {
                set_path(&mut replayed, &FieldPath::parse(key).unwrap(), value.clone());
            }
            prop_assert_eq!(replayed, tree);
        }
    }
}
