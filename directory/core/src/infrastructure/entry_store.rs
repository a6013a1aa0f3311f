// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory entry store
//!
//! A thread-safe tree of entries kept in a `BTreeMap` keyed by DN. Because
//! [`Dn`] orders parents before children, every subtree is a contiguous key
//! range, which keeps subtree search and replacement simple.
//!
//! Entries may only be added below an existing parent, except for the
//! registered suffixes (naming contexts such as `o=test` or `cn=config`).

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::dn::{Dn, Rdn};
use crate::domain::entry::{Entry, Modification};
use crate::domain::operation::SearchScope;
use crate::domain::repository::{EntryStore, EntryStoreError};

#[derive(Clone, Default)]
pub struct InMemoryEntryStore {
    inner: Arc<RwLock<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    suffixes: Vec<Dn>,
    entries: BTreeMap<Dn, Entry>,
}

impl StoreState {
    fn parent_exists(&self, dn: &Dn) -> bool {
        if self.suffixes.contains(dn) {
            return true;
        }
        dn.parent().is_some_and(|parent| self.entries.contains_key(&parent))
    }

    fn has_children(&self, dn: &Dn) -> bool {
        self.subtree(dn).any(|(child, _)| child != dn)
    }

    fn subtree<'a>(&'a self, base: &'a Dn) -> impl Iterator<Item = (&'a Dn, &'a Entry)> + 'a {
        self.entries
            .range(base.clone()..)
            .take_while(move |(dn, _)| dn.is_within(base))
    }
}

impl InMemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load entries in parent-first order. An entry whose parent is not part
    /// of the store becomes a suffix.
    pub fn seed(&self, mut entries: Vec<Entry>) -> usize {
        entries.sort_by(|a, b| a.dn.cmp(&b.dn));
        let mut state = self.inner.write();
        let count = entries.len();
        for entry in entries {
            if !state.parent_exists(&entry.dn) {
                state.suffixes.push(entry.dn.clone());
            }
            state.entries.insert(entry.dn.clone(), entry);
        }
        debug!(count, "Seeded entry store");
        count
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Synchronous lookup, used by the CLI when materializing identities.
    pub fn snapshot(&self, dn: &Dn) -> Option<Entry> {
        self.inner.read().entries.get(dn).cloned()
    }
}

#[async_trait]
impl EntryStore for InMemoryEntryStore {
    async fn get(&self, dn: &Dn) -> Result<Option<Entry>, EntryStoreError> {
        Ok(self.snapshot(dn))
    }

    async fn add(&self, entry: Entry) -> Result<(), EntryStoreError> {
        let mut state = self.inner.write();
        if state.entries.contains_key(&entry.dn) {
            return Err(EntryStoreError::AlreadyExists(entry.dn));
        }
        if !state.parent_exists(&entry.dn) {
            return Err(EntryStoreError::NoSuchObject(entry.dn.parent().unwrap_or_default()));
        }
        state.entries.insert(entry.dn.clone(), entry);
        Ok(())
    }

    async fn delete(&self, dn: &Dn) -> Result<(), EntryStoreError> {
        let mut state = self.inner.write();
        if !state.entries.contains_key(dn) {
            return Err(EntryStoreError::NoSuchObject(dn.clone()));
        }
        if state.has_children(dn) {
            return Err(EntryStoreError::NotAllowedOnNonLeaf(dn.clone()));
        }
        state.entries.remove(dn);
        Ok(())
    }

    async fn modify(&self, dn: &Dn, modifications: &[Modification]) -> Result<Entry, EntryStoreError> {
        let mut state = self.inner.write();
        let entry = state
            .entries
            .get_mut(dn)
            .ok_or_else(|| EntryStoreError::NoSuchObject(dn.clone()))?;
        entry.apply_modifications(modifications)?;
        Ok(entry.clone())
    }

    async fn rename(
        &self,
        dn: &Dn,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&Dn>,
    ) -> Result<Dn, EntryStoreError> {
        let rdn = Rdn::parse(new_rdn).map_err(|e| EntryStoreError::Unsupported(e.to_string()))?;
        let mut state = self.inner.write();
        if !state.entries.contains_key(dn) {
            return Err(EntryStoreError::NoSuchObject(dn.clone()));
        }
        if state.has_children(dn) {
            return Err(EntryStoreError::NotAllowedOnNonLeaf(dn.clone()));
        }
        let new_dn = dn.renamed(rdn.clone(), new_superior);
        if new_dn != *dn && state.entries.contains_key(&new_dn) {
            return Err(EntryStoreError::AlreadyExists(new_dn));
        }
        if !state.parent_exists(&new_dn) {
            return Err(EntryStoreError::NoSuchObject(new_dn.parent().unwrap_or_default()));
        }

        let Some(mut entry) = state.entries.get(dn).cloned() else {
            return Err(EntryStoreError::NoSuchObject(dn.clone()));
        };
        if delete_old_rdn {
            if let Some(old) = dn.rdn() {
                // seeded entries may lack their naming value
                if entry.has_value(old.attribute(), old.value()) {
                    entry.apply_modifications(&[Modification::delete(old.attribute(), &[old.value()])])?;
                }
            }
        }
        if !entry.has_value(rdn.attribute(), rdn.value()) {
            entry.push_value(rdn.attribute(), rdn.value());
        }
        entry.dn = new_dn.clone();
        state.entries.remove(dn);
        state.entries.insert(new_dn.clone(), entry);
        Ok(new_dn)
    }

    async fn search(&self, base: &Dn, scope: SearchScope) -> Result<Vec<Entry>, EntryStoreError> {
        let state = self.inner.read();
        if !state.entries.contains_key(base) {
            return Err(EntryStoreError::NoSuchObject(base.clone()));
        }
        let found = state
            .subtree(base)
            .filter(|(dn, _)| match scope {
                SearchScope::Base => *dn == base,
                SearchScope::OneLevel => dn.is_child_of(base),
                SearchScope::Subtree => true,
            })
            .map(|(_, entry)| entry.clone())
            .collect();
        Ok(found)
    }

    async fn replace_subtree(&self, base: &Dn, entries: Vec<Entry>) -> Result<usize, EntryStoreError> {
        if let Some(stray) = entries.iter().find(|e| !e.dn.is_within(base)) {
            return Err(EntryStoreError::Backend(format!(
                "Entry '{}' is outside of '{}'",
                stray.dn, base
            )));
        }
        let mut state = self.inner.write();
        let existing: Vec<Dn> = state.subtree(base).map(|(dn, _)| dn.clone()).collect();
        for dn in &existing {
            state.entries.remove(dn);
        }
        if !state.parent_exists(base) {
            state.suffixes.push(base.clone());
        }
        let count = entries.len();
        for entry in entries {
            state.entries.insert(entry.dn.clone(), entry);
        }
        debug!(base = %base, removed = existing.len(), inserted = count, "Replaced subtree");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn person(s: &str) -> Entry {
        Entry::new(dn(s)).with_attribute("objectClass", &["person"])
    }

    async fn populated() -> InMemoryEntryStore {
        let store = InMemoryEntryStore::new();
        store.seed(vec![Entry::new(dn("o=test"))]);
        store.add(person("ou=People,o=test")).await.unwrap();
        store.add(person("cn=Alice,ou=People,o=test")).await.unwrap();
        store.add(person("cn=Bob,ou=People,o=test")).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_add_requires_parent() {
        let store = populated().await;
        let err = store.add(person("cn=Carol,ou=Missing,o=test")).await.unwrap_err();
        assert!(matches!(err, EntryStoreError::NoSuchObject(_)));

        let err = store.add(person("cn=Alice,ou=People,o=test")).await.unwrap_err();
        assert!(matches!(err, EntryStoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_delete_only_leaves() {
        let store = populated().await;
        let err = store.delete(&dn("ou=People,o=test")).await.unwrap_err();
        assert!(matches!(err, EntryStoreError::NotAllowedOnNonLeaf(_)));

        store.delete(&dn("cn=Bob,ou=People,o=test")).await.unwrap();
        assert!(store.get(&dn("cn=Bob,ou=People,o=test")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_scopes() {
        let store = populated().await;
        let base = dn("ou=People,o=test");
        assert_eq!(store.search(&base, SearchScope::Base).await.unwrap().len(), 1);
        assert_eq!(store.search(&base, SearchScope::OneLevel).await.unwrap().len(), 2);
        assert_eq!(store.search(&dn("o=test"), SearchScope::Subtree).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_rename_updates_rdn_value() {
        let store = populated().await;
        let new_dn = store
            .rename(&dn("cn=Bob,ou=People,o=test"), "cn=Robert", true, None)
            .await
            .unwrap();
        let entry = store.get(&new_dn).await.unwrap().unwrap();
        assert!(entry.has_value("cn", "Robert"));
        assert!(!entry.has_value("cn", "Bob"));
    }

    #[tokio::test]
    async fn test_rename_without_naming_value() {
        let store = populated().await;
        store.seed(vec![Entry::new(dn("cn=Carol,ou=People,o=test")).with_attribute("sn", &["Carol"])]);

        let new_dn = store
            .rename(&dn("cn=Carol,ou=People,o=test"), "cn=Caroline", true, None)
            .await
            .unwrap();
        let entry = store.get(&new_dn).await.unwrap().unwrap();
        assert_eq!(entry.get("cn"), ["Caroline".to_string()]);
        assert!(entry.has_value("sn", "Carol"));
        assert!(store.get(&dn("cn=Carol,ou=People,o=test")).await.unwrap().is_none());

        let kept = store.rename(&new_dn, "cn=Caro", false, None).await.unwrap();
        let entry = store.get(&kept).await.unwrap().unwrap();
        assert!(entry.has_value("cn", "Caroline"));
        assert!(entry.has_value("cn", "Caro"));
    }

    #[tokio::test]
    async fn test_modify_is_atomic() {
        let store = populated().await;
        let target = dn("cn=Alice,ou=People,o=test");
        let err = store
            .modify(
                &target,
                &[
                    Modification::add("description", &["first"]),
                    Modification::delete("mail", &["nobody@example.com"]),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EntryStoreError::Modification(_)));
        assert!(!store.get(&target).await.unwrap().unwrap().has_attribute("description"));
    }

    #[tokio::test]
    async fn test_replace_subtree() {
        let store = populated().await;
        let replaced = store
            .replace_subtree(
                &dn("ou=People,o=test"),
                vec![person("ou=People,o=test"), person("cn=Dave,ou=People,o=test")],
            )
            .await
            .unwrap();
        assert_eq!(replaced, 2);
        assert!(store.get(&dn("cn=Alice,ou=People,o=test")).await.unwrap().is_none());
        assert!(store.get(&dn("cn=Dave,ou=People,o=test")).await.unwrap().is_some());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_seed_registers_suffixes() {
        let store = InMemoryEntryStore::new();
        let count = store.seed(vec![person("cn=Bob,o=test"), Entry::new(dn("o=test")), Entry::new(dn("cn=config"))]);
        assert_eq!(count, 3);
        assert!(store.snapshot(&dn("cn=bob,o=test")).is_some());
    }
}
