//! In-process document store
//!
//! Keeps documents in insertion order and fans snapshots out to live
//! listeners synchronously after every write. `set_offline` makes every call
//! fail like a dropped connection.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use async_trait::async_trait;

use super::{
    CollectionPath, Document, DocumentPath, DocumentStore, Fields, Query, QueryListener,
    SnapshotListener,
};
use crate::error::{DashboardError, Result};
use crate::listener::{ListenerRegistry, Subscription};

struct StoredDocument {
    seq: u64,
    fields: Fields,
}

/// Memory-backed store handle
#[derive(Default)]
pub struct MemoryStore {
    documents: RefCell<BTreeMap<DocumentPath, StoredDocument>>,
    listeners: ListenerRegistry<QueryListener>,
    next_seq: Cell<u64>,
    operations: Cell<usize>,
    offline: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls issued so far, failed ones included
    pub fn operations(&self) -> usize {
        self.operations.get()
    }

    /// Number of live query listeners
    pub fn active_listeners(&self) -> usize {
        self.listeners.active()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    fn begin(&self) -> Result<()> {
        self.operations.set(self.operations.get() + 1);
        if self.offline.get() {
            return Err(DashboardError::Network("memory store is offline".into()));
        }
        Ok(())
    }

    fn seq(&self) -> u64 {
        let seq = self.next_seq.get() + 1;
        self.next_seq.set(seq);
        seq
    }

    fn collect(&self, query: &Query) -> Vec<Document> {
        let documents = self.documents.borrow();
        let mut matching: Vec<(u64, Document)> = documents
            .iter()
            .filter(|(path, _)| path.parent() == query.collection)
            .map(|(path, stored)| {
                (
                    stored.seq,
                    Document {
                        path: path.clone(),
                        fields: stored.fields.clone(),
                    },
                )
            })
            .collect();
        matching.sort_by_key(|(seq, _)| *seq);
        query.apply(matching.into_iter().map(|(_, doc)| doc).collect())
    }

    fn notify(&self, collection: &CollectionPath) {
        for entry in self.listeners.snapshot() {
            if entry.query.collection == *collection {
                let snapshot = self.collect(&entry.query);
                (entry.listener)(&snapshot);
            }
        }
    }
}

#[async_trait(?Send)]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn add_document(&self, collection: &CollectionPath, fields: Fields) -> Result<DocumentPath> {
        self.begin()?;
        let path = collection.doc(&uuid::Uuid::new_v4().simple().to_string())?;
        let seq = self.seq();
        self.documents
            .borrow_mut()
            .insert(path.clone(), StoredDocument { seq, fields });
        self.notify(collection);
        Ok(path)
    }

    async fn set_document(&self, path: &DocumentPath, fields: Fields, merge: bool) -> Result<()> {
        self.begin()?;
        {
            let mut documents = self.documents.borrow_mut();
            match documents.get_mut(path) {
                Some(existing) if merge => existing.fields.extend(fields),
                Some(existing) => existing.fields = fields,
                None => {
                    let seq = self.seq();
                    documents.insert(path.clone(), StoredDocument { seq, fields });
                }
            }
        }
        self.notify(&path.parent());
        Ok(())
    }

    async fn update_document(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        self.begin()?;
        {
            let mut documents = self.documents.borrow_mut();
            let existing = documents
                .get_mut(path)
                .ok_or_else(|| DashboardError::NotFound(path.to_string()))?;
            existing.fields.extend(fields);
        }
        self.notify(&path.parent());
        Ok(())
    }

    async fn delete_document(&self, path: &DocumentPath) -> Result<()> {
        self.begin()?;
        let removed = self.documents.borrow_mut().remove(path).is_some();
        if removed {
            self.notify(&path.parent());
        }
        Ok(())
    }

    async fn get_document(&self, path: &DocumentPath) -> Result<Option<Document>> {
        self.begin()?;
        Ok(self.documents.borrow().get(path).map(|stored| Document {
            path: path.clone(),
            fields: stored.fields.clone(),
        }))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.begin()?;
        Ok(self.collect(query))
    }

    async fn subscribe(&self, query: Query, listener: Rc<SnapshotListener>) -> Result<Subscription> {
        self.begin()?;
        listener(&self.collect(&query));
        Ok(self.listeners.register(Rc::new(QueryListener { query, listener })))
    }
}
