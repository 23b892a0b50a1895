//! In-crate test doubles for the backend traits.

use async_trait::async_trait;
use bson::Document;
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    backend::{
        BackendCollection, BackendCursor, RemoveOptions, StoreBackend, UpdateOptions, VecCursor,
        acknowledgement,
    },
    config::ConnectionOptions,
    error::{DocModelError, DocModelResult},
    query::QueryOptions,
};

/// A collection that records the verbs it receives.
#[derive(Debug, Default)]
pub struct RecordingCollection {
    log: Mutex<Vec<&'static str>>,
    documents: Mutex<Vec<Document>>,
    updates: Mutex<Vec<(Document, Document)>>,
    insert_gate: Mutex<Option<oneshot::Receiver<()>>>,
    fail_updates: AtomicBool,
}

impl RecordingCollection {
    pub fn log(&self) -> Vec<&'static str> {
        self.log.lock().clone()
    }

    pub fn last_update(&self) -> Option<(Document, Document)> {
        self.updates.lock().last().cloned()
    }

    /// Makes the next `insert` wait until the returned sender fires.
    pub fn gate_inserts(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.insert_gate.lock() = Some(gate);
        release
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    fn record(&self, verb: &'static str) {
        self.log.lock().push(verb);
    }
}

#[async_trait]
impl BackendCollection for RecordingCollection {
    async fn find(&self, _conditions: Document, _options: QueryOptions) -> DocModelResult<Box<dyn BackendCursor>> {
        self.record("find");
        Ok(Box::new(VecCursor::new(self.documents.lock().clone())))
    }

    async fn find_one(&self, _conditions: Document, _options: QueryOptions) -> DocModelResult<Option<Document>> {
        self.record("findOne");
        Ok(self.documents.lock().first().cloned())
    }

    async fn insert(&self, documents: Vec<Document>) -> DocModelResult<Document> {
        self.record("insert");

        let gate = self.insert_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let n = documents.len() as u64;
        self.documents.lock().extend(documents);
        Ok(acknowledgement(n))
    }

    async fn update(&self, conditions: Document, changes: Document, _options: UpdateOptions) -> DocModelResult<Document> {
        self.record("update");
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DocModelError::Driver("update rejected".to_string()));
        }
        self.updates.lock().push((conditions, changes));
        Ok(acknowledgement(1))
    }

    async fn remove(&self, _conditions: Document, _options: RemoveOptions) -> DocModelResult<Document> {
        self.record("remove");
        Ok(acknowledgement(0))
    }

    async fn count(&self, _conditions: Document) -> DocModelResult<u64> {
        self.record("count");
        Ok(self.documents.lock().len() as u64)
    }
}

/// A backend whose lifecycle can be delayed or made to fail.
#[derive(Debug, Default)]
pub struct MockBackend {
    collections: Mutex<HashMap<String, Arc<RecordingCollection>>>,
    events: Mutex<Vec<String>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    fail_open: AtomicBool,
    reject_auth: AtomicBool,
}

impl MockBackend {
    /// A backend whose `open` waits until the returned sender fires.
    pub fn gated() -> (Self, oneshot::Sender<()>) {
        let (release, gate) = oneshot::channel();
        let backend = Self {
            gate: Mutex::new(Some(gate)),
            ..Self::default()
        };
        (backend, release)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn reject_auth(&self, reject: bool) {
        self.reject_auth.store(reject, Ordering::SeqCst);
    }

    pub fn recording(&self, name: &str) -> Arc<RecordingCollection> {
        Arc::clone(self.collections.lock().entry(name.to_string()).or_default())
    }
}

#[async_trait]
impl StoreBackend for MockBackend {
    async fn open(&self, _options: &ConnectionOptions) -> DocModelResult<()> {
        self.events.lock().push("open".to_string());

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if self.fail_open.load(Ordering::SeqCst) {
            return Err(DocModelError::Driver("unreachable".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> DocModelResult<()> {
        self.events.lock().push("close".to_string());
        Ok(())
    }

    async fn authenticate(&self, user: &str, _password: &str) -> DocModelResult<()> {
        self.events.lock().push(format!("auth:{user}"));

        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(DocModelError::Driver("authentication failed".to_string()));
        }
        Ok(())
    }

    fn collection(&self, name: &str) -> Arc<dyn BackendCollection> {
        self.recording(name)
    }
}
