//! Collections with operation buffering.
//!
//! A [`Collection`] forwards verbs to the backend collection once its connection is
//! open. Until then every verb is queued, in call order, and replayed when the
//! connection finishes opening. Enqueueing happens when the verb is *called*, not when
//! the returned future is first polled, so the queue order is exactly the order of the
//! calls.
//!
//! # Example
//!
//! ```ignore
//! let people = connection.collection("people");
//!
//! // Queued: the connection is not open yet.
//! let insert = people.insert(vec![doc! { "name": "Ada" }]);
//!
//! connection.open().await?;
//! let ack = insert.await?;
//! ```

use bson::Document;
use futures::{FutureExt, channel::oneshot, future::BoxFuture};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt::{self, Debug},
    sync::Arc,
};
use tracing::{debug, trace};

use crate::{
    backend::{BackendCollection, BackendCursor, RemoveOptions, UpdateOptions},
    error::{DocModelError, DocModelResult},
    query::QueryOptions,
};

/// A collection verb with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionOp {
    Find {
        conditions: Document,
        options: QueryOptions,
    },
    FindOne {
        conditions: Document,
        options: QueryOptions,
    },
    Insert {
        documents: Vec<Document>,
    },
    Update {
        conditions: Document,
        changes: Document,
        options: UpdateOptions,
    },
    Remove {
        conditions: Document,
        options: RemoveOptions,
    },
    Count {
        conditions: Document,
    },
}

impl CollectionOp {
    pub fn name(&self) -> &'static str {
        match self {
            CollectionOp::Find { .. } => "find",
            CollectionOp::FindOne { .. } => "findOne",
            CollectionOp::Insert { .. } => "insert",
            CollectionOp::Update { .. } => "update",
            CollectionOp::Remove { .. } => "remove",
            CollectionOp::Count { .. } => "count",
        }
    }
}

enum OpReply {
    Cursor(Box<dyn BackendCursor>),
    Document(Option<Document>),
    Ack(Document),
    Count(u64),
}

impl OpReply {
    fn kind(&self) -> &'static str {
        match self {
            OpReply::Cursor(_) => "cursor",
            OpReply::Document(_) => "document",
            OpReply::Ack(_) => "acknowledgement",
            OpReply::Count(_) => "count",
        }
    }
}

struct PendingOp {
    op: CollectionOp,
    reply: oneshot::Sender<DocModelResult<OpReply>>,
}

struct Buffer {
    buffering: bool,
    // Bumped by every suspend, so a replay can tell the connection closed under it.
    generation: u64,
    queue: VecDeque<PendingOp>,
}

/// A named collection that buffers verbs while its connection is not open.
pub struct Collection {
    name: String,
    inner: Arc<dyn BackendCollection>,
    buffer: Mutex<Buffer>,
}

impl Collection {
    pub(crate) fn new(name: impl Into<String>, inner: Arc<dyn BackendCollection>, buffering: bool) -> Self {
        Self {
            name: name.into(),
            inner,
            buffer: Mutex::new(Buffer {
                buffering,
                generation: 0,
                queue: VecDeque::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether verbs are currently being queued.
    pub fn is_buffering(&self) -> bool {
        self.buffer.lock().buffering
    }

    /// The number of queued verbs.
    pub fn pending(&self) -> usize {
        self.buffer.lock().queue.len()
    }

    pub fn find(
        &self,
        conditions: Document,
        options: QueryOptions,
    ) -> BoxFuture<'static, DocModelResult<Box<dyn BackendCursor>>> {
        let reply = self.dispatch(CollectionOp::Find { conditions, options });

        async move {
            match reply.await? {
                OpReply::Cursor(cursor) => Ok(cursor),
                other => Err(unexpected("find", &other)),
            }
        }
        .boxed()
    }

    pub fn find_one(
        &self,
        conditions: Document,
        options: QueryOptions,
    ) -> BoxFuture<'static, DocModelResult<Option<Document>>> {
        let reply = self.dispatch(CollectionOp::FindOne { conditions, options });

        async move {
            match reply.await? {
                OpReply::Document(found) => Ok(found),
                other => Err(unexpected("findOne", &other)),
            }
        }
        .boxed()
    }

    pub fn insert(&self, documents: Vec<Document>) -> BoxFuture<'static, DocModelResult<Document>> {
        let reply = self.dispatch(CollectionOp::Insert { documents });

        async move { ack("insert", reply.await?) }.boxed()
    }

    pub fn update(
        &self,
        conditions: Document,
        changes: Document,
        options: UpdateOptions,
    ) -> BoxFuture<'static, DocModelResult<Document>> {
        let reply = self.dispatch(CollectionOp::Update {
            conditions,
            changes,
            options,
        });

        async move { ack("update", reply.await?) }.boxed()
    }

    pub fn remove(&self, conditions: Document, options: RemoveOptions) -> BoxFuture<'static, DocModelResult<Document>> {
        let reply = self.dispatch(CollectionOp::Remove { conditions, options });

        async move { ack("remove", reply.await?) }.boxed()
    }

    pub fn count(&self, conditions: Document) -> BoxFuture<'static, DocModelResult<u64>> {
        let reply = self.dispatch(CollectionOp::Count { conditions });

        async move {
            match reply.await? {
                OpReply::Count(count) => Ok(count),
                other => Err(unexpected("count", &other)),
            }
        }
        .boxed()
    }

    /// Replays every queued verb in call order, then stops buffering.
    ///
    /// Verbs called while the replay is running join the end of the queue, so they
    /// never overtake verbs queued before them. A [`suspend`](Self::suspend) during the
    /// replay stops it: the remaining verbs stay queued and buffering stays on.
    pub async fn resume(&self) {
        let generation = {
            let buffer = self.buffer.lock();
            debug!(collection = %self.name, queued = buffer.queue.len(), "replaying buffered operations");
            buffer.generation
        };

        loop {
            let pending = {
                let mut buffer = self.buffer.lock();
                if buffer.generation != generation {
                    debug!(collection = %self.name, left = buffer.queue.len(), "replay interrupted by suspend");
                    return;
                }
                match buffer.queue.pop_front() {
                    Some(pending) => pending,
                    None => {
                        buffer.buffering = false;
                        return;
                    }
                }
            };

            let result = execute(self.inner.as_ref(), pending.op).await;
            // The caller may have dropped its future; the verb still ran.
            let _ = pending.reply.send(result);
        }
    }

    /// Starts queueing verbs again.
    pub fn suspend(&self) {
        let mut buffer = self.buffer.lock();
        buffer.buffering = true;
        buffer.generation += 1;
    }

    fn dispatch(&self, op: CollectionOp) -> BoxFuture<'static, DocModelResult<OpReply>> {
        let mut buffer = self.buffer.lock();

        if buffer.buffering {
            let (reply, receiver) = oneshot::channel();
            trace!(collection = %self.name, verb = op.name(), position = buffer.queue.len(), "buffering operation");
            buffer.queue.push_back(PendingOp { op, reply });

            return async move {
                receiver.await.map_err(|_| {
                    DocModelError::ConnectionState("buffered operation was discarded".to_string())
                })?
            }
            .boxed();
        }

        drop(buffer);
        let inner = Arc::clone(&self.inner);
        async move { execute(inner.as_ref(), op).await }.boxed()
    }
}

impl Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffer = self.buffer.lock();
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("buffering", &buffer.buffering)
            .field("pending", &buffer.queue.len())
            .finish()
    }
}

async fn execute(inner: &dyn BackendCollection, op: CollectionOp) -> DocModelResult<OpReply> {
    match op {
        CollectionOp::Find { conditions, options } => inner.find(conditions, options).await.map(OpReply::Cursor),
        CollectionOp::FindOne { conditions, options } => {
            inner.find_one(conditions, options).await.map(OpReply::Document)
        }
        CollectionOp::Insert { documents } => inner.insert(documents).await.map(OpReply::Ack),
        CollectionOp::Update {
            conditions,
            changes,
            options,
        } => inner.update(conditions, changes, options).await.map(OpReply::Ack),
        CollectionOp::Remove { conditions, options } => inner.remove(conditions, options).await.map(OpReply::Ack),
        CollectionOp::Count { conditions } => inner.count(conditions).await.map(OpReply::Count),
    }
}

fn ack(verb: &str, reply: OpReply) -> DocModelResult<Document> {
    match reply {
        OpReply::Ack(ack) => Ok(ack),
        other => Err(unexpected(verb, &other)),
    }
}

fn unexpected(verb: &str, reply: &OpReply) -> DocModelError {
    DocModelError::Driver(format!("{verb} produced an unexpected {} reply", reply.kind()))
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::testing::RecordingCollection;

    #[tokio::test]
    async fn forwards_immediately_when_not_buffering() {
        let backend = Arc::new(RecordingCollection::default());
        let people = Collection::new("people", backend.clone(), false);

        people.insert(vec![doc! { "n": 1 }]).await.unwrap();

        assert_eq!(backend.log(), vec!["insert"]);
    }

    #[tokio::test]
    async fn queues_at_call_time_and_replays_in_order() {
        let backend = Arc::new(RecordingCollection::default());
        let people = Collection::new("people", backend.clone(), true);

        let insert = people.insert(vec![doc! { "n": 1 }]);
        let update = people.update(doc! { "n": 1 }, doc! { "$set": { "n": 2 } }, UpdateOptions::default());
        let count = people.count(doc! {});

        assert_eq!(people.pending(), 3);
        assert!(backend.log().is_empty());

        people.resume().await;

        assert!(!people.is_buffering());
        assert_eq!(backend.log(), vec!["insert", "update", "count"]);
        assert!(insert.await.is_ok());
        assert!(update.await.is_ok());
        assert_eq!(count.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn suspend_resumes_queueing() {
        let backend = Arc::new(RecordingCollection::default());
        let people = Collection::new("people", backend.clone(), false);

        people.suspend();
        let _pending = people.count(doc! {});

        assert_eq!(people.pending(), 1);
        assert!(backend.log().is_empty());
    }

    #[tokio::test]
    async fn suspend_during_replay_keeps_the_rest_queued() {
        let backend = Arc::new(RecordingCollection::default());
        let release = backend.gate_inserts();
        let people = Arc::new(Collection::new("people", backend.clone(), true));

        let insert = people.insert(vec![doc! { "n": 1 }]);
        let _count = people.count(doc! {});

        let replay = tokio::spawn({
            let people = Arc::clone(&people);
            async move { people.resume().await }
        });
        while backend.log().is_empty() {
            tokio::task::yield_now().await;
        }

        people.suspend();
        release.send(()).unwrap();
        replay.await.unwrap();

        assert!(insert.await.is_ok());
        assert!(people.is_buffering());
        assert_eq!(people.pending(), 1);
        assert_eq!(backend.log(), vec!["insert"]);
    }
}
