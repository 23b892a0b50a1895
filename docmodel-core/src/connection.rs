//! Connection lifecycle and registries.
//!
//! A [`Connection`] moves through four states:
//!
//! ```text
//! Disconnected --open--> Connecting --ok--> Connected --close--> Disconnecting --> Disconnected
//!                            \--error--> Disconnected
//! ```
//!
//! Collections obtained from a connection queue their verbs until it is
//! `Connected`; a successful [`open`](Connection::open) replays every queue, and
//! [`close`](Connection::close) makes them queue again.

use futures::{channel::oneshot, future::join_all};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt::{self, Debug, Display},
    sync::Arc,
};
use tracing::{debug, info, warn};

use crate::{
    backend::StoreBackend,
    collection::Collection,
    config::ConnectionOptions,
    error::{DocModelError, DocModelResult},
    model::Model,
    schema::Schema,
};

/// The lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connected = 1,
    Connecting = 2,
    Disconnecting = 3,
}

impl ConnectionState {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Disconnecting => "disconnecting",
        })
    }
}

struct Lifecycle {
    state: ConnectionState,
    // Notified whenever a transition settles.
    waiters: Vec<oneshot::Sender<()>>,
}

impl Lifecycle {
    fn settle(&mut self, state: ConnectionState) {
        self.state = state;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

struct ConnectionInner {
    backend: Arc<dyn StoreBackend>,
    options: ConnectionOptions,
    lifecycle: Mutex<Lifecycle>,
    collections: Mutex<HashMap<String, Arc<Collection>>>,
    models: Mutex<HashMap<String, Model>>,
}

/// A handle to a backend connection. Clones share the same state.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn new(backend: impl StoreBackend + 'static, options: ConnectionOptions) -> Self {
        Self::from_backend(Arc::new(backend), options)
    }

    pub fn from_backend(backend: Arc<dyn StoreBackend>, options: ConnectionOptions) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                backend,
                options,
                lifecycle: Mutex::new(Lifecycle {
                    state: ConnectionState::Disconnected,
                    waiters: Vec::new(),
                }),
                collections: Mutex::new(HashMap::new()),
                models: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lifecycle.lock().state
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.inner.backend
    }

    /// Opens the connection, authenticates when credentials are configured, then
    /// replays every buffered collection verb.
    ///
    /// # Errors
    ///
    /// Returns [`DocModelError::ConnectionState`] unless the connection is
    /// `Disconnected`. Backend failures are returned as-is and leave the connection
    /// `Disconnected` with its queues intact.
    pub async fn open(&self) -> DocModelResult<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state != ConnectionState::Disconnected {
                return Err(DocModelError::ConnectionState(
                    "connection already open or opening".to_string(),
                ));
            }
            lifecycle.state = ConnectionState::Connecting;
        }

        info!(uri = %self.inner.options.uri(), "opening connection");
        let established = self.establish().await;

        let collections = {
            let mut lifecycle = self.inner.lifecycle.lock();
            match established {
                Ok(()) => {
                    lifecycle.settle(ConnectionState::Connected);
                    self.inner
                        .collections
                        .lock()
                        .values()
                        .cloned()
                        .collect::<Vec<_>>()
                }
                Err(err) => {
                    lifecycle.settle(ConnectionState::Disconnected);
                    warn!(uri = %self.inner.options.uri(), error = %err, "failed to open connection");
                    return Err(err);
                }
            }
        };

        debug!(collections = collections.len(), "replaying buffered collections");
        join_all(collections.iter().map(|collection| collection.resume())).await;
        info!(uri = %self.inner.options.uri(), "connection open");

        Ok(())
    }

    async fn establish(&self) -> DocModelResult<()> {
        let backend = &self.inner.backend;
        backend.open(&self.inner.options).await?;

        if let Some((user, password)) = self.inner.options.credentials() {
            debug!(user, "authenticating");
            if let Err(err) = backend.authenticate(user, password).await {
                if let Err(close_err) = backend.close().await {
                    warn!(error = %close_err, "failed to close after authentication failure");
                }
                return Err(err);
            }
        }

        Ok(())
    }

    /// Closes the connection.
    ///
    /// Closing a disconnected connection does nothing. A close requested while the
    /// connection is opening or closing waits for that transition to settle first.
    pub async fn close(&self) -> DocModelResult<()> {
        loop {
            let settled = {
                let mut lifecycle = self.inner.lifecycle.lock();
                match lifecycle.state {
                    ConnectionState::Disconnected => return Ok(()),
                    ConnectionState::Connected => {
                        lifecycle.state = ConnectionState::Disconnecting;
                        break;
                    }
                    ConnectionState::Connecting | ConnectionState::Disconnecting => {
                        let (waiter, settled) = oneshot::channel();
                        lifecycle.waiters.push(waiter);
                        settled
                    }
                }
            };

            debug!("close waiting for pending transition");
            let _ = settled.await;
        }

        info!(uri = %self.inner.options.uri(), "closing connection");
        let result = self.inner.backend.close().await;

        let mut lifecycle = self.inner.lifecycle.lock();
        for collection in self.inner.collections.lock().values() {
            collection.suspend();
        }
        lifecycle.settle(ConnectionState::Disconnected);

        if let Err(err) = &result {
            warn!(error = %err, "backend reported an error while closing");
        }
        result
    }

    /// Returns the named collection, creating it on first use.
    ///
    /// A collection created while the connection is not `Connected` starts out
    /// buffering.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        let lifecycle = self.inner.lifecycle.lock();
        let mut collections = self.inner.collections.lock();

        Arc::clone(collections.entry(name.to_string()).or_insert_with(|| {
            let buffering = lifecycle.state != ConnectionState::Connected;
            Arc::new(Collection::new(name, self.inner.backend.collection(name), buffering))
        }))
    }

    /// Registers a model over the collection of the same name.
    ///
    /// Registering a name twice replaces the earlier model.
    pub fn model(&self, name: &str, schema: Schema) -> Model {
        self.model_in(name, name, schema)
    }

    /// Registers a model over an explicitly named collection.
    pub fn model_in(&self, name: &str, collection: &str, schema: Schema) -> Model {
        let model = Model::new(name, Arc::new(schema), self.collection(collection));
        self.inner
            .models
            .lock()
            .insert(name.to_string(), model.clone());
        model
    }

    /// Looks up a registered model.
    pub fn get_model(&self, name: &str) -> Option<Model> {
        self.inner.models.lock().get(name).cloned()
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("uri", &self.inner.options.uri())
            .field("state", &self.state())
            .field("backend", &self.inner.backend)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::testing::MockBackend;

    fn options() -> ConnectionOptions {
        ConnectionOptions::new("localhost", "test")
    }

    #[tokio::test]
    async fn open_and_close_transition_states() {
        let connection = Connection::new(MockBackend::default(), options());
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        connection.open().await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Connected);

        connection.close().await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Disconnecting.code(), 3);
    }

    #[tokio::test]
    async fn open_twice_is_a_state_error() {
        let connection = Connection::new(MockBackend::default(), options());
        connection.open().await.unwrap();

        assert!(matches!(connection.open().await, Err(DocModelError::ConnectionState(_))));
    }

    #[tokio::test]
    async fn close_when_disconnected_is_a_no_op() {
        let backend = Arc::new(MockBackend::default());
        let connection = Connection::from_backend(backend.clone(), options());

        connection.close().await.unwrap();

        assert!(backend.events().is_empty());
    }

    #[tokio::test]
    async fn verbs_queue_until_open() {
        let backend = Arc::new(MockBackend::default());
        let connection = Connection::from_backend(backend.clone(), options());
        let people = connection.collection("people");

        let insert = people.insert(vec![doc! { "name": "Ada" }]);
        let count = people.count(doc! {});
        assert!(people.is_buffering());

        connection.open().await.unwrap();

        assert!(!people.is_buffering());
        assert!(insert.await.is_ok());
        assert_eq!(count.await.unwrap(), 1);
        assert_eq!(backend.recording("people").log(), vec!["insert", "count"]);
    }

    #[tokio::test]
    async fn collections_created_after_open_forward_directly() {
        let connection = Connection::new(MockBackend::default(), options());
        connection.open().await.unwrap();

        assert!(!connection.collection("late").is_buffering());
    }

    #[tokio::test]
    async fn close_requeues_verbs() {
        let connection = Connection::new(MockBackend::default(), options());
        let people = connection.collection("people");
        connection.open().await.unwrap();

        connection.close().await.unwrap();

        assert!(people.is_buffering());
    }

    #[tokio::test]
    async fn failed_open_returns_to_disconnected_and_keeps_queue() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_open(true);
        let connection = Connection::from_backend(backend.clone(), options());
        let people = connection.collection("people");
        let _pending = people.count(doc! {});

        assert!(matches!(connection.open().await, Err(DocModelError::Driver(_))));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(people.pending(), 1);
    }

    #[tokio::test]
    async fn authenticates_when_credentials_are_configured() {
        let backend = Arc::new(MockBackend::default());
        let connection = Connection::from_backend(backend.clone(), options().with_credentials("ada", "pw"));

        connection.open().await.unwrap();

        assert_eq!(backend.events(), vec!["open", "auth:ada"]);
    }

    #[tokio::test]
    async fn rejected_authentication_closes_and_fails() {
        let backend = Arc::new(MockBackend::default());
        backend.reject_auth(true);
        let connection = Connection::from_backend(backend.clone(), options().with_credentials("ada", "bad"));

        assert!(connection.open().await.is_err());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(backend.events(), vec!["open", "auth:ada", "close"]);
    }

    #[tokio::test]
    async fn close_while_connecting_waits_for_open() {
        let (backend, gate) = MockBackend::gated();
        let backend = Arc::new(backend);
        let connection = Connection::from_backend(backend.clone(), options());

        let opening = tokio::spawn({
            let connection = connection.clone();
            async move { connection.open().await }
        });
        while connection.state() != ConnectionState::Connecting {
            tokio::task::yield_now().await;
        }

        let closing = tokio::spawn({
            let connection = connection.clone();
            async move { connection.close().await }
        });
        tokio::task::yield_now().await;
        assert_eq!(connection.state(), ConnectionState::Connecting);

        gate.send(()).unwrap();
        opening.await.unwrap().unwrap();
        closing.await.unwrap().unwrap();

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(backend.events(), vec!["open", "close"]);
    }

    #[tokio::test]
    async fn open_while_connecting_is_a_state_error() {
        let (backend, gate) = MockBackend::gated();
        let backend = Arc::new(backend);
        let connection = Connection::from_backend(backend.clone(), options());

        let opening = tokio::spawn({
            let connection = connection.clone();
            async move { connection.open().await }
        });
        while connection.state() != ConnectionState::Connecting {
            tokio::task::yield_now().await;
        }

        assert!(matches!(connection.open().await, Err(DocModelError::ConnectionState(_))));
        assert_eq!(connection.state(), ConnectionState::Connecting);

        gate.send(()).unwrap();
        opening.await.unwrap().unwrap();

        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(backend.events(), vec!["open"]);
    }

    #[tokio::test]
    async fn close_during_replay_keeps_collections_buffering() {
        let backend = Arc::new(MockBackend::default());
        let release = backend.recording("people").gate_inserts();
        let connection = Connection::from_backend(backend.clone(), options());
        let people = connection.collection("people");
        let insert = people.insert(vec![doc! { "name": "Ada" }]);

        let opening = tokio::spawn({
            let connection = connection.clone();
            async move { connection.open().await }
        });
        while backend.recording("people").log().is_empty() {
            tokio::task::yield_now().await;
        }

        connection.close().await.unwrap();
        release.send(()).unwrap();
        opening.await.unwrap().unwrap();

        assert!(insert.await.is_ok());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(people.is_buffering());

        let _count = people.count(doc! {});
        assert_eq!(people.pending(), 1);
        assert_eq!(backend.recording("people").log(), vec!["insert"]);
    }

    #[test]
    fn models_are_registered_by_name() {
        let connection = Connection::new(MockBackend::default(), options());
        let schema = Schema::builder().build().unwrap();

        let model = connection.model_in("Person", "people", schema);

        assert_eq!(model.collection().name(), "people");
        assert_eq!(connection.get_model("Person").unwrap().name(), "Person");
        assert!(connection.get_model("Pet").is_none());
    }
}
