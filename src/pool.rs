//! Connection pool.
//!
//! A [`Pool`] presents one subscription surface over an elastic set of
//! [`Connection`]s, hiding the per-connection topic ceiling. Connections
//! are created lazily, only when a `listen` finds no existing connection
//! with spare capacity; they are never destroyed, only disconnected by
//! [`Pool::stop`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Pool                    │
//! │  ┌─────────────────────────────────┐    │
//! │  │ Connection 1 → up to 50 topics  │    │
//! │  │ Connection 2 → up to 50 topics  │    │
//! │  │ Connection N → created on demand│    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Topic names are unique across the whole pool. Lifecycle and error
//! notifications from every connection fan into one [`PoolObserver`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tracing::{debug, info};
use url::Url;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::topic::{Topic, TopicCallback};
use crate::transport::{Transport, WebSocketTransport};

// ============================================================================
// Constants
// ============================================================================

/// The Twitch PubSub edge endpoint.
pub const PUBSUB_EDGE_URL: &str = "wss://pubsub-edge.twitch.tv";

// ============================================================================
// Types
// ============================================================================

/// Factory producing a fresh transport for each new connection.
pub type TransportFactory = Box<dyn Fn() -> Arc<dyn Transport> + Send + Sync>;

// ============================================================================
// PoolObserver
// ============================================================================

/// Observer hooks for pool-wide lifecycle and error events.
///
/// All methods default to no-ops; implement only what you need and
/// install with [`Pool::set_observer`].
pub trait PoolObserver: Send + Sync {
    /// Called once when [`Pool::start`] brings every connection up.
    fn on_start(&self) {}

    /// Called on each connection's connect or reconnect.
    fn on_connect(&self, _connection: &Arc<Connection>) {}

    /// Called with asynchronous errors from any connection.
    ///
    /// Server-reported subscription errors carry the evicted topic as
    /// context.
    fn on_error(&self, _connection: &Arc<Connection>, _error: Error, _topic: Option<Arc<Topic>>) {}
}

/// Default observer that ignores everything.
struct NoopObserver;

impl PoolObserver for NoopObserver {}

// ============================================================================
// Pool
// ============================================================================

/// A set of connections presenting one unified subscription API.
///
/// # Example
///
/// ```ignore
/// let pool = Pool::new("oauth-token", HeaderMap::new());
/// pool.start().await?;
///
/// pool.listen("channel-points-channel-v1.44322889", Arc::new(|data| {
///     println!("event on {}: {}", data.topic, data.message);
/// }))
/// .await?;
/// ```
pub struct Pool {
    /// Lifecycle flag; held across the whole start/stop sequence.
    running: Mutex<bool>,

    /// Every connection ever created, in creation order.
    connections: RwLock<Vec<Arc<Connection>>>,

    /// Auth token attached to LISTEN requests.
    credential: String,

    /// Produces the transport for each new connection.
    transport_factory: TransportFactory,

    /// Lifecycle/error fan-in.
    observer: RwLock<Arc<dyn PoolObserver>>,
}

// ============================================================================
// Pool - Constructors
// ============================================================================

impl Pool {
    /// Creates a pool speaking to the Twitch PubSub edge.
    ///
    /// `headers` are attached to every connection's WebSocket handshake.
    /// No connection is made until the first `listen`.
    #[must_use]
    pub fn new(credential: impl Into<String>, headers: HeaderMap) -> Arc<Self> {
        let factory: TransportFactory = Box::new(move || {
            let url = Url::parse(PUBSUB_EDGE_URL).expect("endpoint URL is valid");
            Arc::new(WebSocketTransport::new(url, headers.clone()))
        });
        Self::with_transport_factory(credential, factory)
    }

    /// Creates a pool with a custom transport factory.
    ///
    /// Used for alternate endpoints and for injecting test transports.
    #[must_use]
    pub fn with_transport_factory(
        credential: impl Into<String>,
        transport_factory: TransportFactory,
    ) -> Arc<Self> {
        Arc::new(Self {
            running: Mutex::new(false),
            connections: RwLock::new(Vec::new()),
            credential: credential.into(),
            transport_factory,
            observer: RwLock::new(Arc::new(NoopObserver)),
        })
    }

    /// Installs the observer, replacing any previous one.
    pub fn set_observer(&self, observer: Arc<dyn PoolObserver>) {
        *self.observer.write() = observer;
    }
}

// ============================================================================
// Pool - Subscription API
// ============================================================================

impl Pool {
    /// Subscribes to a topic on a connection with spare capacity,
    /// creating a new connection if none qualifies.
    ///
    /// Never fails for capacity reasons; a fresh connection always has
    /// room.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTopic`] if the name is already tracked
    /// anywhere in the pool.
    pub async fn listen(
        self: &Arc<Self>,
        name: impl Into<String>,
        callback: TopicCallback,
    ) -> Result<Arc<Topic>> {
        let name = name.into();

        if self.find_topic(&name).is_some() {
            return Err(Error::duplicate_topic(name));
        }

        let connection = self.target_connection().await;
        connection.listen(name, callback).await
    }

    /// Subscribes to several topics with a shared callback.
    ///
    /// Stops at the first failure; earlier subscriptions stay in place.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Pool::listen`].
    pub async fn listen_many<I, S>(
        self: &Arc<Self>,
        callback: TopicCallback,
        names: I,
    ) -> Result<Vec<Arc<Topic>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut topics = Vec::new();
        for name in names {
            topics.push(self.listen(name.as_ref(), Arc::clone(&callback)).await?);
        }
        Ok(topics)
    }

    /// Unsubscribes from a topic on whichever connection holds it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if no connection tracks the name.
    pub async fn unlisten(&self, name: &str) -> Result<()> {
        let Some((_, connection)) = self.find_topic(name) else {
            return Err(Error::invalid_topic(name));
        };
        connection.unlisten(name).await
    }

    /// Unsubscribes from several topics, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] for the first unknown name.
    pub async fn unlisten_many<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.unlisten(name.as_ref()).await?;
        }
        Ok(())
    }

    /// Returns `true` if any connection tracks the topic.
    #[must_use]
    pub fn is_listening(&self, name: &str) -> bool {
        self.find_topic(name).is_some()
    }

    /// Returns the number of connections created so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    fn find_topic(&self, name: &str) -> Option<(Arc<Topic>, Arc<Connection>)> {
        let connections = self.connections.read();
        connections.iter().find_map(|connection| {
            connection
                .topic_by_name(name)
                .map(|topic| (topic, Arc::clone(connection)))
        })
    }
}

// ============================================================================
// Pool - Connection Management
// ============================================================================

impl Pool {
    /// Picks the first connection with spare capacity, creating one when
    /// none qualifies (including the empty-pool case).
    async fn target_connection(self: &Arc<Self>) -> Arc<Connection> {
        {
            let connections = self.connections.read();
            if let Some(connection) = connections.iter().find(|c| c.capacity() > 0) {
                return Arc::clone(connection);
            }
        }

        let connection = self.create_connection();

        // A connection created after start() comes up immediately; its
        // start error is reported, not returned, because the topic can
        // still be registered for the next connect replay.
        if *self.running.lock().await {
            if let Err(error) = connection.start().await {
                self.current_observer().on_error(&connection, error, None);
            }
        }

        connection
    }

    /// Creates a connection wired into the pool's observer.
    fn create_connection(self: &Arc<Self>) -> Arc<Connection> {
        let transport = (self.transport_factory)();
        let connection = Connection::new(transport, self.credential.clone());

        let pool = Arc::downgrade(self);
        let subject = Arc::downgrade(&connection);
        connection.on_connect(move || {
            if let (Some(pool), Some(connection)) = (pool.upgrade(), subject.upgrade()) {
                pool.current_observer().on_connect(&connection);
            }
        });

        let pool = Arc::downgrade(self);
        let subject = Arc::downgrade(&connection);
        connection.on_error(move |error, topic| {
            if let (Some(pool), Some(connection)) = (pool.upgrade(), subject.upgrade()) {
                pool.current_observer().on_error(&connection, error, topic);
            }
        });

        self.connections.write().push(Arc::clone(&connection));
        debug!(
            connections = self.connection_count(),
            "Connection created on demand"
        );

        connection
    }

    fn current_observer(&self) -> Arc<dyn PoolObserver> {
        self.observer.read().clone()
    }
}

// ============================================================================
// Pool - Lifecycle
// ============================================================================

impl Pool {
    /// Starts every currently existing connection in sequence.
    ///
    /// Idempotent: a running pool is a no-op. Aborts on the first
    /// per-connection failure, leaving earlier connections started; the
    /// observer's `on_start` fires only when all of them came up.
    ///
    /// Connections are created lazily by `listen`, never here, so
    /// starting an empty pool succeeds without connecting anywhere.
    ///
    /// # Errors
    ///
    /// Propagates the first connection start failure.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if *running {
            return Ok(());
        }

        let connections: Vec<_> = self.connections.read().iter().cloned().collect();
        for connection in &connections {
            connection.start().await?;
        }

        *running = true;
        info!(connections = connections.len(), "Pool started");
        self.current_observer().on_start();
        Ok(())
    }

    /// Stops every connection and clears the running flag.
    ///
    /// Idempotent: a stopped pool is a no-op. Connections stay in the
    /// pool with their topics; a later `start` replays them.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        if !*running {
            return;
        }

        let connections: Vec<_> = self.connections.read().iter().cloned().collect();
        for connection in &connections {
            connection.stop().await;
        }

        *running = false;
        info!("Pool stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex as PlMutex;

    use crate::connection::MAX_TOPICS;
    use crate::transport::mock::MockTransport;

    fn noop_callback() -> TopicCallback {
        Arc::new(|_| {})
    }

    /// Pool backed by mock transports, plus the mocks it created.
    fn mock_pool() -> (Arc<Pool>, Arc<PlMutex<Vec<Arc<MockTransport>>>>) {
        let transports = Arc::new(PlMutex::new(Vec::new()));
        let created = Arc::clone(&transports);

        let factory: TransportFactory = Box::new(move || {
            let transport = MockTransport::new();
            created.lock().push(Arc::clone(&transport));
            transport
        });

        (
            Pool::with_transport_factory("credential", factory),
            transports,
        )
    }

    struct CountingObserver {
        starts: AtomicUsize,
        errors: AtomicUsize,
    }

    impl CountingObserver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                starts: AtomicUsize::new(0),
                errors: AtomicUsize::new(0),
            })
        }
    }

    impl PoolObserver for CountingObserver {
        fn on_start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _: &Arc<Connection>, _: Error, _: Option<Arc<Topic>>) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_listen_creates_first_connection() {
        let (pool, transports) = mock_pool();
        assert_eq!(pool.connection_count(), 0);

        pool.listen("topicA", noop_callback()).await.expect("listen");

        assert_eq!(pool.connection_count(), 1);
        assert_eq!(transports.lock().len(), 1);
        assert!(pool.is_listening("topicA"));
    }

    #[tokio::test]
    async fn test_duplicate_listen_across_pool() {
        let (pool, _transports) = mock_pool();

        pool.listen("topicA", noop_callback()).await.expect("listen");
        let result = pool.listen("topicA", noop_callback()).await;

        assert!(matches!(result, Err(Error::DuplicateTopic { .. })));
    }

    #[tokio::test]
    async fn test_overflow_creates_second_connection() {
        let (pool, _transports) = mock_pool();

        for i in 0..MAX_TOPICS {
            pool.listen(format!("topic{i}"), noop_callback())
                .await
                .expect("listen");
        }
        assert_eq!(pool.connection_count(), 1);

        // The 51st unique topic never fails for capacity reasons.
        pool.listen("one-more", noop_callback())
            .await
            .expect("listen");
        assert_eq!(pool.connection_count(), 2);
        assert!(pool.is_listening("one-more"));
    }

    #[tokio::test]
    async fn test_unlisten_routes_to_owning_connection() {
        let (pool, _transports) = mock_pool();

        for i in 0..=MAX_TOPICS {
            pool.listen(format!("topic{i}"), noop_callback())
                .await
                .expect("listen");
        }

        // topic0 lives on connection #1, the overflow topic on #2.
        pool.unlisten("topic0").await.expect("unlisten");
        pool.unlisten(&format!("topic{MAX_TOPICS}"))
            .await
            .expect("unlisten");

        assert!(!pool.is_listening("topic0"));
        assert!(!pool.is_listening(&format!("topic{MAX_TOPICS}")));
    }

    #[tokio::test]
    async fn test_unlisten_unknown_topic() {
        let (pool, _transports) = mock_pool();
        let result = pool.unlisten("nobody").await;
        assert!(matches!(result, Err(Error::InvalidTopic { .. })));
    }

    #[tokio::test]
    async fn test_listen_many_and_unlisten_many() {
        let (pool, _transports) = mock_pool();

        let topics = pool
            .listen_many(noop_callback(), ["a", "b", "c"])
            .await
            .expect("listen_many");
        assert_eq!(topics.len(), 3);

        pool.unlisten_many(["a", "c"]).await.expect("unlisten_many");
        assert!(!pool.is_listening("a"));
        assert!(pool.is_listening("b"));
        assert!(!pool.is_listening("c"));
    }

    #[tokio::test]
    async fn test_start_is_lazy_and_idempotent() {
        let (pool, transports) = mock_pool();
        let observer = CountingObserver::new();
        pool.set_observer(observer.clone());

        // Start never creates connections by itself.
        pool.start().await.expect("start");
        assert_eq!(pool.connection_count(), 0);
        assert!(transports.lock().is_empty());
        assert_eq!(observer.starts.load(Ordering::SeqCst), 1);

        // Second start is a no-op.
        pool.start().await.expect("start again");
        assert_eq!(observer.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_created_while_running_is_started() {
        let (pool, transports) = mock_pool();

        pool.start().await.expect("start");
        pool.listen("topicA", noop_callback()).await.expect("listen");

        let transports = transports.lock();
        assert_eq!(transports.len(), 1);
        assert_eq!(transports[0].connect_count(), 1);
    }

    #[tokio::test]
    async fn test_connection_created_before_start_stays_down() {
        let (pool, transports) = mock_pool();

        pool.listen("topicA", noop_callback()).await.expect("listen");

        let created = transports.lock();
        assert_eq!(created[0].connect_count(), 0);
        drop(created);

        pool.start().await.expect("start");
        assert_eq!(transports.lock()[0].connect_count(), 1);
    }

    #[tokio::test]
    async fn test_observer_sees_connection_connects() {
        let (pool, transports) = mock_pool();

        struct ConnectObserver {
            connects: tokio::sync::mpsc::UnboundedSender<()>,
        }

        impl PoolObserver for ConnectObserver {
            fn on_connect(&self, _: &Arc<Connection>) {
                let _ = self.connects.send(());
            }
        }

        let (connects_tx, mut connects_rx) = tokio::sync::mpsc::unbounded_channel();
        pool.set_observer(Arc::new(ConnectObserver {
            connects: connects_tx,
        }));

        pool.listen("topicA", noop_callback()).await.expect("listen");

        let transport = Arc::clone(&transports.lock()[0]);
        transport.fire_connect();

        connects_rx.recv().await.expect("on_connect");
    }

    #[tokio::test]
    async fn test_stop_disconnects_and_keeps_topics() {
        let (pool, transports) = mock_pool();

        pool.start().await.expect("start");
        pool.listen("topicA", noop_callback()).await.expect("listen");
        assert!(transports.lock()[0].is_connected());

        pool.stop().await;
        assert!(!transports.lock()[0].is_connected());
        // Topics survive a stop; only the transport goes down.
        assert!(pool.is_listening("topicA"));

        // Second stop is a no-op.
        pool.stop().await;
    }
}
