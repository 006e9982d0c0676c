//! Protocol connection state machine.
//!
//! A [`Connection`] owns one [`Transport`] and the set of topics routed
//! through it. It handles connect/reconnect replay, the PING/PONG
//! keepalive, inbound envelope dispatch and topic add/remove.
//!
//! # States
//!
//! Disconnected → Connecting → Connected, returning to Disconnected on
//! transport-level disconnect or forced stop. The transport cycles back
//! to Connected through its own reconnect; on every (re)connect the
//! connection retires the previous keepalive loop, starts a fresh one,
//! retransmits a LISTEN envelope for every tracked topic in snapshot
//! order, and invokes the connect hook.
//!
//! # Keepalive
//!
//! Every [`PING_INTERVAL`] the loop sends a PING, preceded by a random
//! 0–3s jitter so many connections in one process do not burst in sync.
//! A per-ping watchdog waits [`PONG_DEADLINE`] for the PONG; on expiry
//! it reports [`Error::PingTimeout`] and requests a transport reconnect,
//! unless the transport is already disconnected (a reconnect is then
//! assumed to be underway).

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result, ServerError};
use crate::identifiers::TopicIdentifier;
use crate::protocol::{Request, ServerMessage};
use crate::topic::{Topic, TopicCallback};
use crate::transport::{Transport, TransportHandler};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of topics one connection may carry.
pub const MAX_TOPICS: usize = 50;

/// Interval between keepalive PINGs.
pub(crate) const PING_INTERVAL: Duration = Duration::from_secs(4 * 60);

/// How long a PING waits for its PONG.
pub(crate) const PONG_DEADLINE: Duration = Duration::from_secs(10);

/// Upper bound of the random pre-PING jitter, in milliseconds.
const PING_JITTER_MS: u64 = 3000;

// ============================================================================
// Hook Types
// ============================================================================

/// Hook invoked after every successful connect or reconnect.
type ConnectHook = Arc<dyn Fn() + Send + Sync>;

/// Hook invoked with asynchronous errors, optionally carrying the topic
/// that triggered them.
type ErrorHook = Arc<dyn Fn(Error, Option<Arc<Topic>>) + Send + Sync>;

// ============================================================================
// Connection
// ============================================================================

/// One transport-backed protocol session multiplexing up to
/// [`MAX_TOPICS`] topics.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`; the topic set is guarded by a single
/// reader/writer lock that is never held across an await point.
pub struct Connection {
    /// The duplex transport this session runs over.
    transport: Arc<dyn Transport>,

    /// Auth token attached to LISTEN requests.
    credential: String,

    /// Ordered topic set; order is replayed verbatim on reconnect.
    topics: RwLock<Vec<Arc<Topic>>>,

    /// Generation counter retiring superseded keepalive loops.
    keepalive_generation: AtomicU64,

    /// PONG delivery channel for the active ping's watchdog.
    pong_tx: Mutex<Option<oneshot::Sender<()>>>,

    /// Called on connect/reconnect, after topic replay.
    connect_hook: RwLock<ConnectHook>,

    /// Called on asynchronous errors.
    error_hook: RwLock<ErrorHook>,
}

impl Connection {
    /// Creates a connection over the given transport and installs itself
    /// as the transport's inbound handler.
    pub fn new(transport: Arc<dyn Transport>, credential: impl Into<String>) -> Arc<Self> {
        let connection = Arc::new(Self {
            transport: Arc::clone(&transport),
            credential: credential.into(),
            topics: RwLock::new(Vec::new()),
            keepalive_generation: AtomicU64::new(0),
            pong_tx: Mutex::new(None),
            connect_hook: RwLock::new(Arc::new(|| {})),
            error_hook: RwLock::new(Arc::new(|_, _| {})),
        });

        transport.set_handler(Arc::new(ConnectionHandler {
            connection: Arc::downgrade(&connection),
        }));

        connection
    }

    /// Replaces the connect hook.
    pub fn on_connect(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.connect_hook.write() = Arc::new(hook);
    }

    /// Replaces the error hook.
    pub fn on_error(&self, hook: impl Fn(Error, Option<Arc<Topic>>) + Send + Sync + 'static) {
        *self.error_hook.write() = Arc::new(hook);
    }
}

// ============================================================================
// Connection - Topic Operations
// ============================================================================

impl Connection {
    /// Subscribes to a topic.
    ///
    /// The topic is registered optimistically before any server
    /// confirmation; a later error RESPONSE evicts it and surfaces
    /// through the error hook. While disconnected the LISTEN transmit is
    /// deferred to the next connect replay.
    ///
    /// # Errors
    ///
    /// - [`Error::TooManyTopics`] if the connection is at capacity
    /// - [`Error::DuplicateTopic`] if the name is already tracked here
    pub async fn listen(
        &self,
        name: impl Into<String>,
        callback: TopicCallback,
    ) -> Result<Arc<Topic>> {
        let name = name.into();

        // Check and insert under one guard so two concurrent listens
        // cannot both pass the capacity or duplicate check.
        let topic = {
            let mut topics = self.topics.write();
            if topics.len() >= MAX_TOPICS {
                return Err(Error::too_many_topics(MAX_TOPICS));
            }
            if topics.iter().any(|t| t.name() == name) {
                return Err(Error::duplicate_topic(name));
            }

            let topic = Arc::new(Topic::new(name, self.credential.clone(), callback));
            topics.push(Arc::clone(&topic));
            topic
        };

        if self.transport.is_connected() {
            self.transmit(topic.listen_request()).await?;
        }

        trace!(topic = topic.name(), "Topic registered");
        Ok(topic)
    }

    /// Subscribes to several topics with a shared callback.
    ///
    /// Stops at the first failure; earlier subscriptions stay in place.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Connection::listen`].
    pub async fn listen_many<I, S>(
        &self,
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

    /// Unsubscribes from a topic.
    ///
    /// Removal matches by identity (name + credential hash), not by
    /// nonce: the outgoing UNLISTEN carries a freshly generated nonce
    /// that never matches the original LISTEN's. The transmit is skipped
    /// while disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the name is not tracked here.
    pub async fn unlisten(&self, name: &str) -> Result<()> {
        let Some(topic) = self.topic_by_name(name) else {
            return Err(Error::invalid_topic(name));
        };

        self.remove_topic(&topic.identifier());

        if self.transport.is_connected() {
            self.transmit(topic.unlisten_request()).await?;
        }

        trace!(topic = name, "Topic removed");
        Ok(())
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

    /// Returns `true` if the topic is tracked by this connection.
    #[must_use]
    pub fn is_listening(&self, name: &str) -> bool {
        self.topic_by_name(name).is_some()
    }

    /// Returns the number of tracked topics.
    #[must_use]
    pub fn count(&self) -> usize {
        self.topics.read().len()
    }

    /// Returns the remaining topic slots before the ceiling.
    #[must_use]
    pub fn capacity(&self) -> usize {
        MAX_TOPICS - self.topics.read().len()
    }

    pub(crate) fn topic_by_name(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics
            .read()
            .iter()
            .find(|topic| topic.name() == name)
            .cloned()
    }

    fn topic_by_nonce(&self, nonce: &str) -> Option<Arc<Topic>> {
        self.topics
            .read()
            .iter()
            .find(|topic| topic.nonce().as_str() == nonce)
            .cloned()
    }

    /// Removes a topic by identity. Swap-removal may reorder the set,
    /// which is why replay order is only a snapshot order.
    fn remove_topic(&self, identifier: &TopicIdentifier) -> bool {
        let mut topics = self.topics.write();
        match topics.iter().position(|t| t.identifier() == *identifier) {
            Some(index) => {
                topics.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Establishes the transport connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the endpoint cannot be reached.
    pub async fn start(&self) -> Result<()> {
        self.transport.connect().await
    }

    /// Disconnects the transport and retires the keepalive loop.
    ///
    /// No-op while disconnected. Tracked topics are kept; a later start
    /// replays them.
    pub async fn stop(&self) {
        if !self.transport.is_connected() {
            return;
        }

        self.transport.force_disconnect().await;
        self.keepalive_generation.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Connection - Connect Replay
// ============================================================================

impl Connection {
    /// Runs the (re)connect sequence: retire the old keepalive loop,
    /// start a fresh one, replay every topic, invoke the connect hook.
    fn handle_connect(self: &Arc<Self>) {
        let generation = self.keepalive_generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(Self::keepalive_loop(Arc::downgrade(self), generation));

        let connection = Arc::clone(self);
        tokio::spawn(async move {
            connection.replay_topics().await;
            (connection.connect_hook.read().clone())();
        });
    }

    /// Retransmits a LISTEN for every tracked topic in snapshot order.
    ///
    /// Stops at the first transmit failure and reports it with the
    /// failing topic as context; the remaining topics are picked up by
    /// the next reconnect replay.
    async fn replay_topics(&self) {
        let snapshot: Vec<Arc<Topic>> = self.topics.read().clone();

        for topic in snapshot {
            if let Err(error) = self.transmit(topic.listen_request()).await {
                warn!(topic = topic.name(), error = %error, "Replay failed");
                self.report_error(error, Some(topic));
                break;
            }
        }
    }

    async fn transmit(&self, request: Request) -> Result<()> {
        self.transport.send_json(serde_json::to_value(&request)?).await
    }

    fn report_error(&self, error: Error, topic: Option<Arc<Topic>>) {
        let hook = self.error_hook.read().clone();
        hook(error, topic);
    }
}

// ============================================================================
// Connection - Keepalive
// ============================================================================

impl Connection {
    /// Periodic PING loop for one connect generation.
    ///
    /// Exits cooperatively once the generation counter moves on, so a
    /// reconnect replaces the loop instead of layering a second one.
    async fn keepalive_loop(connection: Weak<Connection>, generation: u64) {
        loop {
            // Jitter keeps many connections in one process from pinging
            // in a synchronized burst.
            let jitter = rand::thread_rng().gen_range(0..PING_JITTER_MS);
            tokio::time::sleep(Duration::from_millis(jitter)).await;

            let Some(connection) = connection.upgrade() else {
                return;
            };
            if connection.keepalive_generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "Keepalive loop superseded");
                return;
            }

            if let Err(error) = connection.send_ping().await {
                debug!(error = %error, "PING transmit failed");
            }
            drop(connection);

            tokio::time::sleep(PING_INTERVAL).await;
        }
    }

    /// Sends one PING and spawns its PONG watchdog.
    async fn send_ping(self: &Arc<Self>) -> Result<()> {
        let (pong_tx, pong_rx) = oneshot::channel();
        *self.pong_tx.lock() = Some(pong_tx);

        self.transmit(Request::Ping).await?;
        trace!("PING sent");

        let connection = Arc::downgrade(self);
        tokio::spawn(async move {
            match timeout(PONG_DEADLINE, pong_rx).await {
                // PONG arrived, or this watchdog was superseded by a
                // newer ping dropping our sender.
                Ok(_) => {}

                Err(_) => {
                    let Some(connection) = connection.upgrade() else {
                        return;
                    };
                    if !connection.transport.is_connected() {
                        // A reconnect is already in progress.
                        return;
                    }

                    warn!("PONG deadline elapsed, requesting reconnect");
                    connection
                        .report_error(Error::ping_timeout(PONG_DEADLINE.as_millis() as u64), None);
                    if let Err(error) = connection.transport.reconnect().await {
                        debug!(error = %error, "Reconnect request failed");
                    }
                }
            }
        });

        Ok(())
    }

    fn handle_pong(&self) {
        if let Some(pong_tx) = self.pong_tx.lock().take() {
            let _ = pong_tx.send(());
        }
    }
}

// ============================================================================
// Connection - Inbound Dispatch
// ============================================================================

impl Connection {
    /// Routes one inbound envelope.
    ///
    /// # Errors
    ///
    /// Malformed frames and server references to unknown topics/nonces
    /// are returned to the transport's error channel rather than the
    /// per-topic error hook.
    fn dispatch(&self, data: &[u8]) -> Result<()> {
        let message: ServerMessage = serde_json::from_slice(data)?;

        match message {
            ServerMessage::Reconnect => {
                debug!("Server requested reconnect");
                let transport = Arc::clone(&self.transport);
                tokio::spawn(async move {
                    if let Err(error) = transport.reconnect().await {
                        debug!(error = %error, "Reconnect request failed");
                    }
                });
                Ok(())
            }

            ServerMessage::Response { nonce, error } => self.handle_response(&nonce, &error),

            ServerMessage::Message { data } => {
                let Some(topic) = self.topic_by_name(&data.topic) else {
                    return Err(Error::invalid_topic(&data.topic));
                };

                // Fire-and-forget; no ordering guarantee across topics.
                tokio::spawn(async move {
                    topic.deliver(data);
                });
                Ok(())
            }

            ServerMessage::Pong => {
                self.handle_pong();
                Ok(())
            }

            ServerMessage::Unknown => Ok(()),
        }
    }

    /// Handles a RESPONSE envelope.
    ///
    /// An empty error string is an implicit success; the topic was
    /// already registered optimistically. A non-empty error evicts the
    /// topic whose pending nonce matches and reports it once through the
    /// error hook.
    fn handle_response(&self, nonce: &str, error: &str) -> Result<()> {
        if error.is_empty() {
            return Ok(());
        }

        let Some(topic) = self.topic_by_nonce(nonce) else {
            return Err(Error::invalid_topic(format!("nonce {nonce}")));
        };
        if !self.remove_topic(&topic.identifier()) {
            return Err(Error::invalid_topic(format!("nonce {nonce}")));
        }

        match ServerError::from_code(error) {
            Some(kind) => {
                self.report_error(
                    Error::subscription(kind, topic.name()),
                    Some(Arc::clone(&topic)),
                );
            }
            None => warn!(code = error, topic = topic.name(), "Unrecognized RESPONSE error"),
        }

        Ok(())
    }
}

// ============================================================================
// ConnectionHandler
// ============================================================================

/// Adapter installing a [`Connection`] as its transport's inbound
/// handler without creating a reference cycle.
struct ConnectionHandler {
    connection: Weak<Connection>,
}

impl TransportHandler for ConnectionHandler {
    fn on_connect(&self) {
        if let Some(connection) = self.connection.upgrade() {
            connection.handle_connect();
        }
    }

    fn on_message(&self, data: &[u8]) -> Result<()> {
        match self.connection.upgrade() {
            Some(connection) => connection.dispatch(data),
            None => Ok(()),
        }
    }

    fn on_error(&self, error: Error) {
        if let Some(connection) = self.connection.upgrade() {
            connection.report_error(error, None);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
