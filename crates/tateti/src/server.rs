//! `TatetiServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → session → match
//! engine → document store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tateti_match::EngineConfig;
use tateti_protocol::{Codec, JsonCodec};
use tateti_session::{Authenticator, SessionConfig, SessionManager};
use tateti_store::DocumentStore;
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{TatetiError, WebSocketTransport};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default time a connection may stay silent before it is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// State shared by every connection task.
pub(crate) struct ServerState<S, A, C> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) store: S,
    pub(crate) engine: EngineConfig,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Tateti server.
///
/// # Example
///
/// ```rust,ignore
/// use tateti::prelude::*;
///
/// let server = TatetiServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .engine_config(EngineConfig::default().with_concurrency(Concurrency::Optimistic))
///     .build(MemoryStore::new(), my_auth)
///     .await?;
/// server.run().await
/// ```
pub struct TatetiServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    engine_config: EngineConfig,
    idle_timeout: Duration,
}

impl TatetiServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
            engine_config: EngineConfig::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the resume grace period and related session behavior.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets the match collection and concurrency mode.
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// How long a connection may go without sending a frame.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener. Matches live in `store`; handshake tokens go
    /// through `auth`. Frames are JSON.
    pub async fn build<S, A>(
        self,
        store: S,
        auth: A,
    ) -> Result<TatetiServer<S, A, JsonCodec>, TatetiError>
    where
        S: DocumentStore,
        A: Authenticator,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.session_config)),
            store,
            engine: self.engine_config,
            auth,
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
        });

        Ok(TatetiServer { transport, state })
    }
}

impl Default for TatetiServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Tateti server. Call [`run()`](Self::run) to start accepting
/// connections.
pub struct TatetiServer<S, A, C> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, A, C>>,
}

impl<S, A, C> TatetiServer<S, A, C>
where
    S: DocumentStore,
    A: Authenticator,
    C: Codec,
{
    pub fn builder() -> TatetiServerBuilder {
        TatetiServerBuilder::new()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Accepts connections until the process ends, one task per client.
    /// Also sweeps sessions whose resume grace period ran out.
    pub async fn run(self) -> Result<(), TatetiError> {
        tracing::info!(
            collection = %self.state.engine.collection,
            concurrency = ?self.state.engine.concurrency,
            "Tateti server running"
        );

        tokio::spawn(sweep_sessions(Arc::clone(&self.state)));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Expires and drops sessions that didn't come back in time. Stops
/// once the server state is gone.
async fn sweep_sessions<S, A, C>(state: Arc<ServerState<S, A, C>>) {
    let period = {
        let grace = state.sessions.lock().await.config().reconnect_grace_secs;
        Duration::from_secs(grace.max(1))
    };
    let weak = Arc::downgrade(&state);
    drop(state);

    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(state) = weak.upgrade() else {
            return;
        };
        let mut sessions = state.sessions.lock().await;
        if !sessions.expire_stale().is_empty() {
            sessions.cleanup_expired();
        }
    }
}
