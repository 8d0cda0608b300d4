//! Per-connection handler: handshake, then serve requests and push
//! updates until the client leaves.
//!
//! Each accepted connection gets its own Tokio task running this
//! handler. The flow is:
//!   1. Receive Handshake → validate version
//!   2. Authenticate token → get PlayerId
//!   3. Resume the previous session or start a new one
//!   4. Send HandshakeAck; re-attach the match a resumed session held
//!   5. Loop over three sources (plus an idle timer):
//!
//! ```text
//!            ┌── client frame ──→ dispatch ──→ Accepted / Rejected / Error
//!  select! ──┼── match feed ────→ MatchUpdate
//!            └── lobby feed ────→ LobbyUpdate
//! ```
//!
//!   6. However the loop ends: mark the session disconnected, then
//!      cancel both feeds and close the socket.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tateti_match::{MatchError, MatchLobby, MatchSession, standing_for};
use tateti_protocol::{
    ClientMessage, Codec, Envelope, EventKind, Match, MatchEvent, MatchId, PlayerId,
    ProtocolError, ServerMessage,
};
use tateti_session::{Authenticator, FixedIdentity, SessionError, SessionManager};
use tateti_store::DocumentStore;

use crate::server::{PROTOCOL_VERSION, ServerState};
use crate::{ConnectionReader, ConnectionWriter, TatetiError, WebSocketConnection};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Marks a player's session disconnected when the handler exits.
///
/// The normal exit calls [`release`](Self::release). `Drop` covers early
/// returns and panics; it is synchronous, so the async lock happens in a
/// spawned task there.
struct SessionGuard<S: DocumentStore, A: Authenticator, C: Codec> {
    player_id: PlayerId,
    state: Arc<ServerState<S, A, C>>,
    released: bool,
}

impl<S: DocumentStore, A: Authenticator, C: Codec> SessionGuard<S, A, C> {
    fn new(player_id: PlayerId, state: Arc<ServerState<S, A, C>>) -> Self {
        Self {
            player_id,
            state,
            released: false,
        }
    }

    /// Disconnects the session before returning, so a client that sees
    /// its socket close can resume at once.
    async fn release(mut self) {
        let mut sessions = self.state.sessions.lock().await;
        if let Err(e) = sessions.disconnect(&self.player_id) {
            tracing::debug!(player_id = %self.player_id, error = %e, "session already gone");
        }
        drop(sessions);
        self.released = true;
    }
}

impl<S: DocumentStore, A: Authenticator, C: Codec> Drop for SessionGuard<S, A, C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let player_id = self.player_id.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut sessions = state.sessions.lock().await;
            let _ = sessions.disconnect(&player_id);
        });
    }
}

/// What the handshake settled on.
struct Admission {
    player_id: PlayerId,
    session_token: String,
    resumed: bool,
    /// The match a resumed session was observing.
    resumed_match: Option<MatchId>,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, A, C>>,
) -> Result<(), TatetiError>
where
    S: DocumentStore,
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (mut reader, writer) = conn.into_split();
    let mut outbox = Outbox::new(writer, &state.codec);

    let admission = perform_handshake(&mut reader, &mut outbox, &state).await?;
    let player_id = admission.player_id.clone();

    // The session exists from here on; the guard marks it disconnected
    // however this task ends.
    let guard = SessionGuard::new(player_id.clone(), Arc::clone(&state));

    let server_time = outbox.elapsed_ms();
    outbox.send(ServerMessage::HandshakeAck {
        player_id: player_id.clone(),
        server_time,
        session_token: admission.session_token,
        resumed: admission.resumed,
    })?;

    tracing::info!(%conn_id, %player_id, resumed = admission.resumed, "player connected");

    let mut client = Client {
        matches: MatchSession::new(
            state.store.clone(),
            FixedIdentity::new(player_id.clone()),
            state.engine.clone(),
        ),
        lobby: None,
        player_id,
        state: &state,
        outbox,
    };

    let outcome = client.serve(&mut reader, admission.resumed_match).await;

    // Session first: the socket closes when `finish` drops the outbox.
    guard.release().await;
    client.finish().await;
    outcome
}

/// Receives the Handshake, validates it, authenticates the token, and
/// resumes or creates the player's session.
async fn perform_handshake<S, A, C>(
    reader: &mut ConnectionReader,
    outbox: &mut Outbox<'_, C>,
    state: &ServerState<S, A, C>,
) -> Result<Admission, TatetiError>
where
    S: DocumentStore,
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, reader.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => return Err(invalid("connection closed before handshake")),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(invalid("handshake timed out")),
    };

    let handshake = state
        .codec
        .decode::<Envelope<ClientMessage>>(&data)
        .map(|envelope| envelope.payload);
    let Ok(ClientMessage::Handshake {
        version,
        token,
        resume,
    }) = handshake
    else {
        outbox.error(400, "expected Handshake")?;
        return Err(invalid("first message must be Handshake"));
    };

    if version != PROTOCOL_VERSION {
        outbox.error(
            400,
            format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )?;
        return Err(invalid("protocol version mismatch"));
    }

    let player_id = match state.auth.authenticate(token.as_deref().unwrap_or("")).await {
        Ok(player_id) => player_id,
        Err(e) => {
            outbox.error(401, "unauthorized")?;
            return Err(e.into());
        }
    };

    let admitted = {
        let mut sessions = state.sessions.lock().await;
        admit(&mut sessions, player_id, resume.as_deref())
    };
    match admitted {
        Ok(admission) => Ok(admission),
        Err(e) => {
            outbox.error(409, e.to_string())?;
            Err(e.into())
        }
    }
}

/// Resumes the session `resume` names if it belongs to `player_id`;
/// otherwise starts a fresh one.
fn admit(
    sessions: &mut SessionManager,
    player_id: PlayerId,
    resume: Option<&str>,
) -> Result<Admission, SessionError> {
    if let Some(token) = resume {
        let owned = sessions
            .get(&player_id)
            .is_some_and(|session| session.reconnect_token == token);

        if owned {
            match sessions.reconnect(token) {
                Ok(session) => {
                    return Ok(Admission {
                        session_token: session.reconnect_token.clone(),
                        resumed_match: session.current_match.clone(),
                        resumed: true,
                        player_id,
                    });
                }
                Err(e @ SessionError::AlreadyConnected(_)) => return Err(e),
                Err(e) => {
                    tracing::debug!(%player_id, error = %e, "resume refused, starting over");
                }
            }
        } else {
            tracing::debug!(%player_id, "resume token does not belong to player");
        }
    }

    let session = sessions.create(player_id.clone())?;
    Ok(Admission {
        session_token: session.reconnect_token.clone(),
        resumed_match: None,
        resumed: false,
        player_id,
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Everything one connected player's task owns.
struct Client<'a, S, A, C> {
    player_id: PlayerId,
    state: &'a ServerState<S, A, C>,
    outbox: Outbox<'a, C>,
    matches: MatchSession<S, FixedIdentity>,
    lobby: Option<MatchLobby<S>>,
}

impl<S, A, C> Client<'_, S, A, C>
where
    S: DocumentStore,
    A: Authenticator,
    C: Codec,
{
    /// Re-attaches a resumed match, then serves frames and forwards feed
    /// events until the connection ends. An error stops the loop; the
    /// caller cleans up either way.
    async fn serve(
        &mut self,
        reader: &mut ConnectionReader,
        resumed_match: Option<MatchId>,
    ) -> Result<(), TatetiError> {
        if let Some(match_id) = resumed_match {
            self.reattach(&match_id).await?;
        }

        let idle_timeout = self.state.idle_timeout;
        let idle = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                incoming = reader.recv() => {
                    let data = match incoming {
                        Ok(Some(data)) => data,
                        Ok(None) => {
                            tracing::info!(player_id = %self.player_id, "connection closed cleanly");
                            return Ok(());
                        }
                        Err(e) => {
                            tracing::debug!(player_id = %self.player_id, error = %e, "recv error");
                            return Ok(());
                        }
                    };
                    idle.as_mut().reset(tokio::time::Instant::now() + idle_timeout);

                    let envelope: Envelope<ClientMessage> = match self.state.codec.decode(&data) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            tracing::debug!(
                                player_id = %self.player_id, error = %e, "failed to decode envelope"
                            );
                            continue;
                        }
                    };

                    if self.dispatch(envelope.payload).await? == Flow::Close {
                        return Ok(());
                    }
                }
                event = self.matches.next_event() => self.forward_match_event(event).await?,
                event = next_lobby_event(&mut self.lobby) => self.forward_lobby_event(event)?,
                () = &mut idle => {
                    tracing::info!(player_id = %self.player_id, "connection timed out");
                    return Ok(());
                }
            }
        }
    }

    /// Serves one request. Returns [`Flow::Close`] if the connection
    /// should end.
    async fn dispatch(&mut self, message: ClientMessage) -> Result<Flow, TatetiError> {
        match message {
            ClientMessage::Handshake { .. } => {
                self.outbox.error(400, "already handshaken")?;
            }

            ClientMessage::StartMatch { position } => {
                let result = self.matches.start_match(position).await;
                self.reply(result.map(Some)).await?;
            }

            ClientMessage::OpenMatch { match_id } => {
                let result = self.matches.open_match(&match_id).await;
                self.reply(result.map(Some)).await?;
            }

            ClientMessage::Play {
                position,
                observed_moves,
            } => {
                let result = self
                    .matches
                    .play(position, observed_moves)
                    .await
                    .map(|_| self.matches.current().cloned());
                self.reply(result).await?;
            }

            ClientMessage::LeaveMatch => {
                let result = self.matches.leave().await.map(|_| None);
                self.reply(result).await?;
            }

            ClientMessage::WatchLobby => {
                if self.lobby.is_none() {
                    match MatchLobby::open(self.state.store.clone(), &self.state.engine).await {
                        Ok(lobby) => self.lobby = Some(lobby),
                        Err(e) => {
                            self.refuse(e)?;
                            return Ok(Flow::Continue);
                        }
                    }
                }
                self.outbox.send(ServerMessage::Accepted {
                    snapshot: None,
                    standing: None,
                })?;
            }

            ClientMessage::UnwatchLobby => {
                if let Some(mut lobby) = self.lobby.take() {
                    if let Err(e) = lobby.close().await {
                        tracing::debug!(player_id = %self.player_id, error = %e, "lobby close failed");
                    }
                }
                self.outbox.send(ServerMessage::Accepted {
                    snapshot: None,
                    standing: None,
                })?;
            }

            ClientMessage::Heartbeat { client_time } => {
                let server_time = self.outbox.elapsed_ms();
                self.outbox.send(ServerMessage::HeartbeatAck {
                    client_time,
                    server_time,
                })?;
            }

            ClientMessage::Disconnect { reason } => {
                tracing::info!(player_id = %self.player_id, %reason, "client disconnected");
                return Ok(Flow::Close);
            }
        }

        Ok(Flow::Continue)
    }

    /// Answers a match request and records which match the session now
    /// holds, so a resumed connection can find it again.
    async fn reply(&mut self, result: Result<Option<Match>, MatchError>) -> Result<(), TatetiError> {
        match result {
            Ok(snapshot) => {
                self.remember_current_match().await?;
                let standing = snapshot.as_ref().map(|m| standing_for(m, &self.player_id));
                self.outbox.send(ServerMessage::Accepted { snapshot, standing })
            }
            Err(e) => self.refuse(e),
        }
    }

    /// Engine refusals become `Rejected`; anything else is a server-side
    /// failure and becomes `Error`.
    fn refuse(&mut self, error: MatchError) -> Result<(), TatetiError> {
        match error.reject_reason() {
            Some(reason) => {
                tracing::debug!(player_id = %self.player_id, %error, "request rejected");
                self.outbox.send(ServerMessage::Rejected {
                    reason,
                    message: error.to_string(),
                })
            }
            None => {
                tracing::warn!(player_id = %self.player_id, %error, "match operation failed");
                let code = match error {
                    MatchError::Store(_) => 503,
                    _ => 500,
                };
                self.outbox.error(code, error.to_string())
            }
        }
    }

    async fn remember_current_match(&self) -> Result<(), TatetiError> {
        let match_id = self.matches.current().and_then(|m| m.id.clone());
        self.state
            .sessions
            .lock()
            .await
            .set_current_match(&self.player_id, match_id)?;
        Ok(())
    }

    /// Re-opens the match a resumed session was observing. Its feed
    /// opens with the current snapshot, which reaches the client as the
    /// first `MatchUpdate`.
    async fn reattach(&mut self, match_id: &MatchId) -> Result<(), TatetiError> {
        match self.matches.open_match(match_id).await {
            Ok(_) => {
                tracing::info!(player_id = %self.player_id, %match_id, "re-attached to match");
            }
            Err(e) => {
                tracing::debug!(
                    player_id = %self.player_id, %match_id, error = %e, "could not re-attach"
                );
                self.remember_current_match().await?;
            }
        }
        Ok(())
    }

    async fn forward_match_event(
        &mut self,
        event: Result<MatchEvent, MatchError>,
    ) -> Result<(), TatetiError> {
        match event {
            Ok(event) => {
                if event.kind == EventKind::Removed {
                    self.remember_current_match().await?;
                }
                let standing = standing_for(&event.snapshot, &self.player_id);
                self.outbox.send(ServerMessage::MatchUpdate { event, standing })
            }
            // Already logged where it was decoded; the feed goes on.
            Err(MatchError::MalformedDocument(_)) => Ok(()),
            Err(e) => {
                self.remember_current_match().await?;
                self.outbox.error(503, format!("match feed ended: {e}"))
            }
        }
    }

    fn forward_lobby_event(&mut self, event: Result<MatchEvent, MatchError>) -> Result<(), TatetiError> {
        match event {
            Ok(event) => self.outbox.send(ServerMessage::LobbyUpdate { event }),
            Err(MatchError::MalformedDocument(_)) => Ok(()),
            Err(e) => {
                self.lobby = None;
                self.outbox.error(503, format!("lobby feed ended: {e}"))
            }
        }
    }

    /// Cancels both feeds. The session keeps its current match for a
    /// later resume.
    async fn finish(mut self) {
        if let Err(e) = self.matches.leave().await {
            tracing::debug!(player_id = %self.player_id, error = %e, "match unwatch failed");
        }
        if let Some(mut lobby) = self.lobby.take() {
            if let Err(e) = lobby.close().await {
                tracing::debug!(player_id = %self.player_id, error = %e, "lobby close failed");
            }
        }
    }
}

async fn next_lobby_event<S: DocumentStore>(
    lobby: &mut Option<MatchLobby<S>>,
) -> Result<MatchEvent, MatchError> {
    match lobby {
        Some(lobby) => lobby.next_event().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Stamps server frames with sequence number and timestamp, encodes
/// them, and queues them on the connection.
struct Outbox<'a, C> {
    writer: ConnectionWriter,
    codec: &'a C,
    seq: u64,
    start: Instant,
}

impl<'a, C: Codec> Outbox<'a, C> {
    fn new(writer: ConnectionWriter, codec: &'a C) -> Self {
        Self {
            writer,
            codec,
            seq: 0,
            start: Instant::now(),
        }
    }

    /// Milliseconds since the connection was accepted.
    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn send(&mut self, payload: ServerMessage) -> Result<(), TatetiError> {
        let envelope = Envelope::new(next_seq(&mut self.seq), self.elapsed_ms(), payload);
        let bytes = self.codec.encode(&envelope)?;
        self.writer.send(bytes)?;
        Ok(())
    }

    fn error(&mut self, code: u16, message: impl Into<String>) -> Result<(), TatetiError> {
        self.send(ServerMessage::Error {
            code,
            message: message.into(),
        })
    }
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}

fn invalid(message: &str) -> TatetiError {
    TatetiError::Protocol(ProtocolError::InvalidMessage(message.to_string()))
}
