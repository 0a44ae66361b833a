//! Client session
//!
//! One session per accepted connection. It runs the authentication phase
//! (racing the [`AuthTimer`]), then the message phase, then tears itself
//! down. All writes to the socket go through a dedicated writer task.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::auth::CredentialStore;
use crate::client::ClientHandle;
use crate::codec::FrameCodec;
use crate::error::{AppError, SendError};
use crate::message::Command;
use crate::registry::Registry;
use crate::timer::AuthTimer;
use crate::types::SessionId;

/// How long teardown waits for queued frames to reach the socket
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared services every session needs
pub struct SessionContext<S> {
    pub registry: Arc<Registry>,
    pub store: Arc<S>,
    pub auth_timeout: Duration,
}

impl<S> Clone for SessionContext<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            auth_timeout: self.auth_timeout,
        }
    }
}

/// How the authentication phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthOutcome {
    Authenticated,
    TimedOut,
    Disconnected,
}

/// Server-side state of one client connection
pub struct Session<S> {
    id: SessionId,
    peer: String,
    /// Empty until authenticated
    nick: String,
    login: String,
    reader: FramedRead<OwnedReadHalf, FrameCodec>,
    client: ClientHandle,
    writer: JoinHandle<()>,
    ctx: SessionContext<S>,
}

impl<S: CredentialStore> Session<S> {
    /// Take ownership of an accepted connection and start its writer task
    pub fn new(stream: TcpStream, ctx: SessionContext<S>) -> Self {
        let id = SessionId::new();
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(
            id,
            FramedWrite::new(write_half, FrameCodec::new()),
            rx,
        ));

        Self {
            id,
            peer,
            nick: String::new(),
            login: String::new(),
            reader: FramedRead::new(read_half, FrameCodec::new()),
            client: ClientHandle::new(id, tx),
            writer,
            ctx,
        }
    }

    /// Create a session and run it on its own task
    pub fn spawn(stream: TcpStream, ctx: SessionContext<S>) -> JoinHandle<()> {
        tokio::spawn(Self::new(stream, ctx).run())
    }

    /// Drive the session from connect to teardown
    pub async fn run(mut self) {
        info!(session = %self.id, "Client connected from {}", self.peer);

        let timer = AuthTimer::arm(self.ctx.auth_timeout, self.id);
        match self.authenticate(&timer).await {
            AuthOutcome::Authenticated => self.read_messages().await,
            AuthOutcome::TimedOut => {
                info!(session = %self.id, "{} did not authenticate in time", self.peer)
            }
            AuthOutcome::Disconnected => {}
        }
        drop(timer);

        self.teardown().await;
    }

    /// Queue one frame for this client
    ///
    /// Transport failures are logged; the read side notices the dead
    /// connection and ends the session.
    pub fn send(&self, text: impl Into<String>) {
        match self.client.send(text) {
            Ok(()) => {}
            Err(e @ SendError::FrameTooLarge(_)) => {
                warn!(session = %self.id, "Message not sent: {}", e)
            }
            Err(e) => debug!(session = %self.id, "Send failed: {}", e),
        }
    }

    /// Serialize a command and queue it
    pub fn deliver(&self, command: &Command) {
        self.send(command.to_string());
    }

    async fn next_line(&mut self) -> Option<String> {
        match self.reader.next().await {
            Some(Ok(line)) => Some(line),
            Some(Err(e)) => {
                warn!(session = %self.id, "Read failed: {}", e);
                None
            }
            None => {
                debug!(session = %self.id, "Connection closed by peer");
                None
            }
        }
    }

    async fn authenticate(&mut self, timer: &AuthTimer) -> AuthOutcome {
        loop {
            let line = tokio::select! {
                line = self.next_line() => line,
                _ = timer.expired() => return AuthOutcome::TimedOut,
            };
            let Some(line) = line else {
                return AuthOutcome::Disconnected;
            };

            let Command::Auth { login, password } = Command::parse(&line) else {
                debug!(session = %self.id, "Ignoring message before authentication");
                continue;
            };

            match self.login(timer, login, password).await {
                Ok(()) => return AuthOutcome::Authenticated,
                Err(AppError::AuthTimedOut) => return AuthOutcome::TimedOut,
                Err(err) => {
                    match &err {
                        AppError::Store(_) => error!(session = %self.id, "Login failed: {}", err),
                        _ => info!(session = %self.id, "Login refused: {}", err),
                    }
                    self.deliver(&err.into());
                }
            }
        }
    }

    async fn login(
        &mut self,
        timer: &AuthTimer,
        login: String,
        password: String,
    ) -> Result<(), AppError> {
        let nick = self
            .ctx
            .store
            .lookup(&login, &password)
            .await?
            .ok_or(AppError::WrongCredentials)?;

        let auth_ok = Command::AuthOk {
            nick: nick.clone(),
            login: login.clone(),
        };
        let client = &self.client;
        self.ctx.registry.subscribe(&nick, client.clone(), || {
            // Losing to the timer means no side effects at all
            if !timer.cancel() {
                return false;
            }
            if let Err(e) = client.deliver(&auth_ok) {
                debug!(session = %client.id, "Send failed: {}", e);
            }
            true
        })?;

        info!(session = %self.id, "{} authenticated as {}", login, nick);
        self.nick = nick;
        self.login = login;
        Ok(())
    }

    async fn read_messages(&mut self) {
        while let Some(line) = self.next_line().await {
            match Command::parse(&line) {
                Command::End => {
                    debug!(session = %self.id, "{} ended the session", self.nick);
                    break;
                }
                Command::PrivateMessage { to, body } => {
                    self.ctx.registry.route(&self.nick, &self.client, &to, &body);
                }
                Command::Nick { nick } => self.change_nick(nick, &line).await,
                _ => self
                    .ctx
                    .registry
                    .broadcast_text(&format!("{}: {}", self.nick, line)),
            }
        }
    }

    async fn change_nick(&mut self, new_nick: String, line: &str) {
        if let Err(err) = self.ctx.registry.rename(&self.nick, &new_nick, &self.client) {
            info!(session = %self.id, "Rename of {} refused: {}", self.nick, err);
            self.deliver(&err.into());
            return;
        }

        let old_nick = std::mem::replace(&mut self.nick, new_nick);
        info!(session = %self.id, "{} is now known as {}", old_nick, self.nick);
        self.send(line);

        // The in-memory rename stands even if this fails
        if let Err(e) = self.ctx.store.update_nickname(&self.login, &self.nick).await {
            error!(
                session = %self.id,
                "Failed to persist nick {} for {}: {}", self.nick, self.login, e
            );
        }

        self.ctx.registry.broadcast_client_list();
    }

    /// Release everything the session holds. Consumes the session, so it
    /// runs once.
    async fn teardown(self) {
        let Session {
            id,
            peer,
            nick,
            reader,
            client,
            mut writer,
            ctx,
            ..
        } = self;

        ctx.registry.unsubscribe(&nick, id);

        if let Err(e) = client.deliver(&Command::End) {
            debug!(session = %id, "End notice not sent: {}", e);
        }
        drop(reader);
        drop(client);

        match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(session = %id, "Writer task failed: {}", e),
            Err(_) => {
                warn!(session = %id, "Writer did not drain within {:?}", WRITER_DRAIN_TIMEOUT);
                writer.abort();
            }
        }

        info!(session = %id, "Client {} ({}) disconnected", nick, peer);
    }
}

/// Drain the outbound queue onto the socket, one frame per write
async fn write_loop(
    id: SessionId,
    mut sink: FramedWrite<OwnedWriteHalf, FrameCodec>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    while let Some(frame) = outbound.recv().await {
        match sink.send(frame).await {
            Ok(()) => {}
            // Encoder refused this one frame; the connection is still fine
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                warn!(session = %id, "Dropped unframeable message: {}", e);
            }
            Err(e) => {
                warn!(session = %id, "Write failed: {}", e);
                return;
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!(session = %id, "Failed to close write half: {}", e);
    }
    debug!(session = %id, "Write task ended");
}
