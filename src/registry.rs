//! Session registry and message router
//!
//! The single shared table mapping a live nickname to its session's
//! [`ClientHandle`]. Every operation runs under one lock, and enqueueing a
//! frame never blocks, so broadcasts are linearised with each other and
//! with subscribe/unsubscribe/rename.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::client::ClientHandle;
use crate::error::AppError;
use crate::message::Command;
use crate::types::SessionId;

type Clients = BTreeMap<String, ClientHandle>;

/// Nickname → session index
///
/// Holds non-owning handles only; sessions add and remove themselves.
#[derive(Debug, Default)]
pub struct Registry {
    clients: Mutex<Clients>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Clients> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check whether a nickname is currently registered
    pub fn is_nick_busy(&self, nick: &str) -> bool {
        self.lock().contains_key(nick)
    }

    /// Register a session under `nick`
    ///
    /// Under one lock: checks the nick is free, runs `admit` (which may
    /// refuse), announces the arrival to everyone already online, inserts
    /// the session and broadcasts the new roster. Nothing is sent unless the
    /// session actually joins.
    ///
    /// Fails with [`AppError::AlreadyAuthorized`] if the nick is held, or
    /// [`AppError::AuthTimedOut`] if `admit` refuses.
    pub fn subscribe<F>(&self, nick: &str, client: ClientHandle, admit: F) -> Result<(), AppError>
    where
        F: FnOnce() -> bool,
    {
        let mut clients = self.lock();
        if clients.contains_key(nick) {
            return Err(AppError::AlreadyAuthorized);
        }
        if !admit() {
            return Err(AppError::AuthTimedOut);
        }

        send_all(&clients, &format!("User {nick} has entered the chat"));
        info!(session = %client.id, "{} joined ({} online)", nick, clients.len() + 1);
        clients.insert(nick.to_string(), client);
        send_client_list(&clients);
        Ok(())
    }

    /// Remove `nick` if it belongs to session `id`, then broadcast the roster
    ///
    /// Returns whether an entry was removed.
    pub fn unsubscribe(&self, nick: &str, id: SessionId) -> bool {
        let mut clients = self.lock();
        let owned = clients.get(nick).is_some_and(|c| c.id == id);
        if owned {
            clients.remove(nick);
            info!(session = %id, "{} left ({} online)", nick, clients.len());
        }
        send_client_list(&clients);
        owned
    }

    /// Move a session's entry from `old_nick` to `new_nick`
    ///
    /// Does not broadcast the roster; the caller decides when to.
    pub fn rename(
        &self,
        old_nick: &str,
        new_nick: &str,
        client: &ClientHandle,
    ) -> Result<(), AppError> {
        let mut clients = self.lock();
        if old_nick == new_nick {
            return Ok(());
        }
        if clients.contains_key(new_nick) {
            return Err(AppError::NickTaken(new_nick.to_string()));
        }

        if clients.get(old_nick).is_some_and(|c| c.id == client.id) {
            clients.remove(old_nick);
        }
        clients.insert(new_nick.to_string(), client.clone());
        debug!(session = %client.id, "registry key {} -> {}", old_nick, new_nick);
        Ok(())
    }

    /// Send the current roster to every registered session
    pub fn broadcast_client_list(&self) {
        send_client_list(&self.lock());
    }

    /// Deliver literal text to every registered session
    pub fn broadcast_text(&self, text: &str) {
        send_all(&self.lock(), text);
    }

    /// Deliver a command to every registered session
    pub fn broadcast_command(&self, command: &Command) {
        send_all(&self.lock(), &command.to_string());
    }

    /// Deliver a private message from `sender_nick` to `target`
    ///
    /// The sender gets an echo on success, or exactly one `/error` when the
    /// target is not online.
    pub fn route(&self, sender_nick: &str, sender: &ClientHandle, target: &str, body: &str) {
        let clients = self.lock();
        match clients.get(target) {
            Some(receiver) => {
                if let Err(e) = receiver.send(format!("from {sender_nick}: {body}")) {
                    debug!("private message to {} dropped: {}", target, e);
                }
                if let Err(e) = sender.send(format!("to {target}: {body}")) {
                    debug!("private message echo to {} dropped: {}", sender_nick, e);
                }
            }
            None => {
                info!(
                    "User {} tried to message \"{}\" who is not in the chat",
                    sender_nick, target
                );
                let err = AppError::UnknownRecipient(target.to_string());
                if let Err(e) = sender.deliver(&err.into()) {
                    debug!("error notice to {} dropped: {}", sender_nick, e);
                }
            }
        }
    }

    /// Registered nicknames, sorted
    pub fn nicks(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn send_client_list(clients: &Clients) {
    let roster = Command::Clients {
        nicks: clients.keys().cloned().collect(),
    };
    send_all(clients, &roster.to_string());
}

fn send_all(clients: &Clients, line: &str) {
    for (nick, client) in clients {
        if let Err(e) = client.send(line) {
            debug!("broadcast to {} failed: {}", nick, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn client() -> (ClientHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ClientHandle::new(SessionId::new(), tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_subscribe_broadcasts_roster() {
        let registry = Registry::new();
        let (alice, mut alice_rx) = client();
        let (bob, mut bob_rx) = client();

        registry.subscribe("alice", alice, || true).unwrap();
        registry.subscribe("bob", bob, || true).unwrap();

        assert!(registry.is_nick_busy("alice"));
        assert_eq!(registry.nicks(), vec!["alice", "bob"]);
        assert_eq!(
            drain(&mut alice_rx),
            vec![
                "/clients alice",
                "User bob has entered the chat",
                "/clients alice bob"
            ]
        );
        assert_eq!(drain(&mut bob_rx), vec!["/clients alice bob"]);
    }

    #[test]
    fn test_subscribe_rejects_busy_nick() {
        let registry = Registry::new();
        let (first, _first_rx) = client();
        let (second, mut second_rx) = client();

        registry.subscribe("alice", first.clone(), || true).unwrap();

        let mut admitted = false;
        let err = registry
            .subscribe("alice", second, || {
                admitted = true;
                true
            })
            .unwrap_err();

        assert!(matches!(err, AppError::AlreadyAuthorized));
        assert!(!admitted);
        assert_eq!(registry.len(), 1);
        assert!(drain(&mut second_rx).is_empty());
    }

    #[test]
    fn test_refused_admission_sends_nothing() {
        let registry = Registry::new();
        let (alice, mut alice_rx) = client();
        let (bob, mut bob_rx) = client();
        registry.subscribe("alice", alice, || true).unwrap();
        drain(&mut alice_rx);

        let err = registry.subscribe("bob", bob, || false).unwrap_err();

        assert!(matches!(err, AppError::AuthTimedOut));
        assert_eq!(registry.nicks(), vec!["alice"]);
        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn test_unsubscribe_only_removes_own_entry() {
        let registry = Registry::new();
        let (alice, _alice_rx) = client();
        registry.subscribe("alice", alice.clone(), || true).unwrap();

        assert!(!registry.unsubscribe("alice", SessionId::new()));
        assert!(registry.is_nick_busy("alice"));

        assert!(registry.unsubscribe("alice", alice.id));
        assert!(registry.is_empty());
        assert!(!registry.unsubscribe("alice", alice.id));
    }

    #[test]
    fn test_unsubscribe_broadcasts_roster() {
        let registry = Registry::new();
        let (alice, mut alice_rx) = client();
        let (bob, _bob_rx) = client();
        registry.subscribe("alice", alice, || true).unwrap();
        registry.subscribe("bob", bob.clone(), || true).unwrap();
        drain(&mut alice_rx);

        registry.unsubscribe("bob", bob.id);
        assert_eq!(drain(&mut alice_rx), vec!["/clients alice"]);
    }

    #[test]
    fn test_rename_moves_key() {
        let registry = Registry::new();
        let (alice, mut alice_rx) = client();
        registry.subscribe("alice", alice.clone(), || true).unwrap();
        drain(&mut alice_rx);

        registry.rename("alice", "alicia", &alice).unwrap();

        assert_eq!(registry.nicks(), vec!["alicia"]);
        assert!(drain(&mut alice_rx).is_empty());
        registry.broadcast_text("ping");
        assert_eq!(drain(&mut alice_rx), vec!["ping"]);
    }

    #[test]
    fn test_rename_to_taken_nick_fails() {
        let registry = Registry::new();
        let (alice, _alice_rx) = client();
        let (bob, _bob_rx) = client();
        registry.subscribe("alice", alice, || true).unwrap();
        registry.subscribe("bob", bob.clone(), || true).unwrap();

        let err = registry.rename("bob", "alice", &bob).unwrap_err();
        assert!(matches!(err, AppError::NickTaken(_)));
        assert_eq!(registry.nicks(), vec!["alice", "bob"]);

        registry.rename("bob", "bob", &bob).unwrap();
        assert_eq!(registry.nicks(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_route_delivers_and_echoes() {
        let registry = Registry::new();
        let (alice, mut alice_rx) = client();
        let (bob, mut bob_rx) = client();
        registry.subscribe("alice", alice, || true).unwrap();
        registry.subscribe("bob", bob.clone(), || true).unwrap();
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        registry.route("bob", &bob, "alice", "yo");

        assert_eq!(drain(&mut alice_rx), vec!["from bob: yo"]);
        assert_eq!(drain(&mut bob_rx), vec!["to alice: yo"]);
    }

    #[test]
    fn test_route_to_absent_target() {
        let registry = Registry::new();
        let (bob, mut bob_rx) = client();
        registry.subscribe("bob", bob.clone(), || true).unwrap();
        drain(&mut bob_rx);

        registry.route("bob", &bob, "ghost", "anyone?");

        assert_eq!(
            drain(&mut bob_rx),
            vec!["/error There is no user with nick ghost in chat!"]
        );
        assert_eq!(registry.nicks(), vec!["bob"]);
    }

    #[test]
    fn test_broadcast_survives_closed_recipient() {
        let registry = Registry::new();
        let (alice, alice_rx) = client();
        let (bob, mut bob_rx) = client();
        registry.subscribe("alice", alice, || true).unwrap();
        registry.subscribe("bob", bob, || true).unwrap();
        drop(alice_rx);
        drain(&mut bob_rx);

        registry.broadcast_command(&Command::error("maintenance"));
        assert_eq!(drain(&mut bob_rx), vec!["/error maintenance"]);
    }
}
