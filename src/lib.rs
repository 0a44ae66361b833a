//! Multi-user TCP Chat Server Library
//!
//! Clients connect over TCP, log in with a login and password, then chat
//! in a single global room under a nickname they can change.
//!
//! # Features
//! - Length-prefixed text frames over TCP
//! - Login against a credential store, with a fixed authentication window
//! - Unique nicknames, renaming with persistence
//! - Broadcast chat and private messages
//! - Roster updates on join, leave and rename
//!
//! # Architecture
//! - `Registry` is the one shared table of nickname → client handle, behind
//!   a single lock
//! - Each connection runs a `Session` task plus a writer task that owns the
//!   socket's write half
//! - An `AuthTimer` races the login path on an atomic one-shot guard
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use lobby_chat::{ChatServer, Config, UserStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let store = Arc::new(UserStore::open(&config.users_file).await.unwrap());
//!     let server = ChatServer::bind(&config, store).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod timer;
pub mod types;

// Re-export main types for convenience
pub use auth::{CredentialStore, UserRecord, UserStore};
pub use client::ClientHandle;
pub use codec::FrameCodec;
pub use config::Config;
pub use error::{AppError, SendError, StoreError};
pub use message::Command;
pub use registry::Registry;
pub use server::ChatServer;
pub use session::{Session, SessionContext};
pub use timer::{AuthGuard, AuthTimer};
pub use types::SessionId;
