//! Error types for the chat server
//!
//! Defines application-level errors, credential store errors and
//! outbound send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (startup failure, session termination) and
/// business errors (reported to the client as an `/error` command).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Credential store failure
    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid startup configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No user matches the given login and password
    #[error("Wrong login and password")]
    WrongCredentials,

    /// The nickname bound to the login is already online
    #[error("User is already authorized")]
    AlreadyAuthorized,

    /// Another session holds the requested nickname
    #[error("Nick {0} is already taken")]
    NickTaken(String),

    /// Private message target is not online
    #[error("There is no user with nick {0} in chat!")]
    UnknownRecipient(String),

    /// The authentication window closed before login completed
    #[error("Authentication window expired")]
    AuthTimedOut,
}

/// Credential store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the user file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The user file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No record exists for the login
    #[error("Unknown login: {0}")]
    UnknownLogin(String),
}

/// Message send errors
///
/// Occurs when a message cannot be framed or the session's writer is gone.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The text does not fit in one frame
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),
}
