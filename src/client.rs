//! Outbound handle for a connected client
//!
//! Every session owns exactly one writer task. A [`ClientHandle`] is the
//! cloneable sending side of that task's queue, so any number of brokers
//! can write to a client without interleaving frames.

use tokio::sync::mpsc;

use crate::codec::MAX_FRAME_LENGTH;
use crate::error::SendError;
use crate::message::Command;
use crate::types::SessionId;

/// Sending side of one session's exclusive write path
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Session this handle writes to
    pub id: SessionId,
    /// Server → Client frame queue
    sender: mpsc::UnboundedSender<String>,
}

impl ClientHandle {
    /// Create a handle for the given session and writer queue
    pub fn new(id: SessionId, sender: mpsc::UnboundedSender<String>) -> Self {
        Self { id, sender }
    }

    /// Queue one frame for this client
    ///
    /// Never blocks. Returns an error if the text cannot be framed or the
    /// writer has stopped (client disconnected or write failed).
    pub fn send(&self, text: impl Into<String>) -> Result<(), SendError> {
        let text = text.into();
        if text.len() > MAX_FRAME_LENGTH {
            return Err(SendError::FrameTooLarge(text.len()));
        }
        self.sender.send(text).map_err(|_| SendError::ChannelClosed)
    }

    /// Serialize a command to its wire line and queue it
    pub fn deliver(&self, command: &Command) -> Result<(), SendError> {
        self.send(command.to_string())
    }
}
