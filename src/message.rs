//! Message protocol definitions
//!
//! Line-oriented protocol: a line that starts with a known `/token` and has
//! the right number of space-separated fields is a [`Command`]; everything
//! else is plain chat text.

use std::fmt;

use crate::error::AppError;

pub const AUTH: &str = "/auth";
pub const AUTH_OK: &str = "/authok";
pub const ERROR: &str = "/error";
pub const CLIENTS: &str = "/clients";
pub const NICK: &str = "/nick";
pub const PRIVATE_MESSAGE: &str = "/w";
pub const END: &str = "/end";

/// One protocol line, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Log in with a login and password
    Auth { login: String, password: String },
    /// Login accepted, nickname assigned
    AuthOk { nick: String, login: String },
    /// Human-readable failure notice
    Error { message: String },
    /// Current roster
    Clients { nicks: Vec<String> },
    /// Rename request (echoed back on success)
    Nick { nick: String },
    /// Direct message to one nickname
    PrivateMessage { to: String, body: String },
    /// Graceful disconnect
    End,
    /// Plain chat text (not a command)
    Text(String),
}

impl Command {
    /// Parse a line, falling back to [`Command::Text`].
    pub fn parse(line: &str) -> Self {
        parse_command(line).unwrap_or_else(|| Command::Text(line.to_string()))
    }

    pub fn is_command(&self) -> bool {
        !matches!(self, Command::Text(_))
    }

    /// Shorthand for an `/error` command.
    pub fn error(message: impl Into<String>) -> Self {
        Command::Error {
            message: message.into(),
        }
    }
}

fn parse_command(line: &str) -> Option<Command> {
    let (token, rest) = line.split_once(' ').unwrap_or((line, ""));

    let command = match token {
        AUTH => {
            let [login, password] = words(rest)?;
            Command::Auth { login, password }
        }
        AUTH_OK => {
            let [nick, login] = words(rest)?;
            Command::AuthOk { nick, login }
        }
        ERROR => Command::Error {
            message: non_empty(rest)?,
        },
        CLIENTS => Command::Clients {
            nicks: rest.split_whitespace().map(str::to_string).collect(),
        },
        NICK => {
            let [nick] = words(rest)?;
            Command::Nick { nick }
        }
        PRIVATE_MESSAGE => {
            let (to, body) = rest.split_once(' ')?;
            if to.is_empty() {
                return None;
            }
            Command::PrivateMessage {
                to: to.to_string(),
                body: non_empty(body)?,
            }
        }
        END if rest.trim().is_empty() => Command::End,
        _ => return None,
    };
    Some(command)
}

/// Exactly `N` whitespace-free words.
fn words<const N: usize>(rest: &str) -> Option<[String; N]> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let parts: [&str; N] = parts.try_into().ok()?;
    Some(parts.map(str::to_string))
}

fn non_empty(rest: &str) -> Option<String> {
    (!rest.trim().is_empty()).then(|| rest.to_string())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Auth { login, password } => write!(f, "{AUTH} {login} {password}"),
            Command::AuthOk { nick, login } => write!(f, "{AUTH_OK} {nick} {login}"),
            Command::Error { message } => write!(f, "{ERROR} {message}"),
            Command::Clients { nicks } if nicks.is_empty() => f.write_str(CLIENTS),
            Command::Clients { nicks } => write!(f, "{CLIENTS} {}", nicks.join(" ")),
            Command::Nick { nick } => write!(f, "{NICK} {nick}"),
            Command::PrivateMessage { to, body } => write!(f, "{PRIVATE_MESSAGE} {to} {body}"),
            Command::End => f.write_str(END),
            Command::Text(text) => f.write_str(text),
        }
    }
}

/// Convert AppError to an `/error` command for client notification
impl From<AppError> for Command {
    fn from(err: AppError) -> Self {
        match err {
            AppError::WrongCredentials
            | AppError::AlreadyAuthorized
            | AppError::NickTaken(_)
            | AppError::UnknownRecipient(_) => Command::error(err.to_string()),
            // Fatal errors are not described to the client
            _ => Command::error("Internal error"),
        }
    }
}
