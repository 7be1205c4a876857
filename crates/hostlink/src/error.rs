//! # Error Definitions
//!
//! Every failure the bridge reports to its caller. None of these abort the
//! process; they are returned as values or recorded as the terminal state of a
//! pending response.

use crate::engine;
use crate::handle::Handle;
use crate::handle::Kind;
use crate::handle::ServerId;
use crate::router::Slot;

#[derive(Debug, Clone)]
pub enum Error {
    /// The handle was never issued for this kind, or it has been removed.
    InvalidHandle { kind: Kind, handle: i32 },
    /// No router is installed, or the installed router leaves this slot empty.
    RouterNotConfigured(Slot),
    /// The network engine reported a failure for a well-formed request.
    Upstream(engine::Error),
    /// A request reached a server that is not running.
    ServerStopped(ServerId),
    /// The executor backing asynchronous round trips could not be built.
    Runtime(String),
}

impl Error {
    /// Builds an `InvalidHandle` error for any handle type.
    pub fn invalid<H: Handle>(handle: H) -> Self {
        Self::InvalidHandle {
            kind: H::KIND,
            handle: handle.raw(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHandle { kind, handle } => write!(f, "invalid {} handle: {}", kind, handle),
            Self::RouterNotConfigured(slot) => write!(f, "router not configured for slot `{}`", slot),
            Self::Upstream(e) => write!(f, "upstream failure: {}", e),
            Self::ServerStopped(id) => write!(f, "{} is not running", id),
            Self::Runtime(msg) => write!(f, "runtime error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Upstream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<engine::Error> for Error {
    fn from(e: engine::Error) -> Self {
        Self::Upstream(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
