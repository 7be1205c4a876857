//! # Handles
//!
//! Objects that live on this side of the boundary are named on the other side
//! by small integers. Each kind of object gets its own strong type so a client
//! handle can never be passed where a server handle is expected, even though
//! both are plain `i32` on the wire.

use std::fmt;
use std::hash::Hash;

/// The category of object a handle refers to.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Kind {
    NetworkInstance,
    MessageClient,
    RpcResponse,
    RpcServer,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkInstance => write!(f, "network instance"),
            Self::MessageClient => write!(f, "message client"),
            Self::RpcResponse => write!(f, "rpc response"),
            Self::RpcServer => write!(f, "rpc server"),
        }
    }
}

/// Common surface of every handle type.
///
/// Handles are allocated by a [`Registry`](crate::registry::Registry) from a
/// per-kind counter; `from_raw` exists for the boundary, where the host hands
/// back the integer it was given earlier.
pub trait Handle: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    const KIND: Kind;

    fn from_raw(raw: i32) -> Self;
    fn raw(self) -> i32;
}

/// Strong type for network instance handles.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NetworkId(pub i32);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network-{}", self.0)
    }
}

impl Handle for NetworkId {
    const KIND: Kind = Kind::NetworkInstance;

    fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    fn raw(self) -> i32 {
        self.0
    }
}

/// Strong type for message client handles.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClientId(pub i32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

impl Handle for ClientId {
    const KIND: Kind = Kind::MessageClient;

    fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    fn raw(self) -> i32 {
        self.0
    }
}

/// Strong type for in-flight RPC response handles.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResponseId(pub i32);

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "response-{}", self.0)
    }
}

impl Handle for ResponseId {
    const KIND: Kind = Kind::RpcResponse;

    fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    fn raw(self) -> i32 {
        self.0
    }
}

/// Strong type for RPC server handles.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerId(pub i32);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server-{}", self.0)
    }
}

impl Handle for ServerId {
    const KIND: Kind = Kind::RpcServer;

    fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    fn raw(self) -> i32 {
        self.0
    }
}

/// Opaque value supplied by the host and echoed back on push deliveries.
///
/// The bridge never dereferences it. On the C side it is usually a pointer to
/// a host object, which is why it is pointer-sized.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct CallbackToken(pub usize);

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token-{:#x}", self.0)
    }
}
