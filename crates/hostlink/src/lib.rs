//! # hostlink
//!
//! Lets a foreign host hold long-lived network objects by integer handle,
//! receive their inbound events through one process-wide router, and collect
//! RPC replies either by blocking or by push.
//!
//! [`Bridge`] is the entry point; build one with [`BridgeBuilder`].

pub mod adapter;
pub mod bridge;
pub mod builder;
pub mod engine;
pub mod error;
pub mod event;
pub mod handle;
pub mod logging;
pub mod mock;
pub mod pending;
pub mod registry;
pub mod router;
pub mod server;

pub use bridge::Bridge;
pub use builder::BridgeBuilder;
pub use error::Error;
pub use error::Result;
