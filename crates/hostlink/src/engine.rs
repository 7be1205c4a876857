//! # Network Engine Abstraction
//!
//! The engine is the external library that actually talks to the network. The
//! bridge only needs its object identity and a handful of verbs, which are
//! described here.
//!
//! ## Philosophy
//!
//! - **Opaque**: the bridge never inspects identities, keys or payloads. It
//!   moves bytes between the engine and the host.
//! - **Push-driven**: inbound traffic arrives on engine-owned threads through
//!   [`EventSink`] and [`RequestHandler`], which the bridge implements.
//! - **Object-safe**: every trait is used as `Arc<dyn _>`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::event::Message;
use crate::event::OutgoingMessage;
use crate::event::ReactionMessage;
use crate::event::ReplyMessage;
use crate::event::SentStatus;
use crate::event::TextMessage;

/// Failures reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The engine rejected or failed the operation.
    Upstream(String),
    /// The object was closed.
    Closed,
    /// The operation did not complete in time.
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream(msg) => write!(f, "{}", msg),
            Self::Closed => write!(f, "object closed"),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Parameters for creating new network storage.
#[derive(Clone, Debug, Default)]
pub struct NetworkParams {
    pub ndf_json: String,
    pub storage_dir: String,
    pub password: Vec<u8>,
    pub registration_code: String,
}

/// Entry point of the engine: creates and loads network instances.
pub trait Engine: Send + Sync + 'static {
    /// Creates user storage, generates keys and registers with the network.
    fn new_network(&self, params: &NetworkParams) -> Result<()>;

    /// Loads existing storage and starts the engine's background machinery.
    fn load_network(&self, storage_dir: &str, password: &[u8], params_json: &[u8]) -> Result<Arc<dyn Network>>;

    /// Derives the public half of an RPC private key.
    fn derive_public_key(&self, private_key: &[u8]) -> Result<Vec<u8>>;

    /// Source revision the engine was built from.
    fn git_version(&self) -> String;

    /// The engine's own dependency list, as it reports it.
    fn dependencies(&self) -> String;
}

/// A loaded network instance.
#[async_trait::async_trait]
pub trait Network: Send + Sync + 'static {
    /// The engine's own identifier for this instance.
    fn id(&self) -> i32;

    fn reception_id(&self) -> Result<Vec<u8>>;

    fn start_follower(&self, timeout: Duration) -> Result<()>;

    fn stop_follower(&self) -> Result<()>;

    /// Blocks until the network is healthy or `timeout` passes.
    fn wait_for_network(&self, timeout: Duration) -> bool;

    fn ready_to_send(&self) -> bool;

    /// Reads `key` from the instance's encrypted key-value store.
    fn ekv_get(&self, key: &str) -> Result<Vec<u8>>;

    fn ekv_set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Generates a fresh reception identity, serialized by the engine.
    fn make_reception_identity(&self) -> Result<Vec<u8>>;

    fn store_reception_identity(&self, key: &str, identity: &[u8]) -> Result<()>;

    fn load_reception_identity(&self, key: &str) -> Result<Vec<u8>>;

    /// Creates a direct-message client whose inbound traffic goes to `sink`.
    fn new_client(&self, identity: &[u8], passphrase: &str, sink: Arc<dyn EventSink>) -> Result<Arc<dyn MessageClient>>;

    /// Sends one RPC request and resolves with the remote reply.
    ///
    /// Must not interpret the payload.
    async fn rpc_send(&self, recipient: Vec<u8>, pubkey: Vec<u8>, request: Vec<u8>) -> Result<Vec<u8>>;

    fn generate_reception_id(&self) -> Result<Vec<u8>>;

    fn generate_random_key(&self) -> Result<Vec<u8>>;

    /// Creates an RPC endpoint whose requests are answered by `handler`.
    fn new_rpc_server(
        &self,
        handler: Arc<dyn RequestHandler>,
        reception_id: &[u8],
        private_key: &[u8],
    ) -> Result<Arc<dyn RpcEndpoint>>;

    /// Reloads a previously created RPC endpoint from storage.
    fn load_rpc_server(&self, handler: Arc<dyn RequestHandler>) -> Result<Arc<dyn RpcEndpoint>>;

    fn close(&self) -> Result<()>;
}

/// A direct-message client owned by the engine.
pub trait MessageClient: Send + Sync + 'static {
    /// The engine's own identifier for this client.
    fn id(&self) -> i32;

    fn token(&self) -> i32;

    fn public_key(&self) -> Vec<u8>;

    /// Sends a message and returns the engine's send report.
    fn send(&self, message: &OutgoingMessage) -> Result<Vec<u8>>;

    fn close(&self) -> Result<()>;
}

/// Receiver of a client's inbound traffic, implemented by the bridge.
///
/// Called from engine threads. Implementations never fail; a value that
/// cannot be produced is reported as zero, false or empty.
pub trait EventSink: Send + Sync + 'static {
    fn receive(&self, message: Message) -> i64;

    fn receive_text(&self, message: TextMessage) -> i64;

    fn receive_reply(&self, message: ReplyMessage) -> i64;

    fn receive_reaction(&self, message: ReactionMessage) -> i64;

    fn update_sent_status(&self, status: SentStatus);

    fn block_sender(&self, pubkey: &[u8]);

    fn unblock_sender(&self, pubkey: &[u8]);

    fn get_conversation(&self, sender_key: &[u8]) -> Vec<u8>;

    fn get_conversations(&self) -> Vec<u8>;

    fn delete_message(&self, message_id: &[u8], pubkey: &[u8]) -> bool;

    fn event_update(&self, event_type: i64, json: &[u8]);
}

/// Answers inbound RPC requests, implemented by the bridge.
pub trait RequestHandler: Send + Sync + 'static {
    fn serve(&self, sender: &[u8], request: &[u8]) -> Result<Vec<u8>>;
}

/// An engine-side RPC endpoint.
pub trait RpcEndpoint: Send + Sync + 'static {
    fn start(&self);

    fn stop(&self);
}
