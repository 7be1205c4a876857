//! # Bridge
//!
//! The process-scoped state behind the boundary: one registry per kind of
//! object, the callback router, the pending-response table and the executor
//! that drives engine round trips.
//!
//! ## Philosophy
//!
//! - **Explicit state**: nothing here is a lazily initialized global. A bridge
//!   is built once, fully formed, by [`BridgeBuilder`](crate::builder::BridgeBuilder),
//!   and owns everything it hands out handles for.
//! - **Lookup first**: every verb that takes a handle resolves it before doing
//!   anything else, so an unknown handle is always `InvalidHandle` and never a
//!   half-performed operation.
//! - **No locks across the boundary**: registry lookups return `Arc` clones, so
//!   an engine call or host callback never runs under a registry lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::runtime::Runtime;
use tracing::Instrument;

use crate::adapter::ClientAdapter;
use crate::engine::Engine;
use crate::engine::MessageClient;
use crate::engine::Network;
use crate::engine::NetworkParams;
use crate::error::Result;
use crate::event::OutgoingMessage;
use crate::handle::CallbackToken;
use crate::handle::ClientId;
use crate::handle::NetworkId;
use crate::handle::ResponseId;
use crate::handle::ServerId;
use crate::pending::Outcome;
use crate::pending::PendingTable;
use crate::registry::Registry;
use crate::router::HostRouter;
use crate::router::Router;
use crate::server::RpcServer;
use crate::server::ServerDispatch;

pub struct Bridge {
    engine: Arc<dyn Engine>,
    router: Arc<Router>,
    networks: Registry<NetworkId, dyn Network>,
    clients: Registry<ClientId, dyn MessageClient>,
    servers: Registry<ServerId, RpcServer>,
    responses: PendingTable,
    runtime: Option<Runtime>,
    handle: Handle,
}

impl Bridge {
    pub(crate) fn from_parts(
        engine: Arc<dyn Engine>,
        router: Arc<Router>,
        runtime: Option<Runtime>,
        handle: Handle,
    ) -> Self {
        Self {
            engine,
            responses: PendingTable::new(Arc::clone(&router)),
            router,
            networks: Registry::new(),
            clients: Registry::new(),
            servers: Registry::new(),
            runtime,
            handle,
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Installs the host's router, replacing any previous one.
    pub fn set_router(&self, router: Arc<dyn HostRouter>) {
        self.router.set(router);
    }

    pub fn clear_router(&self) -> Option<Arc<dyn HostRouter>> {
        self.router.clear()
    }

    pub fn responses(&self) -> &PendingTable {
        &self.responses
    }

    // Network instances

    /// Creates network storage. Nothing is loaded and no handle is issued.
    pub fn new_network(&self, params: &NetworkParams) -> Result<()> {
        self.engine.new_network(params)?;
        tracing::debug!(storage = %params.storage_dir, "network storage created");
        Ok(())
    }

    pub fn load_network(&self, storage_dir: &str, password: &[u8], params_json: &[u8]) -> Result<NetworkId> {
        let network = self.engine.load_network(storage_dir, password, params_json)?;
        let engine_id = network.id();
        let id = self.networks.insert(network);
        tracing::debug!(network = %id, engine_id, "network loaded");
        Ok(id)
    }

    /// Closes the engine instance, then retires the handle. If the engine
    /// fails to close, the handle stays valid so the close can be retried.
    ///
    /// Clients and servers created on the network keep their handles; their
    /// engine objects report the closure on use.
    pub fn close_network(&self, id: NetworkId) -> Result<()> {
        self.networks.get(id)?.close()?;
        self.networks.remove(id)?;
        tracing::debug!(network = %id, "network closed");
        Ok(())
    }

    /// The engine's own identifier for the instance.
    pub fn network_engine_id(&self, id: NetworkId) -> Result<i32> {
        Ok(self.networks.get(id)?.id())
    }

    pub fn reception_id(&self, id: NetworkId) -> Result<Vec<u8>> {
        Ok(self.networks.get(id)?.reception_id()?)
    }

    pub fn start_network_follower(&self, id: NetworkId, timeout: Duration) -> Result<()> {
        self.networks.get(id)?.start_follower(timeout)?;
        tracing::debug!(network = %id, "follower started");
        Ok(())
    }

    pub fn stop_network_follower(&self, id: NetworkId) -> Result<()> {
        self.networks.get(id)?.stop_follower()?;
        tracing::debug!(network = %id, "follower stopped");
        Ok(())
    }

    pub fn wait_for_network(&self, id: NetworkId, timeout: Duration) -> Result<bool> {
        Ok(self.networks.get(id)?.wait_for_network(timeout))
    }

    pub fn ready_to_send(&self, id: NetworkId) -> Result<bool> {
        Ok(self.networks.get(id)?.ready_to_send())
    }

    pub fn ekv_get(&self, id: NetworkId, key: &str) -> Result<Vec<u8>> {
        Ok(self.networks.get(id)?.ekv_get(key)?)
    }

    pub fn ekv_set(&self, id: NetworkId, key: &str, value: &[u8]) -> Result<()> {
        self.networks.get(id)?.ekv_set(key, value)?;
        tracing::trace!(network = %id, key, len = value.len(), "ekv set");
        Ok(())
    }

    pub fn make_reception_identity(&self, id: NetworkId) -> Result<Vec<u8>> {
        Ok(self.networks.get(id)?.make_reception_identity()?)
    }

    /// Saves `identity` under `key` in the network's encrypted store.
    pub fn store_reception_identity(&self, id: NetworkId, key: &str, identity: &[u8]) -> Result<()> {
        self.networks.get(id)?.store_reception_identity(key, identity)?;
        tracing::debug!(network = %id, key, "reception identity stored");
        Ok(())
    }

    pub fn load_reception_identity(&self, id: NetworkId, key: &str) -> Result<Vec<u8>> {
        Ok(self.networks.get(id)?.load_reception_identity(key)?)
    }

    pub fn generate_reception_id(&self, id: NetworkId) -> Result<Vec<u8>> {
        Ok(self.networks.get(id)?.generate_reception_id()?)
    }

    pub fn generate_random_key(&self, id: NetworkId) -> Result<Vec<u8>> {
        Ok(self.networks.get(id)?.generate_random_key()?)
    }

    pub fn derive_public_key(&self, private_key: &[u8]) -> Result<Vec<u8>> {
        Ok(self.engine.derive_public_key(private_key)?)
    }

    pub fn engine_git_version(&self) -> String {
        self.engine.git_version()
    }

    pub fn engine_dependencies(&self) -> String {
        self.engine.dependencies()
    }

    // Message clients

    /// Creates a message client on `network`.
    ///
    /// The handle is reserved before the engine sees the client, so the
    /// adapter can tag events the engine raises during creation. A failed
    /// creation leaves the reserved handle unused.
    pub fn new_client(&self, network: NetworkId, identity: &[u8], passphrase: &str) -> Result<ClientId> {
        let net = self.networks.get(network)?;
        let id = self.clients.reserve();
        let adapter = Arc::new(ClientAdapter::new(id, Arc::clone(&self.router)));

        let client = net.new_client(identity, passphrase, adapter)?;
        self.clients.fill(id, client);
        tracing::debug!(%network, client = %id, "client created");
        Ok(id)
    }

    pub fn client_token(&self, id: ClientId) -> Result<i32> {
        Ok(self.clients.get(id)?.token())
    }

    pub fn client_public_key(&self, id: ClientId) -> Result<Vec<u8>> {
        Ok(self.clients.get(id)?.public_key())
    }

    /// Sends a direct message and returns the engine's send report.
    pub fn send(&self, id: ClientId, message: &OutgoingMessage) -> Result<Vec<u8>> {
        let client = self.clients.get(id)?;
        let span = tracing::debug_span!("send", client = %id, body = message.body.name());
        let _enter = span.enter();
        Ok(client.send(message)?)
    }

    /// Closes the engine client, then retires its handle. A failed close
    /// leaves the handle valid.
    pub fn close_client(&self, id: ClientId) -> Result<()> {
        self.clients.get(id)?.close()?;
        self.clients.remove(id)?;
        tracing::debug!(client = %id, "client closed");
        Ok(())
    }

    // Request/response

    /// Sends an RPC request through `network` and returns its response handle
    /// at once. The round trip runs on the bridge's executor.
    pub fn rpc_send(&self, network: NetworkId, recipient: &[u8], pubkey: &[u8], request: &[u8]) -> Result<ResponseId> {
        let net = self.networks.get(network)?;
        let (id, resolver) = self.responses.issue();

        let recipient = recipient.to_vec();
        let pubkey = pubkey.to_vec();
        let request = request.to_vec();
        let span = tracing::debug_span!("rpc_send", %network, response = %id);

        self.handle.spawn(
            async move {
                let result = net.rpc_send(recipient, pubkey, request).await;
                if let Err(e) = &result {
                    tracing::debug!("request failed: {}", e);
                }
                resolver.complete(result);
            }
            .instrument(span),
        );
        Ok(id)
    }

    /// Blocks the calling thread until the response is known. A failed
    /// response yields an empty buffer.
    ///
    /// Must not be called from a thread that drives the bridge's executor.
    pub fn await_response(&self, id: ResponseId) -> Result<Vec<u8>> {
        self.responses.await_blocking(id)
    }

    /// Blocking wait that keeps the failure text.
    pub fn response_outcome(&self, id: ResponseId) -> Result<Outcome> {
        self.responses.await_outcome(id)
    }

    /// Async wait for callers already running on an executor.
    pub async fn response(&self, id: ResponseId) -> Result<Outcome> {
        let entry = self.responses.get(id)?;
        Ok(entry.outcome().await)
    }

    pub fn push_on_ready(&self, id: ResponseId, token: CallbackToken) -> Result<()> {
        self.responses.push_on_ready(id, token)
    }

    pub fn release_response(&self, id: ResponseId) -> Result<()> {
        self.responses.release(id)
    }

    // RPC servers

    /// Creates a stopped RPC server. Requests it receives once started go to
    /// the router's `rpc_server_request` slot tagged with `token`.
    pub fn new_rpc_server(
        &self,
        network: NetworkId,
        token: CallbackToken,
        reception_id: &[u8],
        private_key: &[u8],
    ) -> Result<ServerId> {
        let net = self.networks.get(network)?;
        let id = self.servers.reserve();
        let dispatch = Arc::new(ServerDispatch::new(id, token, Arc::clone(&self.router)));

        let endpoint = net.new_rpc_server(dispatch.clone(), reception_id, private_key)?;
        self.servers.fill(id, Arc::new(RpcServer::new(&dispatch, endpoint)));
        tracing::debug!(%network, server = %id, "rpc server created");
        Ok(id)
    }

    /// Reloads the RPC server stored by `network`.
    pub fn load_rpc_server(&self, network: NetworkId, token: CallbackToken) -> Result<ServerId> {
        let net = self.networks.get(network)?;
        let id = self.servers.reserve();
        let dispatch = Arc::new(ServerDispatch::new(id, token, Arc::clone(&self.router)));

        let endpoint = net.load_rpc_server(dispatch.clone())?;
        self.servers.fill(id, Arc::new(RpcServer::new(&dispatch, endpoint)));
        tracing::debug!(%network, server = %id, "rpc server loaded");
        Ok(id)
    }

    pub fn start_server(&self, id: ServerId) -> Result<()> {
        self.servers.get(id)?.start();
        Ok(())
    }

    /// Stops dispatching. Requests already handed to the host complete.
    pub fn stop_server(&self, id: ServerId) -> Result<()> {
        self.servers.get(id)?.stop();
        Ok(())
    }

    pub fn server_running(&self, id: ServerId) -> Result<bool> {
        Ok(self.servers.get(id)?.is_running())
    }

    /// Stops the server and retires its handle.
    pub fn close_rpc_server(&self, id: ServerId) -> Result<()> {
        let server = self.servers.remove(id)?;
        server.stop();
        tracing::debug!(server = %id, "rpc server closed");
        Ok(())
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        // An owned runtime may be dropped from inside another runtime.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
