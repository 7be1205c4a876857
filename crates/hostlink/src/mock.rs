//! In-memory engine for tests.
//!
//! `MockEngine` keeps every network, client and endpoint it creates so a test
//! can reach behind the bridge: inject inbound events through a client's sink,
//! deliver requests to an endpoint, or hold RPC sends until the test lets them
//! through.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::engine;
use crate::engine::Engine;
use crate::engine::EventSink;
use crate::engine::MessageClient;
use crate::engine::Network;
use crate::engine::NetworkParams;
use crate::engine::RequestHandler;
use crate::engine::RpcEndpoint;
use crate::event::OutgoingMessage;

/// Produces the reply to an RPC send from `(recipient, request)`.
pub type Responder = Arc<dyn Fn(&[u8], &[u8]) -> engine::Result<Vec<u8>> + Send + Sync>;

/// Key-value contents of one storage directory, shared by every network
/// loaded from it.
type Store = Arc<Mutex<HashMap<String, Vec<u8>>>>;

pub const GIT_VERSION: &str = "mock-0000000";

pub const DEPENDENCIES: &str = "hostlink-mock";

/// Scriptable engine. By default every RPC send is answered with its own
/// request bytes.
pub struct MockEngine {
    storage: Mutex<HashMap<String, Store>>,
    networks: Mutex<Vec<Arc<MockNetwork>>>,
    next_id: Arc<AtomicI32>,
    responder: Responder,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            storage: Mutex::new(HashMap::new()),
            networks: Mutex::new(Vec::new()),
            next_id: Arc::new(AtomicI32::new(100)),
            responder: Arc::new(echo),
            delay: None,
            gate: None,
        }
    }

    /// Replaces the RPC responder.
    pub fn responder(mut self, f: impl Fn(&[u8], &[u8]) -> engine::Result<Vec<u8>> + Send + Sync + 'static) -> Self {
        self.responder = Arc::new(f);
        self
    }

    /// Delays every RPC reply.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Holds every RPC send until [`open_gate`](Self::open_gate) lets it pass.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Lets `n` held sends complete.
    pub fn open_gate(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Marks `storage_dir` as initialized so it can be loaded.
    pub fn with_storage(self, storage_dir: impl Into<String>) -> Self {
        self.storage.lock().entry(storage_dir.into()).or_default();
        self
    }

    /// Networks loaded so far, oldest first.
    pub fn networks(&self) -> Vec<Arc<MockNetwork>> {
        self.networks.lock().clone()
    }

    pub fn last_network(&self) -> Option<Arc<MockNetwork>> {
        self.networks.lock().last().cloned()
    }
}

fn identity_key(key: &str) -> String {
    format!("identity/{}", key)
}

fn echo(_recipient: &[u8], request: &[u8]) -> engine::Result<Vec<u8>> {
    Ok(request.to_vec())
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MockEngine {
    fn new_network(&self, params: &NetworkParams) -> engine::Result<()> {
        if params.ndf_json.is_empty() {
            return Err(engine::Error::Upstream("empty network definition".into()));
        }
        self.storage.lock().entry(params.storage_dir.clone()).or_default();
        Ok(())
    }

    fn load_network(&self, storage_dir: &str, _password: &[u8], _params_json: &[u8]) -> engine::Result<Arc<dyn Network>> {
        let store = self
            .storage
            .lock()
            .get(storage_dir)
            .cloned()
            .ok_or_else(|| engine::Error::Upstream(format!("no storage at {}", storage_dir)))?;

        let network = Arc::new(MockNetwork {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            next_id: Arc::clone(&self.next_id),
            following: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            store,
            clients: Mutex::new(Vec::new()),
            endpoints: Mutex::new(Vec::new()),
            responder: Arc::clone(&self.responder),
            delay: self.delay,
            gate: self.gate.clone(),
        });
        self.networks.lock().push(Arc::clone(&network));
        Ok(network)
    }

    fn derive_public_key(&self, private_key: &[u8]) -> engine::Result<Vec<u8>> {
        if private_key.is_empty() {
            return Err(engine::Error::Upstream("empty private key".into()));
        }
        Ok(private_key.iter().rev().map(|b| b ^ 0xff).collect())
    }

    fn git_version(&self) -> String {
        GIT_VERSION.into()
    }

    fn dependencies(&self) -> String {
        DEPENDENCIES.into()
    }
}

/// A loaded mock network.
pub struct MockNetwork {
    id: i32,
    next_id: Arc<AtomicI32>,
    following: AtomicBool,
    closed: AtomicBool,
    store: Store,
    clients: Mutex<Vec<Arc<MockClient>>>,
    endpoints: Mutex<Vec<Arc<MockEndpoint>>>,
    responder: Responder,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
}

impl MockNetwork {
    fn check_open(&self) -> engine::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(engine::Error::Closed);
        }
        Ok(())
    }

    fn next_bytes(&self, prefix: &str) -> Vec<u8> {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst)).into_bytes()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn clients(&self) -> Vec<Arc<MockClient>> {
        self.clients.lock().clone()
    }

    pub fn endpoints(&self) -> Vec<Arc<MockEndpoint>> {
        self.endpoints.lock().clone()
    }

    pub fn last_endpoint(&self) -> Option<Arc<MockEndpoint>> {
        self.endpoints.lock().last().cloned()
    }
}

#[async_trait::async_trait]
impl Network for MockNetwork {
    fn id(&self) -> i32 {
        self.id
    }

    fn reception_id(&self) -> engine::Result<Vec<u8>> {
        self.check_open()?;
        Ok(format!("reception-{}", self.id).into_bytes())
    }

    fn start_follower(&self, _timeout: Duration) -> engine::Result<()> {
        self.check_open()?;
        self.following.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_follower(&self) -> engine::Result<()> {
        if !self.following.swap(false, Ordering::SeqCst) {
            return Err(engine::Error::Upstream("follower not running".into()));
        }
        Ok(())
    }

    fn wait_for_network(&self, _timeout: Duration) -> bool {
        self.following.load(Ordering::SeqCst)
    }

    fn ready_to_send(&self) -> bool {
        self.following.load(Ordering::SeqCst) && !self.is_closed()
    }

    fn ekv_get(&self, key: &str) -> engine::Result<Vec<u8>> {
        self.check_open()?;
        self.store
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| engine::Error::Upstream(format!("no value for key {}", key)))
    }

    fn ekv_set(&self, key: &str, value: &[u8]) -> engine::Result<()> {
        self.check_open()?;
        self.store.lock().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn make_reception_identity(&self) -> engine::Result<Vec<u8>> {
        self.check_open()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{{\"id\":\"reception-{}\",\"key\":\"key-{}\"}}", n, n).into_bytes())
    }

    fn store_reception_identity(&self, key: &str, identity: &[u8]) -> engine::Result<()> {
        if identity.is_empty() {
            return Err(engine::Error::Upstream("empty reception identity".into()));
        }
        self.ekv_set(&identity_key(key), identity)
    }

    fn load_reception_identity(&self, key: &str) -> engine::Result<Vec<u8>> {
        self.ekv_get(&identity_key(key))
    }

    fn new_client(&self, identity: &[u8], _passphrase: &str, sink: Arc<dyn EventSink>) -> engine::Result<Arc<dyn MessageClient>> {
        self.check_open()?;
        if identity.is_empty() {
            return Err(engine::Error::Upstream("empty identity".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let client = Arc::new(MockClient {
            id,
            token: id.wrapping_mul(7),
            public_key: identity.iter().rev().copied().collect(),
            sink,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.clients.lock().push(Arc::clone(&client));
        Ok(client)
    }

    async fn rpc_send(&self, recipient: Vec<u8>, _pubkey: Vec<u8>, request: Vec<u8>) -> engine::Result<Vec<u8>> {
        self.check_open()?;

        if let Some(gate) = &self.gate {
            gate.acquire().await.map_err(|_| engine::Error::Closed)?.forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.responder)(recipient.as_slice(), request.as_slice())
    }

    fn generate_reception_id(&self) -> engine::Result<Vec<u8>> {
        self.check_open()?;
        Ok(self.next_bytes("reception"))
    }

    fn generate_random_key(&self) -> engine::Result<Vec<u8>> {
        self.check_open()?;
        Ok(self.next_bytes("key"))
    }

    fn new_rpc_server(
        &self,
        handler: Arc<dyn RequestHandler>,
        reception_id: &[u8],
        private_key: &[u8],
    ) -> engine::Result<Arc<dyn RpcEndpoint>> {
        self.check_open()?;
        let endpoint = Arc::new(MockEndpoint {
            handler,
            reception_id: reception_id.to_vec(),
            private_key: private_key.to_vec(),
            started: AtomicBool::new(false),
        });
        self.endpoints.lock().push(Arc::clone(&endpoint));
        Ok(endpoint)
    }

    fn load_rpc_server(&self, handler: Arc<dyn RequestHandler>) -> engine::Result<Arc<dyn RpcEndpoint>> {
        self.check_open()?;
        let (reception_id, private_key) = {
            let endpoints = self.endpoints.lock();
            let stored = endpoints
                .first()
                .ok_or_else(|| engine::Error::Upstream("no stored rpc server".into()))?;
            (stored.reception_id.clone(), stored.private_key.clone())
        };
        self.new_rpc_server(handler, &reception_id, &private_key)
    }

    fn close(&self) -> engine::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(engine::Error::Closed);
        }
        self.following.store(false, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.close();
        }
        Ok(())
    }
}

/// A mock direct-message client. Keeps its event sink so tests can play the
/// engine and raise inbound events.
pub struct MockClient {
    id: i32,
    token: i32,
    public_key: Vec<u8>,
    sink: Arc<dyn EventSink>,
    sent: Mutex<Vec<OutgoingMessage>>,
    closed: AtomicBool,
}

impl MockClient {
    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.sink)
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MessageClient for MockClient {
    fn id(&self) -> i32 {
        self.id
    }

    fn token(&self) -> i32 {
        self.token
    }

    fn public_key(&self) -> Vec<u8> {
        self.public_key.clone()
    }

    fn send(&self, message: &OutgoingMessage) -> engine::Result<Vec<u8>> {
        if self.is_closed() {
            return Err(engine::Error::Closed);
        }
        let mut sent = self.sent.lock();
        sent.push(message.clone());
        Ok(format!("{{\"kind\":\"{}\",\"round\":{}}}", message.body.name(), sent.len()).into_bytes())
    }

    fn close(&self) -> engine::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(engine::Error::Closed);
        }
        Ok(())
    }
}

/// A mock RPC endpoint. [`deliver`](Self::deliver) plays an inbound request.
pub struct MockEndpoint {
    handler: Arc<dyn RequestHandler>,
    reception_id: Vec<u8>,
    private_key: Vec<u8>,
    started: AtomicBool,
}

impl MockEndpoint {
    /// Hands a request to the bridge, as the engine would on its own thread.
    pub fn deliver(&self, sender: &[u8], request: &[u8]) -> engine::Result<Vec<u8>> {
        self.handler.serve(sender, request)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn reception_id(&self) -> &[u8] {
        &self.reception_id
    }
}

impl RpcEndpoint for MockEndpoint {
    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }
}
