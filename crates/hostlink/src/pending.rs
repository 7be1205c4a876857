//! # Pending responses
//!
//! An RPC request is answered long after the call that issued it returns. The
//! caller gets a `ResponseId` straight away, and the engine gets a `Resolver`
//! that completes the entry when the reply (or an error) arrives.
//!
//! The result can be collected three ways, in any combination and from any
//! thread:
//!
//! - **Blocking**: `PendingResponse::wait` parks the calling thread on a
//!   condition variable until the entry leaves `Pending`.
//! - **Async**: `PendingResponse::outcome` awaits the same transition.
//! - **Push**: `PendingTable::push_on_ready` delivers the outcome to the
//!   host's `rpc_response` or `rpc_error` slot.
//!
//! ## Invariants
//!
//! - An entry transitions exactly once: `Pending -> Resolved | Failed`. Later
//!   completions are ignored.
//! - Every reader gets its own copy of the payload.
//! - Listeners and host slots are invoked after the entry lock is released.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::engine;
use crate::error::Result;
use crate::handle::CallbackToken;
use crate::handle::ResponseId;
use crate::registry::Registry;
use crate::router::Router;
use crate::router::Slot;

/// Error text recorded when the engine drops a request without answering it.
pub const ABANDONED: &str = "response abandoned";

/// Terminal state of a pending response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Resolved(Vec<u8>),
    Failed(String),
}

impl Outcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// The resolved bytes, or an empty buffer for a failure.
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Self::Resolved(bytes) => bytes,
            Self::Failed(_) => Vec::new(),
        }
    }
}

impl From<engine::Result<Vec<u8>>> for Outcome {
    fn from(result: engine::Result<Vec<u8>>) -> Self {
        match result {
            Ok(bytes) => Self::Resolved(bytes),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

type Listener = Box<dyn FnOnce(&Outcome) + Send>;

struct State {
    outcome: Option<Outcome>,
    listeners: Vec<Listener>,
}

/// A single in-flight response.
pub struct PendingResponse {
    id: ResponseId,
    state: Mutex<State>,
    ready: Condvar,
    notify: Notify,
}

impl PendingResponse {
    fn new(id: ResponseId) -> Self {
        Self {
            id,
            state: Mutex::new(State {
                outcome: None,
                listeners: Vec::new(),
            }),
            ready: Condvar::new(),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> ResponseId {
        self.id
    }

    /// A copy of the outcome, if the entry is terminal.
    pub fn peek(&self) -> Option<Outcome> {
        self.state.lock().outcome.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().outcome.is_none()
    }

    /// Moves the entry to its terminal state. Returns false if it already was
    /// terminal, in which case nothing changes.
    pub(crate) fn complete(&self, outcome: Outcome) -> bool {
        let listeners = {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.listeners)
        };

        tracing::debug!(response = %self.id, resolved = outcome.is_resolved(), "response completed");
        self.ready.notify_all();
        self.notify.notify_waiters();

        for listener in listeners {
            listener(&outcome);
        }
        true
    }

    /// Blocks the calling thread until the entry is terminal.
    pub fn wait(&self) -> Outcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.ready.wait(&mut state);
        }
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return Some(outcome.clone());
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return state.outcome.clone();
            }
        }
    }

    /// Waits for the entry to become terminal without blocking the thread.
    pub async fn outcome(&self) -> Outcome {
        loop {
            // Register interest before checking, so a completion landing in
            // between still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.peek() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Runs `listener` once the entry is terminal. If it already is, the
    /// listener runs immediately on the calling thread.
    pub fn on_ready(&self, listener: impl FnOnce(&Outcome) + Send + 'static) {
        let mut state = self.state.lock();
        if let Some(outcome) = state.outcome.clone() {
            drop(state);
            listener(&outcome);
            return;
        }
        state.listeners.push(Box::new(listener));
    }
}

/// Engine-side completion handle for one pending response.
///
/// Consumed by `resolve`, `fail` or `complete`, so an entry can only be
/// completed once through it. Dropping it unused fails the entry with
/// [`ABANDONED`].
pub struct Resolver {
    entry: Option<Arc<PendingResponse>>,
}

impl Resolver {
    fn new(entry: Arc<PendingResponse>) -> Self {
        Self { entry: Some(entry) }
    }

    pub fn id(&self) -> Option<ResponseId> {
        self.entry.as_ref().map(|e| e.id())
    }

    pub fn resolve(self, payload: Vec<u8>) {
        self.complete(Ok(payload));
    }

    pub fn fail(self, message: impl Into<String>) {
        self.complete(Err(engine::Error::Upstream(message.into())));
    }

    pub fn complete(mut self, result: engine::Result<Vec<u8>>) {
        if let Some(entry) = self.entry.take() {
            entry.complete(Outcome::from(result));
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            if entry.complete(Outcome::Failed(ABANDONED.into())) {
                tracing::warn!(response = %entry.id(), "resolver dropped without an answer");
            }
        }
    }
}

/// Correlates response handles with their eventual outcomes.
pub struct PendingTable {
    entries: Registry<ResponseId, PendingResponse>,
    router: Arc<Router>,
}

impl PendingTable {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            entries: Registry::new(),
            router,
        }
    }

    /// Registers a new pending entry. The handle goes to the caller, the
    /// resolver to whoever will produce the answer.
    pub fn issue(&self) -> (ResponseId, Resolver) {
        let id = self.entries.reserve();
        let entry = Arc::new(PendingResponse::new(id));
        self.entries.fill(id, Arc::clone(&entry));
        tracing::debug!(response = %id, "response issued");
        (id, Resolver::new(entry))
    }

    pub fn get(&self, id: ResponseId) -> Result<Arc<PendingResponse>> {
        self.entries.get(id)
    }

    /// Blocks until the response is terminal and returns its payload; a
    /// failed response yields an empty buffer.
    pub fn await_blocking(&self, id: ResponseId) -> Result<Vec<u8>> {
        let entry = self.get(id)?;
        Ok(entry.wait().into_payload())
    }

    /// Blocks until the response is terminal and returns the full outcome.
    pub fn await_outcome(&self, id: ResponseId) -> Result<Outcome> {
        let entry = self.get(id)?;
        Ok(entry.wait())
    }

    /// Delivers the outcome to the host through `rpc_response` or `rpc_error`
    /// once it is known, tagged with `token`.
    ///
    /// An unknown handle is reported to the host through `rpc_error` as well
    /// as to the caller.
    pub fn push_on_ready(&self, id: ResponseId, token: CallbackToken) -> Result<()> {
        let entry = match self.get(id) {
            Ok(entry) => entry,
            Err(e) => {
                let message = format!("cannot find response {}", id.0);
                self.router.notify(Slot::RpcError, |r| r.rpc_error(token, message));
                return Err(e);
            }
        };

        let router = Arc::clone(&self.router);
        entry.on_ready(move |outcome| deliver(&router, token, outcome));
        Ok(())
    }

    /// Forgets a response. Threads already waiting on it still get the outcome.
    pub fn release(&self, id: ResponseId) -> Result<()> {
        self.entries.remove(id)?;
        tracing::debug!(response = %id, "response released");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn deliver(router: &Router, token: CallbackToken, outcome: &Outcome) {
    match outcome {
        Outcome::Resolved(bytes) => {
            router.notify(Slot::RpcResponse, |r| r.rpc_response(token, bytes.clone()));
        }
        Outcome::Failed(message) => {
            router.notify(Slot::RpcError, |r| r.rpc_error(token, message.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::router::HostRouter;

    #[derive(Default)]
    struct Pushes {
        seen: Mutex<Vec<(CallbackToken, Outcome)>>,
    }

    impl HostRouter for Pushes {
        fn rpc_response(&self, token: CallbackToken, response: Vec<u8>) -> Option<()> {
            self.seen.lock().push((token, Outcome::Resolved(response)));
            Some(())
        }

        fn rpc_error(&self, token: CallbackToken, error: String) -> Option<()> {
            self.seen.lock().push((token, Outcome::Failed(error)));
            Some(())
        }
    }

    fn table() -> (PendingTable, Arc<Pushes>) {
        let pushes = Arc::new(Pushes::default());
        let router = Arc::new(Router::new());
        router.set(pushes.clone());
        (PendingTable::new(router), pushes)
    }

    #[test]
    fn test_issue_returns_before_resolution() {
        let (table, _) = table();
        let (id, resolver) = table.issue();

        assert_eq!(id, ResponseId(1));
        assert!(table.get(id).unwrap().is_pending());

        resolver.resolve(vec![0x01, 0x02]);
        assert_eq!(table.await_blocking(id).unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn test_blocking_wait_wakes_on_background_resolve() {
        let (table, _) = table();
        let (id, resolver) = table.issue();

        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            resolver.resolve(vec![7, 7, 7]);
        });

        assert_eq!(table.await_blocking(id).unwrap(), vec![7, 7, 7]);
        worker.join().unwrap();
    }

    #[test]
    fn test_failed_yields_empty_payload() {
        let (table, _) = table();
        let (id, resolver) = table.issue();
        resolver.fail("no route to recipient");

        assert!(table.await_blocking(id).unwrap().is_empty());
        assert_eq!(
            table.await_outcome(id).unwrap(),
            Outcome::Failed("no route to recipient".into())
        );
    }

    #[test]
    fn test_transition_happens_once() {
        let (table, _) = table();
        let (id, _resolver) = table.issue();
        let entry = table.get(id).unwrap();

        assert!(entry.complete(Outcome::Resolved(vec![1])));
        assert!(!entry.complete(Outcome::Failed("late".into())));
        assert!(!entry.complete(Outcome::Resolved(vec![2])));
        assert_eq!(entry.peek(), Some(Outcome::Resolved(vec![1])));
    }

    #[test]
    fn test_dropped_resolver_fails_entry() {
        let (table, _) = table();
        let (id, resolver) = table.issue();
        drop(resolver);

        assert_eq!(table.await_outcome(id).unwrap(), Outcome::Failed(ABANDONED.into()));
    }

    #[test]
    fn test_push_after_resolution_delivers_immediately() {
        let (table, pushes) = table();
        let (id, resolver) = table.issue();
        resolver.resolve(b"pong".to_vec());

        table.push_on_ready(id, CallbackToken(0xabc)).unwrap();
        let seen = pushes.seen.lock();
        assert_eq!(seen.as_slice(), &[(CallbackToken(0xabc), Outcome::Resolved(b"pong".to_vec()))]);
    }

    #[test]
    fn test_push_before_resolution_delivers_on_resolve() {
        let (table, pushes) = table();
        let (id, resolver) = table.issue();

        table.push_on_ready(id, CallbackToken(1)).unwrap();
        assert!(pushes.seen.lock().is_empty());

        resolver.fail("remote said no");
        assert_eq!(
            pushes.seen.lock().as_slice(),
            &[(CallbackToken(1), Outcome::Failed("remote said no".into()))]
        );
    }

    #[test]
    fn test_push_unknown_handle_reports_error_slot() {
        let (table, pushes) = table();

        let err = table.push_on_ready(ResponseId(99), CallbackToken(5)).unwrap_err();
        assert!(matches!(err, Error::InvalidHandle { handle: 99, .. }));
        assert_eq!(
            pushes.seen.lock().as_slice(),
            &[(CallbackToken(5), Outcome::Failed("cannot find response 99".into()))]
        );
    }

    #[test]
    fn test_push_without_router_is_dropped() {
        let table = PendingTable::new(Arc::new(Router::new()));
        let (id, resolver) = table.issue();
        table.push_on_ready(id, CallbackToken(1)).unwrap();
        resolver.resolve(vec![1]);
        assert_eq!(table.await_blocking(id).unwrap(), vec![1]);
    }

    #[test]
    fn test_release_keeps_existing_waiters() {
        let (table, _) = table();
        let (id, resolver) = table.issue();
        let entry = table.get(id).unwrap();

        table.release(id).unwrap();
        assert!(table.get(id).is_err());
        assert!(table.await_blocking(id).is_err());
        assert!(table.release(id).is_err());

        resolver.resolve(vec![3]);
        assert_eq!(entry.wait(), Outcome::Resolved(vec![3]));

        let (next, _) = table.issue();
        assert_ne!(next, id);
    }

    #[test]
    fn test_wait_timeout() {
        let (table, _) = table();
        let (id, resolver) = table.issue();
        let entry = table.get(id).unwrap();

        assert_eq!(entry.wait_timeout(Duration::from_millis(10)), None);
        resolver.resolve(vec![]);
        assert_eq!(entry.wait_timeout(Duration::from_millis(10)), Some(Outcome::Resolved(vec![])));
    }

    #[test]
    fn test_concurrent_wait_and_push_agree() {
        for _ in 0..50 {
            let (table, pushes) = table();
            let (id, resolver) = table.issue();

            let waited = std::thread::scope(|s| {
                let waiter = s.spawn(|| table.await_outcome(id).unwrap());
                let pusher = s.spawn(|| table.push_on_ready(id, CallbackToken(2)).unwrap());
                let resolving = s.spawn(move || resolver.resolve(vec![4, 2]));

                pusher.join().unwrap();
                resolving.join().unwrap();
                waiter.join().unwrap()
            });

            let seen = pushes.seen.lock();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].1, waited);
            assert_eq!(waited, Outcome::Resolved(vec![4, 2]));
        }
    }

    #[tokio::test]
    async fn test_async_outcome() {
        let (table, _) = table();
        let (id, resolver) = table.issue();
        let entry = table.get(id).unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.resolve(b"async".to_vec());
        });

        assert_eq!(entry.outcome().await, Outcome::Resolved(b"async".to_vec()));
        // Already terminal: returns straight away.
        assert_eq!(entry.outcome().await, Outcome::Resolved(b"async".to_vec()));
    }
}
