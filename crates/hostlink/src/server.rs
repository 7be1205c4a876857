//! # RPC servers
//!
//! A server answers inbound requests by asking the host. The engine owns the
//! endpoint and calls [`RequestHandler::serve`] on one of its own threads; the
//! bridge forwards the call to the router's `rpc_server_request` slot and
//! returns whatever bytes the host produced.
//!
//! A server only dispatches while it is running. Requests that reach a
//! stopped server are refused without consulting the host.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::engine;
use crate::engine::RequestHandler;
use crate::engine::RpcEndpoint;
use crate::error::Error;
use crate::handle::CallbackToken;
use crate::handle::ServerId;
use crate::router::Router;
use crate::router::Slot;

/// Forwards requests for one server to the host.
pub struct ServerDispatch {
    server: ServerId,
    token: CallbackToken,
    router: Arc<Router>,
    running: Arc<AtomicBool>,
}

impl ServerDispatch {
    pub fn new(server: ServerId, token: CallbackToken, router: Arc<Router>) -> Self {
        Self {
            server,
            token,
            router,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn server(&self) -> ServerId {
        self.server
    }

    fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

impl RequestHandler for ServerDispatch {
    fn serve(&self, sender: &[u8], request: &[u8]) -> engine::Result<Vec<u8>> {
        let span = tracing::debug_span!("serve", server = %self.server, len = request.len());
        let _enter = span.enter();

        if !self.running.load(Ordering::SeqCst) {
            let e = Error::ServerStopped(self.server);
            tracing::debug!("{}", e);
            return Err(engine::Error::Upstream(e.to_string()));
        }

        self.router
            .request(Slot::RpcServerRequest, |r| {
                r.rpc_server_request(self.server, self.token, sender.to_vec(), request.to_vec())
            })
            .map_err(|e| {
                tracing::warn!("request not answered: {}", e);
                engine::Error::Upstream(e.to_string())
            })
    }
}

/// A registered server: the engine endpoint plus its run state.
pub struct RpcServer {
    id: ServerId,
    endpoint: Arc<dyn RpcEndpoint>,
    running: Arc<AtomicBool>,
}

impl RpcServer {
    pub(crate) fn new(dispatch: &ServerDispatch, endpoint: Arc<dyn RpcEndpoint>) -> Self {
        Self {
            id: dispatch.server(),
            endpoint,
            running: dispatch.running(),
        }
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts serving. Starting a running server does nothing.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            self.endpoint.start();
            tracing::debug!(server = %self.id, "server started");
        }
    }

    /// Stops serving. Stopping a stopped server does nothing.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.endpoint.stop();
            tracing::debug!(server = %self.id, "server stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::router::HostRouter;

    struct Echo {
        seen: Mutex<Vec<(ServerId, CallbackToken, Vec<u8>)>>,
    }

    impl HostRouter for Echo {
        fn rpc_server_request(
            &self,
            server: ServerId,
            token: CallbackToken,
            sender: Vec<u8>,
            request: Vec<u8>,
        ) -> Option<Vec<u8>> {
            self.seen.lock().push((server, token, sender));
            let mut reply = b"re:".to_vec();
            reply.extend(request);
            Some(reply)
        }
    }

    #[derive(Default)]
    struct Endpoint {
        starts: Mutex<u32>,
        stops: Mutex<u32>,
    }

    impl RpcEndpoint for Endpoint {
        fn start(&self) {
            *self.starts.lock() += 1;
        }

        fn stop(&self) {
            *self.stops.lock() += 1;
        }
    }

    #[test]
    fn test_serve_only_while_running() {
        let echo = Arc::new(Echo { seen: Mutex::new(Vec::new()) });
        let router = Arc::new(Router::new());
        router.set(echo.clone());

        let endpoint = Arc::new(Endpoint::default());
        let dispatch = ServerDispatch::new(ServerId(4), CallbackToken(0x10), router);
        let server = RpcServer::new(&dispatch, endpoint.clone());

        assert!(dispatch.serve(b"alice", b"hi").is_err());
        assert!(echo.seen.lock().is_empty());

        server.start();
        server.start();
        assert_eq!(dispatch.serve(b"alice", b"hi").unwrap(), b"re:hi".to_vec());
        assert_eq!(
            echo.seen.lock().as_slice(),
            &[(ServerId(4), CallbackToken(0x10), b"alice".to_vec())]
        );

        server.stop();
        server.stop();
        assert!(dispatch.serve(b"alice", b"again").is_err());
        assert_eq!(echo.seen.lock().len(), 1);

        assert_eq!(*endpoint.starts.lock(), 1);
        assert_eq!(*endpoint.stops.lock(), 1);
    }

    #[test]
    fn test_serve_without_router_fails() {
        let router = Arc::new(Router::new());
        let dispatch = ServerDispatch::new(ServerId(1), CallbackToken(0), router);
        let server = RpcServer::new(&dispatch, Arc::new(Endpoint::default()));
        server.start();

        let err = dispatch.serve(b"bob", b"ping").unwrap_err();
        assert_eq!(
            err,
            engine::Error::Upstream("router not configured for slot `rpc_server_request`".into())
        );
    }
}
