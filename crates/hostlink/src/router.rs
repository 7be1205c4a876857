//! # Callback Router
//!
//! The host registers one set of entry points for the whole process and
//! demultiplexes by handle itself. This module holds that set.
//!
//! ## Philosophy
//!
//! - **One router, many instances**: every client and server shares the same
//!   slots; the handle passed to each slot says which instance the event is for.
//! - **Replace as a unit**: installing a router swaps every slot at once. A
//!   dispatch sees either the old set or the new set, never a mix.
//! - **Never hold the lock across a call**: the table lock only guards the
//!   pointer swap. Dispatch clones the `Arc` and releases the lock before
//!   invoking, so a slot may freely re-enter the bridge (or even replace the
//!   router) without deadlocking.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Error;
use crate::error::Result;
use crate::event::Message;
use crate::event::ReactionMessage;
use crate::event::ReplyMessage;
use crate::event::SentStatus;
use crate::event::TextMessage;
use crate::handle::CallbackToken;
use crate::handle::ClientId;
use crate::handle::ServerId;

/// Names of the callback slots, used in errors and logs.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Slot {
    Receive,
    ReceiveText,
    ReceiveReply,
    ReceiveReaction,
    UpdateSentStatus,
    BlockSender,
    UnblockSender,
    GetConversation,
    GetConversations,
    DeleteMessage,
    EventUpdate,
    RpcResponse,
    RpcError,
    RpcServerRequest,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receive => "receive",
            Self::ReceiveText => "receive_text",
            Self::ReceiveReply => "receive_reply",
            Self::ReceiveReaction => "receive_reaction",
            Self::UpdateSentStatus => "update_sent_status",
            Self::BlockSender => "block_sender",
            Self::UnblockSender => "unblock_sender",
            Self::GetConversation => "get_conversation",
            Self::GetConversations => "get_conversations",
            Self::DeleteMessage => "delete_message",
            Self::EventUpdate => "event_update",
            Self::RpcResponse => "rpc_response",
            Self::RpcError => "rpc_error",
            Self::RpcServerRequest => "rpc_server_request",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The host's set of entry points, one method per slot.
///
/// Every method returns `None` by default, meaning "this slot is empty". A
/// host that only cares about text messages implements `receive_text` and
/// nothing else. Fire-and-forget slots return `Some(())` once handled.
///
/// Every payload is an owned copy made for this call alone.
#[allow(unused_variables)]
pub trait HostRouter: Send + Sync + 'static {
    /// Generic inbound message. Returns the host's row id for the message.
    fn receive(&self, client: ClientId, message: Message) -> Option<i64> {
        None
    }

    fn receive_text(&self, client: ClientId, message: TextMessage) -> Option<i64> {
        None
    }

    fn receive_reply(&self, client: ClientId, message: ReplyMessage) -> Option<i64> {
        None
    }

    fn receive_reaction(&self, client: ClientId, message: ReactionMessage) -> Option<i64> {
        None
    }

    fn update_sent_status(&self, client: ClientId, status: SentStatus) -> Option<()> {
        None
    }

    fn block_sender(&self, client: ClientId, pubkey: Vec<u8>) -> Option<()> {
        None
    }

    fn unblock_sender(&self, client: ClientId, pubkey: Vec<u8>) -> Option<()> {
        None
    }

    /// Serialized conversation with one partner.
    fn get_conversation(&self, client: ClientId, sender_key: Vec<u8>) -> Option<Vec<u8>> {
        None
    }

    /// Serialized list of every conversation.
    fn get_conversations(&self, client: ClientId) -> Option<Vec<u8>> {
        None
    }

    /// Returns whether the message existed and was deleted.
    fn delete_message(&self, client: ClientId, message_id: Vec<u8>, pubkey: Vec<u8>) -> Option<bool> {
        None
    }

    fn event_update(&self, client: ClientId, event_type: i64, json: Vec<u8>) -> Option<()> {
        None
    }

    /// A pending response resolved successfully.
    fn rpc_response(&self, token: CallbackToken, response: Vec<u8>) -> Option<()> {
        None
    }

    /// A pending response failed, or the handle was unknown.
    fn rpc_error(&self, token: CallbackToken, error: String) -> Option<()> {
        None
    }

    /// A running server received a request. The returned bytes are the reply.
    fn rpc_server_request(
        &self,
        server: ServerId,
        token: CallbackToken,
        sender: Vec<u8>,
        request: Vec<u8>,
    ) -> Option<Vec<u8>> {
        None
    }
}

/// Process-wide, replaceable callback table.
pub struct Router {
    current: RwLock<Option<Arc<dyn HostRouter>>>,
}

impl Router {
    /// Creates a table with no router installed.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Installs `router`, replacing any previous one. Last write wins.
    pub fn set(&self, router: Arc<dyn HostRouter>) {
        let previous = self.current.write().replace(router);
        tracing::debug!(replaced = previous.is_some(), "router installed");
    }

    /// Removes the installed router, returning it.
    pub fn clear(&self) -> Option<Arc<dyn HostRouter>> {
        self.current.write().take()
    }

    pub fn is_configured(&self) -> bool {
        self.current.read().is_some()
    }

    /// Clones the current router out of the table so the lock is released
    /// before anything is invoked.
    fn snapshot(&self) -> Option<Arc<dyn HostRouter>> {
        self.current.read().clone()
    }

    /// Invokes a slot that must produce a value.
    ///
    /// Fails with `RouterNotConfigured` if no router is installed or the
    /// router leaves the slot empty.
    pub fn request<R>(&self, slot: Slot, f: impl FnOnce(&dyn HostRouter) -> Option<R>) -> Result<R> {
        let router = self.snapshot().ok_or(Error::RouterNotConfigured(slot))?;
        tracing::trace!(%slot, "dispatch");
        f(router.as_ref()).ok_or(Error::RouterNotConfigured(slot))
    }

    /// Invokes a fire-and-forget slot. Returns whether anything handled it;
    /// an unconfigured slot drops the event.
    pub fn notify(&self, slot: Slot, f: impl FnOnce(&dyn HostRouter) -> Option<()>) -> bool {
        match self.request(slot, f) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%slot, "event dropped: {}", e);
                false
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    struct TextOnly {
        calls: AtomicUsize,
    }

    impl HostRouter for TextOnly {
        fn receive_text(&self, _client: ClientId, message: TextMessage) -> Option<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(message.text.len() as i64)
        }
    }

    fn text(s: &str) -> TextMessage {
        TextMessage {
            text: s.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_dispatch_before_router_is_not_configured() {
        let router = Router::new();
        assert!(!router.is_configured());

        let err = router
            .request(Slot::RpcServerRequest, |r| {
                r.rpc_server_request(ServerId(1), CallbackToken(0), vec![], vec![])
            })
            .unwrap_err();
        assert!(matches!(err, Error::RouterNotConfigured(Slot::RpcServerRequest)));

        assert!(!router.notify(Slot::BlockSender, |r| r.block_sender(ClientId(1), vec![1])));
    }

    #[test]
    fn test_empty_slot_is_not_configured() {
        let router = Router::new();
        router.set(Arc::new(TextOnly { calls: AtomicUsize::new(0) }));

        let got = router.request(Slot::ReceiveText, |r| r.receive_text(ClientId(1), text("hey")));
        assert_eq!(got.unwrap(), 3);

        let err = router
            .request(Slot::GetConversations, |r| r.get_conversations(ClientId(1)))
            .unwrap_err();
        assert!(matches!(err, Error::RouterNotConfigured(Slot::GetConversations)));
    }

    #[test]
    fn test_set_replaces_whole_router() {
        let router = Router::new();
        let first = Arc::new(TextOnly { calls: AtomicUsize::new(0) });
        let second = Arc::new(TextOnly { calls: AtomicUsize::new(0) });

        router.set(first.clone());
        router.request(Slot::ReceiveText, |r| r.receive_text(ClientId(1), text("a"))).unwrap();
        router.set(second.clone());
        router.request(Slot::ReceiveText, |r| r.receive_text(ClientId(1), text("b"))).unwrap();
        router.request(Slot::ReceiveText, |r| r.receive_text(ClientId(1), text("c"))).unwrap();

        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 2);

        assert!(router.clear().is_some());
        assert!(!router.is_configured());
    }

    /// A slot that replaces the router from inside a dispatch must not deadlock.
    #[test]
    fn test_reentrant_set_from_slot() {
        struct Swapper {
            table: Arc<Router>,
        }

        impl HostRouter for Swapper {
            fn event_update(&self, _client: ClientId, _event_type: i64, _json: Vec<u8>) -> Option<()> {
                self.table.set(Arc::new(TextOnly { calls: AtomicUsize::new(0) }));
                Some(())
            }
        }

        let table = Arc::new(Router::new());
        table.set(Arc::new(Swapper { table: table.clone() }));

        assert!(table.notify(Slot::EventUpdate, |r| r.event_update(ClientId(1), 0, vec![])));
        assert!(table.request(Slot::ReceiveText, |r| r.receive_text(ClientId(1), text("x"))).is_ok());
    }
}
