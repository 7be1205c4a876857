//! # C Router
//!
//! The host's callback table as a `#[repr(C)]` struct of nullable function
//! pointers, and its adaptation to [`HostRouter`].
//!
//! ## Conventions
//!
//! - Every `ByteSlice` passed to a slot is a fresh copy that lives until the
//!   slot returns.
//! - A slot that returns bytes hands over a host-owned buffer. The bridge
//!   copies it and, if `release` is set, passes it back to `release`.
//! - A null slot is an empty slot: events for it are dropped and queries fall
//!   back to their defaults.

use std::ffi::c_char;
use std::ffi::c_void;
use std::sync::Arc;

use hostlink::event::Inbound;
use hostlink::event::Message;
use hostlink::event::ReactionMessage;
use hostlink::event::ReplyMessage;
use hostlink::event::SentStatus;
use hostlink::event::TextMessage;
use hostlink::handle::CallbackToken;
use hostlink::handle::ClientId;
use hostlink::handle::ServerId;
use hostlink::router::HostRouter;

use crate::buffer::ByteSlice;

/// Fields shared by every inbound message, borrowed for one slot call.
#[repr(C)]
pub struct InboundView {
    pub message_id: ByteSlice,
    pub nickname: ByteSlice,
    pub partner_key: ByteSlice,
    pub sender_key: ByteSlice,
    pub dm_token: i32,
    pub codeset: i32,
    pub timestamp: i64,
    pub round_id: i64,
    pub status: i64,
}

impl InboundView {
    fn of(inbound: &Inbound) -> Self {
        Self {
            message_id: ByteSlice::of(&inbound.message_id),
            nickname: ByteSlice::of(inbound.nickname.as_bytes()),
            partner_key: ByteSlice::of(&inbound.partner_key),
            sender_key: ByteSlice::of(&inbound.sender_key),
            dm_token: inbound.dm_token,
            codeset: inbound.codeset,
            timestamp: inbound.timestamp,
            round_id: inbound.round_id,
            status: inbound.status,
        }
    }
}

pub type ReceiveFn = extern "C" fn(client: i32, inbound: *const InboundView, payload: ByteSlice, message_type: i64) -> i64;
pub type ReceiveTextFn = extern "C" fn(client: i32, inbound: *const InboundView, text: ByteSlice) -> i64;
pub type ReceiveReplyFn =
    extern "C" fn(client: i32, inbound: *const InboundView, reply_to: ByteSlice, text: ByteSlice) -> i64;
pub type ReceiveReactionFn =
    extern "C" fn(client: i32, inbound: *const InboundView, reaction_to: ByteSlice, reaction: ByteSlice) -> i64;
pub type UpdateSentStatusFn =
    extern "C" fn(client: i32, uuid: i64, message_id: ByteSlice, timestamp: i64, round_id: i64, status: i64);
pub type SenderFn = extern "C" fn(client: i32, pubkey: ByteSlice);
pub type GetConversationFn = extern "C" fn(client: i32, sender_key: ByteSlice) -> ByteSlice;
pub type GetConversationsFn = extern "C" fn(client: i32) -> ByteSlice;
pub type DeleteMessageFn = extern "C" fn(client: i32, message_id: ByteSlice, pubkey: ByteSlice) -> bool;
pub type EventUpdateFn = extern "C" fn(client: i32, event_type: i64, json: ByteSlice);
pub type RpcResponseFn = extern "C" fn(obj: *mut c_void, response: ByteSlice);
pub type RpcErrorFn = extern "C" fn(obj: *mut c_void, error: ByteSlice);
pub type RpcServerRequestFn =
    extern "C" fn(obj: *mut c_void, server: i32, sender: ByteSlice, request: ByteSlice) -> ByteSlice;
pub type ReleaseFn = extern "C" fn(buffer: ByteSlice);

/// The host's callback table. Any slot may be null.
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct RouterFunctions {
    pub receive: Option<ReceiveFn>,
    pub receive_text: Option<ReceiveTextFn>,
    pub receive_reply: Option<ReceiveReplyFn>,
    pub receive_reaction: Option<ReceiveReactionFn>,
    pub update_sent_status: Option<UpdateSentStatusFn>,
    pub block_sender: Option<SenderFn>,
    pub unblock_sender: Option<SenderFn>,
    pub get_conversation: Option<GetConversationFn>,
    pub get_conversations: Option<GetConversationsFn>,
    pub delete_message: Option<DeleteMessageFn>,
    pub event_update: Option<EventUpdateFn>,
    pub rpc_response: Option<RpcResponseFn>,
    pub rpc_error: Option<RpcErrorFn>,
    pub rpc_server_request: Option<RpcServerRequestFn>,
    pub release: Option<ReleaseFn>,
}

/// [`HostRouter`] over a copied [`RouterFunctions`] table.
pub struct CRouter {
    fns: RouterFunctions,
}

impl CRouter {
    pub fn new(fns: RouterFunctions) -> Self {
        Self { fns }
    }

    /// Copies a host-returned buffer, then hands it back for release.
    fn take(&self, returned: ByteSlice) -> Vec<u8> {
        // The host promises `returned` stays valid until released.
        let bytes = unsafe { returned.to_vec() };
        if let (Some(release), false) = (self.fns.release, returned.is_null()) {
            release(returned);
        }
        bytes
    }
}

fn object(token: CallbackToken) -> *mut c_void {
    token.0 as *mut c_void
}

impl HostRouter for CRouter {
    fn receive(&self, client: ClientId, message: Message) -> Option<i64> {
        let f = self.fns.receive?;
        let inbound = InboundView::of(&message.inbound);
        Some(f(client.0, &inbound, ByteSlice::of(&message.payload), message.message_type))
    }

    fn receive_text(&self, client: ClientId, message: TextMessage) -> Option<i64> {
        let f = self.fns.receive_text?;
        let inbound = InboundView::of(&message.inbound);
        Some(f(client.0, &inbound, ByteSlice::of(message.text.as_bytes())))
    }

    fn receive_reply(&self, client: ClientId, message: ReplyMessage) -> Option<i64> {
        let f = self.fns.receive_reply?;
        let inbound = InboundView::of(&message.inbound);
        Some(f(
            client.0,
            &inbound,
            ByteSlice::of(&message.reply_to),
            ByteSlice::of(message.text.as_bytes()),
        ))
    }

    fn receive_reaction(&self, client: ClientId, message: ReactionMessage) -> Option<i64> {
        let f = self.fns.receive_reaction?;
        let inbound = InboundView::of(&message.inbound);
        Some(f(
            client.0,
            &inbound,
            ByteSlice::of(&message.reaction_to),
            ByteSlice::of(message.reaction.as_bytes()),
        ))
    }

    fn update_sent_status(&self, client: ClientId, status: SentStatus) -> Option<()> {
        let f = self.fns.update_sent_status?;
        f(
            client.0,
            status.uuid,
            ByteSlice::of(&status.message_id),
            status.timestamp,
            status.round_id,
            status.status,
        );
        Some(())
    }

    fn block_sender(&self, client: ClientId, pubkey: Vec<u8>) -> Option<()> {
        let f = self.fns.block_sender?;
        f(client.0, ByteSlice::of(&pubkey));
        Some(())
    }

    fn unblock_sender(&self, client: ClientId, pubkey: Vec<u8>) -> Option<()> {
        let f = self.fns.unblock_sender?;
        f(client.0, ByteSlice::of(&pubkey));
        Some(())
    }

    fn get_conversation(&self, client: ClientId, sender_key: Vec<u8>) -> Option<Vec<u8>> {
        let f = self.fns.get_conversation?;
        Some(self.take(f(client.0, ByteSlice::of(&sender_key))))
    }

    fn get_conversations(&self, client: ClientId) -> Option<Vec<u8>> {
        let f = self.fns.get_conversations?;
        Some(self.take(f(client.0)))
    }

    fn delete_message(&self, client: ClientId, message_id: Vec<u8>, pubkey: Vec<u8>) -> Option<bool> {
        let f = self.fns.delete_message?;
        Some(f(client.0, ByteSlice::of(&message_id), ByteSlice::of(&pubkey)))
    }

    fn event_update(&self, client: ClientId, event_type: i64, json: Vec<u8>) -> Option<()> {
        let f = self.fns.event_update?;
        f(client.0, event_type, ByteSlice::of(&json));
        Some(())
    }

    fn rpc_response(&self, token: CallbackToken, response: Vec<u8>) -> Option<()> {
        let f = self.fns.rpc_response?;
        f(object(token), ByteSlice::of(&response));
        Some(())
    }

    fn rpc_error(&self, token: CallbackToken, error: String) -> Option<()> {
        let f = self.fns.rpc_error?;
        f(object(token), ByteSlice::of(error.as_bytes()));
        Some(())
    }

    fn rpc_server_request(
        &self,
        server: ServerId,
        token: CallbackToken,
        sender: Vec<u8>,
        request: Vec<u8>,
    ) -> Option<Vec<u8>> {
        let f = self.fns.rpc_server_request?;
        let reply = f(object(token), server.0, ByteSlice::of(&sender), ByteSlice::of(&request));
        Some(self.take(reply))
    }
}

/// Installs the host's callback table, replacing any previous one. The
/// table is copied; `fns` need not outlive the call.
///
/// Returns an error message (free with `hostlink_error_free`) or null.
///
/// # Safety
///
/// `fns` must be null or point to a valid `RouterFunctions`, and every
/// non-null slot must be safe to call from any thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_set_router(fns: *const RouterFunctions) -> *mut c_char {
    if fns.is_null() {
        return crate::error_message("null router");
    }
    let fns = unsafe { *fns };
    crate::run(|bridge| {
        bridge.set_router(Arc::new(CRouter::new(fns)));
        Ok(())
    })
}

/// Removes the installed callback table. Later events are dropped.
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_clear_router() -> *mut c_char {
    crate::run(|bridge| {
        bridge.clear_router();
        Ok(())
    })
}
