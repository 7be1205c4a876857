//! # Client event adapter
//!
//! The engine delivers a client's inbound traffic to a receiver object it was
//! given at creation. The host, on the other hand, registered a single router
//! for every client. `ClientAdapter` sits between the two: it remembers which
//! client handle it belongs to and stamps that handle on every event it
//! forwards.
//!
//! Each message variant goes to its own slot. Replies and reactions carry a
//! target id that plain messages don't, so the host never has to unpack a
//! tagged union for the common case.

use std::sync::Arc;

use crate::engine::EventSink;
use crate::event::Message;
use crate::event::ReactionMessage;
use crate::event::ReplyMessage;
use crate::event::SentStatus;
use crate::event::TextMessage;
use crate::handle::ClientId;
use crate::router::HostRouter;
use crate::router::Router;
use crate::router::Slot;

/// Forwards one client's engine events to the router, tagged with its handle.
///
/// Holds no state beyond the handle, so events are forwarded synchronously on
/// the engine thread that raised them and arrive in the order raised.
pub struct ClientAdapter {
    client: ClientId,
    router: Arc<Router>,
}

impl ClientAdapter {
    pub fn new(client: ClientId, router: Arc<Router>) -> Self {
        Self { client, router }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Runs a value-producing slot, falling back to `default` when nothing
    /// answers.
    fn ask<R>(&self, slot: Slot, default: R, f: impl FnOnce(&dyn HostRouter) -> Option<R>) -> R {
        match self.router.request(slot, f) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(client = %self.client, %slot, "no answer from host: {}", e);
                default
            }
        }
    }
}

impl EventSink for ClientAdapter {
    fn receive(&self, message: Message) -> i64 {
        self.ask(Slot::Receive, 0, |r| r.receive(self.client, message))
    }

    fn receive_text(&self, message: TextMessage) -> i64 {
        self.ask(Slot::ReceiveText, 0, |r| r.receive_text(self.client, message))
    }

    fn receive_reply(&self, message: ReplyMessage) -> i64 {
        self.ask(Slot::ReceiveReply, 0, |r| r.receive_reply(self.client, message))
    }

    fn receive_reaction(&self, message: ReactionMessage) -> i64 {
        self.ask(Slot::ReceiveReaction, 0, |r| r.receive_reaction(self.client, message))
    }

    fn update_sent_status(&self, status: SentStatus) {
        self.router
            .notify(Slot::UpdateSentStatus, |r| r.update_sent_status(self.client, status));
    }

    fn block_sender(&self, pubkey: &[u8]) {
        self.router
            .notify(Slot::BlockSender, |r| r.block_sender(self.client, pubkey.to_vec()));
    }

    fn unblock_sender(&self, pubkey: &[u8]) {
        self.router
            .notify(Slot::UnblockSender, |r| r.unblock_sender(self.client, pubkey.to_vec()));
    }

    fn get_conversation(&self, sender_key: &[u8]) -> Vec<u8> {
        self.ask(Slot::GetConversation, Vec::new(), |r| {
            r.get_conversation(self.client, sender_key.to_vec())
        })
    }

    fn get_conversations(&self) -> Vec<u8> {
        self.ask(Slot::GetConversations, Vec::new(), |r| r.get_conversations(self.client))
    }

    fn delete_message(&self, message_id: &[u8], pubkey: &[u8]) -> bool {
        self.ask(Slot::DeleteMessage, false, |r| {
            r.delete_message(self.client, message_id.to_vec(), pubkey.to_vec())
        })
    }

    fn event_update(&self, event_type: i64, json: &[u8]) {
        self.router
            .notify(Slot::EventUpdate, |r| r.event_update(self.client, event_type, json.to_vec()));
    }
}
