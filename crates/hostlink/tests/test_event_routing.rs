//! Inbound events from several clients reach the single host router, tagged
//! with the handle of the client that raised them.

use std::sync::Arc;

use parking_lot::Mutex;

use hostlink::BridgeBuilder;
use hostlink::engine::EventSink;
use hostlink::event::Inbound;
use hostlink::event::Message;
use hostlink::event::ReactionMessage;
use hostlink::event::SentStatus;
use hostlink::event::TextMessage;
use hostlink::handle::ClientId;
use hostlink::mock::MockEngine;
use hostlink::router::HostRouter;

#[derive(Default)]
struct Inbox {
    texts: Mutex<Vec<(ClientId, String)>>,
    raw: Mutex<Vec<(ClientId, i64, Vec<u8>)>>,
    reactions: Mutex<Vec<(ClientId, Vec<u8>, String)>>,
    statuses: Mutex<Vec<(ClientId, i64)>>,
    blocked: Mutex<Vec<(ClientId, Vec<u8>)>>,
}

impl HostRouter for Inbox {
    fn receive(&self, client: ClientId, message: Message) -> Option<i64> {
        self.raw.lock().push((client, message.message_type, message.payload));
        Some(10)
    }

    fn receive_text(&self, client: ClientId, message: TextMessage) -> Option<i64> {
        let mut texts = self.texts.lock();
        texts.push((client, message.text));
        Some(texts.len() as i64)
    }

    fn receive_reaction(&self, client: ClientId, message: ReactionMessage) -> Option<i64> {
        self.reactions.lock().push((client, message.reaction_to, message.reaction));
        Some(20)
    }

    fn update_sent_status(&self, client: ClientId, status: SentStatus) -> Option<()> {
        self.statuses.lock().push((client, status.uuid));
        Some(())
    }

    fn block_sender(&self, client: ClientId, pubkey: Vec<u8>) -> Option<()> {
        self.blocked.lock().push((client, pubkey));
        Some(())
    }

    fn get_conversation(&self, client: ClientId, sender_key: Vec<u8>) -> Option<Vec<u8>> {
        Some(format!("{}:{}", client, String::from_utf8_lossy(&sender_key)).into_bytes())
    }

    fn delete_message(&self, _client: ClientId, message_id: Vec<u8>, _pubkey: Vec<u8>) -> Option<bool> {
        Some(message_id == b"exists")
    }
}

fn text(body: &str) -> TextMessage {
    TextMessage {
        inbound: Inbound {
            message_id: body.as_bytes().to_vec(),
            ..Default::default()
        },
        text: body.into(),
    }
}

#[test]
fn test_events_demultiplexed_by_client() {
    let inbox = Arc::new(Inbox::default());
    let engine = Arc::new(MockEngine::new().with_storage("store"));
    let bridge = BridgeBuilder::new(engine.clone())
        .router(inbox.clone())
        .build()
        .expect("bridge");

    let network = bridge.load_network("store", b"pw", b"{}").expect("load");
    let alice = bridge.new_client(network, b"alice", "pw").expect("alice");
    let bob = bridge.new_client(network, b"bob", "pw").expect("bob");

    let clients = engine.last_network().expect("network").clients();
    let (alice_sink, bob_sink) = (clients[0].sink(), clients[1].sink());

    assert_eq!(alice_sink.receive_text(text("hi bob")), 1);
    assert_eq!(bob_sink.receive_text(text("hi alice")), 2);
    assert_eq!(
        bob_sink.receive(Message {
            payload: vec![9, 9],
            message_type: 3,
            ..Default::default()
        }),
        10
    );
    assert_eq!(
        alice_sink.receive_reaction(ReactionMessage {
            reaction_to: b"hi bob".to_vec(),
            reaction: "<3".into(),
            ..Default::default()
        }),
        20
    );
    alice_sink.update_sent_status(SentStatus {
        uuid: 1,
        ..Default::default()
    });
    bob_sink.block_sender(b"mallory");

    assert_eq!(
        inbox.texts.lock().as_slice(),
        &[(alice, "hi bob".to_string()), (bob, "hi alice".to_string())]
    );
    assert_eq!(inbox.raw.lock().as_slice(), &[(bob, 3, vec![9, 9])]);
    assert_eq!(
        inbox.reactions.lock().as_slice(),
        &[(alice, b"hi bob".to_vec(), "<3".to_string())]
    );
    assert_eq!(inbox.statuses.lock().as_slice(), &[(alice, 1)]);
    assert_eq!(inbox.blocked.lock().as_slice(), &[(bob, b"mallory".to_vec())]);
}

#[test]
fn test_query_slots_return_host_values() {
    let engine = Arc::new(MockEngine::new().with_storage("store"));
    let bridge = BridgeBuilder::new(engine.clone()).build().expect("bridge");
    let network = bridge.load_network("store", b"pw", b"{}").expect("load");
    bridge.new_client(network, b"carol", "pw").expect("client");
    let sink = engine.last_network().expect("network").clients()[0].sink();

    // Nothing installed yet: defaults.
    assert!(sink.get_conversation(b"dave").is_empty());
    assert!(!sink.delete_message(b"exists", b"key"));

    bridge.set_router(Arc::new(Inbox::default()));
    assert_eq!(sink.get_conversation(b"dave"), b"client-1:dave".to_vec());
    assert!(sink.delete_message(b"exists", b"key"));
    assert!(!sink.delete_message(b"missing", b"key"));
    // The router leaves this slot empty.
    assert!(sink.get_conversations().is_empty());
}

#[test]
fn test_per_client_order_preserved_across_threads() {
    let inbox = Arc::new(Inbox::default());
    let engine = Arc::new(MockEngine::new().with_storage("store"));
    let bridge = BridgeBuilder::new(engine.clone())
        .router(inbox.clone())
        .build()
        .expect("bridge");
    let network = bridge.load_network("store", b"pw", b"{}").expect("load");
    for name in ["a", "b", "c", "d"] {
        bridge.new_client(network, name.as_bytes(), "pw").expect("client");
    }
    let sinks: Vec<Arc<dyn EventSink>> = engine
        .last_network()
        .expect("network")
        .clients()
        .iter()
        .map(|c| c.sink())
        .collect();

    std::thread::scope(|s| {
        for sink in &sinks {
            s.spawn(move || {
                for n in 0..200 {
                    sink.receive_text(text(&n.to_string()));
                }
            });
        }
    });

    let texts = inbox.texts.lock();
    assert_eq!(texts.len(), 800);
    for client in 1..=4 {
        let seq: Vec<u32> = texts
            .iter()
            .filter(|(c, _)| *c == ClientId(client))
            .map(|(_, t)| t.parse().expect("number"))
            .collect();
        assert_eq!(seq, (0..200).collect::<Vec<_>>());
    }
}
