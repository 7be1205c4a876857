//! Many requests in flight at once, collected through a shuffled mix of
//! blocking waits and push deliveries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;

use hostlink::BridgeBuilder;
use hostlink::engine;
use hostlink::handle::CallbackToken;
use hostlink::handle::ResponseId;
use hostlink::mock::MockEngine;
use hostlink::pending::Outcome;
use hostlink::router::HostRouter;

#[derive(Default)]
struct Pushes {
    by_token: Mutex<HashMap<usize, Outcome>>,
}

impl HostRouter for Pushes {
    fn rpc_response(&self, token: CallbackToken, response: Vec<u8>) -> Option<()> {
        let previous = self.by_token.lock().insert(token.0, Outcome::Resolved(response));
        assert!(previous.is_none(), "pushed twice for {}", token);
        Some(())
    }

    fn rpc_error(&self, token: CallbackToken, error: String) -> Option<()> {
        let previous = self.by_token.lock().insert(token.0, Outcome::Failed(error));
        assert!(previous.is_none(), "pushed twice for {}", token);
        Some(())
    }
}

/// Odd requests fail, even requests echo.
fn respond(_recipient: &[u8], request: &[u8]) -> engine::Result<Vec<u8>> {
    match request.last() {
        Some(n) if n % 2 == 1 => Err(engine::Error::Upstream(format!("odd {}", n))),
        _ => Ok(request.to_vec()),
    }
}

fn expected(n: u8) -> Outcome {
    if n % 2 == 1 {
        Outcome::Failed(format!("odd {}", n))
    } else {
        Outcome::Resolved(vec![n])
    }
}

#[test]
fn test_mixed_collection_under_load() -> anyhow::Result<()> {
    let pushes = Arc::new(Pushes::default());
    let engine = Arc::new(
        MockEngine::new()
            .with_storage("store")
            .responder(respond)
            .delay(Duration::from_millis(2)),
    );
    let bridge = BridgeBuilder::new(engine)
        .worker_threads(4)
        .router(pushes.clone())
        .build()?;
    let network = bridge.load_network("store", b"pw", b"{}")?;

    let mut issued: Vec<(u8, ResponseId)> = (0..200u8)
        .map(|n| bridge.rpc_send(network, b"peer", b"key", &[n]).map(|id| (n, id)))
        .collect::<hostlink::Result<_>>()?;

    let ids: Vec<i32> = issued.iter().map(|(_, id)| id.0).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    issued.shuffle(&mut rand::thread_rng());
    let (blocking, pushed) = issued.split_at(issued.len() / 2);

    std::thread::scope(|s| {
        for chunk in blocking.chunks(25) {
            let bridge = &bridge;
            s.spawn(move || {
                for (n, id) in chunk {
                    let outcome = bridge.response_outcome(*id).expect("known response");
                    assert_eq!(outcome, expected(*n));
                }
            });
        }
        for (n, id) in pushed {
            bridge
                .push_on_ready(*id, CallbackToken(*n as usize))
                .expect("known response");
        }
    });

    for (n, id) in pushed {
        assert_eq!(bridge.response_outcome(*id)?, expected(*n));
    }

    // Pushes run on the resolving thread just after waiters are released.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while pushes.by_token.lock().len() < pushed.len() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }

    let delivered = pushes.by_token.lock();
    assert_eq!(delivered.len(), pushed.len());
    for (n, _) in pushed {
        assert_eq!(delivered.get(&(*n as usize)), Some(&expected(*n)));
    }
    Ok(())
}

#[test]
fn test_release_all_leaves_table_empty() -> anyhow::Result<()> {
    let engine = Arc::new(MockEngine::new().with_storage("store"));
    let bridge = BridgeBuilder::new(engine).build()?;
    let network = bridge.load_network("store", b"pw", b"{}")?;

    let ids = (0..50u8)
        .map(|n| bridge.rpc_send(network, b"peer", b"key", &[n]))
        .collect::<hostlink::Result<Vec<_>>>()?;
    for id in &ids {
        bridge.await_response(*id)?;
        bridge.release_response(*id)?;
    }

    assert!(bridge.responses().is_empty());
    assert!(ids.iter().all(|id| bridge.await_response(*id).is_err()));
    Ok(())
}
