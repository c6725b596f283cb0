#![allow(dead_code)]

use std::time::{Duration, Instant};

use inspector_bridge::{Inspector, LoopbackEngine};
use tokio::task::JoinHandle;

const DEADLINE: Duration = Duration::from_secs(10);

/// Bridge on an ephemeral port around a fresh loopback engine.
pub fn start() -> Inspector<LoopbackEngine> {
    let inspector = Inspector::create(0, LoopbackEngine::new());
    assert!(inspector.is_alive(), "inspector failed to bind");
    inspector
}

pub fn url(inspector: &Inspector<LoopbackEngine>) -> String {
    inspector
        .websocket_url()
        .expect("inspector has no listener")
        .to_string()
}

/// Ticks until `done` holds. Clients run on the runtime's worker threads
/// while the inspector stays on the test thread.
pub async fn tick_until(
    inspector: &Inspector<LoopbackEngine>,
    mut done: impl FnMut(&Inspector<LoopbackEngine>) -> bool,
) {
    let started = Instant::now();
    while !done(inspector) {
        assert!(started.elapsed() < DEADLINE, "timed out waiting on inspector");
        inspector.tick().expect("tick failed");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Ticks until the client task finishes and returns its output.
pub async fn drive<T>(inspector: &Inspector<LoopbackEngine>, client: JoinHandle<T>) -> T {
    tick_until(inspector, |_| client.is_finished()).await;
    client.await.expect("client task panicked")
}
