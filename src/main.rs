//! Demo session: a GM hub and two player replicas in one process, wired
//! over the in-memory transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dreadwheel::session::{runner, Hub, Replica};
use dreadwheel::transport::Switchboard;
use dreadwheel::types::{ScenarioDocument, SessionId};
use dreadwheel::wheel::wedge_for_angle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dreadwheel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting demo session...");

    let board = Switchboard::new();
    let session_id = SessionId::new("demo-night");

    let (hub, listener) = Hub::create_session(&board, session_id.clone(), "Morgan", 8)
        .expect("session address should be free");
    let hub = Arc::new(Mutex::new(hub));
    runner::spawn_hub(Arc::clone(&hub), listener);

    // Two players join
    let mut replicas = Vec::new();
    for (addr, name) in [("player-alice", "Alice"), ("player-bob", "Bob")] {
        let conn = board
            .connect(addr, &session_id.address())
            .expect("hub should be listening");
        let replica = Arc::new(Mutex::new(Replica::join_session(
            session_id.clone(),
            addr,
            name,
        )));
        runner::spawn_replica(Arc::clone(&replica), conn);
        replicas.push(replica);
    }

    // Let the joins and welcomes drain
    tokio::time::sleep(Duration::from_millis(100)).await;

    hub.lock().unwrap().save_scenario(ScenarioDocument {
        title: "The Lighthouse".to_string(),
        description: "The lamp went dark three nights ago.".to_string(),
        ..Default::default()
    });
    replicas[0].lock().unwrap().send_chat("Did anyone bring a lantern?");
    replicas[0].lock().unwrap().set_answer(0, "Alice Hargrove");

    tokio::time::sleep(Duration::from_millis(100)).await;

    // The GM spins; the demo stands in for the renderer
    let (plan, wedge_count) = {
        let mut hub = hub.lock().unwrap();
        let plan = hub.request_spin().expect("no spin in flight");
        (plan, hub.data().wedge_count)
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let selected = wedge_for_angle(plan.target_angle, wedge_count);
    let result = hub.lock().unwrap().finish_spin(selected);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let hub = hub.lock().unwrap();
    tracing::info!(
        "Spin landed on wedge {}: {}",
        selected,
        result.expect("spin should resolve")
    );
    tracing::info!("Roster: {:?}", hub.data().users.values().collect::<Vec<_>>());
    for replica in &replicas {
        let replica = replica.lock().unwrap();
        tracing::info!(
            "[{}] wheel={:?} chat={} scenario={:?}",
            replica.display_name(),
            replica.data().wheel,
            replica.chat_log().len(),
            replica.data().scenario.as_ref().map(|s| &s.title)
        );
    }
}
