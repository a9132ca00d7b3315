//! Watches one fake client through a few refresh cycles in real time,
//! including two failed refreshes and their backoff retries.

use chrono::TimeDelta;
use session_keeper::application_impl::*;
use session_keeper::application_port::*;
use session_keeper::domain_model::ClientId;
use session_keeper::infra_clock::TokioClock;
use session_keeper::logger::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _logger = Logger::new_bootstrap();

    let clock = Arc::new(TokioClock::new());
    let config = LifecycleConfig {
        buffer: Duration::from_secs(2),
        min_refresh_interval: Duration::from_millis(500),
        initial_backoff: Duration::from_millis(250),
        max_backoff: Duration::from_secs(2),
    };
    let store = Arc::new(FakeTokenStore::new(clock.clone(), TimeDelta::seconds(3)));
    store.sign_in("demo");

    let registry = SessionRegistry::new(clock, config);
    let manager = registry.get_or_create(ClientId::new("demo"), store.clone());
    let mut events = manager.subscribe();

    manager.start_monitoring().await;
    store.fail_next(2);

    let watch = async {
        while let Ok(event) = events.recv().await {
            println!("{}", serde_json::to_string(&event)?);
        }
        anyhow::Ok(())
    };
    let _ = tokio::time::timeout(Duration::from_secs(6), watch).await;

    println!(
        "refresh calls: {}, phase: {:?}, expires in: {:?}",
        store.refresh_calls(),
        manager.phase(),
        manager.get_time_until_expiry().await
    );
    registry.shutdown();
    Ok(())
}
