//! Same round trip, with flushes scheduled by the tokio timer.
//!
//! Run with:
//!   cargo run --example timed-round-trip --features peer,async

use std::rc::Rc;
use std::time::Duration;

use framebridge::peer::{Client, EndpointConfig, Host, TokioTimer};
use framebridge::transport::LocalBus;
use serde_json::json;
use tokio::task::LocalSet;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    LocalSet::new()
        .run_until(async {
            let bus = Rc::new(LocalBus::new());
            let top = bus.add_root("top");
            let frame = bus.add_child(top, "frame")?;
            let config = EndpointConfig::default().with_gather(Duration::from_millis(20));

            let host = Host::bind(Rc::clone(&bus), top, config.clone())?
                .with_timer(TokioTimer::shared());
            host.on_request("add", |handle, args| {
                let total: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
                let _ = handle.respond(vec![json!(total)]);
            })?;

            let client =
                Client::connect(Rc::clone(&bus), frame, config)?.with_timer(TokioTimer::shared());
            let request = client.request_with("add", (40, 2))?;

            // The bus is a plain queue; deliver whatever the timers flushed.
            let pump_bus = Rc::clone(&bus);
            let pump = tokio::task::spawn_local(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(5));
                loop {
                    interval.tick().await;
                    pump_bus.pump();
                }
            });

            let outcome = tokio::time::timeout(Duration::from_secs(1), request).await?;
            pump.abort();
            eprintln!("add(40, 2) -> {outcome:?}");
            Ok::<(), Box<dyn std::error::Error>>(())
        })
        .await
}
