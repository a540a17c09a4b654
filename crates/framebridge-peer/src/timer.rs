use std::rc::Rc;
use std::time::Duration;

use crate::batcher::FlushTimer;

/// [`FlushTimer`] backed by the tokio timer.
///
/// Each schedule spawns a local task that sleeps for the gather interval
/// and then fires the flush. Endpoints are `!Send`, so the task is spawned
/// with [`tokio::task::spawn_local`].
///
/// # Panics
///
/// Arming panics when called outside a [`tokio::task::LocalSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl TokioTimer {
    /// Shared instance ready for `with_timer`.
    pub fn shared() -> Rc<dyn FlushTimer> {
        Rc::new(TokioTimer)
    }
}

impl FlushTimer for TokioTimer {
    fn arm(&self, delay: Duration, fire: Box<dyn FnOnce()>) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            fire();
        });
    }
}

#[cfg(test)]
mod tests {
    use framebridge_transport::LocalBus;
    use serde_json::json;
    use tokio::task::LocalSet;

    use super::*;
    use crate::config::{EndpointConfig, DEFAULT_GATHER};
    use crate::{Client, Host, Outcome};

    #[tokio::test(start_paused = true)]
    async fn flush_waits_for_gather_interval() {
        LocalSet::new()
            .run_until(async {
                let bus = Rc::new(LocalBus::new());
                let top = bus.add_root("top");
                let host = Host::bind(Rc::clone(&bus), top, EndpointConfig::default())
                    .unwrap()
                    .with_timer(TokioTimer::shared());

                host.dispatch("a", None).unwrap();
                host.dispatch("b", None).unwrap();
                tokio::time::sleep(DEFAULT_GATHER - Duration::from_millis(1)).await;
                assert_eq!(bus.in_flight(), 0);
                assert_eq!(host.queued(), 2);

                tokio::time::sleep(Duration::from_millis(2)).await;
                assert_eq!(host.queued(), 0);
                assert_eq!(bus.in_flight(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn timed_round_trip_resolves_awaited_request() {
        LocalSet::new()
            .run_until(async {
                let bus = Rc::new(LocalBus::new());
                let top = bus.add_root("top");
                let frame = bus.add_child(top, "frame").unwrap();
                let gather = Duration::from_millis(20);
                let config = EndpointConfig::default().with_gather(gather);

                let host = Host::bind(Rc::clone(&bus), top, config.clone())
                    .unwrap()
                    .with_timer(TokioTimer::shared());
                let client = Client::connect(Rc::clone(&bus), frame, config)
                    .unwrap()
                    .with_timer(TokioTimer::shared());
                host.on_request("add", |handle, args| {
                    let total: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
                    handle.respond(vec![json!(total)]).unwrap();
                })
                .unwrap();

                let pending = client.request("add", vec![json!(2), json!(3)]).unwrap();
                let step = gather + Duration::from_millis(1);
                for _ in 0..2 {
                    tokio::time::sleep(step).await;
                    bus.pump();
                }

                assert_eq!(pending.await, Outcome::Success(vec![json!(5)]));
                assert_eq!(client.pending_count(), 0);
            })
            .await;
    }
}
