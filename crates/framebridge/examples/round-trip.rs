//! Host in the top context, two clients in nested contexts, driven by hand.
//!
//! Run with:
//!   cargo run --example round-trip --features peer

use std::rc::Rc;

use framebridge::peer::{Client, EndpointConfig, Host, Outcome};
use framebridge::transport::LocalBus;
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = Rc::new(LocalBus::new());
    let top = bus.add_root("top");
    let left = bus.add_child(top, "left")?;
    let right = bus.add_child(left, "right")?;

    let host = Host::bind(Rc::clone(&bus), top, EndpointConfig::default().with_tag("host"))?;
    host.on_request("add", |handle, args| {
        let _ = handle.progress(json!("50%"));
        let total: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
        if let Err(err) = handle.respond(vec![json!(total)]) {
            eprintln!("respond failed: {err}");
        }
    })?;

    let mut pending = Vec::new();
    for (name, context) in [("left", left), ("right", right)] {
        let client = Client::connect(
            Rc::clone(&bus),
            context,
            EndpointConfig::default().with_tag(name),
        )?;
        client.on_event("hello", move |payload| {
            eprintln!("{name}: hello {payload:?}");
        })?;
        let request = client.request("add", vec![json!(2), json!(3)])?;
        request.on_progress(move |state| eprintln!("{name}: progress {state}"));
        request.on_result(move |outcome| match outcome {
            Outcome::Success(values) => eprintln!("{name}: result {values:?}"),
            other => eprintln!("{name}: {other:?}"),
        });
        pending.push((client, request));
    }
    host.dispatch("hello", Some(json!({"from": "host"})))?;

    // Flush everything, deliver, repeat until quiet.
    loop {
        host.flush()?;
        for (client, _) in &pending {
            client.flush()?;
        }
        if bus.pump() == 0 {
            break;
        }
    }

    for (client, request) in &pending {
        eprintln!("{:?} -> {:?}", client.tag(), request.outcome());
        client.shutdown();
    }
    host.shutdown();
    Ok(())
}
