use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use framebridge_frame::WireFormat;
use framebridge_peer::{
    Client, Discovery, EndpointConfig, Host, Outcome, PendingRequest, RequestHandle,
};
use framebridge_schema::SchemaRegistry;
use framebridge_transport::{ContextId, LocalBus};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cmd::DemoArgs;
use crate::exit::{
    peer_error, schema_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS,
};
use crate::output::{new_table, payload_preview, print_json, wire_name, OutputFormat};

const MIN_ROUNDS: u64 = 64;
const MAX_ROUNDS: u64 = 10_000;

#[derive(Serialize, Clone, Debug)]
struct DemoRecord {
    endpoint: String,
    context: String,
    kind: &'static str,
    command: &'static str,
    detail: Value,
}

#[derive(Serialize)]
struct DemoOutput {
    schema_id: &'static str,
    domain: String,
    discovery: &'static str,
    wire: &'static str,
    contexts: usize,
    clients: usize,
    rounds: u64,
    simulated_ms: u64,
    completed: usize,
    pending: usize,
    records: Vec<DemoRecord>,
}

type Records = Rc<RefCell<Vec<DemoRecord>>>;

struct DemoClient {
    client: Client,
    request: PendingRequest,
    tag: String,
    context: String,
}

pub fn run(args: DemoArgs, format: OutputFormat) -> CliResult<i32> {
    let config = endpoint_config(&args);
    let bus = Rc::new(LocalBus::new());
    let top = bus.add_root("top");
    let sites = build_tree(&bus, top, args.frames, args.depth, args.relay)?;
    let records: Records = Rc::new(RefCell::new(Vec::new()));

    let mut host = Host::bind(Rc::clone(&bus), top, config.clone().with_tag("host"))
        .map_err(|err| peer_error("bind host", err))?;
    if let Some(dir) = &args.validate {
        let registry =
            SchemaRegistry::from_directory(dir).map_err(|err| schema_error("load schemas", err))?;
        tracing::info!(commands = ?registry.commands(), "schema validation enabled");
        host = host.with_schema_registry(Arc::new(registry));
    }
    host.on_request("add", serve_add)
        .map_err(|err| peer_error("register handler", err))?;

    let mut clients = Vec::with_capacity(sites.len());
    for (index, site) in sites.iter().enumerate() {
        clients.push(spawn_client(&bus, *site, index, &config, &records)?);
    }

    host.dispatch(
        "hello",
        Some(json!({ "from": "host", "clients": clients.len() })),
    )
    .map_err(|err| peer_error("dispatch", err))?;

    let (rounds, simulated) = drive(&bus, &host, &clients, &config)?;

    let mut pending = 0;
    for entry in &clients {
        if !entry.request.is_complete() {
            pending += 1;
            records.borrow_mut().push(DemoRecord {
                endpoint: entry.tag.clone(),
                context: entry.context.clone(),
                kind: "pending",
                command: "add",
                detail: Value::Null,
            });
        }
        entry.client.shutdown();
    }
    host.shutdown();

    let records = records.borrow().clone();
    let output = DemoOutput {
        schema_id: "https://schemas.3leaps.dev/framebridge/cli/v1/demo-run.schema.json",
        domain: args.domain.clone(),
        discovery: match config.discovery {
            Discovery::BroadcastAll => "broadcast-all",
            Discovery::RelayOnly => "relay-only",
        },
        wire: wire_name(config.wire),
        contexts: 1 + usize::from(args.frames) * usize::from(args.depth),
        clients: clients.len(),
        rounds,
        simulated_ms: simulated.as_millis() as u64,
        completed: clients.len() - pending,
        pending,
        records,
    };
    print_demo(&output, format);
    Ok(SUCCESS)
}

fn endpoint_config(args: &DemoArgs) -> EndpointConfig {
    let mut config = EndpointConfig::default()
        .with_domain(args.domain.clone())
        .with_gather(Duration::from_millis(args.gather))
        .with_discovery(if args.relay {
            Discovery::RelayOnly
        } else {
            Discovery::BroadcastAll
        });
    if args.legacy {
        config = config.with_wire(WireFormat::Legacy);
    }
    if let Some(ms) = args.request_timeout {
        config = config.with_request_timeout(Duration::from_millis(ms));
    }
    config
}

/// `frames` chains of `depth` contexts under `top`; returns where clients go.
///
/// Without `relay`, clients go to the chain ends. With `relay`, every context of
/// the first chain is tagged as its parent's relay and holds a client, since
/// relay-only discovery never reaches the other frames.
fn build_tree(
    bus: &LocalBus,
    top: ContextId,
    frames: u16,
    depth: u16,
    relay: bool,
) -> CliResult<Vec<ContextId>> {
    let mut sites = Vec::with_capacity(usize::from(frames));
    for frame in 0..frames {
        let mut parent = top;
        for level in 0..depth {
            let name = if level == 0 {
                format!("frame-{frame}")
            } else {
                format!("frame-{frame}.{level}")
            };
            let context = bus
                .add_child(parent, &name)
                .map_err(|err| transport_error("build tree", err))?;
            if relay && frame == 0 {
                bus.set_relay(parent, Some(context))
                    .map_err(|err| transport_error("tag relay", err))?;
                sites.push(context);
            }
            parent = context;
        }
        if !relay {
            sites.push(parent);
        }
    }
    Ok(sites)
}

fn spawn_client(
    bus: &Rc<LocalBus>,
    context: ContextId,
    index: usize,
    config: &EndpointConfig,
    records: &Records,
) -> CliResult<DemoClient> {
    let tag = format!("client-{index}");
    let name = bus.name(context).unwrap_or_else(|| context.to_string());
    let client = Client::connect(Rc::clone(bus), context, config.clone().with_tag(tag.clone()))
        .map_err(|err| peer_error("connect client", err))?;

    let record = recorder(records, &tag, &name);
    client
        .on_event("hello", move |payload| {
            record("event", "hello", payload.cloned().unwrap_or(Value::Null));
        })
        .map_err(|err| peer_error("register event", err))?;

    let request = client
        .request_with("add", (index, index + 1))
        .map_err(|err| peer_error("request", err))?;
    let record = recorder(records, &tag, &name);
    request.on_progress(move |state| record("progress", "add", state.clone()));
    let record = recorder(records, &tag, &name);
    request.on_result(move |outcome| match outcome {
        Outcome::Success(values) => record("result", "add", Value::Array(values)),
        Outcome::Failure(error) => record("failed", "add", error),
        Outcome::TimedOut => record("timed-out", "add", Value::Null),
    });

    Ok(DemoClient {
        client,
        request,
        tag,
        context: name,
    })
}

fn recorder(
    records: &Records,
    endpoint: &str,
    context: &str,
) -> impl Fn(&'static str, &'static str, Value) + 'static {
    let records = Rc::clone(records);
    let endpoint = endpoint.to_string();
    let context = context.to_string();
    move |kind, command, detail| {
        records.borrow_mut().push(DemoRecord {
            endpoint: endpoint.clone(),
            context: context.clone(),
            kind,
            command,
            detail,
        });
    }
}

fn serve_add(handle: RequestHandle, args: &[Value]) {
    let result = handle
        .progress(json!("50%"))
        .and_then(|()| match sum(args) {
            Some(total) => handle.respond(vec![total]),
            None => handle.fail(json!({ "error": "add expects numbers" })),
        });
    if let Err(err) = result {
        tracing::warn!(correlation_id = %handle.id(), error = %err, "add handler could not reply");
    }
}

fn sum(args: &[Value]) -> Option<Value> {
    if let Some(ints) = args.iter().map(Value::as_i64).collect::<Option<Vec<i64>>>() {
        return ints
            .into_iter()
            .try_fold(0i64, i64::checked_add)
            .map(Value::from);
    }
    let floats = args.iter().map(Value::as_f64).collect::<Option<Vec<f64>>>()?;
    Some(json!(floats.into_iter().sum::<f64>()))
}

/// Advance a simulated clock one gather interval per round, ticking every
/// endpoint and pumping the bus, until traffic settles.
fn drive(
    bus: &LocalBus,
    host: &Host,
    clients: &[DemoClient],
    config: &EndpointConfig,
) -> CliResult<(u64, Duration)> {
    let gather = host.gather();
    let limit = match config.request_timeout {
        Some(timeout) => {
            let needed = timeout.as_millis() / gather.as_millis().max(1);
            (needed as u64 + 4).clamp(MIN_ROUNDS, MAX_ROUNDS)
        }
        None => MIN_ROUNDS,
    };

    let start = Instant::now();
    let mut now = start;
    let mut rounds = 0;
    while rounds < limit {
        rounds += 1;
        now += gather;

        host.tick(now).map_err(|err| peer_error("host flush", err))?;
        for entry in clients {
            entry
                .client
                .tick(now)
                .map_err(|err| peer_error("client flush", err))?;
        }
        let delivered = bus.pump();

        let queued = host.queued() + clients.iter().map(|c| c.client.queued()).sum::<usize>();
        let waiting = clients.iter().any(|c| !c.request.is_complete());
        let can_expire = config.request_timeout.is_some() && waiting;
        if delivered == 0 && queued == 0 && !can_expire {
            break;
        }
    }

    let leftover = host.queued() + clients.iter().map(|c| c.client.queued()).sum::<usize>();
    if leftover > 0 || bus.in_flight() > 0 {
        return Err(CliError::new(
            INTERNAL,
            format!("traffic did not settle after {rounds} rounds"),
        ));
    }
    tracing::debug!(rounds, delivered = bus.delivered(), dropped = bus.dropped(), "demo settled");
    Ok((rounds, now - start))
}

fn print_demo(output: &DemoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ENDPOINT", "CONTEXT", "KIND", "COMMAND", "DETAIL"]);
            for record in &output.records {
                table.add_row(vec![
                    record.endpoint.clone(),
                    record.context.clone(),
                    record.kind.to_string(),
                    record.command.to_string(),
                    payload_preview(Some(&record.detail)),
                ]);
            }
            println!("{table}");
            println!("{}", summary_line(output));
        }
        OutputFormat::Pretty => {
            for record in &output.records {
                println!(
                    "{} [{}] {} {} {}",
                    record.endpoint, record.context, record.kind, record.command, record.detail
                );
            }
            println!("{}", summary_line(output));
        }
        OutputFormat::Raw => {
            for record in &output.records {
                print_json(record);
            }
        }
    }
}

fn summary_line(output: &DemoOutput) -> String {
    format!(
        "clients={} completed={} pending={} discovery={} wire={} domain={:?} rounds={} simulated={}ms",
        output.clients,
        output.completed,
        output.pending,
        output.discovery,
        output.wire,
        output.domain,
        output.rounds,
        output.simulated_ms
    )
}

#[cfg(test)]
mod tests {
    use framebridge_transport::ContextTree;

    use super::*;

    #[test]
    fn sum_prefers_integers() {
        assert_eq!(sum(&[json!(2), json!(3)]), Some(json!(5)));
        assert_eq!(sum(&[]), Some(json!(0)));
    }

    #[test]
    fn sum_falls_back_to_floats() {
        assert_eq!(sum(&[json!(1.5), json!(1)]), Some(json!(2.5)));
    }

    #[test]
    fn sum_rejects_non_numbers_and_overflow() {
        assert_eq!(sum(&[json!("2")]), None);
        assert_eq!(sum(&[json!(i64::MAX), json!(1)]), None);
    }

    #[test]
    fn tree_has_requested_shape() {
        let bus = LocalBus::new();
        let top = bus.add_root("top");
        let leaves = build_tree(&bus, top, 2, 3, false).unwrap();
        assert_eq!(leaves.len(), 2);
        assert_eq!(bus.name(leaves[1]).as_deref(), Some("frame-1.2"));
    }

    #[test]
    fn relay_tree_places_clients_on_the_relay_chain() {
        let bus = LocalBus::new();
        let top = bus.add_root("top");
        let sites = build_tree(&bus, top, 3, 2, true).unwrap();
        let names: Vec<_> = sites.iter().filter_map(|site| bus.name(*site)).collect();
        assert_eq!(names, vec!["frame-0", "frame-0.1"]);
        assert_eq!(bus.relay_of(top).unwrap(), Some(sites[0]));
        assert_eq!(bus.relay_of(sites[0]).unwrap(), Some(sites[1]));
    }
}
