use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use framebridge_frame::{Role, DEFAULT_MAX_MESSAGES};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod demo;
pub mod inspect;
pub mod new_id;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a host and clients over an in-memory context tree.
    Demo(DemoArgs),
    /// Decode a wire payload and print its envelopes.
    Inspect(InspectArgs),
    /// Generate correlation ids.
    NewId(NewIdArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Demo(args) => demo::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::NewId(args) => new_id::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Client contexts nested under the top context.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub frames: u16,
    /// Nesting depth of each client context below the top context.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=16))]
    pub depth: u16,
    /// Tag the first chain of contexts as relays, use relay-only discovery, and
    /// place one client on every context of that chain. Other frames are bystanders.
    #[arg(long)]
    pub relay: bool,
    /// Channel scoping domain shared by every endpoint.
    #[arg(long, default_value = "")]
    pub domain: String,
    /// Batch flush interval in milliseconds (floored to 10).
    #[arg(long, value_name = "MS", default_value_t = 50)]
    pub gather: u64,
    /// Fail client requests still pending after this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub request_timeout: Option<u64>,
    /// Use the legacy string-prefixed wire format (cannot carry a domain).
    #[arg(long)]
    pub legacy: bool,
    /// Schema directory for request validation (`<command>.schema.json`).
    #[arg(long, value_name = "DIR")]
    pub validate: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum RoleArg {
    Host,
    Client,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Host => Role::Host,
            RoleArg::Client => Role::Client,
        }
    }
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Wire payload text: a batch object or a legacy prefixed string.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub json: Option<String>,
    /// Read the wire payload from a file.
    #[arg(long, required_unless_present = "json")]
    pub file: Option<PathBuf>,
    /// Sending role to decode as. Default: try host, then client.
    #[arg(long)]
    pub role: Option<RoleArg>,
    /// Maximum envelopes accepted from one batch.
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGES)]
    pub max_messages: usize,
}

#[derive(Args, Debug)]
pub struct NewIdArgs {
    /// Number of ids to generate.
    #[arg(long, short = 'n', default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub count: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
