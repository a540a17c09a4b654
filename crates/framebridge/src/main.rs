mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "framebridge",
    version,
    about = "Cross-context request/response and event broadcast toolkit"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", env = "FRAMEBRIDGE_FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "FRAMEBRIDGE_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "FRAMEBRIDGE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::debug!(code = err.code, "command failed");
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_demo_subcommand() {
        let cli = Cli::try_parse_from([
            "framebridge",
            "demo",
            "--frames",
            "4",
            "--depth",
            "2",
            "--domain",
            "a",
            "--gather",
            "25",
        ])
        .expect("demo args should parse");

        match cli.command {
            Command::Demo(args) => {
                assert_eq!(args.frames, 4);
                assert_eq!(args.depth, 2);
                assert_eq!(args.domain, "a");
                assert_eq!(args.gather, 25);
                assert!(!args.relay);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_inspect_inputs() {
        let err = Cli::try_parse_from([
            "framebridge",
            "inspect",
            "--json",
            "{}",
            "--file",
            "/tmp/batch.json",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_zero_frames() {
        let err = Cli::try_parse_from(["framebridge", "demo", "--frames", "0"])
            .expect_err("zero frames should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_new_id_count() {
        let cli = Cli::try_parse_from(["framebridge", "new-id", "--count", "3"])
            .expect("new-id args should parse");
        assert!(matches!(cli.command, Command::NewId(ref args) if args.count == 3));
    }

    #[test]
    fn global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["framebridge", "version", "--log-level", "debug"])
            .expect("global flags should parse anywhere");
        assert!(matches!(cli.log_level, LogLevel::Debug));
    }
}
