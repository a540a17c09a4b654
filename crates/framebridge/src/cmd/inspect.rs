use framebridge_frame::{decode_batch, FrameConfig, Role};
use serde_json::Value;

use crate::cmd::InspectArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_batch, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let text = match (&args.json, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("read {}", path.display()), err))?,
        (None, None) => {
            return Err(CliError::new(USAGE, "one of --json or --file is required"));
        }
    };
    let raw = parse_payload(&text);
    let config = FrameConfig {
        max_messages: args.max_messages,
    };

    let roles = match args.role {
        Some(role) => vec![Role::from(role)],
        None => vec![Role::Host, Role::Client],
    };
    for role in roles {
        match decode_batch(&raw, role, &config) {
            Ok(Some(batch)) => {
                tracing::debug!(role = %role, messages = batch.messages.len(), "decoded batch");
                print_batch(&batch, format);
                return Ok(SUCCESS);
            }
            Ok(None) => continue,
            Err(err) => return Err(frame_error(&format!("decode as {role}"), err)),
        }
    }

    Err(CliError::new(
        DATA_INVALID,
        "input carries no framebridge marker for the requested role",
    ))
}

/// JSON text as-is; anything else is taken as a raw string so unquoted
/// legacy payloads (`BRHOST#[...]`) can be pasted directly.
fn parse_payload(text: &str) -> Value {
    let trimmed = text.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unquoted_legacy_text_becomes_string() {
        assert_eq!(
            parse_payload("BRHOST#[{\"ts\":1}]\n"),
            json!("BRHOST#[{\"ts\":1}]")
        );
    }

    #[test]
    fn json_text_is_parsed() {
        assert_eq!(parse_payload(r#"{"bridge": "BRHOST#2"}"#), json!({"bridge": "BRHOST#2"}));
    }
}
