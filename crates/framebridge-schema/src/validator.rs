use jsonschema::Validator;
use serde_json::Value;

use crate::error::{Result, SchemaError};

/// Reports the first error plus up to three more, joined with `; `.
pub(crate) fn validate_args(command: &str, args: &Value, validator: &Validator) -> Result<()> {
    let mut errors = validator.iter_errors(args);
    if let Some(first) = errors.next() {
        let message = std::iter::once(first)
            .chain(errors.take(3))
            .map(|err| err.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SchemaError::ValidationFailed {
            command: command.to_string(),
            message,
        });
    }
    Ok(())
}
