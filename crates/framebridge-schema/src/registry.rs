use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use jsonschema::Validator;
use serde_json::{Map, Value};

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::validator::validate_args;

const SCHEMA_SUFFIX: &str = ".schema.json";

/// Command-keyed registry of compiled JSON Schema validators.
///
/// Each schema describes the positional argument array of one command.
pub struct SchemaRegistry {
    validators: BTreeMap<String, Validator>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            validators: BTreeMap::new(),
            config,
        }
    }

    /// Register a schema for a command from a JSON string.
    pub fn register(&mut self, command: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.register_value(command, &schema)
    }

    /// Register a schema for a command from a JSON value.
    pub fn register_value(&mut self, command: &str, schema: &Value) -> Result<()> {
        let mut schema = schema.clone();
        if self.config.strict_mode {
            close_objects(&mut schema);
        }
        let compiled = jsonschema::validator_for(&schema)
            .map_err(|err| SchemaError::CompileFailed(err.to_string()))?;
        self.validators.insert(command.to_string(), compiled);
        Ok(())
    }

    /// Load `<command>.schema.json` files from a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load schemas from a directory with explicit config.
    ///
    /// Symlinked schema files are refused; other files are skipped.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(command) = command_from_file_name(&file_name) else {
                continue;
            };

            let entry_path = entry.path();
            let metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            if metadata.file_type().is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load schema symlink: {file_name}"
                )));
            }
            if !metadata.is_file() {
                continue;
            }

            if registry.validators.len() >= registry.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({})",
                    registry.config.max_schemas_from_directory
                )));
            }

            let content = read_bounded(&entry_path, registry.config.max_schema_file_size)?;
            registry.register(&command, &content)?;
            tracing::debug!(command = %command, file = %file_name, "loaded request schema");
        }

        Ok(registry)
    }

    /// Load from embedded `(command, schema)` pairs.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        let mut registry = Self::new();
        for (command, schema) in schemas {
            registry.register(command, schema)?;
        }
        Ok(registry)
    }

    /// Validate the positional arguments of a request for `command`.
    pub fn validate(&self, command: &str, args: &[Value]) -> Result<()> {
        match self.validators.get(command) {
            Some(validator) => validate_args(command, &Value::Array(args.to_vec()), validator),
            None if self.config.fail_on_missing_schema => {
                Err(SchemaError::NoSchema(command.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Check if a command has a registered schema.
    pub fn has_schema(&self, command: &str) -> bool {
        self.validators.contains_key(command)
    }

    /// Commands that have registered schemas, sorted.
    pub fn commands(&self) -> Vec<String> {
        self.validators.keys().cloned().collect()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn command_from_file_name(file_name: &str) -> Option<String> {
    let command = file_name.strip_suffix(SCHEMA_SUFFIX)?;
    let valid = !command.is_empty()
        && command
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    valid.then(|| command.to_string())
}

fn read_bounded(path: &Path, max_bytes: usize) -> Result<String> {
    let file = std::fs::File::open(path)
        .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;
    let limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(limit)
        .read_to_string(&mut content)
        .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;
    if content.len() > max_bytes {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large (max {max_bytes} bytes): {}",
            path.display()
        )));
    }
    Ok(content)
}

const NESTED_MAPS: [&str; 5] = [
    "properties",
    "patternProperties",
    "dependentSchemas",
    "$defs",
    "definitions",
];
const NESTED_SINGLE: [&str; 11] = [
    "propertyNames",
    "additionalProperties",
    "unevaluatedProperties",
    "items",
    "contains",
    "additionalItems",
    "unevaluatedItems",
    "not",
    "if",
    "then",
    "else",
];
const NESTED_LISTS: [&str; 4] = ["prefixItems", "allOf", "anyOf", "oneOf"];

/// Add `additionalProperties: false` to every object schema that leaves it open.
fn close_objects(schema: &mut Value) {
    let Value::Object(map) = schema else {
        return;
    };
    if describes_object(map) && !map.contains_key("additionalProperties") {
        map.insert("additionalProperties".to_string(), Value::Bool(false));
    }
    for key in NESTED_MAPS {
        if let Some(Value::Object(children)) = map.get_mut(key) {
            children.values_mut().for_each(close_objects);
        }
    }
    for key in NESTED_SINGLE {
        if let Some(child) = map.get_mut(key) {
            close_objects(child);
        }
    }
    for key in NESTED_LISTS {
        if let Some(Value::Array(children)) = map.get_mut(key) {
            children.iter_mut().for_each(close_objects);
        }
    }
}

fn describes_object(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        _ => ["properties", "patternProperties", "required", "propertyNames"]
            .iter()
            .any(|keyword| map.contains_key(*keyword)),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    const ADD_SCHEMA: &str = r#"{
        "type": "array",
        "items": { "type": "number" },
        "minItems": 2,
        "maxItems": 2
    }"#;

    const USER_SCHEMA: &str = r#"{
        "type": "array",
        "prefixItems": [{
            "type": "object",
            "properties": { "id": { "type": "integer" } },
            "required": ["id"]
        }]
    }"#;

    #[test]
    fn register_and_validate() {
        let mut registry = SchemaRegistry::new();
        registry.register("add", ADD_SCHEMA).unwrap();

        assert!(registry.validate("add", &[json!(2), json!(3)]).is_ok());
        assert!(matches!(
            registry.validate("add", &[json!("two"), json!(3)]),
            Err(SchemaError::ValidationFailed { .. })
        ));
        assert!(registry.validate("add", &[json!(2)]).is_err());
    }

    #[test]
    fn missing_schema_is_permissive_by_default() {
        let registry = SchemaRegistry::new();
        assert!(registry.validate("anything", &[json!({"x": 1})]).is_ok());
    }

    #[test]
    fn missing_schema_fails_when_configured() {
        let registry = SchemaRegistry::with_config(RegistryConfig {
            fail_on_missing_schema: true,
            ..RegistryConfig::default()
        });
        assert!(matches!(
            registry.validate("nope", &[]),
            Err(SchemaError::NoSchema(command)) if command == "nope"
        ));
    }

    #[test]
    fn strict_mode_closes_nested_objects() {
        let mut permissive = SchemaRegistry::new();
        permissive.register("user", USER_SCHEMA).unwrap();
        let mut strict = SchemaRegistry::with_config(RegistryConfig {
            strict_mode: true,
            ..RegistryConfig::default()
        });
        strict.register("user", USER_SCHEMA).unwrap();

        let args = [json!({"id": 1, "extra": true})];
        assert!(permissive.validate("user", &args).is_ok());
        assert!(strict.validate("user", &args).is_err());
        assert!(strict.validate("user", &[json!({"id": 1})]).is_ok());
    }

    #[test]
    fn invalid_schema_fails_compile() {
        let mut registry = SchemaRegistry::new();
        assert!(matches!(
            registry.register("x", r#"{"type":"definitely-not-a-type"}"#),
            Err(SchemaError::CompileFailed(_))
        ));
    }

    #[test]
    fn from_embedded_lists_commands() {
        let registry =
            SchemaRegistry::from_embedded(&[("user", USER_SCHEMA), ("add", ADD_SCHEMA)]).unwrap();
        assert!(registry.has_schema("add"));
        assert_eq!(registry.commands(), vec!["add".to_string(), "user".to_string()]);
    }

    #[test]
    fn from_directory_loads_schema_files_only() {
        let dir = make_temp_schema_dir("from-directory");
        write_schema(&dir, "add.schema.json", ADD_SCHEMA);
        write_schema(&dir, "notes.json", ADD_SCHEMA);
        write_schema(&dir, "bad name.schema.json", ADD_SCHEMA);

        let registry = SchemaRegistry::from_directory(&dir).unwrap();
        assert_eq!(registry.commands(), vec!["add".to_string()]);
        assert!(registry.validate("add", &[json!(1), json!(2)]).is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn directory_limits_are_enforced() {
        let dir = make_temp_schema_dir("limits");
        write_schema(&dir, "a.schema.json", ADD_SCHEMA);
        write_schema(&dir, "b.schema.json", ADD_SCHEMA);

        let count = SchemaRegistry::from_directory_with_config(
            &dir,
            RegistryConfig {
                max_schemas_from_directory: 1,
                ..RegistryConfig::default()
            },
        );
        assert!(matches!(count, Err(SchemaError::LoadFailed(_))));

        let size = SchemaRegistry::from_directory_with_config(
            &dir,
            RegistryConfig {
                max_schema_file_size: 8,
                ..RegistryConfig::default()
            },
        );
        assert!(matches!(size, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_schema_is_rejected() {
        let dir = make_temp_schema_dir("symlink");
        let target = dir.join("target.json");
        std::fs::write(&target, ADD_SCHEMA).unwrap();
        std::os::unix::fs::symlink(&target, dir.join("add.schema.json")).unwrap();

        let result = SchemaRegistry::from_directory(&dir);
        assert!(matches!(result, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn command_names_from_files() {
        assert_eq!(command_from_file_name("add.schema.json").as_deref(), Some("add"));
        assert_eq!(
            command_from_file_name("user.get-v2.schema.json").as_deref(),
            Some("user.get-v2")
        );
        assert_eq!(command_from_file_name(".schema.json"), None);
        assert_eq!(command_from_file_name("add.json"), None);
    }

    fn make_temp_schema_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "framebridge-schema-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_schema(dir: &Path, file_name: &str, contents: &str) {
        std::fs::write(dir.join(file_name), contents.as_bytes()).unwrap();
    }
}
