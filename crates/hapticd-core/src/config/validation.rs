//! Config validation - warns about unknown fields

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate JSON config and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    let expected = expected_config_keys();
    let unknowns = find_unknown_keys(&value, &expected, "");

    for path in unknowns {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Find unknown keys in JSON value compared to expected keys.
/// Returns paths like "server.unknownField"; array entries are checked
/// against the same expected keys and reported as "simulation.devices[0].x".
fn find_unknown_keys(value: &Value, expected: &ExpectedKeys, prefix: &str) -> Vec<String> {
    let mut unknowns = Vec::new();

    let Value::Object(obj) = value else {
        return unknowns;
    };

    for (key, child) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if let Some(nested) = expected.nested.get(key.as_str()) {
            match child {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        unknowns.extend(find_unknown_keys(item, nested, &format!("{path}[{i}]")));
                    }
                }
                _ => unknowns.extend(find_unknown_keys(child, nested, &path)),
            }
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }

    unknowns
}

/// Expected keys for a config section.
/// `fields` are leaf fields, `nested` are nested objects with their own expected keys.
struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }
}

fn expected_config_keys() -> ExpectedKeys {
    let server_keys = ExpectedKeys::new(&[
        "serverName",
        "maxPingTimeMs",
        "minSchemaVersion",
        "pingResetPolicy",
    ]);

    let device_keys = ExpectedKeys::new(&[
        "identity",
        "name",
        "displayName",
        "vibrators",
        "rotators",
        "linears",
        "battery",
        "rssi",
        "messageTimingGapMs",
    ]);

    let simulation_keys = ExpectedKeys::new(&[]).with_nested("devices", device_keys);

    ExpectedKeys::new(&[])
        .with_nested("server", server_keys)
        .with_nested("simulation", simulation_keys)
}
