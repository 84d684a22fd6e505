use anyhow::anyhow;
use jsonschema::JSONSchema;
use serde_json::Value;

/// Compile the bundled job manifest schema
pub fn load_schema() -> anyhow::Result<JSONSchema> {
    /// included job manifest schema
    static JOB_SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/job.json"));
    let schema: Value = serde_json::from_str(JOB_SCHEMA)?;
    compile_schema(&schema)
}

fn compile_schema(schema: &Value) -> anyhow::Result<JSONSchema> {
    JSONSchema::options()
        .compile(schema)
        .map_err(|err| anyhow!("invalid job manifest schema: {err}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bundled_schema_accepts_manifests() {
        let schema = load_schema().unwrap();
        assert!(schema.is_valid(&json!({"name": "relax_1", "arguments": {"cores": 4}})));
        assert!(schema.is_valid(&json!({"name": "relax_2"})));
        assert!(!schema.is_valid(&json!({"arguments": {}})));
        assert!(!schema.is_valid(&json!({"name": "../escape"})));
        assert!(!schema.is_valid(&json!({"name": "a", "arguments": [1, 2]})));
        assert!(!schema.is_valid(&json!({"name": "a", "extra": true})));
    }
}
