//! OpenAPI specification parser.
//!
//! Accepts OpenAPI 3.x documents as JSON or YAML, resolves internal
//! references and converts the result into a [`SpecDocument`].

use crate::deref::dereference;
use crate::error::{PipelineError, Result};
use crate::types::SpecDocument;
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Parser for OpenAPI specifications.
pub struct OpenApiParser {
    raw: Value,
}

impl OpenApiParser {
    /// Parse a document from text.
    ///
    /// JSON is tried first, then YAML. `origin` names the source in errors.
    pub fn from_content(content: &str, origin: &str) -> Result<Self> {
        let raw = match serde_json::from_str::<Value>(content) {
            Ok(value) => value,
            Err(json_err) => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(content).map_err(|yaml_err| {
                    PipelineError::spec_load(
                        origin,
                        format!("not JSON ({}) and not YAML ({})", json_err, yaml_err),
                    )
                })?;
                yaml_to_json(yaml)
            }
        };

        if !raw.is_object() {
            return Err(PipelineError::spec_load(origin, "document is not an object"));
        }

        Ok(Self { raw })
    }

    /// Dereference and convert into the typed model.
    pub fn parse(&self) -> Result<SpecDocument> {
        let resolved = dereference(&self.raw)?;
        let document = SpecDocument::from_value(&resolved)?;
        debug!(
            "Parsed {} operations across {} paths",
            document.operation_count(),
            document.paths.len()
        );
        Ok(document)
    }

    /// The raw document as parsed, references intact.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Convert YAML into JSON, stringifying non-string mapping keys
/// (`200:` response codes are integers in YAML).
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                map.insert(yaml_key(key), yaml_to_json(value));
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => s,
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::Null => "null".to_string(),
        other => serde_json::to_string(&yaml_to_json(other)).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpMethod;

    const YAML_SPEC: &str = r#"
openapi: 3.0.0
info:
  title: Carts API
  version: 1.0.0
paths:
  /v2/carts/{cartId}:
    get:
      summary: Get a cart
      parameters:
        - $ref: '#/components/parameters/CartId'
      responses:
        200:
          description: OK
        '404':
          description: Not found
components:
  parameters:
    CartId:
      name: cartId
      in: path
      required: true
      description: The cart identifier
"#;

    #[test]
    fn test_parse_yaml_with_integer_keys_and_refs() {
        let doc = OpenApiParser::from_content(YAML_SPEC, "carts.yaml")
            .unwrap()
            .parse()
            .unwrap();

        assert_eq!(doc.title, "Carts API");
        let op = doc.operation("/v2/carts/{cartId}", HttpMethod::Get).unwrap();
        assert_eq!(op.parameters[0].name, "cartId");
        assert!(op.parameters[0].required);
        assert_eq!(op.responses["200"].description, "OK");
        assert_eq!(op.responses["404"].description, "Not found");
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{"openapi":"3.1.0","paths":{"/v2/carts":{"post":{"summary":"Create"}}}}"#;
        let doc = OpenApiParser::from_content(json, "carts.json")
            .unwrap()
            .parse()
            .unwrap();
        assert!(doc.operation("/v2/carts", HttpMethod::Post).is_some());
    }

    #[test]
    fn test_unparsable_content_is_spec_load_error() {
        let err = OpenApiParser::from_content("openapi: [unclosed", "broken.yaml")
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::SpecLoad { ref origin, .. } if origin == "broken.yaml"));

        let err = OpenApiParser::from_content("just a string", "scalar.yaml")
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::SpecLoad { .. }));
    }
}
