//! Internal `$ref` resolution.
//!
//! Every `#/...` reference is replaced by a copy of its target, with sibling
//! keys of the reference object laid over the target. A reference that points
//! back into its own resolution chain is cut and replaced by a stub object so
//! the output is always a finite tree without `$ref` keys.

use crate::error::{PipelineError, Result};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

const REF_KEY: &str = "$ref";

/// Resolve every internal reference in `root`.
pub fn dereference(root: &Value) -> Result<Value> {
    let mut resolver = Resolver {
        root,
        memo: HashMap::new(),
        stack: Vec::new(),
    };
    resolver.resolve(root).map(|(value, _)| value)
}

struct Resolver<'a> {
    root: &'a Value,
    // only references whose expansion never hit a cycle cut are memoized,
    // since a cut depends on the chain that led to it
    memo: HashMap<String, Value>,
    stack: Vec<String>,
}

impl Resolver<'_> {
    /// Returns the resolved node and whether a cycle was cut inside it.
    fn resolve(&mut self, node: &Value) -> Result<(Value, bool)> {
        match node {
            Value::Object(map) => match map.get(REF_KEY).and_then(Value::as_str) {
                Some(reference) => self.resolve_reference(reference, map),
                None => {
                    let mut out = Map::with_capacity(map.len());
                    let mut cut = false;
                    for (key, value) in map {
                        let (resolved, child_cut) = self.resolve(value)?;
                        cut |= child_cut;
                        out.insert(key.clone(), resolved);
                    }
                    Ok((Value::Object(out), cut))
                }
            },
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut cut = false;
                for item in items {
                    let (resolved, child_cut) = self.resolve(item)?;
                    cut |= child_cut;
                    out.push(resolved);
                }
                Ok((Value::Array(out), cut))
            }
            other => Ok((other.clone(), false)),
        }
    }

    fn resolve_reference(
        &mut self,
        reference: &str,
        node: &Map<String, Value>,
    ) -> Result<(Value, bool)> {
        let Some(pointer) = reference.strip_prefix('#') else {
            return Err(PipelineError::InvalidSpec(format!(
                "external reference '{}' is not supported",
                reference
            )));
        };

        let (mut target, mut cut) = if self.stack.iter().any(|r| r == reference) {
            (circular_stub(reference), true)
        } else if let Some(done) = self.memo.get(reference) {
            (done.clone(), false)
        } else {
            let root = self.root;
            let raw = root.pointer(pointer).ok_or_else(|| {
                PipelineError::InvalidSpec(format!("unresolvable reference '{}'", reference))
            })?;
            self.stack.push(reference.to_string());
            let resolved = self.resolve(raw);
            self.stack.pop();
            let (value, cut) = resolved?;
            if !cut {
                self.memo.insert(reference.to_string(), value.clone());
            }
            (value, cut)
        };

        let siblings: Vec<_> = node.iter().filter(|(k, _)| k.as_str() != REF_KEY).collect();
        if !siblings.is_empty()
            && let Value::Object(ref mut target_map) = target
        {
            for (key, value) in siblings {
                let (resolved, child_cut) = self.resolve(value)?;
                cut |= child_cut;
                target_map.insert(key.clone(), resolved);
            }
        }

        Ok((target, cut))
    }
}

fn circular_stub(reference: &str) -> Value {
    let name = reference.rsplit('/').next().unwrap_or(reference);
    json!({
        "type": "object",
        "description": format!("Circular reference to {}", name),
    })
}

/// True when no `$ref` key remains anywhere in `value`.
pub fn is_fully_resolved(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.contains_key(REF_KEY) && map.values().all(is_fully_resolved),
        Value::Array(items) => items.iter().all(is_fully_resolved),
        _ => true,
    }
}
