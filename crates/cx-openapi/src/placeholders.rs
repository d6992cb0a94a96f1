//! `{placeholder}` handling for path templates.

use crate::error::{PipelineError, Result};
use cx_core::SessionContext;
use std::collections::HashSet;
use tracing::warn;

/// Names of the `{placeholders}` in `path`, in order of appearance.
pub fn placeholders(path: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let name = &after[..close];
        if !name.is_empty() {
            names.push(name);
        }
        rest = &after[close + 1..];
    }
    names
}

/// Replace every placeholder with its session binding.
///
/// Values are percent-encoded as a single path segment, so an id holding
/// `/`, `?` or `#` cannot change the route. A placeholder without a binding
/// is an error and nothing is ever sent with a literal `{name}` in the URL.
pub fn substitute(path: &str, session: &SessionContext) -> Result<String> {
    let mut out = path.to_string();
    for name in placeholders(path) {
        let value = session.binding(name).ok_or_else(|| {
            PipelineError::UnresolvedPlaceholder(name.to_string(), path.to_string())
        })?;
        out = out.replace(&format!("{{{}}}", name), &urlencoding::encode(value));
    }
    Ok(out)
}

/// Literal path segments of every `/path` mentioned in `text`.
pub fn literal_segments(text: &str) -> HashSet<&str> {
    text.split_whitespace()
        .filter(|token| token.starts_with('/'))
        .flat_map(|token| token.split('/'))
        .map(|segment| segment.trim_end_matches([',', '.', ':', ';', ')']))
        .filter(|segment| !segment.is_empty() && !segment.starts_with('{'))
        .collect()
}

/// Turn path segments that equal a session-bound value back into
/// `{name}` placeholders.
///
/// Segments in `literals` are documented path words and stay as they are,
/// whatever the session binds.
pub fn retemplate(path: &str, session: &SessionContext, literals: &HashSet<&str>) -> String {
    let bindings: Vec<(&str, &str)> = session
        .bindings()
        .filter(|(_, value)| !value.is_empty())
        .collect();
    if bindings.is_empty() {
        return path.to_string();
    }

    let segments: Vec<String> = path
        .split('/')
        .map(|segment| {
            if literals.contains(segment) {
                return segment.to_string();
            }
            match bindings.iter().find(|(_, value)| *value == segment) {
                Some((name, value)) => {
                    warn!(
                        "Plan path carried bound value '{}', restoring placeholder {{{}}}",
                        value, name
                    );
                    format!("{{{}}}", name)
                }
                None => segment.to_string(),
            }
        })
        .collect();
    segments.join("/")
}
