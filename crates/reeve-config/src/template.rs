//! Template rendering for `.tmpl` configuration files.
//!
//! Templated files are rendered against the `templateData` of the include that
//! references them before they are decoded. Supported syntax:
//! - `${name}` - Top-level value
//! - `${deploy.targets.0.host}` - Nested mapping keys and sequence indices
//! - `${name:-fallback}` - Fallback for undefined or null values
//! - `$$` - A literal `$`
//!
//! Strings, numbers and booleans render verbatim, null renders empty, and
//! mappings/sequences render as inline JSON, which is valid YAML flow syntax.
//!
//! This is not Go `text/template`: actions such as `{{ .name }}` or
//! `{{ range .items }}` are left as written, so configurations using them must
//! be converted to `${...}` references.

use regex::{Captures, Regex};
use serde_yaml::Value;
use std::sync::LazyLock;

use crate::TemplateError;

// Regex for matching $$ and ${path[:-fallback]}
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(\$)|\{\s*([A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)*)\s*(?::-([^}]*))?\})").unwrap()
});

/// Renders configuration fragments against template data.
#[derive(Debug, Clone, Copy)]
pub struct TemplateRenderer<'a> {
    data: &'a Value,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(data: &'a Value) -> Self {
        Self { data }
    }

    /// Resolve a dotted path against the template data.
    pub fn resolve(&self, path: &str) -> Option<&'a Value> {
        path.split('.').try_fold(self.data, |current, segment| {
            match untag(current) {
                Value::Mapping(mapping) => mapping.get(segment),
                Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
        })
    }

    /// Render all variables in `input`.
    pub fn render(&self, input: &str) -> Result<String, TemplateError> {
        let mut output = String::with_capacity(input.len());
        let mut last = 0;

        for caps in VAR_REGEX.captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            output.push_str(&input[last..whole.start()]);
            output.push_str(&self.expand(&caps)?);
            last = whole.end();
        }

        output.push_str(&input[last..]);
        Ok(output)
    }

    fn expand(&self, caps: &Captures<'_>) -> Result<String, TemplateError> {
        if caps.get(1).is_some() {
            return Ok("$".to_string());
        }

        let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let fallback = caps.get(3).map(|m| m.as_str());

        match (self.resolve(name).map(untag), fallback) {
            (None | Some(Value::Null), Some(fallback)) => Ok(fallback.to_string()),
            (None, None) => Err(TemplateError::Undefined(name.to_string())),
            (Some(value), _) => render_value(name, value),
        }
    }
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn render_value(name: &str, value: &Value) -> Result<String, TemplateError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Tagged(tagged) => render_value(name, &tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => {
            serde_json::to_string(value).map_err(|e| TemplateError::NotRenderable {
                name: name.to_string(),
                message: e.to_string(),
            })
        }
    }
}
