//! Late-bound value substitution
//!
//! Resource records may reference attributes of other resources that are
//! only known once those resources have been provisioned - the cluster
//! name, the network partition identifier, the registry URI, the region.
//! Such references are written as `${...}` placeholders and rendered at
//! apply time against the [`ResolvedValues`] accumulated from resource
//! outputs.
//!
//! Rendering is strict: a placeholder whose value has not been resolved
//! yet is an error, which is exactly the dependency-ordering contract
//! applied to data flow. Strings without placeholders pass through
//! untouched, so shell `$VAR` references in build scripts are never
//! interpreted.

use std::collections::BTreeMap;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;

use crate::{Error, Result};

/// Returns true if the string contains `${...}` placeholder syntax
pub fn has_placeholders(s: &str) -> bool {
    s.contains("${")
}

/// Values resolved from provisioned resource outputs
///
/// Keys are dotted paths (`cluster.name`, `vpc.id`, `repository.uri`);
/// rendering exposes them as nested objects to the template engine.
#[derive(Clone, Debug, Default)]
pub struct ResolvedValues {
    values: BTreeMap<String, String>,
}

impl ResolvedValues {
    /// Create an empty value set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one resolved value under a dotted key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.values.insert(key.into(), value.into());
    }

    /// Merge a batch of outputs, later writers winning
    pub fn merge(&mut self, outputs: BTreeMap<String, String>) {
        self.values.extend(outputs);
    }

    /// Look up a resolved value by dotted key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// All resolved values, by dotted key
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build the nested context the template engine renders against
    fn context(&self) -> Value {
        let mut root = Value::Object(serde_json::Map::new());
        for (key, value) in &self.values {
            let mut node = &mut root;
            let mut parts = key.split('.').peekable();
            while let Some(part) = parts.next() {
                let map = node
                    .as_object_mut()
                    .expect("context nodes are always objects");
                if parts.peek().is_none() {
                    let _ = map.insert(part.to_string(), Value::String(value.clone()));
                    break;
                }
                node = map
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
            }
        }
        root
    }
}

/// Template engine configured for `${...}` placeholder syntax
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create an engine with strict undefined behavior
    ///
    /// Strictness is the point: rendering must fail, not silently emit an
    /// empty string, when a referenced resource has not completed yet.
    pub fn new() -> Result<Self> {
        let syntax = SyntaxConfig::builder()
            .block_delimiters("{%", "%}")
            .variable_delimiters("${", "}")
            .comment_delimiters("{#", "#}")
            .build()
            .map_err(|e| Error::template(e.to_string()))?;

        let mut env = Environment::new();
        env.set_syntax(syntax);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Ok(Self { env })
    }

    /// Render one string against resolved values
    pub fn render(&self, template: &str, values: &ResolvedValues) -> Result<String> {
        if !has_placeholders(template) {
            return Ok(template.to_string());
        }
        let ctx = minijinja::Value::from_serialize(values.context());
        self.env
            .render_str(template, ctx)
            .map_err(|e| Error::template(format!("'{template}': {e}")))
    }

    /// Render every string in a JSON value, recursively
    ///
    /// This is how whole resource records are resolved before submission:
    /// the record is serialized, each embedded string rendered, and the
    /// resolved payload handed to the provisioning API.
    pub fn render_json(&self, value: &Value, values: &ResolvedValues) -> Result<Value> {
        match value {
            Value::String(s) => Ok(Value::String(self.render(s, values)?)),
            Value::Array(items) => {
                let rendered: Result<Vec<Value>> = items
                    .iter()
                    .map(|item| self.render_json(item, values))
                    .collect();
                Ok(Value::Array(rendered?))
            }
            Value::Object(map) => {
                let mut rendered = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    let _ = rendered.insert(key.clone(), self.render_json(item, values)?);
                }
                Ok(Value::Object(rendered))
            }
            other => Ok(other.clone()),
        }
    }
}
