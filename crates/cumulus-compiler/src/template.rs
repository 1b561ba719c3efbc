//! The output document: a named, ordered collection of typed resources.

use crate::CompileError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description")]
    pub description: String,
    /// Kept in emission order.
    #[serde(rename = "Resources")]
    pub resources: IndexMap<String, Resource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub kind: String,
    pub properties: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Resource {
    pub fn new(kind: &str, properties: Value) -> Self {
        Self {
            kind: kind.to_owned(),
            properties,
            depends_on: Vec::new(),
            update_policy: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn depends_on(mut self, name: &str) -> Self {
        self.depends_on.push(name.to_owned());
        self
    }

    #[must_use]
    pub fn with_update_policy(mut self, policy: Option<Value>) -> Self {
        self.update_policy = policy;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Names of every resource this one points at, in discovery order.
    pub fn references(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_refs(&self.properties, &mut out);
        if let Some(policy) = &self.update_policy {
            collect_refs(policy, &mut out);
        }
        if let Some(metadata) = &self.metadata {
            collect_refs(metadata, &mut out);
        }
        out.extend(self.depends_on.iter().cloned());
        out
    }
}

pub fn ref_to(name: &str) -> Value {
    json!({ "Ref": name })
}

pub fn get_att(name: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [name, attribute] })
}

fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                out.push(target.clone());
            }
            if let Some(Value::Array(args)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(target)) = args.first() {
                    out.push(target.clone());
                }
            }
            for v in map.values() {
                collect_refs(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_refs(v, out);
            }
        }
        _ => {}
    }
}

impl Template {
    pub fn new(description: &str) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_owned(),
            description: description.to_owned(),
            resources: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: String, resource: Resource) -> Result<(), CompileError> {
        if self.resources.contains_key(&name) {
            return Err(CompileError::DuplicateResource(name));
        }
        self.resources.insert(name, resource);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn of_kind<'t>(&'t self, kind: &'t str) -> impl Iterator<Item = (&'t str, &'t Resource)> {
        self.resources
            .iter()
            .filter(move |(_, r)| r.kind == kind)
            .map(|(n, r)| (n.as_str(), r))
    }

    /// `(from, to)` pairs whose target is not a resource in this template.
    ///
    /// Pseudo parameters such as `AWS::Region` are never dangling.
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        let mut dangling = Vec::new();
        for (name, resource) in &self.resources {
            for target in resource.references() {
                if !target.contains("::") && !self.resources.contains_key(&target) {
                    dangling.push((name.clone(), target));
                }
            }
        }
        dangling
    }

    pub fn to_json_pretty(&self) -> Result<String, CompileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
