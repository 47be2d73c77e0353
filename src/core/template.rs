//! In-memory CloudFormation resource graph.
//!
//! Resources are addressed by construct path (`Svc/LB/Resource`) and carry
//! raw JSON properties. Escape-hatch overrides are recorded on the resource
//! and applied to the rendered JSON in insertion order, so a later
//! `add_deletion_override` wins over whatever the declaring code produced.

use crate::core::logical_id::logical_id;
use crate::domain::model::Environment;
use crate::utils::error::{Result, SynthError};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

pub mod intrinsic {
    use serde_json::{json, Value};

    pub fn reference(logical_id: &str) -> Value {
        json!({ "Ref": logical_id })
    }

    pub fn get_att(logical_id: &str, attribute: &str) -> Value {
        json!({ "Fn::GetAtt": [logical_id, attribute] })
    }

    pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
        json!({ "Fn::Join": [delimiter, parts] })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Override {
    Set(Vec<String>, Value),
    Delete(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct CfnResource {
    path: String,
    logical_id: String,
    resource_type: String,
    properties: Value,
    depends_on: BTreeSet<String>,
    retain: bool,
    overrides: Vec<Override>,
}

impl CfnResource {
    pub fn new(path: impl Into<String>, resource_type: impl Into<String>, properties: Value) -> Self {
        let path = path.into();
        Self {
            logical_id: logical_id(&path),
            path,
            resource_type: resource_type.into(),
            properties,
            depends_on: BTreeSet::new(),
            retain: false,
            overrides: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn properties(&self) -> &Value {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Value {
        &mut self.properties
    }

    pub fn add_dependency(&mut self, logical_id: impl Into<String>) {
        self.depends_on.insert(logical_id.into());
    }

    /// Keeps the physical resource when it is deleted or replaced.
    pub fn retain(&mut self) {
        self.retain = true;
    }

    /// Sets `path` (dotted, `\.` for a literal dot) on the rendered resource.
    pub fn add_override(&mut self, path: &str, value: Value) {
        self.overrides.push(Override::Set(split_override_path(path), value));
    }

    /// Removes `path` from the rendered resource. Absent paths are ignored.
    pub fn add_deletion_override(&mut self, path: &str) {
        self.overrides.push(Override::Delete(split_override_path(path)));
    }

    pub fn add_property_override(&mut self, path: &str, value: Value) {
        self.add_override(&format!("Properties.{}", path), value);
    }

    pub fn add_property_deletion_override(&mut self, path: &str) {
        self.add_deletion_override(&format!("Properties.{}", path));
    }

    pub fn render(&self) -> Value {
        let mut rendered = Map::new();
        rendered.insert("Type".to_string(), Value::String(self.resource_type.clone()));

        let has_properties = match &self.properties {
            Value::Object(map) => !map.is_empty(),
            Value::Null => false,
            _ => true,
        };
        if has_properties {
            rendered.insert("Properties".to_string(), self.properties.clone());
        }

        if !self.depends_on.is_empty() {
            rendered.insert("DependsOn".to_string(), json!(self.depends_on));
        }
        if self.retain {
            rendered.insert("UpdateReplacePolicy".to_string(), json!("Retain"));
            rendered.insert("DeletionPolicy".to_string(), json!("Retain"));
        }

        let mut rendered = Value::Object(rendered);
        for o in &self.overrides {
            match o {
                Override::Set(path, value) => set_path(&mut rendered, path, value.clone()),
                Override::Delete(path) => delete_path(&mut rendered, path),
            }
        }
        rendered
    }
}

fn split_override_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);
    parts
}

fn set_path(target: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = target;
    for key in parents {
        let node = current;
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        current = match node {
            Value::Object(map) => map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), value);
    }
}

fn delete_path(target: &mut Value, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = target;
    for key in parents {
        current = match current.get_mut(key.as_str()) {
            Some(next) => next,
            None => return,
        };
    }
    if let Value::Object(map) = current {
        map.remove(last);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CfnOutput {
    pub value: Value,
    pub description: Option<String>,
}

/// One deployable unit: the resources and outputs of a single template.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    environment: Environment,
    resources: Vec<CfnResource>,
    outputs: BTreeMap<String, CfnOutput>,
}

impl Stack {
    pub fn new(name: impl Into<String>, environment: Environment) -> Self {
        Self {
            name: name.into(),
            environment,
            resources: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn resources(&self) -> &[CfnResource] {
        &self.resources
    }

    /// 加入資源並回傳其 logical id；同一路徑或 id 不可重複
    pub fn add_resource(&mut self, resource: CfnResource) -> Result<String> {
        if let Some(existing) = self
            .resources
            .iter()
            .find(|r| r.logical_id == resource.logical_id || r.path == resource.path)
        {
            return Err(SynthError::ConstructError {
                path: resource.path.clone(),
                message: format!(
                    "logical id '{}' already used by '{}'",
                    resource.logical_id, existing.path
                ),
            });
        }

        let id = resource.logical_id.clone();
        tracing::debug!("Declared {} ({}) at {}", id, resource.resource_type, resource.path);
        self.resources.push(resource);
        Ok(id)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&CfnResource> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }

    pub fn resource_mut(&mut self, logical_id: &str) -> Option<&mut CfnResource> {
        self.resources.iter_mut().find(|r| r.logical_id == logical_id)
    }

    pub fn resources_under<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a CfnResource> + 'a {
        self.resources.iter().filter(move |r| in_scope(&r.path, scope))
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a CfnResource> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.resource_type == resource_type)
    }

    /// Finds the single resource of `resource_type` declared under `scope`.
    pub fn find_child_mut(&mut self, scope: &str, resource_type: &str) -> Result<&mut CfnResource> {
        let matches = self
            .resources
            .iter()
            .filter(|r| in_scope(&r.path, scope) && r.resource_type == resource_type)
            .count();

        if matches != 1 {
            return Err(SynthError::ConstructError {
                path: scope.to_string(),
                message: format!(
                    "expected exactly one {} under this scope, found {}",
                    resource_type, matches
                ),
            });
        }

        self.resources
            .iter_mut()
            .find(|r| in_scope(&r.path, scope) && r.resource_type == resource_type)
            .ok_or_else(|| SynthError::ConstructError {
                path: scope.to_string(),
                message: format!("{} not found", resource_type),
            })
    }

    pub fn add_output(&mut self, id: impl Into<String>, value: Value, description: Option<String>) {
        self.outputs.insert(id.into(), CfnOutput { value, description });
    }

    pub fn outputs(&self) -> &BTreeMap<String, CfnOutput> {
        &self.outputs
    }

    pub fn to_template(&self) -> Value {
        let resources: Map<String, Value> = self
            .resources
            .iter()
            .map(|r| (r.logical_id.clone(), r.render()))
            .collect();

        let mut template = Map::new();
        template.insert("Resources".to_string(), Value::Object(resources));

        if !self.outputs.is_empty() {
            let outputs: Map<String, Value> = self
                .outputs
                .iter()
                .map(|(id, output)| {
                    let mut rendered = Map::new();
                    if let Some(description) = &output.description {
                        rendered.insert("Description".to_string(), json!(description));
                    }
                    rendered.insert("Value".to_string(), output.value.clone());
                    (id.clone(), Value::Object(rendered))
                })
                .collect();
            template.insert("Outputs".to_string(), Value::Object(outputs));
        }

        Value::Object(template)
    }
}

fn in_scope(path: &str, scope: &str) -> bool {
    path == scope
        || path
            .strip_prefix(scope)
            .is_some_and(|rest| rest.starts_with('/'))
}
