// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure template: the compiled resource/parameter/output graph
//! submitted to the orchestration API.
//!
//! Maps are `BTreeMap` so the canonical body is byte-stable; the lifecycle
//! manager's idempotency guard compares persisted bodies for equality.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::api::ApiError;
use crate::domain::config::{FABRIC_GROUP, FABRIC_VERSION};
use crate::domain::repository::SchematicError;

pub const TEMPLATE_FORMAT_VERSION: &str = "2015-09-01";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "FormatVersion")]
    pub format_version: String,

    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,

    #[serde(rename = "Resources", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, Resource>,

    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,

    #[serde(rename = "Default", default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    #[serde(rename = "Description", default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Submitted alongside the template as a stack parameter, not part of
    /// the template body itself.
    #[serde(skip)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(rename = "Properties", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,

    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(rename = "DeletionPolicy", default)]
    pub deletion_policy: DeletionPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeletionPolicy {
    #[default]
    Retain,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "Description", default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(rename = "Value")]
    pub value: serde_json::Value,
}

impl Template {
    pub fn new() -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Canonical JSON body submitted to the API and persisted for the
    /// idempotency comparison.
    pub fn body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbolic "read this attribute from that resource once provisioned"
/// expression.
pub fn get_attribute(logical_id: &str, attribute: &str) -> serde_json::Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("{0}")]
    TemplateInvalid(String),

    #[error("invalid fieldPath '{path}': must be of format .status.{{FieldName}}")]
    InvalidFieldPath { path: String },

    #[error("invalid reference '{instance}': no such component instance in the application")]
    UnknownComponentReference { instance: String },

    #[error("invalid reference '{instance}': a component may not reference itself")]
    SelfReference { instance: String },

    #[error("parameter '{parameter}': either a value or a reference must be supplied")]
    MissingParameterValue { parameter: String },

    #[error("workload settings of component '{component}' are not a JSON object")]
    MalformedSettings { component: String },

    #[error(transparent)]
    Schematic(#[from] SchematicError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Parse a workload type of the form `{group}/{version}.{product}_{kind}`
/// into the provider resource type `{PRODUCT}::{KIND}`.
pub fn parse_workload_type(workload_type: &str) -> Result<String, TemplateError> {
    const FORMAT: &str = "workload type must be of format {group}/{version}.{product}_{kind}";

    let (group, rest) = workload_type
        .split_once('/')
        .ok_or_else(|| TemplateError::TemplateInvalid(FORMAT.to_string()))?;
    if group != FABRIC_GROUP {
        return Err(TemplateError::TemplateInvalid(format!(
            "group '{group}' in workload type is not supported; supported group: {FABRIC_GROUP}"
        )));
    }

    let (version, type_name) = rest
        .split_once('.')
        .ok_or_else(|| TemplateError::TemplateInvalid(FORMAT.to_string()))?;
    if version != FABRIC_VERSION {
        return Err(TemplateError::TemplateInvalid(format!(
            "version '{version}' in workload type is not supported; supported version: {FABRIC_VERSION}"
        )));
    }

    match type_name.split_once('_') {
        Some((product, kind)) if !product.is_empty() && !kind.is_empty() && !kind.contains('_') => {
            Ok(format!(
                "{}::{}",
                product.to_uppercase(),
                kind.to_uppercase()
            ))
        }
        _ => Err(TemplateError::TemplateInvalid(format!(
            "type '{type_name}' in workload type must be of format {{product}}_{{kind}}"
        ))),
    }
}
