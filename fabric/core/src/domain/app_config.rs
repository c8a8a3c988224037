// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application configuration model.
//!
//! The controller accepts two wire shapes carrying identical semantics: the
//! native `ApplicationConfiguration` document and the `FabricStack` CRD.
//! Both convert into the single canonical [`ApplicationConfiguration`] at the
//! adapter boundary; business logic never sees the wire variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical, wire-independent application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfiguration {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<ScopeBinding>,
    #[serde(default)]
    pub components: Vec<ComponentConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
}

/// Binding of an application to a named scope (tenancy, identity, network).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeBinding {
    pub name: String,
    #[serde(rename = "type")]
    pub scope_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// One component instance inside an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfiguration {
    #[serde(rename = "instanceName")]
    pub instance_name: String,
    #[serde(rename = "componentName")]
    pub component_name: String,
    #[serde(rename = "parameterValues", default)]
    pub parameter_values: Vec<ParameterBinding>,
    #[serde(default)]
    pub traits: Vec<TraitBinding>,
}

/// A parameter binding: either a literal value or a reference to another
/// component instance's produced attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBinding {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ParameterSource>,
}

/// Cross-component reference: `.status.<FieldName>` of another instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSource {
    pub component: String,
    #[serde(rename = "fieldPath")]
    pub field_path: String,
}

/// Trait attached to a component configuration. The only trait this engine
/// acts on is `DeletionPolicy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitBinding {
    pub name: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Abstract definition of a deployable unit referenced by a component
/// configuration: a workload type plus its merged settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSchematic {
    #[serde(rename = "workloadType")]
    pub workload_type: String,
    #[serde(rename = "workloadSettings", default)]
    pub workload_settings: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationPhase {
    Progressing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: String,
    #[serde(rename = "lastUpdateTime")]
    pub last_update_time: DateTime<Utc>,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplicationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ApplicationPhase>,
    #[serde(default)]
    pub conditions: Vec<ApplicationCondition>,
}

impl ApplicationConfiguration {
    pub fn has_component(&self, instance_name: &str) -> bool {
        self.components
            .iter()
            .any(|c| c.instance_name == instance_name)
    }

    pub fn add_finalizer(&mut self, finalizer: &str) {
        if !self.finalizers.iter().any(|f| f == finalizer) {
            self.finalizers.push(finalizer.to_string());
        }
    }

    pub fn remove_finalizer(&mut self, finalizer: &str) {
        self.finalizers.retain(|f| f != finalizer);
    }

    /// Record a phase transition as a status condition. The first condition
    /// is created on demand and updated in place afterwards; an empty message
    /// leaves the previous message untouched.
    pub fn set_condition(&mut self, phase: ApplicationPhase, message: &str) {
        let condition_type = if phase == ApplicationPhase::Failed {
            ConditionType::Error
        } else {
            ConditionType::Ready
        };
        let now = Utc::now();

        let status = self.status.get_or_insert_with(ApplicationStatus::default);
        status.phase = Some(phase);
        match status.conditions.first_mut() {
            None => status.conditions.push(ApplicationCondition {
                condition_type,
                status: "True".to_string(),
                last_update_time: now,
                last_transition_time: now,
                reason: message.to_string(),
                message: message.to_string(),
            }),
            Some(condition) => {
                condition.condition_type = condition_type;
                condition.last_update_time = now;
                condition.last_transition_time = now;
                if !message.is_empty() {
                    condition.message = message.to_string();
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// A received application document, tagged by its `kind`. Either shape
/// carries the same spec; conversion to the canonical form happens here and
/// nowhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ApplicationDocument {
    #[serde(rename = "ApplicationConfiguration")]
    Native(DocumentBody),
    #[serde(rename = "FabricStack")]
    Stack(DocumentBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBody {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub metadata: DocumentMetadata,
    pub spec: DocumentSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSpec {
    #[serde(default)]
    pub scopes: Vec<ScopeBinding>,
    #[serde(default)]
    pub components: Vec<ComponentConfiguration>,
}

impl ApplicationDocument {
    pub fn body(&self) -> &DocumentBody {
        match self {
            Self::Native(body) | Self::Stack(body) => body,
        }
    }

    pub fn into_config(self) -> ApplicationConfiguration {
        let body = match self {
            Self::Native(body) | Self::Stack(body) => body,
        };
        ApplicationConfiguration {
            name: body.metadata.name,
            namespace: body.metadata.namespace,
            finalizers: body.metadata.finalizers,
            scopes: body.spec.scopes,
            components: body.spec.components,
            status: body.status,
        }
    }

    /// Re-wrap a canonical configuration in the native document shape.
    pub fn native_from_config(config: ApplicationConfiguration) -> Self {
        Self::Native(DocumentBody::from_config(config, "core.fabric.aegis.dev/v1alpha1"))
    }

    /// Re-wrap a canonical configuration in the stack CRD shape.
    pub fn stack_from_config(config: ApplicationConfiguration) -> Self {
        Self::Stack(DocumentBody::from_config(config, "fabric.aegis.dev/v1alpha1"))
    }
}

impl DocumentBody {
    fn from_config(config: ApplicationConfiguration, api_version: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            metadata: DocumentMetadata {
                name: config.name,
                namespace: config.namespace,
                finalizers: config.finalizers,
            },
            spec: DocumentSpec {
                scopes: config.scopes,
                components: config.components,
            },
            status: config.status,
        }
    }
}

impl From<ApplicationDocument> for ApplicationConfiguration {
    fn from(document: ApplicationDocument) -> Self {
        document.into_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ApplicationConfiguration {
        ApplicationConfiguration {
            name: "web-app".to_string(),
            namespace: "prod".to_string(),
            finalizers: vec![],
            scopes: vec![],
            components: vec![ComponentConfiguration {
                instance_name: "db".to_string(),
                component_name: "db-comp".to_string(),
                parameter_values: vec![],
                traits: vec![],
            }],
            status: None,
        }
    }

    #[test]
    fn both_wire_shapes_convert_to_the_same_canonical_form() {
        let native = ApplicationDocument::native_from_config(sample_config());
        let stack = ApplicationDocument::stack_from_config(sample_config());
        assert_eq!(native.clone().into_config(), stack.into_config());
        assert_eq!(native.into_config(), sample_config());
    }

    #[test]
    fn document_round_trips_through_json() {
        let native = ApplicationDocument::native_from_config(sample_config());
        let raw = serde_json::to_string(&native).unwrap();
        assert!(raw.contains("\"kind\":\"ApplicationConfiguration\""));
        let parsed: ApplicationDocument = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, native);

        let stack = ApplicationDocument::stack_from_config(sample_config());
        let raw = serde_json::to_string(&stack).unwrap();
        assert!(raw.contains("\"kind\":\"FabricStack\""));
        let parsed: ApplicationDocument = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, stack);
    }

    #[test]
    fn set_condition_creates_then_updates_in_place() {
        let mut config = sample_config();
        config.set_condition(ApplicationPhase::Progressing, "");
        {
            let status = config.status.as_ref().unwrap();
            assert_eq!(status.phase, Some(ApplicationPhase::Progressing));
            assert_eq!(status.conditions.len(), 1);
            assert_eq!(status.conditions[0].condition_type, ConditionType::Ready);
        }

        config.set_condition(ApplicationPhase::Failed, "stack create failed");
        let status = config.status.as_ref().unwrap();
        assert_eq!(status.phase, Some(ApplicationPhase::Failed));
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].condition_type, ConditionType::Error);
        assert_eq!(status.conditions[0].message, "stack create failed");
    }

    #[test]
    fn finalizers_are_deduplicated() {
        let mut config = sample_config();
        config.add_finalizer("fabric.aegis.dev/stack-cleanup");
        config.add_finalizer("fabric.aegis.dev/stack-cleanup");
        assert_eq!(config.finalizers.len(), 1);
        config.remove_finalizer("fabric.aegis.dev/stack-cleanup");
        assert!(config.finalizers.is_empty());
    }
}
