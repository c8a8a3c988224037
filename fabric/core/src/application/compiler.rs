// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Template compiler.
//!
//! Maps an application's component list into an infrastructure template:
//! resources, inter-resource dependency edges and expected output bindings.
//! Pure except for the schematic lookup and (outside dry-run) the resource
//! type attribute-schema query; it performs no writes.

use std::sync::Arc;

use tracing::info;

use crate::application::context::ExecutionContext;
use crate::domain::api::{OrchestrationClient, ResourceTypeSchema};
use crate::domain::app_config::{
    ApplicationConfiguration, ComponentConfiguration, ComponentSchematic,
};
use crate::domain::repository::SchematicLookup;
use crate::domain::template::{
    get_attribute, parse_workload_type, DeletionPolicy, Output, Resource, Template, TemplateError,
};

const DELETION_POLICY_TRAIT: &str = "DeletionPolicy";

pub struct TemplateCompiler {
    schematics: Arc<dyn SchematicLookup>,
}

impl TemplateCompiler {
    pub fn new(schematics: Arc<dyn SchematicLookup>) -> Self {
        Self { schematics }
    }

    /// Compile the application into a template, component by component in
    /// the application's listed order.
    pub async fn compile(
        &self,
        ctx: &ExecutionContext,
        app: &ApplicationConfiguration,
    ) -> Result<Template, TemplateError> {
        let mut template = Template::new();

        for component in &app.components {
            let schematic = self
                .schematics
                .get(&app.namespace, &component.component_name)
                .await?;

            info!(
                component_name = %component.component_name,
                workload_type = %schematic.workload_type,
                "compiling component into template resource"
            );
            let resource_type = parse_workload_type(&schematic.workload_type)?;

            let resource = build_resource(&resource_type, component, &schematic, app)?;
            // instance names are unique within an application; a duplicate
            // overwrites the earlier entry
            template
                .resources
                .insert(component.instance_name.clone(), resource);

            if !ctx.dry_run {
                let schema = ctx.api.get_resource_type(&resource_type).await?;
                generate_outputs(&mut template, &component.instance_name, &schema);
            }
        }

        Ok(template)
    }
}

fn build_resource(
    resource_type: &str,
    component: &ComponentConfiguration,
    schematic: &ComponentSchematic,
    app: &ApplicationConfiguration,
) -> Result<Resource, TemplateError> {
    let mut resource = Resource {
        resource_type: resource_type.to_string(),
        properties: Default::default(),
        depends_on: Vec::new(),
        deletion_policy: DeletionPolicy::Retain,
    };

    // schematic settings first: one level of the settings object becomes
    // properties, later parameter bindings win
    if !schematic.workload_settings.is_null() {
        let settings = schematic.workload_settings.as_object().ok_or_else(|| {
            TemplateError::MalformedSettings {
                component: component.component_name.clone(),
            }
        })?;
        for (name, value) in settings {
            resource.properties.insert(name.clone(), value.clone());
        }
    }

    for binding in &component.parameter_values {
        match (&binding.from, &binding.value) {
            (Some(source), _) => {
                let field = parse_field_path(&source.field_path)?;

                if !app.has_component(&source.component) {
                    return Err(TemplateError::UnknownComponentReference {
                        instance: source.component.clone(),
                    });
                }
                if source.component == component.instance_name {
                    return Err(TemplateError::SelfReference {
                        instance: source.component.clone(),
                    });
                }

                resource
                    .properties
                    .insert(binding.name.clone(), get_attribute(&source.component, field));
                if !resource.depends_on.iter().any(|dep| dep == &source.component) {
                    resource.depends_on.push(source.component.clone());
                }
            }
            (None, Some(value)) if !value.is_empty() => {
                resource
                    .properties
                    .insert(binding.name.clone(), serde_json::Value::String(value.clone()));
            }
            _ => {
                return Err(TemplateError::MissingParameterValue {
                    parameter: binding.name.clone(),
                });
            }
        }
    }

    // the DeletionPolicy trait only ever tightens Retain into Delete; an
    // explicit Retain (or anything else) is the same as the default
    for trait_binding in &component.traits {
        if trait_binding.name != DELETION_POLICY_TRAIT || trait_binding.properties.is_null() {
            continue;
        }
        let policy = trait_binding
            .properties
            .get("policy")
            .and_then(|value| value.as_str());
        if policy == Some("Delete") {
            resource.deletion_policy = DeletionPolicy::Delete;
        }
    }

    Ok(resource)
}

/// A reference's field path must be `.status.<FieldName>` with a single
/// trailing segment.
fn parse_field_path(field_path: &str) -> Result<&str, TemplateError> {
    let field = field_path
        .strip_prefix(".status.")
        .filter(|field| !field.is_empty() && !field.contains('.'))
        .ok_or_else(|| TemplateError::InvalidFieldPath {
            path: field_path.to_string(),
        })?;
    Ok(field)
}

/// Synthesize one output per declared attribute of the resource type, named
/// `<instanceName>.<attributeName>`.
fn generate_outputs(template: &mut Template, instance_name: &str, schema: &ResourceTypeSchema) {
    for (attribute_name, attribute) in &schema.attributes {
        template.outputs.insert(
            format!("{instance_name}.{attribute_name}"),
            Output {
                description: attribute.description.clone().unwrap_or_default(),
                value: get_attribute(instance_name, attribute_name),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::ControllerDeps;
    use crate::domain::api::AttributeSchema;
    use crate::domain::app_config::{ParameterBinding, ParameterSource, TraitBinding};
    use crate::domain::config::ControllerConfig;
    use crate::infrastructure::dry_run::LoggingDryRunHandler;
    use crate::infrastructure::memory_api::{InMemoryOrchestrationClient, RecordingClientBuilder};
    use crate::infrastructure::memory_framework::{
        InMemoryAppConfigRepository, InMemorySchematicRegistry,
    };
    use crate::infrastructure::memory_store::InMemoryRecordStore;
    use serde_json::json;

    fn component(instance: &str, component_name: &str) -> ComponentConfiguration {
        ComponentConfiguration {
            instance_name: instance.to_string(),
            component_name: component_name.to_string(),
            parameter_values: vec![],
            traits: vec![],
        }
    }

    fn reference(name: &str, component: &str, field_path: &str) -> ParameterBinding {
        ParameterBinding {
            name: name.to_string(),
            value: None,
            from: Some(ParameterSource {
                component: component.to_string(),
                field_path: field_path.to_string(),
            }),
        }
    }

    fn literal(name: &str, value: &str) -> ParameterBinding {
        ParameterBinding {
            name: name.to_string(),
            value: Some(value.to_string()),
            from: None,
        }
    }

    struct Fixture {
        ctx: ExecutionContext,
        compiler: TemplateCompiler,
        client: Arc<InMemoryOrchestrationClient>,
        schematics: Arc<InMemorySchematicRegistry>,
    }

    async fn fixture() -> Fixture {
        let client = Arc::new(InMemoryOrchestrationClient::new());
        let schematics = Arc::new(InMemorySchematicRegistry::new());
        let deps = ControllerDeps {
            config: Arc::new(ControllerConfig::default()),
            store: Arc::new(InMemoryRecordStore::new()),
            apps: Arc::new(InMemoryAppConfigRepository::new()),
            schematics: schematics.clone(),
            clients: Arc::new(RecordingClientBuilder::new(client.clone())),
            dry_run_handler: Arc::new(LoggingDryRunHandler),
        };
        let app = ApplicationConfiguration {
            name: "web-app".to_string(),
            namespace: "default".to_string(),
            finalizers: vec![],
            scopes: vec![],
            components: vec![],
            status: None,
        };
        let ctx = ExecutionContext::new(app, &deps).await.unwrap();
        Fixture {
            ctx,
            compiler: TemplateCompiler::new(schematics.clone()),
            client,
            schematics,
        }
    }

    fn register_vpc_schematic(fixture: &Fixture) {
        fixture.schematics.register(
            "default",
            "vpc-comp",
            ComponentSchematic {
                workload_type: "fabric.aegis.dev/v1alpha1.Ecs_Vpc".to_string(),
                workload_settings: json!({
                    "VpcName": "MyVpc",
                    "CidrBlock": "192.168.0.0/16",
                }),
            },
        );
    }

    fn app_with(components: Vec<ComponentConfiguration>) -> ApplicationConfiguration {
        ApplicationConfiguration {
            name: "web-app".to_string(),
            namespace: "default".to_string(),
            finalizers: vec![],
            scopes: vec![],
            components,
            status: None,
        }
    }

    #[tokio::test]
    async fn settings_flatten_into_properties_and_bindings_win() {
        let fixture = fixture().await;
        register_vpc_schematic(&fixture);

        let mut vpc = component("Vpc", "vpc-comp");
        vpc.parameter_values = vec![literal("VpcName", "OverriddenName")];
        let app = app_with(vec![vpc]);

        let template = fixture.compiler.compile(&fixture.ctx, &app).await.unwrap();
        let resource = &template.resources["Vpc"];
        assert_eq!(resource.resource_type, "ECS::VPC");
        assert_eq!(resource.properties["VpcName"], json!("OverriddenName"));
        assert_eq!(resource.properties["CidrBlock"], json!("192.168.0.0/16"));
        assert_eq!(resource.deletion_policy, DeletionPolicy::Retain);
        assert!(resource.depends_on.is_empty());
    }

    #[tokio::test]
    async fn references_become_get_attribute_expressions_with_deduplicated_deps() {
        let fixture = fixture().await;
        register_vpc_schematic(&fixture);
        fixture.schematics.register(
            "default",
            "instance-comp",
            ComponentSchematic {
                workload_type: "fabric.aegis.dev/v1alpha1.Ecs_Instance".to_string(),
                workload_settings: json!({}),
            },
        );

        let vpc = component("Vpc", "vpc-comp");
        let mut instance = component("Server", "instance-comp");
        instance.parameter_values = vec![
            reference("VpcId", "Vpc", ".status.VpcId"),
            reference("RouteTableId", "Vpc", ".status.RouteTableId"),
        ];
        let app = app_with(vec![vpc, instance]);

        let template = fixture.compiler.compile(&fixture.ctx, &app).await.unwrap();
        let resource = &template.resources["Server"];
        assert_eq!(
            resource.properties["VpcId"],
            json!({ "Fn::GetAtt": ["Vpc", "VpcId"] })
        );
        assert_eq!(
            resource.properties["RouteTableId"],
            json!({ "Fn::GetAtt": ["Vpc", "RouteTableId"] })
        );
        // two distinct fields of the same component, one dependency edge
        assert_eq!(resource.depends_on, vec!["Vpc".to_string()]);
    }

    #[tokio::test]
    async fn self_reference_fails_compilation() {
        let fixture = fixture().await;
        register_vpc_schematic(&fixture);

        let mut vpc = component("Vpc", "vpc-comp");
        vpc.parameter_values = vec![reference("VpcId", "Vpc", ".status.VpcId")];
        let app = app_with(vec![vpc]);

        let err = fixture.compiler.compile(&fixture.ctx, &app).await.unwrap_err();
        assert!(matches!(err, TemplateError::SelfReference { .. }), "{err}");
    }

    #[tokio::test]
    async fn unknown_reference_fails_compilation() {
        let fixture = fixture().await;
        register_vpc_schematic(&fixture);

        let mut vpc = component("Vpc", "vpc-comp");
        vpc.parameter_values = vec![reference("VpcId", "Missing", ".status.VpcId")];
        let app = app_with(vec![vpc]);

        let err = fixture.compiler.compile(&fixture.ctx, &app).await.unwrap_err();
        assert!(
            matches!(err, TemplateError::UnknownComponentReference { .. }),
            "{err}"
        );
    }

    #[tokio::test]
    async fn field_path_must_be_a_single_status_segment() {
        let fixture = fixture().await;
        register_vpc_schematic(&fixture);

        for bad_path in [".status.a.b", ".spec.VpcId", "VpcId", ".status."] {
            let vpc = component("Vpc", "vpc-comp");
            let mut other = component("Other", "vpc-comp");
            other.parameter_values = vec![reference("VpcId", "Vpc", bad_path)];
            let app = app_with(vec![vpc, other]);

            let err = fixture.compiler.compile(&fixture.ctx, &app).await.unwrap_err();
            assert!(
                matches!(err, TemplateError::InvalidFieldPath { .. }),
                "{bad_path}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn binding_without_value_or_reference_fails() {
        let fixture = fixture().await;
        register_vpc_schematic(&fixture);

        for binding in [
            ParameterBinding {
                name: "VpcName".to_string(),
                value: None,
                from: None,
            },
            literal("VpcName", ""),
        ] {
            let mut vpc = component("Vpc", "vpc-comp");
            vpc.parameter_values = vec![binding];
            let app = app_with(vec![vpc]);

            let err = fixture.compiler.compile(&fixture.ctx, &app).await.unwrap_err();
            assert!(
                matches!(err, TemplateError::MissingParameterValue { .. }),
                "{err}"
            );
        }
    }

    #[tokio::test]
    async fn deletion_policy_trait_overrides_retain_only_for_delete() {
        let fixture = fixture().await;
        register_vpc_schematic(&fixture);

        let cases = [
            (Some(json!({ "policy": "Delete" })), DeletionPolicy::Delete),
            (Some(json!({ "policy": "Retain" })), DeletionPolicy::Retain),
            (Some(json!({ "policy": "Snapshot" })), DeletionPolicy::Retain),
            (None, DeletionPolicy::Retain),
        ];
        for (properties, expected) in cases {
            let mut vpc = component("Vpc", "vpc-comp");
            if let Some(properties) = properties {
                vpc.traits = vec![TraitBinding {
                    name: "DeletionPolicy".to_string(),
                    properties,
                }];
            }
            let app = app_with(vec![vpc]);

            let template = fixture.compiler.compile(&fixture.ctx, &app).await.unwrap();
            assert_eq!(template.resources["Vpc"].deletion_policy, expected);
        }
    }

    #[tokio::test]
    async fn outputs_are_synthesized_from_the_attribute_schema() {
        let fixture = fixture().await;
        register_vpc_schematic(&fixture);
        fixture.client.register_resource_type(
            "ECS::VPC",
            ResourceTypeSchema {
                attributes: [
                    (
                        "VpcId".to_string(),
                        AttributeSchema {
                            description: Some("The VPC id".to_string()),
                        },
                    ),
                    ("RouteTableId".to_string(), AttributeSchema::default()),
                ]
                .into(),
            },
        );

        let app = app_with(vec![component("Vpc", "vpc-comp")]);
        let template = fixture.compiler.compile(&fixture.ctx, &app).await.unwrap();

        assert_eq!(template.outputs.len(), 2);
        let output = &template.outputs["Vpc.VpcId"];
        assert_eq!(output.description, "The VPC id");
        assert_eq!(output.value, json!({ "Fn::GetAtt": ["Vpc", "VpcId"] }));
        assert_eq!(template.outputs["Vpc.RouteTableId"].description, "");
    }

    #[tokio::test]
    async fn dry_run_skips_the_attribute_schema_query() {
        let mut fixture = fixture().await;
        fixture.ctx.dry_run = true;
        register_vpc_schematic(&fixture);

        let app = app_with(vec![component("Vpc", "vpc-comp")]);
        let template = fixture.compiler.compile(&fixture.ctx, &app).await.unwrap();
        assert!(template.outputs.is_empty());
    }

    #[tokio::test]
    async fn schematic_lookup_failure_aborts_the_compile() {
        let fixture = fixture().await;
        let app = app_with(vec![component("Vpc", "missing-comp")]);
        let err = fixture.compiler.compile(&fixture.ctx, &app).await.unwrap_err();
        assert!(matches!(err, TemplateError::Schematic(_)), "{err}");
    }
}
