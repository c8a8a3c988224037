// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution context and credential resolution.
//!
//! One context is built per reconcile event (or per recovered record): the
//! resolved credentials and region/tenant, plus handles to every
//! collaborator the lifecycle manager needs. Credential sources are tried
//! in priority order: identity scope, then the configured shared secret,
//! then static configuration.

use std::sync::Arc;

use tracing::info;

use crate::application::stack_handle::DryRunHandler;
use crate::domain::api::{ClientBuilder, OrchestrationClient};
use crate::domain::app_config::ApplicationConfiguration;
use crate::domain::config::{ControllerConfig, RESOURCE_IDENTITY, RESOURCE_IDENTITY_TYPE};
use crate::domain::credentials::{
    CredentialError, Credentials, ResourceIdentity, ACCESS_KEY_ID, ACCESS_KEY_SECRET, EXPIRATION,
    SESSION_TOKEN,
};
use crate::domain::repository::{AppConfigRepository, RecordStore, SchematicLookup};
use crate::infrastructure::dry_run::UninitializedClient;

/// Shared collaborator handles the controller is constructed with.
#[derive(Clone)]
pub struct ControllerDeps {
    pub config: Arc<ControllerConfig>,
    pub store: Arc<dyn RecordStore>,
    pub apps: Arc<dyn AppConfigRepository>,
    pub schematics: Arc<dyn SchematicLookup>,
    pub clients: Arc<dyn ClientBuilder>,
    pub dry_run_handler: Arc<dyn DryRunHandler>,
}

/// Per-reconcile execution context: resolved credentials and region/tenant,
/// the application being reconciled, and handles to the store, the
/// application repository and the orchestration client.
#[derive(Clone)]
pub struct ExecutionContext {
    pub app_name: String,
    pub namespace: String,
    pub tenant_id: String,
    pub region_id: String,
    pub dry_run: bool,
    pub app: ApplicationConfiguration,
    pub apps: Arc<dyn AppConfigRepository>,
    pub api: Arc<dyn OrchestrationClient>,
    pub store: Arc<dyn RecordStore>,
    pub config: Arc<ControllerConfig>,
    pub dry_run_handler: Arc<dyn DryRunHandler>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("app_name", &self.app_name)
            .field("namespace", &self.namespace)
            .field("tenant_id", &self.tenant_id)
            .field("region_id", &self.region_id)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Build a context for the given application, resolving credentials and
    /// initializing the orchestration client. In dry-run mode the resolver
    /// and the store are bypassed entirely: no client is initialized and
    /// stack requests are routed to the dry-run stub.
    pub async fn new(
        app: ApplicationConfiguration,
        deps: &ControllerDeps,
    ) -> Result<Self, CredentialError> {
        let config = deps.config.clone();
        let mut ctx = Self {
            app_name: app.name.clone(),
            namespace: app.namespace.clone(),
            tenant_id: String::new(),
            region_id: config.region_id.clone(),
            dry_run: config.dry_run,
            app,
            apps: deps.apps.clone(),
            api: Arc::new(UninitializedClient),
            store: deps.store.clone(),
            config,
            dry_run_handler: deps.dry_run_handler.clone(),
        };

        if ctx.dry_run {
            return Ok(ctx);
        }

        if ctx.init_from_scope(deps).await? {
            return Ok(ctx);
        }
        ctx.init_from_config(deps).await?;
        Ok(ctx)
    }

    /// Credential source 1: a `resource-identity` scope binding of the
    /// recognized type carried by the application itself.
    async fn init_from_scope(&mut self, deps: &ControllerDeps) -> Result<bool, CredentialError> {
        let identity = {
            let scope = self.app.scopes.iter().find(|scope| {
                scope.name == RESOURCE_IDENTITY && scope.scope_type == RESOURCE_IDENTITY_TYPE
            });
            let Some(scope) = scope else {
                return Ok(false);
            };
            info!(app_name = %self.app_name, "identity scope detected");
            serde_json::from_value::<ResourceIdentity>(scope.properties.clone())
                .map_err(CredentialError::IdentityMalformed)?
        };

        info!(
            app_name = %identity.app_name,
            tenant_id = %identity.tenant_id,
            "resolving credentials from resource identity"
        );
        let credentials = read_credentials(deps.store.as_ref(), &identity.secret_key()).await?;

        self.tenant_id = identity.tenant_id;
        self.region_id = if identity.region_id.is_empty() {
            self.config.region_id.clone()
        } else {
            identity.region_id
        };

        self.api = build_client(deps.clients.as_ref(), &self.config, &self.region_id, &credentials)?;
        Ok(true)
    }

    /// Credential sources 2 and 3: the configured shared secret record,
    /// falling back to the static access key pair.
    async fn init_from_config(&mut self, deps: &ControllerDeps) -> Result<(), CredentialError> {
        let secret_name = &self.config.credential_secret_name;
        if !secret_name.is_empty() {
            info!(credential_secret_name = %secret_name, "resolving credentials from configured secret");
            let credentials = read_credentials(deps.store.as_ref(), secret_name).await?;
            self.api =
                build_client(deps.clients.as_ref(), &self.config, &self.region_id, &credentials)?;
            return Ok(());
        }

        self.api = deps.clients.with_access_key(
            &self.config.endpoint,
            &self.region_id,
            &self.config.access_key_id,
            &self.config.access_key_secret,
        )?;
        Ok(())
    }
}

/// Load a credential record from the store. Both the access key id and the
/// secret must be present for the record to count.
pub async fn read_credentials(
    store: &dyn RecordStore,
    name: &str,
) -> Result<Credentials, CredentialError> {
    let mut data = store.get(&name.to_lowercase()).await?;

    let access_key_id = data.remove(ACCESS_KEY_ID).unwrap_or_default();
    let access_key_secret = data.remove(ACCESS_KEY_SECRET).unwrap_or_default();
    if access_key_id.is_empty() || access_key_secret.is_empty() {
        return Err(CredentialError::CredentialNotFound {
            name: name.to_string(),
        });
    }

    Ok(Credentials {
        access_key_id,
        access_key_secret,
        session_token: data.remove(SESSION_TOKEN).filter(|token| !token.is_empty()),
        expiration: data.remove(EXPIRATION).filter(|exp| !exp.is_empty()),
    })
}

fn build_client(
    clients: &dyn ClientBuilder,
    config: &ControllerConfig,
    region_id: &str,
    credentials: &Credentials,
) -> Result<Arc<dyn OrchestrationClient>, CredentialError> {
    match &credentials.session_token {
        Some(token) => clients.with_session_token(
            &config.endpoint,
            region_id,
            &credentials.access_key_id,
            &credentials.access_key_secret,
            token,
        ),
        None => clients.with_access_key(
            &config.endpoint,
            region_id,
            &credentials.access_key_id,
            &credentials.access_key_secret,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::app_config::ScopeBinding;
    use crate::infrastructure::dry_run::LoggingDryRunHandler;
    use crate::infrastructure::memory_api::{ClientInit, InMemoryOrchestrationClient, RecordingClientBuilder};
    use crate::infrastructure::memory_framework::{
        InMemoryAppConfigRepository, InMemorySchematicRegistry,
    };
    use crate::infrastructure::memory_store::InMemoryRecordStore;
    use serde_json::json;
    use std::collections::HashMap;

    fn app_with_scopes(scopes: Vec<ScopeBinding>) -> ApplicationConfiguration {
        ApplicationConfiguration {
            name: "web-app".to_string(),
            namespace: "default".to_string(),
            finalizers: vec![],
            scopes,
            components: vec![],
            status: None,
        }
    }

    fn deps_with(config: ControllerConfig) -> (ControllerDeps, Arc<RecordingClientBuilder>) {
        let client = Arc::new(InMemoryOrchestrationClient::new());
        let builder = Arc::new(RecordingClientBuilder::new(client));
        let deps = ControllerDeps {
            config: Arc::new(config),
            store: Arc::new(InMemoryRecordStore::new()),
            apps: Arc::new(InMemoryAppConfigRepository::new()),
            schematics: Arc::new(InMemorySchematicRegistry::new()),
            clients: builder.clone(),
            dry_run_handler: Arc::new(LoggingDryRunHandler),
        };
        (deps, builder)
    }

    fn credential_record(token: Option<&str>) -> HashMap<String, String> {
        let mut data = HashMap::from([
            (ACCESS_KEY_ID.to_string(), "AKID".to_string()),
            (ACCESS_KEY_SECRET.to_string(), "SECRET".to_string()),
        ]);
        if let Some(token) = token {
            data.insert(SESSION_TOKEN.to_string(), token.to_string());
        }
        data
    }

    fn identity_scope() -> ScopeBinding {
        ScopeBinding {
            name: RESOURCE_IDENTITY.to_string(),
            scope_type: RESOURCE_IDENTITY_TYPE.to_string(),
            properties: json!({
                "appName": "web-app",
                "tenantId": "123456789",
                "regionId": "cn-beijing",
            }),
        }
    }

    #[tokio::test]
    async fn identity_scope_takes_priority_and_sets_tenant_and_region() {
        let mut config = ControllerConfig::default();
        config.credential_secret_name = "shared".to_string();
        let (deps, builder) = deps_with(config);
        deps.store
            .merge("web-app.cn-beijing.123456789", credential_record(None))
            .await
            .unwrap();

        let ctx = ExecutionContext::new(app_with_scopes(vec![identity_scope()]), &deps)
            .await
            .unwrap();

        assert_eq!(ctx.tenant_id, "123456789");
        assert_eq!(ctx.region_id, "cn-beijing");
        assert_eq!(
            builder.inits(),
            vec![ClientInit::AccessKey {
                region_id: "cn-beijing".to_string(),
                access_key_id: "AKID".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn session_token_routes_through_the_temporary_token_path() {
        let (deps, builder) = deps_with(ControllerConfig::default());
        deps.store
            .merge("web-app.cn-beijing.123456789", credential_record(Some("STS")))
            .await
            .unwrap();

        ExecutionContext::new(app_with_scopes(vec![identity_scope()]), &deps)
            .await
            .unwrap();

        assert_eq!(
            builder.inits(),
            vec![ClientInit::SessionToken {
                region_id: "cn-beijing".to_string(),
                access_key_id: "AKID".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn malformed_identity_scope_is_an_error() {
        let (deps, _) = deps_with(ControllerConfig::default());
        let mut scope = identity_scope();
        scope.properties = json!("not an object");

        let err = ExecutionContext::new(app_with_scopes(vec![scope]), &deps)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::IdentityMalformed(_)));
    }

    #[tokio::test]
    async fn missing_credential_record_fails_resolution() {
        let (deps, _) = deps_with(ControllerConfig::default());

        let err = ExecutionContext::new(app_with_scopes(vec![identity_scope()]), &deps)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::CredentialNotFound { .. }));
    }

    #[tokio::test]
    async fn record_without_secret_fails_resolution() {
        let (deps, _) = deps_with(ControllerConfig::default());
        deps.store
            .merge(
                "web-app.cn-beijing.123456789",
                HashMap::from([(ACCESS_KEY_ID.to_string(), "AKID".to_string())]),
            )
            .await
            .unwrap();

        let err = ExecutionContext::new(app_with_scopes(vec![identity_scope()]), &deps)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::CredentialNotFound { .. }));
    }

    #[tokio::test]
    async fn configured_secret_is_used_when_no_identity_scope_is_present() {
        let mut config = ControllerConfig::default();
        config.credential_secret_name = "shared".to_string();
        let (deps, builder) = deps_with(config);
        deps.store
            .merge("shared", credential_record(None))
            .await
            .unwrap();

        let ctx = ExecutionContext::new(app_with_scopes(vec![]), &deps)
            .await
            .unwrap();

        assert!(ctx.tenant_id.is_empty());
        assert_eq!(ctx.region_id, "us-west-1");
        assert_eq!(
            builder.inits(),
            vec![ClientInit::AccessKey {
                region_id: "us-west-1".to_string(),
                access_key_id: "AKID".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn static_configuration_is_the_last_resort() {
        let mut config = ControllerConfig::default();
        config.access_key_id = "STATIC_ID".to_string();
        config.access_key_secret = "STATIC_SECRET".to_string();
        let (deps, builder) = deps_with(config);

        ExecutionContext::new(app_with_scopes(vec![]), &deps)
            .await
            .unwrap();

        assert_eq!(
            builder.inits(),
            vec![ClientInit::AccessKey {
                region_id: "us-west-1".to_string(),
                access_key_id: "STATIC_ID".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn dry_run_bypasses_the_resolver_and_the_store() {
        let mut config = ControllerConfig::default();
        config.dry_run = true;
        let (deps, builder) = deps_with(config);
        // an identity scope pointing at a credential record that does not
        // exist: resolution would fail if it ran
        let ctx = ExecutionContext::new(app_with_scopes(vec![identity_scope()]), &deps)
            .await
            .unwrap();

        assert!(ctx.dry_run);
        assert!(builder.inits().is_empty());
    }
}
