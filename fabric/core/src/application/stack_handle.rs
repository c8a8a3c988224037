// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Handle over one orchestration-API stack.
//!
//! Wraps create/update/delete/refresh plus the blocking wait-until-terminal
//! loop. In dry-run mode stack requests are routed to a caller-supplied
//! stub instead of the API, so the update/delete/refresh paths can be
//! exercised without network access.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::application::context::ExecutionContext;
use crate::domain::api::{
    ApiError, CreateStackRequest, DeleteStackRequest, GetStackRequest, OrchestrationClient,
    StackParameter, StackRequest, UpdateStackRequest,
};
use crate::domain::stack::{StackOutcome, StackOutput, StackStatus, DRY_RUN_FAKE_STACK};
use crate::domain::template::Template;

/// Receives stack requests instead of the orchestration API in dry-run
/// mode. The handle is passed mutably so a stub can script status
/// transitions for the wait loop.
#[async_trait]
pub trait DryRunHandler: Send + Sync {
    async fn handle(&self, stack: &mut StackHandle, request: StackRequest) -> Result<(), ApiError>;
}

#[derive(Debug, Error)]
pub enum StackError {
    #[error("failed to serialize template body: {0}")]
    Body(#[from] serde_json::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// How an update submission ended without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The provider reported the template as identical; a successful no-op.
    NoChanges,
}

/// How a delete submission ended without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Submitted,
    /// The stack was already gone; nothing to delete.
    NotFound,
}

pub struct StackHandle {
    api: Arc<dyn OrchestrationClient>,
    dry_run_handler: Arc<dyn DryRunHandler>,
    user_agent: String,
    poll_interval: Duration,
    pub id: String,
    pub name: String,
    pub status: StackStatus,
    pub status_reason: String,
    pub outputs: Vec<StackOutput>,
}

impl StackHandle {
    /// Submit a create for a fresh stack. Creates carry a fixed 60-minute
    /// provider-side timeout with rollback-on-failure disabled explicitly.
    pub async fn create(
        ctx: &ExecutionContext,
        stack_name: &str,
        template: &Template,
    ) -> Result<Self, StackError> {
        let request = CreateStackRequest {
            stack_name: stack_name.to_string(),
            template_body: template.body()?,
            parameters: stack_parameters(template),
            timeout_minutes: 60,
            disable_rollback: false,
            user_agent: ctx.config.user_agent.clone(),
        };

        let mut stack = Self {
            api: ctx.api.clone(),
            dry_run_handler: ctx.dry_run_handler.clone(),
            user_agent: ctx.config.user_agent.clone(),
            poll_interval: ctx.config.stack_check_interval,
            id: String::new(),
            name: stack_name.to_string(),
            status: StackStatus::default(),
            status_reason: String::new(),
            outputs: Vec::new(),
        };

        if ctx.dry_run {
            stack.id = DRY_RUN_FAKE_STACK.to_string();
            let handler = stack.dry_run_handler.clone();
            handler
                .handle(&mut stack, StackRequest::Create(request))
                .await?;
            return Ok(stack);
        }

        let response = ctx.api.create_stack(request).await?;
        stack.id = response.stack_id;
        Ok(stack)
    }

    /// Re-attach to a previously persisted stack id.
    pub fn attach(ctx: &ExecutionContext, stack_id: String, stack_name: String) -> Self {
        Self {
            api: ctx.api.clone(),
            dry_run_handler: ctx.dry_run_handler.clone(),
            user_agent: ctx.config.user_agent.clone(),
            poll_interval: ctx.config.stack_check_interval,
            id: stack_id,
            name: stack_name,
            status: StackStatus::default(),
            status_reason: String::new(),
            outputs: Vec::new(),
        }
    }

    fn is_dry_run(&self) -> bool {
        self.id == DRY_RUN_FAKE_STACK
    }

    /// Submit an update for the existing stack. A "completely same stack"
    /// rejection is a successful no-op; a "stack not found" error surfaces
    /// so the caller can fall back to create.
    pub async fn update(&mut self, template: &Template) -> Result<UpdateOutcome, StackError> {
        let request = UpdateStackRequest {
            stack_id: self.id.clone(),
            template_body: template.body()?,
            parameters: stack_parameters(template),
            user_agent: self.user_agent.clone(),
        };

        if self.is_dry_run() {
            let handler = self.dry_run_handler.clone();
            handler.handle(self, StackRequest::Update(request)).await?;
            return Ok(UpdateOutcome::Updated);
        }

        match self.api.update_stack(request).await {
            Ok(()) => Ok(UpdateOutcome::Updated),
            Err(err) if err.is_stack_same() => Ok(UpdateOutcome::NoChanges),
            Err(err) => Err(err.into()),
        }
    }

    /// Submit a delete for the existing stack. "Not found" means there is
    /// nothing left to delete and is reported as such, not as an error.
    pub async fn delete(&mut self) -> Result<DeleteOutcome, StackError> {
        let request = DeleteStackRequest {
            stack_id: self.id.clone(),
            user_agent: self.user_agent.clone(),
        };

        if self.is_dry_run() {
            let handler = self.dry_run_handler.clone();
            handler.handle(self, StackRequest::Delete(request)).await?;
            return Ok(DeleteOutcome::Submitted);
        }

        match self.api.delete_stack(request).await {
            Ok(()) => Ok(DeleteOutcome::Submitted),
            Err(err) if err.is_stack_not_found() => Ok(DeleteOutcome::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Overwrite the cached name/status/reason/outputs from the provider.
    pub async fn refresh(&mut self) -> Result<(), StackError> {
        let request = GetStackRequest {
            stack_id: self.id.clone(),
            user_agent: self.user_agent.clone(),
        };

        if self.is_dry_run() {
            let handler = self.dry_run_handler.clone();
            handler.handle(self, StackRequest::Get(request)).await?;
            return Ok(());
        }

        let response = self.api.get_stack(request).await?;
        self.name = response.stack_name;
        self.status = response.status;
        self.status_reason = response.status_reason;
        self.outputs = response.outputs;
        Ok(())
    }

    pub fn is_in_delete_status(&self) -> bool {
        self.status.is_delete()
    }

    /// Poll until the stack reaches a terminal status. Refresh errors are
    /// logged and retried after the same interval; transient API errors
    /// never abort the wait.
    pub async fn wait_until_done(&mut self) -> (bool, String) {
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if let Err(err) = self.refresh().await {
                error!(stack_id = %self.id, stack_name = %self.name, error = %err, "stack refresh failed");
                continue;
            }

            info!(stack_id = %self.id, stack_name = %self.name, stack_status = %self.status, "stack status");
            match self.status.outcome() {
                StackOutcome::Complete => {
                    info!(stack_id = %self.id, stack_name = %self.name, stack_status = %self.status, "stack check done");
                    return (true, String::new());
                }
                StackOutcome::Failed => {
                    info!(stack_id = %self.id, stack_name = %self.name, stack_status = %self.status, "stack check failed");
                    return (false, self.status_reason.clone());
                }
                StackOutcome::InProgress => {}
            }
        }
    }
}

fn stack_parameters(template: &Template) -> Vec<StackParameter> {
    template
        .parameters
        .iter()
        .map(|(name, parameter)| StackParameter {
            key: name.clone(),
            value: parameter.value.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::{ControllerDeps, ExecutionContext};
    use crate::domain::app_config::ApplicationConfiguration;
    use crate::domain::config::ControllerConfig;
    use crate::infrastructure::dry_run::RecordingDryRunHandler;
    use crate::infrastructure::memory_api::{InMemoryOrchestrationClient, RecordingClientBuilder};
    use crate::infrastructure::memory_framework::{
        InMemoryAppConfigRepository, InMemorySchematicRegistry,
    };
    use crate::infrastructure::memory_store::InMemoryRecordStore;

    fn sample_app() -> ApplicationConfiguration {
        ApplicationConfiguration {
            name: "web-app".to_string(),
            namespace: "default".to_string(),
            finalizers: vec![],
            scopes: vec![],
            components: vec![],
            status: None,
        }
    }

    async fn dry_run_ctx(handler: Arc<RecordingDryRunHandler>) -> ExecutionContext {
        let mut config = ControllerConfig::default();
        config.dry_run = true;
        config.stack_check_interval = Duration::from_millis(10);
        let client = Arc::new(InMemoryOrchestrationClient::new());
        let deps = ControllerDeps {
            config: Arc::new(config),
            store: Arc::new(InMemoryRecordStore::new()),
            apps: Arc::new(InMemoryAppConfigRepository::new()),
            schematics: Arc::new(InMemorySchematicRegistry::new()),
            clients: Arc::new(RecordingClientBuilder::new(client)),
            dry_run_handler: handler,
        };
        ExecutionContext::new(sample_app(), &deps).await.unwrap()
    }

    #[tokio::test]
    async fn dry_run_create_assigns_sentinel_id_and_routes_to_stub() {
        let handler = Arc::new(RecordingDryRunHandler::new());
        let ctx = dry_run_ctx(handler.clone()).await;

        let template = Template::new();
        let stack = StackHandle::create(&ctx, "web-app", &template).await.unwrap();

        assert_eq!(stack.id, DRY_RUN_FAKE_STACK);
        let requests = handler.take();
        assert_eq!(requests.len(), 1);
        match &requests[0] {
            StackRequest::Create(request) => {
                assert_eq!(request.stack_name, "web-app");
                assert_eq!(request.timeout_minutes, 60);
                assert!(!request.disable_rollback);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dry_run_update_and_delete_route_to_stub() {
        let handler = Arc::new(RecordingDryRunHandler::new());
        let ctx = dry_run_ctx(handler.clone()).await;

        let template = Template::new();
        let mut stack = StackHandle::create(&ctx, "web-app", &template).await.unwrap();
        assert_eq!(stack.update(&template).await.unwrap(), UpdateOutcome::Updated);
        assert_eq!(stack.delete().await.unwrap(), DeleteOutcome::Submitted);

        let requests = handler.take();
        assert_eq!(requests.len(), 3);
        assert!(matches!(requests[1], StackRequest::Update(_)));
        assert!(matches!(requests[2], StackRequest::Delete(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_wait_terminates_when_the_stub_scripts_a_terminal_status() {
        let handler = Arc::new(RecordingDryRunHandler::new());
        handler.script_refresh_status(StackStatus::CreateComplete);
        let ctx = dry_run_ctx(handler.clone()).await;

        let template = Template::new();
        let mut stack = StackHandle::create(&ctx, "web-app", &template).await.unwrap();
        let (success, reason) = stack.wait_until_done().await;
        assert!(success);
        assert!(reason.is_empty());
    }
}
