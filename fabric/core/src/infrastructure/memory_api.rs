// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory orchestration API for development and testing.
//!
//! Simulates the provider's stack lifecycle: submissions land in the
//! matching `*_IN_PROGRESS` status and, with auto-complete on (the
//! default), advance to the `*_COMPLETE` status on the next poll. Tests
//! can script failures, outputs and provider-side disappearance.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::api::{
    ApiError, ClientBuilder, CreateStackRequest, CreateStackResponse, DeleteStackRequest,
    GetStackRequest, GetStackResponse, OrchestrationClient, ResourceTypeSchema,
    UpdateStackRequest, NOT_SUPPORTED, STACK_NOT_FOUND,
};
use crate::domain::credentials::CredentialError;
use crate::domain::stack::{StackOutput, StackStatus};

#[derive(Debug, Clone)]
struct SimulatedStack {
    name: String,
    status: StackStatus,
    status_reason: String,
    outputs: Vec<StackOutput>,
    template_body: String,
}

#[derive(Default)]
pub struct InMemoryOrchestrationClient {
    stacks: DashMap<String, SimulatedStack>,
    resource_types: DashMap<String, ResourceTypeSchema>,
    auto_complete: AtomicBool,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    next_create_error: Mutex<Option<ApiError>>,
}

impl InMemoryOrchestrationClient {
    pub fn new() -> Self {
        Self {
            auto_complete: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Stop statuses from advancing on poll; tests then drive transitions
    /// with [`set_status`](Self::set_status).
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.auto_complete.store(auto_complete, Ordering::SeqCst);
    }

    pub fn register_resource_type(&self, resource_type: &str, schema: ResourceTypeSchema) {
        self.resource_types.insert(resource_type.to_string(), schema);
    }

    pub fn set_status(&self, stack_id: &str, status: StackStatus, reason: &str) {
        if let Some(mut stack) = self.stacks.get_mut(stack_id) {
            stack.status = status;
            stack.status_reason = reason.to_string();
        }
    }

    pub fn set_outputs(&self, stack_id: &str, outputs: Vec<StackOutput>) {
        if let Some(mut stack) = self.stacks.get_mut(stack_id) {
            stack.outputs = outputs;
        }
    }

    /// Simulate the stack disappearing on the provider side.
    pub fn remove_stack(&self, stack_id: &str) {
        self.stacks.remove(stack_id);
    }

    pub fn fail_next_create(&self, error: ApiError) {
        *self.next_create_error.lock() = Some(error);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn stack_ids(&self) -> Vec<String> {
        self.stacks.iter().map(|entry| entry.key().clone()).collect()
    }

    fn advance(&self, stack: &mut SimulatedStack) {
        if !self.auto_complete.load(Ordering::SeqCst) {
            return;
        }
        let next = match &stack.status {
            StackStatus::CreateInProgress => Some(StackStatus::CreateComplete),
            StackStatus::UpdateInProgress => Some(StackStatus::UpdateComplete),
            StackStatus::DeleteInProgress => Some(StackStatus::DeleteComplete),
            _ => None,
        };
        if let Some(next) = next {
            stack.status = next;
        }
    }
}

#[async_trait]
impl OrchestrationClient for InMemoryOrchestrationClient {
    async fn create_stack(
        &self,
        request: CreateStackRequest,
    ) -> Result<CreateStackResponse, ApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.next_create_error.lock().take() {
            return Err(error);
        }

        let stack_id = Uuid::new_v4().to_string();
        self.stacks.insert(
            stack_id.clone(),
            SimulatedStack {
                name: request.stack_name,
                status: StackStatus::CreateInProgress,
                status_reason: String::new(),
                outputs: Vec::new(),
                template_body: request.template_body,
            },
        );
        Ok(CreateStackResponse { stack_id })
    }

    async fn update_stack(&self, request: UpdateStackRequest) -> Result<(), ApiError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut stack = self.stacks.get_mut(&request.stack_id).ok_or_else(|| {
            ApiError::new(
                STACK_NOT_FOUND,
                format!("stack {} does not exist", request.stack_id),
            )
        })?;

        if stack.template_body == request.template_body {
            return Err(ApiError::new(
                NOT_SUPPORTED,
                "update the completely same stack is not supported",
            ));
        }

        stack.template_body = request.template_body;
        stack.status = StackStatus::UpdateInProgress;
        stack.status_reason = String::new();
        Ok(())
    }

    async fn delete_stack(&self, request: DeleteStackRequest) -> Result<(), ApiError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut stack = self.stacks.get_mut(&request.stack_id).ok_or_else(|| {
            ApiError::new(
                STACK_NOT_FOUND,
                format!("stack {} does not exist", request.stack_id),
            )
        })?;
        stack.status = StackStatus::DeleteInProgress;
        stack.status_reason = String::new();
        Ok(())
    }

    async fn get_stack(&self, request: GetStackRequest) -> Result<GetStackResponse, ApiError> {
        let mut stack = self.stacks.get_mut(&request.stack_id).ok_or_else(|| {
            ApiError::new(
                STACK_NOT_FOUND,
                format!("stack {} does not exist", request.stack_id),
            )
        })?;
        self.advance(&mut stack);
        Ok(GetStackResponse {
            stack_name: stack.name.clone(),
            status: stack.status.clone(),
            status_reason: stack.status_reason.clone(),
            outputs: stack.outputs.clone(),
        })
    }

    async fn list_resource_types(&self) -> Result<Vec<String>, ApiError> {
        Ok(self
            .resource_types
            .iter()
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn get_resource_type(
        &self,
        resource_type: &str,
    ) -> Result<ResourceTypeSchema, ApiError> {
        Ok(self
            .resource_types
            .get(resource_type)
            .map(|schema| schema.clone())
            .unwrap_or_default())
    }
}

/// Client initialization path taken by the credential resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInit {
    AccessKey {
        region_id: String,
        access_key_id: String,
    },
    SessionToken {
        region_id: String,
        access_key_id: String,
    },
}

/// A `ClientBuilder` that always hands out the same client and records how
/// it was asked to initialize it.
pub struct RecordingClientBuilder {
    client: Arc<dyn OrchestrationClient>,
    inits: Mutex<Vec<ClientInit>>,
}

impl RecordingClientBuilder {
    pub fn new(client: Arc<dyn OrchestrationClient>) -> Self {
        Self {
            client,
            inits: Mutex::new(Vec::new()),
        }
    }

    pub fn inits(&self) -> Vec<ClientInit> {
        self.inits.lock().clone()
    }
}

impl ClientBuilder for RecordingClientBuilder {
    fn with_access_key(
        &self,
        _endpoint: &str,
        region_id: &str,
        access_key_id: &str,
        _access_key_secret: &str,
    ) -> Result<Arc<dyn OrchestrationClient>, CredentialError> {
        self.inits.lock().push(ClientInit::AccessKey {
            region_id: region_id.to_string(),
            access_key_id: access_key_id.to_string(),
        });
        Ok(self.client.clone())
    }

    fn with_session_token(
        &self,
        _endpoint: &str,
        region_id: &str,
        access_key_id: &str,
        _access_key_secret: &str,
        _session_token: &str,
    ) -> Result<Arc<dyn OrchestrationClient>, CredentialError> {
        self.inits.lock().push(ClientInit::SessionToken {
            region_id: region_id.to_string(),
            access_key_id: access_key_id.to_string(),
        });
        Ok(self.client.clone())
    }
}
