// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dry-run plumbing: stubs that stand in for the orchestration API when no
//! real call may be made.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::application::stack_handle::{DryRunHandler, StackHandle};
use crate::domain::api::{
    ApiError, CreateStackRequest, CreateStackResponse, DeleteStackRequest, GetStackRequest,
    GetStackResponse, OrchestrationClient, ResourceTypeSchema, StackRequest, UpdateStackRequest,
};
use crate::domain::stack::StackStatus;

/// Default dry-run stub: log the request and succeed.
pub struct LoggingDryRunHandler;

#[async_trait]
impl DryRunHandler for LoggingDryRunHandler {
    async fn handle(&self, stack: &mut StackHandle, request: StackRequest) -> Result<(), ApiError> {
        info!(stack_name = %stack.name, request = ?request, "dry run");
        Ok(())
    }
}

/// Dry-run stub that records every request it sees and can script the
/// status a refresh reports, so wait loops terminate in tests.
#[derive(Default)]
pub struct RecordingDryRunHandler {
    requests: Mutex<Vec<StackRequest>>,
    refresh_status: Mutex<Option<StackStatus>>,
}

impl RecordingDryRunHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_refresh_status(&self, status: StackStatus) {
        *self.refresh_status.lock() = Some(status);
    }

    pub fn take(&self) -> Vec<StackRequest> {
        std::mem::take(&mut *self.requests.lock())
    }
}

#[async_trait]
impl DryRunHandler for RecordingDryRunHandler {
    async fn handle(&self, stack: &mut StackHandle, request: StackRequest) -> Result<(), ApiError> {
        if matches!(request, StackRequest::Get(_)) {
            if let Some(status) = self.refresh_status.lock().clone() {
                stack.status = status;
            }
        }
        self.requests.lock().push(request);
        Ok(())
    }
}

/// Placeholder client held by dry-run execution contexts. Dry-run short
/// circuits every stack operation before the client is reached; any call
/// landing here is a bug surfaced as a provider error rather than a panic.
pub struct UninitializedClient;

const UNINITIALIZED: &str = "ClientUninitialized";

fn uninitialized() -> ApiError {
    ApiError::new(
        UNINITIALIZED,
        "orchestration client is not initialized in dry-run mode",
    )
}

#[async_trait]
impl OrchestrationClient for UninitializedClient {
    async fn create_stack(
        &self,
        _request: CreateStackRequest,
    ) -> Result<CreateStackResponse, ApiError> {
        Err(uninitialized())
    }

    async fn update_stack(&self, _request: UpdateStackRequest) -> Result<(), ApiError> {
        Err(uninitialized())
    }

    async fn delete_stack(&self, _request: DeleteStackRequest) -> Result<(), ApiError> {
        Err(uninitialized())
    }

    async fn get_stack(&self, _request: GetStackRequest) -> Result<GetStackResponse, ApiError> {
        Err(uninitialized())
    }

    async fn list_resource_types(&self) -> Result<Vec<String>, ApiError> {
        Err(uninitialized())
    }

    async fn get_resource_type(
        &self,
        _resource_type: &str,
    ) -> Result<ResourceTypeSchema, ApiError> {
        Err(uninitialized())
    }
}
