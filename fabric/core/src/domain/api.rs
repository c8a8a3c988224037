// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Orchestration API port.
//!
//! Request/response shapes for the provider's stack API, plus the error
//! type its implementations return. The concrete transport lives outside
//! this crate; everything here is exercised through `Arc<dyn
//! OrchestrationClient>`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::credentials::CredentialError;
use crate::domain::stack::{StackOutput, StackStatus};

/// Provider error code for an unknown stack id. Load-bearing: callers fall
/// back to create on update and treat delete as already done.
pub const STACK_NOT_FOUND: &str = "StackNotFound";

/// Provider error code carried by the "completely same stack" rejection.
pub const NOT_SUPPORTED: &str = "NotSupported";

/// Error returned by the orchestration API, carrying the provider's error
/// code and message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The stack no longer exists on the provider side.
    pub fn is_stack_not_found(&self) -> bool {
        self.code == STACK_NOT_FOUND
    }

    /// The submitted template is identical to the applied one; the provider
    /// rejects the update as a no-op rather than a failure.
    pub fn is_stack_same(&self) -> bool {
        self.code == NOT_SUPPORTED && self.message.contains("completely same stack")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackParameter {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateStackRequest {
    pub stack_name: String,
    pub template_body: String,
    pub parameters: Vec<StackParameter>,
    pub timeout_minutes: u32,
    pub disable_rollback: bool,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateStackResponse {
    pub stack_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStackRequest {
    pub stack_id: String,
    pub template_body: String,
    pub parameters: Vec<StackParameter>,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStackRequest {
    pub stack_id: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetStackRequest {
    pub stack_id: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetStackResponse {
    pub stack_name: String,
    pub status: StackStatus,
    pub status_reason: String,
    pub outputs: Vec<StackOutput>,
}

/// Attribute schema of a provider resource type, used to synthesize
/// template outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceTypeSchema {
    pub attributes: BTreeMap<String, AttributeSchema>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSchema {
    pub description: Option<String>,
}

/// A stack request of any shape, handed to the dry-run stub instead of the
/// real API.
#[derive(Debug, Clone, PartialEq)]
pub enum StackRequest {
    Create(CreateStackRequest),
    Update(UpdateStackRequest),
    Delete(DeleteStackRequest),
    Get(GetStackRequest),
}

#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    async fn create_stack(&self, request: CreateStackRequest)
        -> Result<CreateStackResponse, ApiError>;
    async fn update_stack(&self, request: UpdateStackRequest) -> Result<(), ApiError>;
    async fn delete_stack(&self, request: DeleteStackRequest) -> Result<(), ApiError>;
    async fn get_stack(&self, request: GetStackRequest) -> Result<GetStackResponse, ApiError>;
    async fn list_resource_types(&self) -> Result<Vec<String>, ApiError>;
    async fn get_resource_type(&self, resource_type: &str)
        -> Result<ResourceTypeSchema, ApiError>;
}

/// Constructs orchestration clients from resolved credentials. A session
/// token on the credential record routes through the temporary-token path.
pub trait ClientBuilder: Send + Sync {
    fn with_access_key(
        &self,
        endpoint: &str,
        region_id: &str,
        access_key_id: &str,
        access_key_secret: &str,
    ) -> Result<Arc<dyn OrchestrationClient>, CredentialError>;

    fn with_session_token(
        &self,
        endpoint: &str,
        region_id: &str,
        access_key_id: &str,
        access_key_secret: &str,
        session_token: &str,
    ) -> Result<Arc<dyn OrchestrationClient>, CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_not_found_sentinel() {
        assert!(ApiError::new("StackNotFound", "stack x does not exist").is_stack_not_found());
        assert!(!ApiError::new("Throttling", "slow down").is_stack_not_found());
    }

    #[test]
    fn same_stack_sentinel_requires_code_and_message() {
        assert!(ApiError::new(
            "NotSupported",
            "update the completely same stack is not supported"
        )
        .is_stack_same());
        assert!(!ApiError::new("NotSupported", "something else").is_stack_same());
        assert!(!ApiError::new(
            "Throttling",
            "update the completely same stack is not supported"
        )
        .is_stack_same());
    }
}
