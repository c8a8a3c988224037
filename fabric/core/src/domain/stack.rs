// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Provider stack lifecycle states and their classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel stack id assigned in dry-run mode instead of calling the API.
pub const DRY_RUN_FAKE_STACK: &str = "DryRunFakeStack";

/// Lifecycle status reported by the orchestration API for a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    UpdateInProgress,
    UpdateFailed,
    UpdateComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    CreateRollbackInProgress,
    CreateRollbackFailed,
    CreateRollbackComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    CheckInProgress,
    CheckFailed,
    CheckComplete,
    ReviewInProgress,
    /// Any status string this controller does not classify; treated as
    /// still in progress.
    Other(String),
}

/// What a status means for a waiting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOutcome {
    Complete,
    Failed,
    InProgress,
}

impl StackStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_FAILED" => Self::CreateFailed,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "UPDATE_IN_PROGRESS" => Self::UpdateInProgress,
            "UPDATE_FAILED" => Self::UpdateFailed,
            "UPDATE_COMPLETE" => Self::UpdateComplete,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_FAILED" => Self::DeleteFailed,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            "CREATE_ROLLBACK_IN_PROGRESS" => Self::CreateRollbackInProgress,
            "CREATE_ROLLBACK_FAILED" => Self::CreateRollbackFailed,
            "CREATE_ROLLBACK_COMPLETE" => Self::CreateRollbackComplete,
            "ROLLBACK_IN_PROGRESS" => Self::RollbackInProgress,
            "ROLLBACK_FAILED" => Self::RollbackFailed,
            "ROLLBACK_COMPLETE" => Self::RollbackComplete,
            "CHECK_IN_PROGRESS" => Self::CheckInProgress,
            "CHECK_FAILED" => Self::CheckFailed,
            "CHECK_COMPLETE" => Self::CheckComplete,
            "REVIEW_IN_PROGRESS" => Self::ReviewInProgress,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateFailed => "CREATE_FAILED",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::CreateRollbackInProgress => "CREATE_ROLLBACK_IN_PROGRESS",
            Self::CreateRollbackFailed => "CREATE_ROLLBACK_FAILED",
            Self::CreateRollbackComplete => "CREATE_ROLLBACK_COMPLETE",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::CheckInProgress => "CHECK_IN_PROGRESS",
            Self::CheckFailed => "CHECK_FAILED",
            Self::CheckComplete => "CHECK_COMPLETE",
            Self::ReviewInProgress => "REVIEW_IN_PROGRESS",
            Self::Other(raw) => raw,
        }
    }

    /// Classify for the wait loop: the complete family ends the wait with
    /// success, the failed/rollback family ends it with failure, everything
    /// else keeps polling.
    pub fn outcome(&self) -> StackOutcome {
        match self {
            Self::CreateComplete
            | Self::UpdateComplete
            | Self::DeleteComplete
            | Self::CheckComplete => StackOutcome::Complete,
            Self::CreateFailed
            | Self::UpdateFailed
            | Self::DeleteFailed
            | Self::CheckFailed
            | Self::CreateRollbackFailed
            | Self::CreateRollbackComplete
            | Self::RollbackFailed
            | Self::RollbackComplete => StackOutcome::Failed,
            _ => StackOutcome::InProgress,
        }
    }

    /// Whether this status belongs to a delete operation.
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Self::DeleteInProgress | Self::DeleteFailed | Self::DeleteComplete
        )
    }

    /// Whether this terminal status produced consumable outputs
    /// (create/update/check completions; a completed delete has none).
    pub fn is_provisioning_complete(&self) -> bool {
        matches!(
            self,
            Self::CreateComplete | Self::UpdateComplete | Self::CheckComplete
        )
    }
}

impl Default for StackStatus {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StackStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StackStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// One provisioning output reported by the orchestration API. The key
/// encodes `<componentInstance>.<attributeName>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackOutput {
    #[serde(rename = "OutputKey")]
    pub key: String,
    #[serde(rename = "OutputValue")]
    pub value: serde_json::Value,
}
