// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Persistence and framework ports.
//!
//! | Trait | Backing collaborator | Implementations |
//! |-------|----------------------|-----------------|
//! | `RecordStore` | durable key-value records | `InMemoryRecordStore`, `PostgresRecordStore` |
//! | `AppConfigRepository` | application object store/event framework | `InMemoryAppConfigRepository` |
//! | `SchematicLookup` | component schematic catalog | `InMemorySchematicRegistry` |
//!
//! All durable controller state (stack identity, status, last-applied
//! template, output locations, the crash-recovery index) lives in
//! `RecordStore` records: flat string maps under a derived, lower-cased
//! name. In-memory implementations serve development and testing; the
//! PostgreSQL implementation serves production.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::app_config::{ApplicationConfiguration, ComponentSchematic};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("record serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Durable flat-map records keyed by name.
///
/// `get` on an absent record yields an empty map and `delete` on an absent
/// record succeeds; `merge` creates the record if needed and overlays the
/// given keys onto the existing ones, while `replace` swaps the whole map.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<HashMap<String, String>, StoreError>;
    async fn merge(&self, name: &str, data: HashMap<String, String>) -> Result<(), StoreError>;
    async fn replace(&self, name: &str, data: HashMap<String, String>) -> Result<(), StoreError>;
    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Handle to one named record. Normalizes the name to lower case once, so
/// every store access for the record agrees on the key.
#[derive(Clone)]
pub struct Record {
    name: String,
    store: Arc<dyn RecordStore>,
}

impl Record {
    pub fn new(name: impl Into<String>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn data(&self) -> Result<HashMap<String, String>, StoreError> {
        self.store.get(&self.name).await
    }

    pub async fn field(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut data = self.data().await?;
        Ok(data.remove(key))
    }

    pub async fn merge(&self, data: HashMap<String, String>) -> Result<(), StoreError> {
        self.store.merge(&self.name, data).await
    }

    pub async fn replace(&self, data: HashMap<String, String>) -> Result<(), StoreError> {
        self.store.replace(&self.name, data).await
    }

    pub async fn delete(&self) -> Result<(), StoreError> {
        self.store.delete(&self.name).await
    }
}

/// Pluggable record store backend selected at controller startup.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    InMemory,
    Postgres { connection_string: String },
}

#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("application configuration '{namespace}/{name}' not found")]
    NotFound { namespace: String, name: String },

    #[error("framework error: {0}")]
    Backend(String),
}

impl FrameworkError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FrameworkError::NotFound { .. })
    }
}

/// Access to the application objects owned by the external watch/reconcile
/// framework: fetching the current generation, writing back metadata
/// (finalizers) and status conditions.
#[async_trait]
pub trait AppConfigRepository: Send + Sync {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ApplicationConfiguration, FrameworkError>;

    async fn update(&self, app: &ApplicationConfiguration) -> Result<(), FrameworkError>;

    async fn update_status(&self, app: &ApplicationConfiguration) -> Result<(), FrameworkError>;
}

#[derive(Debug, Error)]
pub enum SchematicError {
    #[error("component schematic '{namespace}/{name}' not found")]
    NotFound { namespace: String, name: String },

    #[error("schematic lookup error: {0}")]
    Backend(String),
}

/// Resolves a component configuration's schematic reference.
#[async_trait]
pub trait SchematicLookup: Send + Sync {
    async fn get(&self, namespace: &str, name: &str)
        -> Result<ComponentSchematic, SchematicError>;
}
