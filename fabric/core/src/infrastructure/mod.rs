// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod dry_run;
pub mod memory_api;
pub mod memory_framework;
pub mod memory_store;
pub mod postgres_store;

use std::sync::Arc;

use crate::domain::repository::{RecordStore, StoreBackend, StoreError};

/// Open the record store selected by configuration: in-memory for
/// development and testing, PostgreSQL for production.
pub async fn open_record_store(
    backend: &StoreBackend,
) -> Result<Arc<dyn RecordStore>, StoreError> {
    match backend {
        StoreBackend::InMemory => Ok(Arc::new(memory_store::InMemoryRecordStore::new())),
        StoreBackend::Postgres { connection_string } => {
            let store = postgres_store::PostgresRecordStore::connect(connection_string).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
    }
}
