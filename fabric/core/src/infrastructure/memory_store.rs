// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory record store for development and testing.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

use crate::domain::repository::{RecordStore, StoreError};

#[derive(Default)]
pub struct InMemoryRecordStore {
    records: DashMap<String, HashMap<String, String>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, name: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .records
            .get(name)
            .map(|record| record.clone())
            .unwrap_or_default())
    }

    async fn merge(&self, name: &str, data: HashMap<String, String>) -> Result<(), StoreError> {
        self.records
            .entry(name.to_string())
            .or_default()
            .extend(data);
        Ok(())
    }

    async fn replace(&self, name: &str, data: HashMap<String, String>) -> Result<(), StoreError> {
        self.records.insert(name.to_string(), data);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.records.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::Record;
    use std::sync::Arc;

    #[tokio::test]
    async fn absent_records_read_as_empty_and_delete_is_idempotent() {
        let store = InMemoryRecordStore::new();
        assert!(store.get("nothing").await.unwrap().is_empty());
        store.delete("nothing").await.unwrap();
    }

    #[tokio::test]
    async fn merge_creates_then_overlays() {
        let store = InMemoryRecordStore::new();
        store
            .merge("r", HashMap::from([("a".to_string(), "1".to_string())]))
            .await
            .unwrap();
        store
            .merge(
                "r",
                HashMap::from([
                    ("a".to_string(), "2".to_string()),
                    ("b".to_string(), "3".to_string()),
                ]),
            )
            .await
            .unwrap();

        let data = store.get("r").await.unwrap();
        assert_eq!(data.get("a").unwrap(), "2");
        assert_eq!(data.get("b").unwrap(), "3");
    }

    #[tokio::test]
    async fn replace_swaps_the_whole_map() {
        let store = InMemoryRecordStore::new();
        store
            .merge("r", HashMap::from([("a".to_string(), "1".to_string())]))
            .await
            .unwrap();
        store
            .replace("r", HashMap::from([("b".to_string(), "2".to_string())]))
            .await
            .unwrap();

        let data = store.get("r").await.unwrap();
        assert!(data.get("a").is_none());
        assert_eq!(data.get("b").unwrap(), "2");
    }

    #[tokio::test]
    async fn record_handle_lower_cases_its_name() {
        let store = Arc::new(InMemoryRecordStore::new());
        let record = Record::new("MiXeD-Case", store.clone());
        assert_eq!(record.name(), "mixed-case");

        record
            .merge(HashMap::from([("k".to_string(), "v".to_string())]))
            .await
            .unwrap();
        assert_eq!(store.get("mixed-case").await.unwrap().get("k").unwrap(), "v");
    }
}
