// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PostgreSQL record store.
//!
//! Production `RecordStore` implementation backed by a single `records`
//! table (name text primary key, data jsonb). Merge maps onto a JSONB
//! concatenation upsert, so the overlay happens inside the database rather
//! than as a read-modify-write on the client.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashMap;

use crate::domain::repository::{RecordStore, StoreError};

pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(connection_string).await?;
        Ok(Self { pool })
    }

    /// Create the backing table if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                name TEXT PRIMARY KEY,
                data JSONB NOT NULL DEFAULT '{}'::jsonb
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn to_json(data: HashMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        data.into_iter()
            .map(|(key, value)| (key, serde_json::Value::String(value)))
            .collect(),
    )
}

fn from_json(value: serde_json::Value) -> Result<HashMap<String, String>, StoreError> {
    serde_json::from_value(value).map_err(StoreError::from)
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn get(&self, name: &str) -> Result<HashMap<String, String>, StoreError> {
        let row = sqlx::query("SELECT data FROM records WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => from_json(row.get::<serde_json::Value, _>("data")),
            None => Ok(HashMap::new()),
        }
    }

    async fn merge(&self, name: &str, data: HashMap<String, String>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO records (name, data)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET data = records.data || EXCLUDED.data
            "#,
        )
        .bind(name)
        .bind(to_json(data))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace(&self, name: &str, data: HashMap<String, String>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO records (name, data)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(name)
        .bind(to_json(data))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM records WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
