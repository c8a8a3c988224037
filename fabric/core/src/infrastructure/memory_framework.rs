// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory application object and schematic backends for development and
//! testing. The production counterparts live with the external watch
//! framework, outside this crate.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::app_config::{ApplicationConfiguration, ComponentSchematic};
use crate::domain::repository::{
    AppConfigRepository, FrameworkError, SchematicError, SchematicLookup,
};

#[derive(Default)]
pub struct InMemoryAppConfigRepository {
    apps: DashMap<(String, String), ApplicationConfiguration>,
}

impl InMemoryAppConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, app: ApplicationConfiguration) {
        self.apps
            .insert((app.namespace.clone(), app.name.clone()), app);
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.apps.remove(&(namespace.to_string(), name.to_string()));
    }
}

#[async_trait]
impl AppConfigRepository for InMemoryAppConfigRepository {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ApplicationConfiguration, FrameworkError> {
        self.apps
            .get(&(namespace.to_string(), name.to_string()))
            .map(|app| app.clone())
            .ok_or_else(|| FrameworkError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn update(&self, app: &ApplicationConfiguration) -> Result<(), FrameworkError> {
        let key = (app.namespace.clone(), app.name.clone());
        match self.apps.get_mut(&key) {
            Some(mut stored) => {
                *stored = app.clone();
                Ok(())
            }
            None => Err(FrameworkError::NotFound {
                namespace: app.namespace.clone(),
                name: app.name.clone(),
            }),
        }
    }

    async fn update_status(&self, app: &ApplicationConfiguration) -> Result<(), FrameworkError> {
        let key = (app.namespace.clone(), app.name.clone());
        match self.apps.get_mut(&key) {
            Some(mut stored) => {
                stored.status = app.status.clone();
                Ok(())
            }
            None => Err(FrameworkError::NotFound {
                namespace: app.namespace.clone(),
                name: app.name.clone(),
            }),
        }
    }
}

#[derive(Default)]
pub struct InMemorySchematicRegistry {
    schematics: DashMap<(String, String), ComponentSchematic>,
}

impl InMemorySchematicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, namespace: &str, name: &str, schematic: ComponentSchematic) {
        self.schematics
            .insert((namespace.to_string(), name.to_string()), schematic);
    }
}

#[async_trait]
impl SchematicLookup for InMemorySchematicRegistry {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ComponentSchematic, SchematicError> {
        self.schematics
            .get(&(namespace.to_string(), name.to_string()))
            .map(|schematic| schematic.clone())
            .ok_or_else(|| SchematicError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
