// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Durable per-application stack state machine.
//!
//! One `AppStack` exists per (tenant, region, application) tuple. The
//! persisted record is the single source of truth; the in-memory status is
//! a cache of it. Transitions into `Progressing` also register the app
//! stack in a single global progressing index so an interrupted wait can be
//! resumed after a controller restart.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{error, info};

use crate::application::context::{ControllerDeps, ExecutionContext};
use crate::application::stack_handle::StackHandle;
use crate::domain::app_config::ApplicationPhase;
use crate::domain::repository::{AppConfigRepository, Record, StoreError};

pub const STACK_ID: &str = "StackId";
pub const STACK_STATUS: &str = "StackStatus";
pub const MESSAGE: &str = "Message";
pub const TEMPLATE_BODY: &str = "TemplateBody";
pub const OUTPUT_SECRET_NAMES: &str = "AppStackOutputSecretNames";

/// Name of the single global record holding the progressing index.
pub const PROGRESSING_INDEX: &str = "progressing-app-stacks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStackStatus {
    Init,
    Progressing,
    Ready,
    Failed,
    Deleted,
}

impl AppStackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Progressing => "Progressing",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
            Self::Deleted => "Deleted",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Init" => Some(Self::Init),
            "Progressing" => Some(Self::Progressing),
            "Ready" => Some(Self::Ready),
            "Failed" => Some(Self::Failed),
            "Deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Deleted)
    }
}

impl fmt::Display for AppStackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor persisted in the progressing index, enough to rebuild an
/// execution context after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStackInfo {
    #[serde(rename = "AppConfNamespace", default)]
    pub app_namespace: String,
    #[serde(rename = "AppConfName", default)]
    pub app_name: String,
    #[serde(rename = "RegionId", default)]
    pub region_id: String,
    #[serde(rename = "AliUid", default)]
    pub tenant_id: String,
}

pub struct AppStack {
    name: String,
    ctx: ExecutionContext,
    record: Record,
    progressing: Record,
    status: RwLock<AppStackStatus>,
}

impl AppStack {
    pub fn new(ctx: ExecutionContext) -> Self {
        let name = derive_record_name(&ctx.region_id, &ctx.tenant_id, &ctx.app_name);
        let record = Record::new(name.clone(), ctx.store.clone());
        let progressing = Record::new(PROGRESSING_INDEX, ctx.store.clone());
        Self {
            name,
            ctx,
            record,
            progressing,
            status: RwLock::new(AppStackStatus::Init),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn app_name(&self) -> &str {
        &self.ctx.app_name
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Name of the record holding the outputs of one component instance.
    pub fn output_secret_name(&self, instance_name: &str) -> String {
        derive_record_name(
            &self.ctx.region_id,
            &self.ctx.tenant_id,
            &format!("{}-{}", self.ctx.app_name, instance_name),
        )
    }

    pub async fn data(&self) -> Result<HashMap<String, String>, StoreError> {
        self.record.data().await
    }

    /// Re-attach a stack handle from the persisted stack id, if any. The
    /// record name doubles as the stack name.
    pub async fn stack(&self) -> Result<Option<StackHandle>, StoreError> {
        let data = self.record.data().await?;
        Ok(match data.get(STACK_ID) {
            Some(id) if !id.is_empty() => Some(StackHandle::attach(
                &self.ctx,
                id.clone(),
                self.name.clone(),
            )),
            _ => None,
        })
    }

    /// Current status. Reads through to the record while the cache still
    /// says `Init`; an absent record reads as `Deleted`.
    pub async fn status(&self) -> Result<AppStackStatus, StoreError> {
        let cached = *self.status.read();
        if cached != AppStackStatus::Init {
            return Ok(cached);
        }

        let raw = self.record.field(STACK_STATUS).await?.unwrap_or_default();
        if raw.is_empty() {
            *self.status.write() = AppStackStatus::Deleted;
            return Ok(AppStackStatus::Deleted);
        }
        Ok(AppStackStatus::parse(&raw).unwrap_or(AppStackStatus::Init))
    }

    pub async fn is_progressing(&self) -> Result<bool, StoreError> {
        Ok(self.status().await? == AppStackStatus::Progressing)
    }

    pub async fn is_failed(&self) -> Result<bool, StoreError> {
        Ok(self.status().await? == AppStackStatus::Failed)
    }

    /// Persist the stack id and the template body it was created or updated
    /// with.
    pub async fn set_id_and_template(
        &self,
        stack_id: &str,
        template_body: &str,
    ) -> Result<(), StoreError> {
        self.record
            .merge(HashMap::from([
                (STACK_ID.to_string(), stack_id.to_string()),
                (TEMPLATE_BODY.to_string(), template_body.to_string()),
            ]))
            .await
    }

    /// Transition to `Failed` with the given message, leave the progressing
    /// index and best-effort propagate the condition to the application
    /// object.
    pub async fn set_failed(&self, message: &str) -> Result<(), StoreError> {
        info!(app_stack_name = %self.name, message, "setting app stack failed");
        *self.status.write() = AppStackStatus::Failed;
        self.record
            .merge(HashMap::from([
                (STACK_STATUS.to_string(), AppStackStatus::Failed.as_str().to_string()),
                (MESSAGE.to_string(), message.to_string()),
            ]))
            .await?;
        self.remove_progressing_info().await?;
        self.maybe_set_app_condition(ApplicationPhase::Failed, message)
            .await;
        Ok(())
    }

    /// Transition to `Progressing` and register in the progressing index.
    pub async fn set_progressing(&self) -> Result<(), StoreError> {
        *self.status.write() = AppStackStatus::Progressing;
        self.record
            .merge(HashMap::from([(
                STACK_STATUS.to_string(),
                AppStackStatus::Progressing.as_str().to_string(),
            )]))
            .await?;
        self.add_progressing_info().await?;
        self.maybe_set_app_condition(ApplicationPhase::Progressing, "")
            .await;
        Ok(())
    }

    /// Transition to `Ready`, clearing any failure message.
    pub async fn set_ready(&self) -> Result<(), StoreError> {
        *self.status.write() = AppStackStatus::Ready;
        self.record
            .merge(HashMap::from([
                (STACK_STATUS.to_string(), AppStackStatus::Ready.as_str().to_string()),
                (MESSAGE.to_string(), String::new()),
            ]))
            .await?;
        self.remove_progressing_info().await?;
        self.maybe_set_app_condition(ApplicationPhase::Ready, "").await;
        Ok(())
    }

    /// Fan provisioning outputs out to one record per component instance,
    /// then persist the joined list of those record names on the app stack
    /// record. Individual record failures are logged, not fatal.
    pub async fn save_outputs(&self, stack: &StackHandle) {
        let mut grouped: HashMap<String, HashMap<String, String>> = HashMap::new();

        for output in &stack.outputs {
            let Some((instance_name, field)) = output.key.split_once('.') else {
                info!(output_key = %output.key, "unexpected output key");
                continue;
            };

            let value = match &output.value {
                serde_json::Value::String(value) => value.clone(),
                other => match serde_json::to_string(other) {
                    Ok(raw) => raw,
                    Err(err) => {
                        error!(output_key = %output.key, error = %err, "unexpected output value");
                        continue;
                    }
                },
            };

            grouped
                .entry(self.output_secret_name(instance_name))
                .or_default()
                .insert(field.to_string(), value);
        }

        let mut record_names = Vec::new();
        for (record_name, data) in grouped {
            let record = Record::new(record_name.clone(), self.ctx.store.clone());
            if let Err(err) = record.replace(data).await {
                error!(record_name = %record_name, error = %err, "failed to save output record");
                continue;
            }
            record_names.push(record_name);
        }
        record_names.sort();

        let joined = record_names.join(",");
        if let Err(err) = self
            .record
            .merge(HashMap::from([(OUTPUT_SECRET_NAMES.to_string(), joined.clone())]))
            .await
        {
            error!(
                app_stack_name = %self.name,
                output_secret_names = %joined,
                error = %err,
                "failed to save output record names"
            );
        }
    }

    /// Purge the app stack record and all of its output records, and leave
    /// the progressing index.
    pub async fn delete(&self) -> Result<(), StoreError> {
        let data = self.record.data().await?;
        if let Some(names) = data.get(OUTPUT_SECRET_NAMES) {
            for name in names.split(',').filter(|name| !name.is_empty()) {
                Record::new(name, self.ctx.store.clone()).delete().await?;
            }
        }

        self.record.delete().await?;
        self.remove_progressing_info().await?;
        *self.status.write() = AppStackStatus::Deleted;
        Ok(())
    }

    /// Block until the app stack record reaches a terminal status. Used by
    /// delete to avoid racing a concurrent provisioning operation.
    pub async fn wait_until_done(&self) -> AppStackStatus {
        loop {
            tokio::time::sleep(self.ctx.config.stack_check_interval).await;
            info!(app_stack_name = %self.name, "waiting for app stack to settle");
            match self.status().await {
                Err(err) => error!(app_stack_name = %self.name, error = %err, "waiting for app stack failed"),
                Ok(status) if status.is_terminal() => {
                    info!(app_stack_name = %self.name, app_stack_status = %status, "app stack settled");
                    return status;
                }
                Ok(_) => {}
            }
        }
    }

    async fn add_progressing_info(&self) -> Result<(), StoreError> {
        let info = AppStackInfo {
            app_namespace: self.ctx.namespace.clone(),
            app_name: self.ctx.app_name.clone(),
            region_id: self.ctx.region_id.clone(),
            tenant_id: self.ctx.tenant_id.clone(),
        };
        let payload = serde_json::to_string(&info)?;
        self.progressing
            .merge(HashMap::from([(self.name.clone(), payload)]))
            .await
    }

    async fn remove_progressing_info(&self) -> Result<(), StoreError> {
        let mut data = self.progressing.data().await?;
        data.remove(&self.name);
        self.progressing.replace(data).await
    }

    /// Best-effort status-condition propagation onto the application
    /// object; suppressed by configuration, tolerated when the object has
    /// meanwhile been deleted.
    async fn maybe_set_app_condition(&self, phase: ApplicationPhase, message: &str) {
        if !self.ctx.config.update_app {
            return;
        }

        let mut app = match self.ctx.apps.get(&self.ctx.namespace, &self.ctx.app_name).await {
            Ok(app) => app,
            Err(err) if err.is_not_found() => return,
            Err(err) => {
                error!(app_name = %self.ctx.app_name, error = %err, "failed to fetch app conf for condition update");
                return;
            }
        };

        app.set_condition(phase, message);
        if let Err(err) = self.ctx.apps.update_status(&app).await {
            error!(app_name = %self.ctx.app_name, error = %err, "failed to update app conf status");
        }
    }
}

/// Derive the durable record name for an app stack:
/// `lower([region-tenant-]app)`, with the region and tenant segments
/// omitted when no tenant is bound.
pub fn derive_record_name(region_id: &str, tenant_id: &str, app_name: &str) -> String {
    if tenant_id.is_empty() {
        app_name.to_lowercase()
    } else {
        format!("{region_id}-{tenant_id}-{app_name}").to_lowercase()
    }
}

/// Load every app stack registered in the progressing index. Descriptors
/// that are malformed or whose application configuration no longer exists
/// are skipped with a logged error; one broken entry must not block the
/// other recoveries.
pub async fn load_progressing_app_stacks(
    deps: &ControllerDeps,
) -> Result<Vec<AppStack>, StoreError> {
    let index = Record::new(PROGRESSING_INDEX, deps.store.clone());
    let data = index.data().await?;

    let mut app_stacks = Vec::new();
    for (record_name, payload) in data {
        let info: AppStackInfo = match serde_json::from_str(&payload) {
            Ok(info) => info,
            Err(err) => {
                error!(
                    app_stack_name = %record_name,
                    payload = %payload,
                    error = %err,
                    "progressing index entry is malformed, skipping"
                );
                continue;
            }
        };

        let app = match deps.apps.get(&info.app_namespace, &info.app_name).await {
            Ok(app) => app,
            Err(err) => {
                error!(
                    app_stack_name = %record_name,
                    app_name = %info.app_name,
                    error = %err,
                    "application configuration for progressing app stack not found, skipping"
                );
                continue;
            }
        };

        let mut ctx = match ExecutionContext::new(app, deps).await {
            Ok(ctx) => ctx,
            Err(err) => {
                error!(
                    app_stack_name = %record_name,
                    error = %err,
                    "failed to rebuild execution context for progressing app stack, skipping"
                );
                continue;
            }
        };
        ctx.tenant_id = info.tenant_id;
        ctx.region_id = info.region_id;

        app_stacks.push(AppStack::new(ctx));
    }
    Ok(app_stacks)
}
