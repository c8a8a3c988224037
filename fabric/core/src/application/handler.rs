// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Reconcile handler.
//!
//! Receives create/update/delete events from the external watch framework
//! and drives the lifecycle manager synchronously up to the provider
//! submission; the long wait for a terminal stack status is handed to a
//! background task so the framework's control loop is never blocked for
//! the minutes a provider operation may take. Delete is the exception: it
//! blocks on any pre-existing in-progress operation before issuing its own.

use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tracing::{error, info};

use crate::application::app_stack::{
    load_progressing_app_stacks, AppStack, AppStackStatus, TEMPLATE_BODY,
};
use crate::application::compiler::TemplateCompiler;
use crate::application::context::{ControllerDeps, ExecutionContext};
use crate::application::stack_handle::{DeleteOutcome, StackError, StackHandle, UpdateOutcome};
use crate::domain::api::ApiError;
use crate::domain::app_config::ApplicationDocument;
use crate::domain::config::FABRIC_FINALIZER;
use crate::domain::repository::AppConfigRepository;

/// Event kinds delivered by the external framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CreateOrUpdate,
    Delete,
}

pub struct ReconcileHandler {
    deps: ControllerDeps,
    compiler: TemplateCompiler,
    /// Single-owner lease per app stack name: a freshly submitted wait and
    /// a recovery-triggered wait for the same app stack must not run
    /// concurrently.
    active_waits: Arc<DashMap<String, ()>>,
}

impl ReconcileHandler {
    pub fn new(deps: ControllerDeps) -> Self {
        let compiler = TemplateCompiler::new(deps.schematics.clone());
        Self {
            deps,
            compiler,
            active_waits: Arc::new(DashMap::new()),
        }
    }

    fn spawn_wait(&self, app_stack: Arc<AppStack>, stack: StackHandle, delete_requested: bool) {
        let name = app_stack.name().to_string();
        self.active_waits.insert(name.clone(), ());

        let active_waits = self.active_waits.clone();
        tokio::spawn(async move {
            wait_stack_done_and_save_outputs(app_stack, stack, delete_requested).await;
            active_waits.remove(&name);
        });
    }

    /// Entry point for the external framework. A returned error triggers
    /// the framework's own retry/backoff; validation and provider failures
    /// are persisted as `Failed` instead and return `Ok`.
    pub async fn handle(&self, document: ApplicationDocument, event: EventKind) -> Result<()> {
        let app = document.into_config();
        match event {
            EventKind::CreateOrUpdate => self.create_or_update(app).await,
            EventKind::Delete => self.delete(app).await,
        }
    }

    async fn create_or_update(
        &self,
        app: crate::domain::app_config::ApplicationConfiguration,
    ) -> Result<()> {
        info!(app_name = %app.name, namespace = %app.namespace, "handling create or update");

        let ctx = ExecutionContext::new(app, &self.deps)
            .await
            .context("failed to build execution context")?;
        let app_stack = Arc::new(AppStack::new(ctx));
        let app_stack_name = app_stack.name().to_string();

        if app_stack.is_progressing().await? {
            info!(app_stack_name = %app_stack_name, "application is still progressing");
            return Ok(());
        }

        info!(app_stack_name = %app_stack_name, "generating template for application");
        let template = match self
            .compiler
            .compile(app_stack.context(), &app_stack.context().app)
            .await
        {
            Ok(template) => template,
            Err(err) => {
                error!(app_stack_name = %app_stack_name, error = %err, "template generation failed");
                app_stack.set_failed(&err.to_string()).await?;
                return Ok(());
            }
        };

        // idempotency guard: an unchanged template on a non-failed stack
        // means there is nothing to submit
        let template_body = template.body().context("failed to serialize template body")?;
        let is_failed = app_stack.is_failed().await?;
        let data = app_stack.data().await?;
        if !is_failed && data.get(TEMPLATE_BODY) == Some(&template_body) {
            info!(app_stack_name = %app_stack_name, "application stack template is completely same");
            return Ok(());
        }

        let existing = app_stack.stack().await?;

        // the finalizer must be in place before any infrastructure is
        // mutated, so delete events stay deliverable
        add_cleanup_finalizer(app_stack.context()).await?;

        let stack = match existing {
            None => {
                match self.create_stack(&app_stack, &template, &template_body).await? {
                    Some(stack) => stack,
                    None => return Ok(()),
                }
            }
            Some(mut stack) => {
                info!(app_stack_name = %app_stack_name, stack_id = %stack.id, "updating stack");
                match stack.update(&template).await {
                    Ok(UpdateOutcome::NoChanges) => {
                        info!(app_stack_name = %app_stack_name, "stack is completely same");
                        return Ok(());
                    }
                    Ok(UpdateOutcome::Updated) => {
                        app_stack
                            .set_id_and_template(&stack.id, &template_body)
                            .await?;
                        app_stack.set_progressing().await?;
                        stack
                    }
                    Err(StackError::Api(err)) if err.is_stack_not_found() => {
                        info!(app_stack_name = %app_stack_name, "stack does not exist, falling back to create");
                        match self.create_stack(&app_stack, &template, &template_body).await? {
                            Some(stack) => stack,
                            None => return Ok(()),
                        }
                    }
                    Err(err) => {
                        app_stack.set_failed(&failure_message(&err)).await?;
                        return Ok(());
                    }
                }
            }
        };

        self.spawn_wait(app_stack, stack, false);
        Ok(())
    }

    /// Create path shared by fresh stacks and the not-found fallback.
    /// Returns `None` when the failure was persisted and handled.
    async fn create_stack(
        &self,
        app_stack: &Arc<AppStack>,
        template: &crate::domain::template::Template,
        template_body: &str,
    ) -> Result<Option<StackHandle>> {
        let ctx = app_stack.context();
        info!(stack_name = %app_stack.name(), "creating stack");
        match StackHandle::create(ctx, app_stack.name(), template).await {
            Ok(stack) => {
                app_stack.set_id_and_template(&stack.id, template_body).await?;
                app_stack.set_progressing().await?;
                Ok(Some(stack))
            }
            Err(err) => {
                app_stack.set_failed(&failure_message(&err)).await?;
                Ok(None)
            }
        }
    }

    async fn delete(
        &self,
        app: crate::domain::app_config::ApplicationConfiguration,
    ) -> Result<()> {
        info!(app_name = %app.name, namespace = %app.namespace, "handling delete");

        let ctx = ExecutionContext::new(app, &self.deps)
            .await
            .context("failed to build execution context")?;
        let app_stack = Arc::new(AppStack::new(ctx));
        let app_stack_name = app_stack.name().to_string();

        // delete must not race a concurrent provisioning operation; this is
        // the one path allowed to block the caller
        if app_stack.is_progressing().await? {
            info!(app_stack_name = %app_stack_name, "application is still progressing, waiting");
            if app_stack.wait_until_done().await == AppStackStatus::Deleted {
                return Ok(());
            }
        }

        let Some(mut stack) = app_stack.stack().await? else {
            info!(app_stack_name = %app_stack_name, "no stack to delete for application");
            remove_cleanup_finalizer(app_stack.context()).await?;
            return Ok(());
        };

        info!(app_stack_name = %app_stack_name, stack_id = %stack.id, "deleting stack");
        match stack.delete().await {
            Ok(DeleteOutcome::NotFound) => {
                app_stack.delete().await?;
                remove_cleanup_finalizer(app_stack.context()).await?;
                return Ok(());
            }
            Ok(DeleteOutcome::Submitted) => {
                app_stack.set_progressing().await?;
            }
            Err(err) => {
                // the finalizer stays, so the framework redelivers the
                // delete event
                app_stack.set_failed(&failure_message(&err)).await?;
                return Ok(());
            }
        }

        self.spawn_wait(app_stack, stack, true);
        Ok(())
    }

    /// Resume the completion-wait phase for every app stack the progressing
    /// index knows about. Called on controller start; broken entries are
    /// skipped so one of them cannot block the rest.
    pub async fn recover_progressing_app_stacks(&self) {
        info!("loading progressing app stacks");
        let app_stacks = match load_progressing_app_stacks(&self.deps).await {
            Ok(app_stacks) => app_stacks,
            Err(err) => {
                error!(error = %err, "failed to load progressing app stacks");
                return;
            }
        };

        for app_stack in app_stacks {
            // a wait freshly submitted by a reconcile already owns this app
            // stack; a second, recovery-triggered wait must not race it
            if self.active_waits.contains_key(app_stack.name()) {
                info!(app_stack_name = %app_stack.name(), "completion wait already in flight, skipping recovery");
                continue;
            }

            let stack = match app_stack.stack().await {
                Ok(Some(stack)) => stack,
                Ok(None) => {
                    error!(app_stack_name = %app_stack.name(), "progressing app stack has no stack id, skipping");
                    continue;
                }
                Err(err) => {
                    error!(app_stack_name = %app_stack.name(), error = %err, "failed to re-attach stack, skipping");
                    continue;
                }
            };

            info!(app_stack_name = %app_stack.name(), stack_id = %stack.id, "recovering app stack");
            self.spawn_wait(Arc::new(app_stack), stack, false);
        }
    }
}

/// Background completion-wait phase: poll the stack to a terminal status,
/// then fan outputs out and settle the app stack record. When the wait
/// belongs to a delete (requested explicitly, or observed from the stack's
/// own status on a recovered wait), the record, its output records and the
/// cleanup finalizer are removed unconditionally.
pub async fn wait_stack_done_and_save_outputs(
    app_stack: Arc<AppStack>,
    mut stack: StackHandle,
    delete_requested: bool,
) {
    let app_stack_name = app_stack.name().to_string();
    let (success, status_reason) = stack.wait_until_done().await;
    let deleting = delete_requested || stack.is_in_delete_status();

    if success {
        info!(app_stack_name = %app_stack_name, "stack run done");

        if stack.status.is_provisioning_complete() {
            app_stack.save_outputs(&stack).await;
        }

        if !deleting {
            if let Err(err) = app_stack.set_ready().await {
                error!(app_stack_name = %app_stack_name, error = %err, "failed to set app stack ready");
            }
        }
    } else {
        error!(app_stack_name = %app_stack_name, status_reason = %status_reason, "stack run failed");
        if let Err(err) = app_stack.set_failed(&status_reason).await {
            error!(app_stack_name = %app_stack_name, error = %err, "failed to set app stack failed");
        }
    }

    if deleting {
        if let Err(err) = app_stack.delete().await {
            error!(app_stack_name = %app_stack_name, error = %err, "failed to delete app stack record");
        }
        if let Err(err) = remove_cleanup_finalizer(app_stack.context()).await {
            error!(app_stack_name = %app_stack_name, error = %err, "failed to remove cleanup finalizer");
        }
    }
}

async fn add_cleanup_finalizer(ctx: &ExecutionContext) -> Result<()> {
    info!(app_name = %ctx.app_name, "adding cleanup finalizer");
    let mut app = ctx
        .apps
        .get(&ctx.namespace, &ctx.app_name)
        .await
        .context("failed to fetch app conf for finalizer update")?;
    app.add_finalizer(FABRIC_FINALIZER);
    ctx.apps
        .update(&app)
        .await
        .context("failed to add cleanup finalizer")?;
    Ok(())
}

async fn remove_cleanup_finalizer(ctx: &ExecutionContext) -> Result<()> {
    info!(app_name = %ctx.app_name, "removing cleanup finalizer");
    let mut app = match ctx.apps.get(&ctx.namespace, &ctx.app_name).await {
        Ok(app) => app,
        // the application object is already gone, nothing left to release
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err).context("failed to fetch app conf for finalizer removal"),
    };
    app.remove_finalizer(FABRIC_FINALIZER);
    ctx.apps
        .update(&app)
        .await
        .context("failed to remove cleanup finalizer")?;
    Ok(())
}

/// Surface the provider's own message for API errors; everything else keeps
/// its display form.
fn failure_message(err: &StackError) -> String {
    match err {
        StackError::Api(ApiError { message, .. }) => message.clone(),
        other => other.to_string(),
    }
}
