// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Core reconciliation engine for the AEGIS fabric controller.
//!
//! Turns a declarative application configuration (named component instances
//! with parameter bindings) into a provider infrastructure template, submits
//! it as a managed stack, and tracks the stack's asynchronous lifecycle to
//! completion, persisting enough state to survive controller restarts
//! mid-operation.
//!
//! # Architecture
//!
//! - **`domain`**: configuration, template and stack types, persistence and
//!   provider ports, error taxonomy
//! - **`application`**: template compiler, stack handle, lifecycle manager,
//!   reconcile handler, crash recovery
//! - **`infrastructure`**: in-memory and PostgreSQL record stores, in-memory
//!   framework backends, provider simulator, dry-run plumbing

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
