// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Controller configuration.
//!
//! An explicit value threaded through the constructors that need it
//! (credential resolution, stack handles, the lifecycle manager) rather than
//! an ambient global, so dry-run and interval overrides stay testable.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

/// Scope binding name that carries a resource identity.
pub const RESOURCE_IDENTITY: &str = "resource-identity";

/// Recognized type of the resource-identity scope.
pub const RESOURCE_IDENTITY_TYPE: &str = "fabric.aegis.dev/v1.ResourceIdentity";

/// Workload type group served by this controller.
pub const FABRIC_GROUP: &str = "fabric.aegis.dev";

/// Workload type version served by this controller.
pub const FABRIC_VERSION: &str = "v1alpha1";

/// Cleanup finalizer placed on application objects before provisioning starts.
pub const FABRIC_FINALIZER: &str = "fabric.aegis.dev/stack-cleanup";

const BASE_USER_AGENT: &str = "fabric-controller";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ControllerConfig {
    /// Orchestration API endpoint.
    pub endpoint: String,

    /// Region stacks are provisioned in unless an identity scope overrides it.
    pub region_id: String,

    /// Static access key pair, the lowest-priority credential source.
    pub access_key_id: String,
    pub access_key_secret: String,

    /// Fixed store record holding shared credentials, tried before the
    /// static pair.
    pub credential_secret_name: String,

    /// Namespace the controller stores its records in.
    pub namespace: String,

    /// Whether status conditions are written back to application objects.
    pub update_app: bool,

    /// Poll interval for stack status checks.
    #[serde(with = "humantime_serde")]
    pub stack_check_interval: Duration,

    /// Bypass the orchestration API and the persistent store.
    pub dry_run: bool,

    /// Service user agent attached to orchestration API requests.
    pub user_agent: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://orchestration.aegis.dev".to_string(),
            region_id: "us-west-1".to_string(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            credential_secret_name: String::new(),
            namespace: "default".to_string(),
            update_app: false,
            stack_check_interval: Duration::from_secs(5),
            dry_run: false,
            user_agent: BASE_USER_AGENT.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load a configuration manifest from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {}", path.as_ref().display()))?;
        serde_yaml::from_str(&raw).context("failed to parse controller config YAML")
    }

    /// Append a per-service segment to the base user agent.
    pub fn with_service_user_agent(mut self, service: &str) -> Self {
        if !service.is_empty() {
            self.user_agent = format!("{}:{}", BASE_USER_AGENT, service.replace(' ', "-"));
        }
        self
    }

    /// Fill empty credential fields from the process environment.
    pub fn with_env_fallbacks(mut self) -> Self {
        if self.access_key_id.is_empty() {
            self.access_key_id = std::env::var("ACCESS_KEY_ID").unwrap_or_default();
        }
        if self.access_key_secret.is_empty() {
            self.access_key_secret = std::env::var("ACCESS_KEY_SECRET").unwrap_or_default();
        }
        if self.credential_secret_name.is_empty() {
            self.credential_secret_name =
                std::env::var("CREDENTIAL_SECRET_NAME").unwrap_or_default();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.stack_check_interval, Duration::from_secs(5));
        assert_eq!(config.user_agent, "fabric-controller");
        assert!(!config.dry_run);
        assert!(!config.update_app);
    }

    #[test]
    fn service_user_agent_replaces_spaces() {
        let config = ControllerConfig::default().with_service_user_agent("my service");
        assert_eq!(config.user_agent, "fabric-controller:my-service");
    }

    #[test]
    fn load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "region-id: eu-central-1\nstack-check-interval: 250ms\nupdate-app: true"
        )
        .unwrap();

        let config = ControllerConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.region_id, "eu-central-1");
        assert_eq!(config.stack_check_interval, Duration::from_millis(250));
        assert!(config.update_app);
        // untouched fields keep their defaults
        assert_eq!(config.namespace, "default");
    }
}
