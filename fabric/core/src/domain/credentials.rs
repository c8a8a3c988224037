// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Provider credentials and the resource identity scope they are looked up
//! by.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::repository::StoreError;

pub const ACCESS_KEY_ID: &str = "AccessKeyId";
pub const ACCESS_KEY_SECRET: &str = "AccessKeySecret";
pub const SESSION_TOKEN: &str = "SessionToken";
pub const EXPIRATION: &str = "Expiration";

/// Resolved provider API credentials. A present session token means the
/// client must be initialized through the temporary-token path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: String,
    pub session_token: Option<String>,
    pub expiration: Option<String>,
}

/// Identity carried by a `resource-identity` scope binding: which tenant
/// and region the application's infrastructure belongs to, and under which
/// key its credentials are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentity {
    #[serde(rename = "appName")]
    pub app_name: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "regionId", default)]
    pub region_id: String,
}

impl ResourceIdentity {
    /// Store key of the credential record for this identity.
    pub fn secret_key(&self) -> String {
        format!("{}.{}.{}", self.app_name, self.region_id, self.tenant_id)
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("resource identity scope is malformed: {0}")]
    IdentityMalformed(#[source] serde_json::Error),

    #[error("credential record '{name}' is invalid: AccessKeyId and AccessKeySecret must be supplied")]
    CredentialNotFound { name: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to initialize orchestration client: {0}")]
    ClientInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_secret_key_joins_segments_with_dots() {
        let identity = ResourceIdentity {
            app_name: "web-app".to_string(),
            tenant_id: "123456789".to_string(),
            region_id: "cn-beijing".to_string(),
        };
        assert_eq!(identity.secret_key(), "web-app.cn-beijing.123456789");
    }

    #[test]
    fn identity_decodes_from_scope_properties() {
        let raw = r#"{"appName": "web-app", "tenantId": "42", "regionId": "eu-west-1"}"#;
        let identity: ResourceIdentity = serde_json::from_str(raw).unwrap();
        assert_eq!(identity.app_name, "web-app");
        assert_eq!(identity.tenant_id, "42");
        assert_eq!(identity.region_id, "eu-west-1");
    }

    #[test]
    fn region_is_optional_on_the_wire() {
        let raw = r#"{"appName": "web-app", "tenantId": "42"}"#;
        let identity: ResourceIdentity = serde_json::from_str(raw).unwrap();
        assert!(identity.region_id.is_empty());
    }
}
