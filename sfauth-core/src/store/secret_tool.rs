//! Linux Secret Service backend driven through libsecret's `secret-tool`.

use async_trait::async_trait;

use super::process::{ToolOutput, run_tool};
use super::{Backend, CredentialStore, StoreError};
use crate::token::TokenRecord;

const SECRET_TOOL: &str = "secret-tool";

const LABEL: &str = "--label=Salesforce CLI OAuth token";

/// Secret Service-backed credential store.
///
/// The token is stored as JSON under the attributes `service` and
/// `account`. `secret-tool store` reads the secret from stdin.
pub struct SecretToolStore {
    service: String,
    account: String,
}

impl SecretToolStore {
    /// Create a store for the given attribute values.
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn attributes(&self) -> [&str; 4] {
        ["service", self.service.as_str(), "account", self.account.as_str()]
    }

    fn failure(&self, action: &str, output: &ToolOutput) -> StoreError {
        if service_unavailable(&output.stderr) {
            return StoreError::Unavailable {
                backend: Backend::SecretTool,
                message: format!("Secret Service not reachable: {}", output.stderr_trimmed()),
            };
        }
        StoreError::Backend {
            backend: Backend::SecretTool,
            message: format!("failed to {} secret: {}", action, output.stderr_trimmed()),
        }
    }
}

/// Whether stderr indicates that no Secret Service daemon is running.
fn service_unavailable(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("org.freedesktop.secrets")
        || stderr.contains("cannot autolaunch d-bus")
        || stderr.contains("was not provided by any .service files")
        || stderr.contains("no such secret collection")
}

impl std::fmt::Debug for SecretToolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretToolStore")
            .field("service", &self.service)
            .field("account", &self.account)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for SecretToolStore {
    async fn get(&self) -> Result<Option<TokenRecord>, StoreError> {
        let mut args = vec!["lookup"];
        args.extend(self.attributes());

        let output = run_tool(Backend::SecretTool, SECRET_TOOL, &args, None).await?;

        if !output.status.success() {
            // lookup exits 1 with empty stderr when nothing matches
            if output.code() == Some(1) && output.stderr_trimmed().is_empty() {
                return Ok(None);
            }
            return Err(self.failure("read", &output));
        }

        if output.stdout.is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(output.stdout.expose())?))
    }

    async fn set(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let data = zeroize::Zeroizing::new(serde_json::to_string(record)?);

        let mut args = vec!["store", LABEL];
        args.extend(self.attributes());

        let output = run_tool(Backend::SecretTool, SECRET_TOOL, &args, Some(data.as_bytes())).await?;

        if !output.status.success() {
            return Err(self.failure("store", &output));
        }

        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        let mut args = vec!["clear"];
        args.extend(self.attributes());

        let output = run_tool(Backend::SecretTool, SECRET_TOOL, &args, None).await?;

        if output.status.success() {
            return Ok(());
        }
        if output.code() == Some(1) && !service_unavailable(&output.stderr) {
            return Ok(());
        }

        Err(self.failure("delete", &output))
    }

    fn backend(&self) -> Backend {
        Backend::SecretTool
    }
}
