//! macOS Keychain backend driven through the `security` command-line tool.

use async_trait::async_trait;

use super::process::{ToolOutput, run_tool};
use super::{Backend, CredentialStore, StoreError};
use crate::token::TokenRecord;

const SECURITY: &str = "security";

/// `security` exit status for a missing item (errSecItemNotFound).
const ITEM_NOT_FOUND: i32 = 44;

/// Keychain-backed credential store.
///
/// The token is stored as a generic password, serialized as JSON, under
/// `service`/`account`. Writes go through `security -i` so the secret is
/// read from stdin instead of appearing on the command line.
pub struct KeychainStore {
    service: String,
    account: String,
}

impl KeychainStore {
    /// Create a store for the given keychain service and account.
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    /// The command fed to `security -i` to add (or update) the item.
    fn add_command(&self, secret: &str) -> String {
        format!(
            "add-generic-password -s {} -a {} -w {} -U\n",
            quote_interactive_arg(self.service.as_str()),
            quote_interactive_arg(self.account.as_str()),
            quote_interactive_arg(secret),
        )
    }

    fn failure(&self, action: &str, output: &ToolOutput) -> StoreError {
        StoreError::Backend {
            backend: Backend::Keychain,
            message: format!("failed to {} keychain item: {}", action, output.stderr_trimmed()),
        }
    }
}

fn is_not_found(output: &ToolOutput) -> bool {
    output.code() == Some(ITEM_NOT_FOUND) || output.stderr.contains("could not be found")
}

/// Quote an argument for `security`'s interactive command parser.
fn quote_interactive_arg(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

impl std::fmt::Debug for KeychainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainStore")
            .field("service", &self.service)
            .field("account", &self.account)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for KeychainStore {
    async fn get(&self) -> Result<Option<TokenRecord>, StoreError> {
        let output = run_tool(
            Backend::Keychain,
            SECURITY,
            &["find-generic-password", "-s", self.service.as_str(), "-a", self.account.as_str(), "-w"],
            None,
        )
        .await?;

        if !output.status.success() {
            if is_not_found(&output) {
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

        // Replace rather than update so stale attributes never linger.
        if let Err(e) = self.delete().await {
            tracing::debug!(error = %e, "could not remove previous keychain item");
        }

        let command = zeroize::Zeroizing::new(self.add_command(&data));
        let output = run_tool(Backend::Keychain, SECURITY, &["-i"], Some(command.as_bytes())).await?;

        if !output.status.success() {
            return Err(self.failure("store", &output));
        }

        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        let output = run_tool(
            Backend::Keychain,
            SECURITY,
            &["delete-generic-password", "-s", self.service.as_str(), "-a", self.account.as_str()],
            None,
        )
        .await?;

        if output.status.success() || is_not_found(&output) {
            return Ok(());
        }

        Err(self.failure("delete", &output))
    }

    fn backend(&self) -> Backend {
        Backend::Keychain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_interactive_arg() {
        assert_eq!(quote_interactive_arg("plain"), r#""plain""#);
        assert_eq!(
            quote_interactive_arg(r#"{"access_token":"a\b"}"#),
            r#""{\"access_token\":\"a\\b\"}""#
        );
    }

    #[test]
    fn test_add_command_keeps_secret_off_argv() {
        let store = KeychainStore::new("salesforce-cli", "oauth_token");
        let command = store.add_command(r#"{"access_token":"x"}"#);

        assert!(command.starts_with("add-generic-password -s \"salesforce-cli\" -a \"oauth_token\""));
        assert!(command.contains(r#"-w "{\"access_token\":\"x\"}""#));
        assert!(command.ends_with(" -U\n"));
    }

    #[cfg(target_os = "macos")]
    #[tokio::test]
    async fn test_keychain_round_trip() {
        let store = KeychainStore::new("sfauth-test", format!("token-{}", std::process::id()));
        let record = TokenRecord::new("keychain-access", "keychain-refresh");

        if let Err(e) = store.set(&record).await {
            eprintln!("Skipping keychain round trip: {}", e);
            return;
        }

        match store.get().await {
            Ok(retrieved) => assert_eq!(retrieved, Some(record)),
            Err(e) => eprintln!("Keychain read failed ({}), skipping", e),
        }

        store.delete().await.unwrap();
        assert!(store.get().await.unwrap().is_none());
        store.delete().await.unwrap();
    }
}
