//! Shared utility functions for provider adapters.

use sa_domain::config::ProviderEndpoint;
use sa_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the API key for a provider endpoint.
///
/// Precedence:
/// 1. `api_key` field (plaintext — warn)
/// 2. `keychain_service` + `keychain_account` → OS keychain via `keyring`
/// 3. `api_key_env` (reads environment variable)
/// 4. Fallback for keychain mode: env var `{SERVICE}_{ACCOUNT}` uppercased
/// 5. Error
pub fn resolve_api_key(endpoint: &ProviderEndpoint) -> Result<String> {
    if let Some(ref key) = endpoint.api_key {
        tracing::warn!(
            "API key loaded from plaintext config field 'api_key' — \
             prefer 'api_key_env' or keychain instead"
        );
        return Ok(key.clone());
    }

    if let (Some(ref service), Some(ref account)) =
        (&endpoint.keychain_service, &endpoint.keychain_account)
    {
        match resolve_from_keychain(service, account) {
            Ok(secret) => return Ok(secret),
            Err(e) => {
                tracing::warn!(
                    service = %service,
                    account = %account,
                    error = %e,
                    "keychain lookup failed, falling through to env"
                );
            }
        }
    }

    if let Some(ref env_var) = endpoint.api_key_env {
        if let Ok(val) = std::env::var(env_var) {
            return Ok(val);
        }
    }

    if let (Some(ref service), Some(ref account)) =
        (&endpoint.keychain_service, &endpoint.keychain_account)
    {
        let fallback_var = keychain_fallback_env_name(service, account);
        if let Ok(val) = std::env::var(&fallback_var) {
            tracing::info!(
                env_var = %fallback_var,
                "API key resolved from keychain headless fallback env var"
            );
            return Ok(val);
        }
    }

    Err(Error::Auth(format!(
        "no API key configured for provider '{}': set api_key, api_key_env, or \
         keychain_service+keychain_account",
        endpoint.id
    )))
}

/// Try to read a secret from the OS keychain.
///
/// Uses the `keyring` crate which wraps platform-native credential stores
/// (macOS Keychain, Windows Credential Manager, Linux Secret Service / D-Bus).
/// Returns an error on headless systems where no keychain daemon is available.
pub fn resolve_from_keychain(service: &str, account: &str) -> Result<String> {
    let entry = keyring::Entry::new(service, account)
        .map_err(|e| Error::Auth(format!("keyring entry creation failed: {e}")))?;
    entry
        .get_password()
        .map_err(|e| Error::Auth(format!("keyring get_password failed: {e}")))
}

/// Store a secret in the OS keychain, creating or overwriting the entry for
/// `service`/`account`. Counterpart to [`resolve_from_keychain`], used by
/// `serialagent config set-secret`.
pub fn store_in_keychain(service: &str, account: &str, secret: &str) -> Result<()> {
    let entry = keyring::Entry::new(service, account)
        .map_err(|e| Error::Auth(format!("keyring entry creation failed: {e}")))?;
    entry
        .set_password(secret)
        .map_err(|e| Error::Auth(format!("keyring set_password failed: {e}")))
}

/// Build the headless fallback env var name for a keychain service/account.
///
/// Uppercases both parts and replaces hyphens with underscores, then joins
/// with `_`. Example: `("serialagent", "venice-api-key")` → `"SERIALAGENT_VENICE_API_KEY"`.
pub fn keychain_fallback_env_name(service: &str, account: &str) -> String {
    format!(
        "{}_{}",
        service.to_uppercase().replace('-', "_"),
        account.to_uppercase().replace('-', "_"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_env_name_basic() {
        assert_eq!(
            keychain_fallback_env_name("serialagent", "venice-api-key"),
            "SERIALAGENT_VENICE_API_KEY"
        );
    }

    #[test]
    fn fallback_env_name_already_upper() {
        assert_eq!(keychain_fallback_env_name("MY_SVC", "KEY"), "MY_SVC_KEY");
    }

    #[test]
    fn resolve_api_key_plaintext() {
        let endpoint = ProviderEndpoint {
            api_key: Some("sk-test-123".into()),
            api_key_env: None,
            ..ProviderEndpoint::default()
        };
        let result = resolve_api_key(&endpoint).unwrap();
        assert_eq!(result, "sk-test-123");
    }

    #[test]
    fn resolve_api_key_env_var() {
        let var_name = "SA_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "env-secret-value");
        let endpoint = ProviderEndpoint {
            api_key_env: Some(var_name.into()),
            ..ProviderEndpoint::default()
        };
        let result = resolve_api_key(&endpoint).unwrap();
        assert_eq!(result, "env-secret-value");
        std::env::remove_var(var_name);
    }

    #[test]
    fn resolve_api_key_env_var_missing_falls_through_to_error() {
        let endpoint = ProviderEndpoint {
            api_key_env: Some("SA_TEST_NONEXISTENT_VAR_8888".into()),
            ..ProviderEndpoint::default()
        };
        let err = resolve_api_key(&endpoint).unwrap_err();
        assert!(err.to_string().contains("no API key configured"));
    }

    #[test]
    fn resolve_api_key_no_config() {
        let endpoint = ProviderEndpoint {
            api_key_env: None,
            ..ProviderEndpoint::default()
        };
        let err = resolve_api_key(&endpoint).unwrap_err();
        assert!(err.to_string().contains("no API key configured"));
    }

    #[test]
    fn resolve_api_key_keychain_fallback_env() {
        let fallback_var = "SERIALAGENT_MY_PROVIDER";
        std::env::set_var(fallback_var, "fallback-secret");
        let endpoint = ProviderEndpoint {
            api_key_env: None,
            keychain_service: Some("serialagent".into()),
            keychain_account: Some("my-provider".into()),
            ..ProviderEndpoint::default()
        };
        let result = resolve_api_key(&endpoint).unwrap();
        assert_eq!(result, "fallback-secret");
        std::env::remove_var(fallback_var);
    }

    #[test]
    fn resolve_api_key_plaintext_takes_precedence_over_keychain() {
        let endpoint = ProviderEndpoint {
            api_key: Some("plaintext-wins".into()),
            keychain_service: Some("serialagent".into()),
            keychain_account: Some("some-provider".into()),
            api_key_env: Some("SA_TEST_SHOULD_NOT_BE_READ".into()),
            ..ProviderEndpoint::default()
        };
        let result = resolve_api_key(&endpoint).unwrap();
        assert_eq!(result, "plaintext-wins");
    }

    #[test]
    fn resolve_api_key_env_takes_precedence_over_keychain_fallback() {
        let env_var = "SA_TEST_ENV_PREC_KEY_7777";
        let fallback_var = "SERIALAGENT_PREC_PROVIDER";
        std::env::set_var(env_var, "env-wins");
        std::env::set_var(fallback_var, "fallback-loses");
        let endpoint = ProviderEndpoint {
            api_key_env: Some(env_var.into()),
            keychain_service: Some("serialagent".into()),
            keychain_account: Some("prec-provider".into()),
            ..ProviderEndpoint::default()
        };
        let result = resolve_api_key(&endpoint).unwrap();
        assert_eq!(result, "env-wins");
        std::env::remove_var(env_var);
        std::env::remove_var(fallback_var);
    }
}
