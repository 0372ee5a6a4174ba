use sa_domain::config::{Config, ConfigSeverity, ProviderEndpoint};

/// Parse and validate the config, printing any issues.
///
/// Exits with code 0 when valid, code 1 when errors are found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!(
        "\n{} error(s), {} warning(s) in {config_path}",
        error_count, warning_count,
    );

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}

/// Find the `models.proxy` or `models.fallback_providers` entry with the
/// given `id`.
fn find_endpoint<'a>(config: &'a Config, provider_id: &str) -> Option<&'a ProviderEndpoint> {
    if config.models.proxy.id == provider_id {
        return Some(&config.models.proxy);
    }
    config
        .models
        .fallback_providers
        .iter()
        .find(|p| p.id == provider_id)
}

/// Prompt for a secret on stdin (not echoed would require a TTY crate the
/// teacher doesn't carry; read a plain line instead, same as `init`'s
/// prompts).
fn prompt_secret(provider_id: &str) -> anyhow::Result<String> {
    eprint!("API key for '{provider_id}': ");
    use std::io::Write;
    std::io::stderr().flush().ok();
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let secret = input.trim().to_string();
    if secret.is_empty() {
        anyhow::bail!("no key entered");
    }
    Ok(secret)
}

/// Store an API key in the OS keychain for the provider identified by
/// `provider_id`. The provider's `keychain_service`/`keychain_account`
/// fields must already be set in config.toml (`config set-secret` only
/// writes the secret, not the config wiring).
pub fn set_secret(config: &Config, provider_id: &str) -> anyhow::Result<()> {
    let endpoint = find_endpoint(config, provider_id)
        .ok_or_else(|| anyhow::anyhow!("no provider '{provider_id}' in config.toml"))?;
    let (service, account) = endpoint
        .keychain_service
        .as_deref()
        .zip(endpoint.keychain_account.as_deref())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "provider '{provider_id}' has no keychain_service/keychain_account set in config.toml"
            )
        })?;

    let secret = prompt_secret(provider_id)?;
    sa_providers::util::store_in_keychain(service, account, &secret)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Stored API key for '{provider_id}' in the OS keychain ({service}/{account}).");
    Ok(())
}

/// Read (and mask) the API key currently resolvable for `provider_id`,
/// following the same precedence as [`sa_providers::util::resolve_api_key`].
pub fn get_secret(config: &Config, provider_id: &str) -> anyhow::Result<()> {
    let endpoint = find_endpoint(config, provider_id)
        .ok_or_else(|| anyhow::anyhow!("no provider '{provider_id}' in config.toml"))?;

    let key = sa_providers::util::resolve_api_key(endpoint).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{}", mask(&key));
    Ok(())
}

fn mask(secret: &str) -> String {
    if secret.len() <= 8 {
        "*".repeat(secret.len())
    } else {
        format!("{}…{}", &secret[..4], &secret[secret.len() - 4..])
    }
}

#[cfg(test)]
mod secret_tests {
    use super::*;

    #[test]
    fn find_endpoint_matches_proxy() {
        let mut config = Config::default();
        config.models.proxy.id = "primary".into();
        assert!(find_endpoint(&config, "primary").is_some());
        assert!(find_endpoint(&config, "missing").is_none());
    }

    #[test]
    fn find_endpoint_matches_fallback_provider() {
        let mut config = Config::default();
        let mut fallback = ProviderEndpoint::default();
        fallback.id = "anthropic".into();
        config.models.fallback_providers.push(fallback);
        assert!(find_endpoint(&config, "anthropic").is_some());
    }

    #[test]
    fn mask_short_secret_fully_redacted() {
        assert_eq!(mask("short"), "*****");
    }

    #[test]
    fn mask_long_secret_keeps_ends() {
        assert_eq!(mask("sk-abcdefgh12345678"), "sk-a…5678");
    }
}
