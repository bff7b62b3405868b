use anyhow::{Context, Result};
use ca_types::WalletKind;
use ca_wallet_core::SessionConfig;
use std::net::SocketAddr;
use std::time::Duration;

pub(crate) const BIND_ADDR: &str = "ACADEMY_BIND_ADDR";
pub(crate) const STORAGE_PATH: &str = "ACADEMY_STORAGE_PATH";
pub(crate) const REFRESH_INTERVAL_MS: &str = "ACADEMY_REFRESH_INTERVAL_MS";
pub(crate) const CONNECT_DELAY_MS: &str = "ACADEMY_CONNECT_DELAY_MS";
pub(crate) const TRANSACT_DELAY_MS: &str = "ACADEMY_TRANSACT_DELAY_MS";
pub(crate) const SIMULATED_WALLETS: &str = "ACADEMY_SIMULATED_WALLETS";
pub(crate) const PROVIDER_ADDRESS: &str = "ACADEMY_PROVIDER_ADDRESS";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub(crate) struct ServiceConfig {
    pub(crate) bind_addr: SocketAddr,
    /// RocksDB directory. In-memory storage when unset.
    pub(crate) storage_path: Option<String>,
    /// Extensions impersonated by the in-process simulated provider.
    pub(crate) simulated_wallets: Vec<WalletKind>,
    pub(crate) session: SessionConfig,
}

impl ServiceConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let bind_addr: SocketAddr = var(BIND_ADDR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned())
            .parse()
            .with_context(|| format!("{BIND_ADDR} must be a socket address"))?;

        let simulated_wallets = match lookup(SIMULATED_WALLETS) {
            Some(list) => parse_wallets(&list)?,
            None => WalletKind::ALL.to_vec(),
        };

        let mut session = SessionConfig::default();
        if let Some(interval) = millis(var(REFRESH_INTERVAL_MS), REFRESH_INTERVAL_MS)? {
            session.refresh_interval = interval;
        }
        if let Some(delay) = millis(var(CONNECT_DELAY_MS), CONNECT_DELAY_MS)? {
            session.handshake_delay = delay;
        }
        if let Some(delay) = millis(var(TRANSACT_DELAY_MS), TRANSACT_DELAY_MS)? {
            session.transact_delay = delay;
        }
        if let Some(address) = var(PROVIDER_ADDRESS) {
            session.provider_address = address;
        }
        if session.refresh_interval.is_zero() {
            anyhow::bail!("{REFRESH_INTERVAL_MS} must be greater than zero");
        }

        Ok(Self {
            bind_addr,
            storage_path: var(STORAGE_PATH),
            simulated_wallets,
            session,
        })
    }
}

fn millis(value: Option<String>, name: &str) -> Result<Option<Duration>> {
    value
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_millis)
                .with_context(|| format!("{name} must be a whole number of milliseconds"))
        })
        .transpose()
}

/// Comma separated wallet kinds; an empty list registers no simulated wallet.
fn parse_wallets(list: &str) -> Result<Vec<WalletKind>> {
    let mut kinds = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let kind: WalletKind = entry
            .parse()
            .with_context(|| format!("{SIMULATED_WALLETS} contains an unknown wallet"))?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ServiceConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        ServiceConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() -> anyhow::Result<()> {
        let config = config_from(&[])?;
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>()?);
        assert!(config.storage_path.is_none());
        assert_eq!(config.simulated_wallets.len(), 4);
        assert_eq!(config.session.refresh_interval, Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn reads_overrides() -> anyhow::Result<()> {
        let config = config_from(&[
            (BIND_ADDR, "127.0.0.1:9000"),
            (STORAGE_PATH, "/tmp/academy"),
            (REFRESH_INTERVAL_MS, "250"),
            (CONNECT_DELAY_MS, "0"),
            (SIMULATED_WALLETS, "plug, Stoic,plug"),
            (PROVIDER_ADDRESS, "0xAcademy"),
        ])?;

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.storage_path.as_deref(), Some("/tmp/academy"));
        assert_eq!(config.session.refresh_interval, Duration::from_millis(250));
        assert!(config.session.handshake_delay.is_zero());
        assert_eq!(config.simulated_wallets, vec![WalletKind::Plug, WalletKind::Stoic]);
        assert_eq!(config.session.provider_address, "0xAcademy");
        Ok(())
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config_from(&[(REFRESH_INTERVAL_MS, "soon")]).is_err());
        assert!(config_from(&[(REFRESH_INTERVAL_MS, "0")]).is_err());
        assert!(config_from(&[(SIMULATED_WALLETS, "metamask")]).is_err());
        assert!(config_from(&[(BIND_ADDR, "localhost")]).is_err());
    }

    #[test]
    fn empty_wallet_list_disables_simulation() -> anyhow::Result<()> {
        assert!(config_from(&[(SIMULATED_WALLETS, "")])?.simulated_wallets.is_empty());
        Ok(())
    }
}
