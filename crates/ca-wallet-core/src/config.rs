use ca_types::CURRENCY_SYMBOL;
use std::time::Duration;

/// Address that receives course payments.
pub const DEFAULT_PROVIDER_ADDRESS: &str = "0x3a8d29c5DC4cBcA38C9a36726AC56065A4F7A0Fb";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Simulated wallet handshake before the extension is asked to connect.
    pub handshake_delay: Duration,
    /// Simulated processing time of a transfer.
    pub transact_delay: Duration,
    /// Balance refresh / connection poll period of the session monitor.
    pub refresh_interval: Duration,
    /// Upper bound, in whole tokens, of simulated balances.
    pub simulated_balance_max_tokens: u64,
    /// Memo attached to extension transfers.
    pub transfer_memo: u64,
    pub currency: String,
    pub provider_address: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_delay: Duration::from_millis(1500),
            transact_delay: Duration::from_millis(2000),
            refresh_interval: Duration::from_secs(30),
            simulated_balance_max_tokens: 100,
            transfer_memo: 1,
            currency: CURRENCY_SYMBOL.to_owned(),
            provider_address: DEFAULT_PROVIDER_ADDRESS.to_owned(),
        }
    }
}

impl SessionConfig {
    /// Same as the default but without artificial delays.
    pub fn immediate() -> Self {
        Self {
            handshake_delay: Duration::ZERO,
            transact_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}
