//! Transaction identifiers and simulated balances.
//!
//! When the connected extension declares a transfer call, the transfer is
//! delegated to it and its identifier is used. Otherwise the identifier is
//! synthesized locally. Nothing here deduplicates: submitting the same
//! purchase twice produces two transactions.

use ca_types::{Amount, WalletAddress, WalletKind};
use ca_wallet_provider::{ProviderError, TransferRequest, WalletProvider};
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

use crate::config::SessionConfig;

#[derive(Debug, Clone)]
pub struct TransactionSimulator {
    delay: Duration,
    memo: u64,
    max_balance_tokens: u64,
}

impl TransactionSimulator {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            delay: config.transact_delay,
            memo: config.transfer_memo,
            max_balance_tokens: config.simulated_balance_max_tokens,
        }
    }

    /// Runs the transfer and returns its identifier. Does not touch any balance.
    pub async fn submit(
        &self,
        provider: Option<&dyn WalletProvider>,
        kind: WalletKind,
        from: &WalletAddress,
        recipient: &str,
        amount: Amount,
    ) -> Result<String, ProviderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(provider) = provider.filter(|p| p.capabilities().transfer) {
            let receipt = provider
                .transfer(TransferRequest {
                    to: recipient.to_owned(),
                    amount,
                    memo: Some(self.memo),
                })
                .await?;
            debug!("{} extension accepted transfer {}", kind, receipt.transaction_id);
            return Ok(receipt.transaction_id);
        }

        Ok(synthesize_id(kind, from, recipient, amount))
    }

    /// Fresh balance for wallets whose extension cannot report one.
    pub fn simulated_balance(&self) -> Amount {
        Amount::from_tokens(rand::thread_rng().gen_range(0..=self.max_balance_tokens))
    }
}

/// `<kind>-tx-<32 hex>`, unique per call.
pub fn synthesize_id(
    kind: WalletKind,
    from: &WalletAddress,
    recipient: &str,
    amount: Amount,
) -> String {
    let nonce: u64 = rand::thread_rng().r#gen();
    let payload = format!(
        "{}:{}:{}:{}:{}",
        from.0,
        recipient,
        amount.base_units(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        nonce
    );
    let digest = Sha256::digest(payload.as_bytes());
    format!("{}-tx-{}", kind, hex_lower(&digest[..16]))
}

/// Fallback address for extensions that cannot report an identity.
pub fn fallback_address(kind: WalletKind) -> WalletAddress {
    let suffix: u32 = rand::thread_rng().r#gen();
    WalletAddress(format!("{kind}-{suffix:08x}"))
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use ca_wallet_simulated::SimulatedWallet;

    fn simulator() -> TransactionSimulator {
        TransactionSimulator::new(&SessionConfig::immediate())
    }

    #[tokio::test]
    async fn synthesizes_id_without_transfer_capability() {
        let stoic = SimulatedWallet::new(WalletKind::Stoic);
        let from = WalletAddress("icp-principal-abc".to_owned());

        let id = simulator()
            .submit(Some(&stoic), WalletKind::Stoic, &from, "0xProvider", Amount::from_tokens(1))
            .await
            .expect("synthesized");

        assert!(id.starts_with("stoic-tx-"));
        assert_eq!(id.len(), "stoic-tx-".len() + 32);
    }

    #[tokio::test]
    async fn delegates_to_extension_transfer() {
        let plug = SimulatedWallet::new(WalletKind::Plug);
        plug.request_connect().await.expect("connect");
        let from = WalletAddress("icp-principal-abc".to_owned());

        let id = simulator()
            .submit(Some(&plug), WalletKind::Plug, &from, "0xProvider", Amount::from_tokens(2))
            .await
            .expect("transfer");

        assert!(id.starts_with("tx-"));
        let transfers = plug.transfers().await;
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].memo, Some(1));
    }

    #[tokio::test]
    async fn transfer_failure_propagates() {
        let plug = SimulatedWallet::new(WalletKind::Plug);
        let from = WalletAddress("icp-principal-abc".to_owned());

        // Never connected, so the extension refuses the transfer.
        let result = simulator()
            .submit(Some(&plug), WalletKind::Plug, &from, "0xProvider", Amount::from_tokens(2))
            .await;

        assert!(matches!(result, Err(ProviderError::CallFailed { .. })));
    }

    #[test]
    fn synthesized_ids_differ() {
        let from = WalletAddress("a".to_owned());
        let first = synthesize_id(WalletKind::Plug, &from, "b", Amount::from_tokens(1));
        let second = synthesize_id(WalletKind::Plug, &from, "b", Amount::from_tokens(1));
        assert_ne!(first, second);
    }

    #[test]
    fn fallback_address_is_prefixed_with_kind() {
        let address = fallback_address(WalletKind::Infinity);
        assert!(address.0.starts_with("infinity-"));
        assert_eq!(address.0.len(), "infinity-".len() + 8);
    }
}
