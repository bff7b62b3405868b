//! Wallet extension seam.
//!
//! Each supported extension is one `WalletProvider` implementation. What an
//! extension can do is declared up front through [`Capabilities`]; callers
//! check the declaration instead of probing for methods at runtime, and a
//! provider asked for something it does not declare answers
//! [`ProviderError::Unsupported`].

use async_trait::async_trait;
use ca_types::{Amount, WalletAddress, WalletKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Can report the principal of the connected account.
    pub identity: bool,
    pub balance: bool,
    pub transfer: bool,
    pub disconnect: bool,
    /// Can answer "is this site still connected".
    pub connection_status: bool,
    /// Pushes account-change and disconnect events.
    pub events: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        identity: false,
        balance: false,
        transfer: false,
        disconnect: false,
        connection_status: false,
        events: false,
    };

    pub const PLUG: Capabilities = Capabilities {
        identity: true,
        balance: true,
        transfer: true,
        disconnect: true,
        connection_status: true,
        events: false,
    };

    pub const STOIC: Capabilities = Capabilities {
        identity: true,
        balance: false,
        transfer: false,
        disconnect: true,
        connection_status: true,
        events: false,
    };

    // Infinity exposes no disconnect call.
    pub const INFINITY: Capabilities = Capabilities {
        identity: true,
        balance: true,
        transfer: false,
        disconnect: false,
        connection_status: true,
        events: false,
    };

    pub const BITFINITY: Capabilities = Capabilities {
        identity: true,
        balance: true,
        transfer: false,
        disconnect: true,
        connection_status: true,
        events: false,
    };

    /// Capability table of the real browser extension for `kind`.
    pub const fn for_kind(kind: WalletKind) -> Capabilities {
        match kind {
            WalletKind::Plug => Self::PLUG,
            WalletKind::Stoic => Self::STOIC,
            WalletKind::Infinity => Self::INFINITY,
            WalletKind::Bitfinity => Self::BITFINITY,
        }
    }

    pub const fn with_events(self) -> Capabilities {
        Capabilities {
            events: true,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{kind} wallet does not support {operation}")]
    Unsupported {
        kind: WalletKind,
        operation: &'static str,
    },
    #[error("{kind} extension call failed: {message}")]
    CallFailed { kind: WalletKind, message: String },
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Approved,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub to: String,
    pub amount: Amount,
    pub memo: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountChanged { address: WalletAddress },
    Disconnected,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn kind(&self) -> WalletKind;
    fn capabilities(&self) -> Capabilities;

    /// Whether the extension is present in the host environment.
    fn is_available(&self) -> bool;

    async fn request_connect(&self) -> Result<ConnectOutcome>;

    async fn principal(&self) -> Result<WalletAddress> {
        Err(unsupported(self.kind(), "principal"))
    }

    async fn disconnect(&self) -> Result<()> {
        Err(unsupported(self.kind(), "disconnect"))
    }

    async fn balance(&self) -> Result<Amount> {
        Err(unsupported(self.kind(), "balance"))
    }

    async fn transfer(&self, _request: TransferRequest) -> Result<TransferReceipt> {
        Err(unsupported(self.kind(), "transfer"))
    }

    async fn is_connected(&self) -> Result<bool> {
        Err(unsupported(self.kind(), "connection status"))
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<WalletEvent>> {
        None
    }
}

pub fn unsupported(kind: WalletKind, operation: &'static str) -> ProviderError {
    ProviderError::Unsupported { kind, operation }
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<WalletKind, Arc<dyn WalletProvider>>,
}

impl ProviderRegistry {
    pub fn register(&mut self, provider: Arc<dyn WalletProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn provider(&self, kind: WalletKind) -> Option<Arc<dyn WalletProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn is_available(&self, kind: WalletKind) -> bool {
        self.providers
            .get(&kind)
            .is_some_and(|provider| provider.is_available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BareProvider;

    #[async_trait]
    impl WalletProvider for BareProvider {
        fn kind(&self) -> WalletKind {
            WalletKind::Stoic
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn request_connect(&self) -> Result<ConnectOutcome> {
            Ok(ConnectOutcome::Approved)
        }
    }

    #[tokio::test]
    async fn undeclared_calls_are_unsupported() {
        let provider = BareProvider;
        assert_eq!(
            provider.balance().await,
            Err(ProviderError::Unsupported {
                kind: WalletKind::Stoic,
                operation: "balance",
            })
        );
        assert!(provider.subscribe().is_none());
    }

    #[test]
    fn registry_reports_availability_per_kind() {
        let mut registry = ProviderRegistry::default();
        registry.register(Arc::new(BareProvider));

        assert!(registry.is_available(WalletKind::Stoic));
        assert!(!registry.is_available(WalletKind::Plug));
        assert!(registry.provider(WalletKind::Plug).is_none());
    }

    #[test]
    fn capability_tables_match_extensions() {
        assert!(Capabilities::for_kind(WalletKind::Plug).transfer);
        assert!(!Capabilities::for_kind(WalletKind::Infinity).disconnect);
        assert!(!Capabilities::for_kind(WalletKind::Stoic).balance);
        assert!(Capabilities::BITFINITY.with_events().events);
    }
}
