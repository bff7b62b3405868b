use ca_storage::StorageError;
use ca_types::{Amount, WalletKind};
use ca_wallet_provider::ProviderError;
use thiserror::Error;

/// Failures surfaced to the UI. Display strings are meant to be shown as-is.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("{} was not detected; install it from {install_url}", .kind.display_name())]
    WalletUnavailable {
        kind: WalletKind,
        install_url: &'static str,
    },

    #[error("connection to {} was rejected", .kind.display_name())]
    ConnectionRejected { kind: WalletKind },

    #[error("wallet is not connected")]
    NotConnected,

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("recipient is required")]
    InvalidRecipient,

    #[error("insufficient balance: {requested} requested, {available} available")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("wallet extension call failed: {0}")]
    ExtensionCallFailed(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cart is empty")]
    EmptyCart,

    #[error("already enrolled in course {0}")]
    AlreadyEnrolled(u64),

    #[error("progress must be between 0 and 100")]
    InvalidProgress,
}

impl WalletError {
    pub fn unavailable(kind: WalletKind) -> Self {
        WalletError::WalletUnavailable {
            kind,
            install_url: kind.install_url(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;
