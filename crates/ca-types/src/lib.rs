mod amount;

pub use amount::{Amount, AmountParseError, DECIMALS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency symbol shown next to balances and prices.
pub const CURRENCY_SYMBOL: &str = "ICP";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    Plug,
    Stoic,
    Infinity,
    Bitfinity,
}

impl WalletKind {
    pub const ALL: [WalletKind; 4] = [
        WalletKind::Plug,
        WalletKind::Stoic,
        WalletKind::Infinity,
        WalletKind::Bitfinity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WalletKind::Plug => "plug",
            WalletKind::Stoic => "stoic",
            WalletKind::Infinity => "infinity",
            WalletKind::Bitfinity => "bitfinity",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            WalletKind::Plug => "Plug Wallet",
            WalletKind::Stoic => "Stoic Wallet",
            WalletKind::Infinity => "Infinity Wallet",
            WalletKind::Bitfinity => "Bitfinity Wallet",
        }
    }

    /// Where a user without the extension is sent to install it.
    pub fn install_url(self) -> &'static str {
        match self {
            WalletKind::Plug => "https://plugwallet.ooo/",
            WalletKind::Stoic => "https://www.stoicwallet.com/",
            WalletKind::Infinity => "https://infinityswap.one/",
            WalletKind::Bitfinity => "https://wallet.bitfinity.network/",
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported wallet kind: {0}")]
pub struct UnknownWalletKind(pub String);

impl FromStr for WalletKind {
    type Err = UnknownWalletKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        WalletKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownWalletKind(value.to_owned()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WalletAddress(pub String);

impl WalletAddress {
    /// Shortened form for navigation bars, e.g. `0x1234...5678`.
    pub fn short(&self) -> String {
        format_wallet_address(&self.0, 6, 4)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn format_wallet_address(address: &str, start_chars: usize, end_chars: usize) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= start_chars + end_chars {
        return address.to_owned();
    }
    let head: String = chars[..start_chars].iter().collect();
    let tail: String = chars[chars.len() - end_chars..].iter().collect();
    format!("{head}...{tail}")
}

/// Whether the balance came from the wallet extension or from the local simulator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BalanceOrigin {
    Extension,
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletSession {
    pub connected: bool,
    pub address: WalletAddress,
    pub wallet_kind: WalletKind,
    pub balance: Amount,
    pub balance_origin: BalanceOrigin,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxDirection {
    Outgoing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub amount: Amount,
    pub recipient: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub direction: TxDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartItem {
    pub course_id: u64,
    pub title: String,
    pub price: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Enrollment {
    pub course_id: u64,
    pub course_title: String,
    pub wallet_address: WalletAddress,
    pub enrollment_date: DateTime<Utc>,
    pub transaction_id: String,
    pub amount: Amount,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupportedWallet {
    pub kind: WalletKind,
    pub name: String,
    pub available: bool,
    pub install_url: String,
}

// ── HTTP request / response bodies ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub wallet_kind: WalletKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub connected: bool,
    pub session: Option<WalletSession>,
    pub display_address: Option<String>,
    pub display_balance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactRequest {
    pub amount: Amount,
    pub recipient: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactResponse {
    pub transaction: Transaction,
    pub balance: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub wallet_address: String,
    pub balance: Amount,
    pub balance_origin: BalanceOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletListResponse {
    pub wallets: Vec<SupportedWallet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    pub total: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub transaction: Transaction,
    pub enrollments: Vec<Enrollment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollRequest {
    pub title: String,
    pub price: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentListResponse {
    pub enrollments: Vec<Enrollment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRequest {
    pub percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub course_id: u64,
    pub percent: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_kind_parses_case_insensitively() {
        assert_eq!("Plug".parse::<WalletKind>(), Ok(WalletKind::Plug));
        assert_eq!(" bitfinity ".parse::<WalletKind>(), Ok(WalletKind::Bitfinity));
        assert!("metamask".parse::<WalletKind>().is_err());
    }

    #[test]
    fn wallet_kind_serializes_as_lowercase() {
        let json = serde_json::to_string(&WalletKind::Infinity).unwrap();
        assert_eq!(json, "\"infinity\"");
    }

    #[test]
    fn short_address_keeps_head_and_tail() {
        let address = WalletAddress("0x1234567890abcdef1234567890abcdef12345678".to_owned());
        assert_eq!(address.short(), "0x1234...5678");
        assert_eq!(format_wallet_address("plug-ab", 6, 4), "plug-ab");
    }
}
