//! Wallet session state for the course academy.
//!
//! [`WalletSessionStore`] owns the connected wallet, its balance and the
//! transaction history. [`SessionMonitor`] keeps it in sync with the
//! extension in the background and [`Checkout`] turns cart contents into
//! paid enrollments.

pub mod checkout;
pub mod config;
pub mod error;
pub mod monitor;
pub mod simulator;
pub mod store;

pub use checkout::{Checkout, CheckoutReceipt};
pub use config::{DEFAULT_PROVIDER_ADDRESS, SessionConfig};
pub use error::{Result, WalletError};
pub use monitor::SessionMonitor;
pub use simulator::TransactionSimulator;
pub use store::WalletSessionStore;
