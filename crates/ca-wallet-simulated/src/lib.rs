//! In-process stand-in for the browser wallet extensions.
//!
//! Used in development and tests where no real extension is installed. It
//! honours the capability table of the extension it impersonates, so a
//! simulated Stoic wallet still has no balance call.

use async_trait::async_trait;
use ca_types::{Amount, WalletAddress, WalletKind};
use ca_wallet_provider::{
    Capabilities, ConnectOutcome, ProviderError, Result, TransferReceipt, TransferRequest,
    WalletEvent, WalletProvider, unsupported,
};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, broadcast};
use tracing::info;
use uuid::Uuid;

const DEFAULT_MAX_BALANCE_TOKENS: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub enum SimulatedBalance {
    Fixed(Amount),
    /// Uniform whole-token draw in `0..=max_tokens` on every query.
    Random { max_tokens: u64 },
}

#[derive(Debug)]
struct Behavior {
    approve_connect: bool,
    principal: Option<String>,
    balance: SimulatedBalance,
    transfers: Vec<TransferRequest>,
}

pub struct SimulatedWallet {
    kind: WalletKind,
    capabilities: Capabilities,
    installed: AtomicBool,
    connected: AtomicBool,
    failing: AtomicBool,
    behavior: RwLock<Behavior>,
    events: Option<broadcast::Sender<WalletEvent>>,
}

impl SimulatedWallet {
    pub fn new(kind: WalletKind) -> Self {
        Self {
            kind,
            capabilities: Capabilities::for_kind(kind),
            installed: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            failing: AtomicBool::new(false),
            behavior: RwLock::new(Behavior {
                approve_connect: true,
                principal: None,
                balance: SimulatedBalance::Random {
                    max_tokens: DEFAULT_MAX_BALANCE_TOKENS,
                },
                transfers: Vec::new(),
            }),
            events: None,
        }
    }

    pub fn uninstalled(self) -> Self {
        self.installed.store(false, Ordering::SeqCst);
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.behavior.get_mut().approve_connect = false;
        self
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.behavior.get_mut().principal = Some(principal.into());
        self
    }

    pub fn with_balance(mut self, balance: Amount) -> Self {
        self.behavior.get_mut().balance = SimulatedBalance::Fixed(balance);
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Turns on the push channel used for account-change notifications.
    pub fn with_events(mut self) -> Self {
        let (sender, _) = broadcast::channel(16);
        self.capabilities = self.capabilities.with_events();
        self.events = Some(sender);
        self
    }

    /// Makes every subsequent extension call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn set_balance(&self, balance: Amount) {
        self.behavior.write().await.balance = SimulatedBalance::Fixed(balance);
    }

    /// The user revoked the site from the extension UI.
    pub fn revoke(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.emit(WalletEvent::Disconnected);
    }

    pub fn switch_account(&self, principal: impl Into<String>) {
        self.emit(WalletEvent::AccountChanged {
            address: WalletAddress(principal.into()),
        });
    }

    pub async fn transfers(&self) -> Vec<TransferRequest> {
        self.behavior.read().await.transfers.clone()
    }

    fn emit(&self, event: WalletEvent) {
        if let Some(sender) = &self.events {
            // No receivers simply means nobody is monitoring yet.
            let _ = sender.send(event);
        }
    }

    fn guard(&self, declared: bool, operation: &'static str) -> Result<()> {
        if !declared {
            return Err(unsupported(self.kind, operation));
        }
        if !self.installed.load(Ordering::SeqCst) {
            return Err(self.call_failed("extension not installed"));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(self.call_failed(&format!("{operation} threw")));
        }
        Ok(())
    }

    fn call_failed(&self, message: &str) -> ProviderError {
        ProviderError::CallFailed {
            kind: self.kind,
            message: message.to_owned(),
        }
    }
}

fn random_principal() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("icp-principal-{suffix}")
}

fn random_tokens(max_tokens: u64) -> Amount {
    Amount::from_tokens(rand::thread_rng().gen_range(0..=max_tokens))
}

fn random_transfer_id() -> String {
    format!("tx-{}", Uuid::new_v4().simple())
}

#[async_trait]
impl WalletProvider for SimulatedWallet {
    fn kind(&self) -> WalletKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn is_available(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    async fn request_connect(&self) -> Result<ConnectOutcome> {
        self.guard(true, "connect")?;
        if !self.behavior.read().await.approve_connect {
            info!("simulated {} wallet rejected the connection", self.kind);
            return Ok(ConnectOutcome::Rejected);
        }
        self.connected.store(true, Ordering::SeqCst);
        info!("simulated {} wallet connected", self.kind);
        Ok(ConnectOutcome::Approved)
    }

    async fn principal(&self) -> Result<WalletAddress> {
        self.guard(self.capabilities.identity, "principal")?;
        let configured = self.behavior.read().await.principal.clone();
        Ok(WalletAddress(configured.unwrap_or_else(random_principal)))
    }

    async fn disconnect(&self) -> Result<()> {
        self.guard(self.capabilities.disconnect, "disconnect")?;
        self.connected.store(false, Ordering::SeqCst);
        info!("simulated {} wallet disconnected", self.kind);
        Ok(())
    }

    async fn balance(&self) -> Result<Amount> {
        self.guard(self.capabilities.balance, "balance")?;
        let balance = self.behavior.read().await.balance;
        Ok(match balance {
            SimulatedBalance::Fixed(amount) => amount,
            SimulatedBalance::Random { max_tokens } => random_tokens(max_tokens),
        })
    }

    async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt> {
        self.guard(self.capabilities.transfer, "transfer")?;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(self.call_failed("transfer requested while not connected"));
        }
        self.behavior.write().await.transfers.push(request);
        Ok(TransferReceipt {
            transaction_id: random_transfer_id(),
        })
    }

    async fn is_connected(&self) -> Result<bool> {
        self.guard(self.capabilities.connection_status, "connection status")?;
        Ok(self.connected.load(Ordering::SeqCst))
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<WalletEvent>> {
        self.events.as_ref().map(broadcast::Sender::subscribe)
    }
}
