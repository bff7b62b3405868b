//! The wallet session store.
//!
//! One store is created by the composition root and shared as
//! `Arc<WalletSessionStore>`. Mutating operations are serialized by a
//! dedicated mutex held for their whole duration, so two `transact` calls never
//! interleave their balance read-modify-write inside one process. The state
//! lock itself is only taken for snapshots and the final commit: readers are
//! never stalled by the handshake or transfer delays. Nothing coordinates
//! separate processes sharing the same storage: the last writer of the
//! session key wins.

use ca_storage::{SessionStorage, keys, load_json, load_list, save_json};
use ca_types::{
    Amount, BalanceOrigin, SupportedWallet, Transaction, TxDirection, WalletKind, WalletSession,
};
use ca_wallet_provider::{ConnectOutcome, ProviderRegistry, WalletEvent, WalletProvider};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, WalletError};
use crate::simulator::{TransactionSimulator, fallback_address};

#[derive(Debug, Default)]
struct SessionState {
    session: Option<WalletSession>,
    history: Vec<Transaction>,
}

pub struct WalletSessionStore {
    providers: ProviderRegistry,
    storage: Arc<dyn SessionStorage>,
    simulator: TransactionSimulator,
    config: SessionConfig,
    state: RwLock<SessionState>,
    mutations: Mutex<()>,
    active: watch::Sender<Option<WalletKind>>,
}

impl WalletSessionStore {
    pub fn new(
        providers: ProviderRegistry,
        storage: Arc<dyn SessionStorage>,
        config: SessionConfig,
    ) -> Self {
        let (active, _) = watch::channel(None);
        Self {
            providers,
            storage,
            simulator: TransactionSimulator::new(&config),
            config,
            state: RwLock::new(SessionState::default()),
            mutations: Mutex::new(()),
            active,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn SessionStorage> {
        Arc::clone(&self.storage)
    }

    pub fn supported_wallets(&self) -> Vec<SupportedWallet> {
        WalletKind::ALL
            .into_iter()
            .map(|kind| SupportedWallet {
                kind,
                name: kind.display_name().to_owned(),
                available: self.providers.is_available(kind),
                install_url: kind.install_url().to_owned(),
            })
            .collect()
    }

    pub async fn session(&self) -> Option<WalletSession> {
        self.state.read().await.session.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.session.is_some()
    }

    pub async fn history(&self) -> Vec<Transaction> {
        self.state.read().await.history.clone()
    }

    /// Shortened address for headers and buttons, `None` when disconnected.
    pub async fn display_address(&self) -> Option<String> {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|session| session.address.short())
    }

    pub async fn can_afford(&self, amount: Amount) -> bool {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .is_some_and(|session| session.balance >= amount)
    }

    /// Follows the wallet kind of the active session; changes whenever a
    /// session starts or ends.
    pub fn watch_session(&self) -> watch::Receiver<Option<WalletKind>> {
        self.active.subscribe()
    }

    /// Reloads a previously persisted session, e.g. after a restart.
    ///
    /// A session whose extension is gone or reports the site as no longer
    /// connected is discarded along with its history.
    pub async fn restore(&self) -> Result<Option<WalletSession>> {
        let _mutation = self.mutations.lock().await;

        let stored: Option<WalletSession> = load_json(self.storage.as_ref(), keys::SESSION).await?;
        let Some(session) = stored.filter(|session| session.connected) else {
            self.commit(None, Vec::new()).await;
            return Ok(None);
        };

        if !self.still_connected(session.wallet_kind).await {
            info!(
                "discarding stored {} session for {}: extension no longer connected",
                session.wallet_kind, session.address
            );
            self.clear().await?;
            return Ok(None);
        }

        let history: Vec<Transaction> = load_list(self.storage.as_ref(), keys::TRANSACTIONS).await?;
        info!(
            "restored {} session for {} with {} transactions",
            session.wallet_kind,
            session.address,
            history.len()
        );
        self.commit(Some(session.clone()), history).await;
        Ok(Some(session))
    }

    /// Opens a session with `kind`. The current session, if any, is only
    /// replaced once the new handshake has fully succeeded.
    pub async fn connect(&self, kind: WalletKind) -> Result<WalletSession> {
        let Some(provider) = self.available_provider(kind) else {
            warn!("{} wallet requested but not available", kind);
            return Err(WalletError::unavailable(kind));
        };

        let _mutation = self.mutations.lock().await;

        if !self.config.handshake_delay.is_zero() {
            tokio::time::sleep(self.config.handshake_delay).await;
        }

        if provider.request_connect().await? == ConnectOutcome::Rejected {
            info!("{} wallet connection rejected", kind);
            return Err(WalletError::ConnectionRejected { kind });
        }

        let capabilities = provider.capabilities();
        let address = if capabilities.identity {
            provider.principal().await?
        } else {
            fallback_address(kind)
        };
        let (balance, balance_origin) = if capabilities.balance {
            (provider.balance().await?, BalanceOrigin::Extension)
        } else {
            (self.simulator.simulated_balance(), BalanceOrigin::Simulated)
        };

        let session = WalletSession {
            connected: true,
            address,
            wallet_kind: kind,
            balance,
            balance_origin,
            connected_at: Utc::now(),
        };
        self.persist(&session, &[]).await?;

        if let Some(previous) = self.session().await {
            info!(
                "replacing {} session for {} with a new {} connection",
                previous.wallet_kind, previous.address, kind
            );
            // Same extension: the handshake above already took over its connection.
            if previous.wallet_kind != kind {
                self.release(&previous).await;
            }
        }

        info!(
            "{} wallet connected as {} with balance {}",
            kind,
            session.address,
            session.balance.format_crypto(&self.config.currency)
        );
        self.commit(Some(session.clone()), Vec::new()).await;
        Ok(session)
    }

    /// Ends the session. Extension failures are logged, local state is always cleared.
    pub async fn disconnect(&self) -> Result<()> {
        let _mutation = self.mutations.lock().await;
        if let Some(session) = self.session().await {
            self.release(&session).await;
            info!("{} wallet {} disconnected", session.wallet_kind, session.address);
        }
        self.clear().await
    }

    pub async fn transact(
        &self,
        amount: Amount,
        recipient: &str,
        description: &str,
    ) -> Result<Transaction> {
        let _mutation = self.mutations.lock().await;
        let Some(session) = self.session().await else {
            return Err(WalletError::NotConnected);
        };

        if amount.is_zero() {
            return Err(WalletError::InvalidAmount);
        }
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(WalletError::InvalidRecipient);
        }
        let Some(remaining) = session.balance.checked_sub(amount) else {
            return Err(WalletError::InsufficientBalance {
                requested: amount,
                available: session.balance,
            });
        };

        let provider = self.providers.provider(session.wallet_kind);
        let id = self
            .simulator
            .submit(
                provider.as_deref(),
                session.wallet_kind,
                &session.address,
                recipient,
                amount,
            )
            .await?;

        let transaction = Transaction {
            id,
            amount,
            recipient: recipient.to_owned(),
            description: description.to_owned(),
            timestamp: Utc::now(),
            direction: TxDirection::Outgoing,
        };
        let updated = WalletSession {
            balance: remaining,
            ..session
        };
        let mut history = self.history().await;
        history.push(transaction.clone());

        self.persist(&updated, &history).await?;

        info!(
            "transaction {} sent {} to {}",
            transaction.id,
            amount.format_crypto(&self.config.currency),
            transaction.recipient
        );
        self.commit(Some(updated), history).await;
        Ok(transaction)
    }

    /// Re-reads the balance from the extension, or draws a new simulated one.
    ///
    /// This source is independent from `transact` deductions: a simulated
    /// refresh can undo them.
    pub async fn refresh_balance(&self) -> Result<Amount> {
        let _mutation = self.mutations.lock().await;
        let Some(session) = self.session().await else {
            return Err(WalletError::NotConnected);
        };

        let provider = self
            .providers
            .provider(session.wallet_kind)
            .filter(|provider| provider.capabilities().balance);
        let (balance, balance_origin) = match provider {
            Some(provider) => (provider.balance().await?, BalanceOrigin::Extension),
            None => (self.simulator.simulated_balance(), BalanceOrigin::Simulated),
        };

        let updated = WalletSession {
            balance,
            balance_origin,
            ..session
        };
        save_json(self.storage.as_ref(), keys::SESSION, &updated).await?;
        debug!("{} balance refreshed to {}", updated.address, balance);
        self.state.write().await.session = Some(updated);
        Ok(balance)
    }

    /// Asks the extension whether the site is still connected and ends the
    /// session when it is not. Returns whether a session remains.
    pub async fn sync_connection(&self) -> Result<bool> {
        let Some(kind) = self.active_kind().await else {
            return Ok(false);
        };
        let Some(provider) = self
            .providers
            .provider(kind)
            .filter(|provider| provider.capabilities().connection_status)
        else {
            return Ok(true);
        };

        if provider.is_connected().await? {
            return Ok(true);
        }
        self.end_externally(kind, "extension reports the site as disconnected")
            .await?;
        Ok(false)
    }

    /// Account switches and disconnects pushed by the extension both end the session.
    pub async fn apply_event(&self, kind: WalletKind, event: WalletEvent) -> Result<()> {
        let reason = match event {
            WalletEvent::Disconnected => "extension disconnected".to_owned(),
            WalletEvent::AccountChanged { address } => format!("account changed to {address}"),
        };
        self.end_externally(kind, &reason).await
    }

    pub fn subscribe(&self, kind: WalletKind) -> Option<broadcast::Receiver<WalletEvent>> {
        self.providers
            .provider(kind)
            .filter(|provider| provider.capabilities().events)
            .and_then(|provider| provider.subscribe())
    }

    /// One monitor cycle: connection check followed by a balance refresh.
    /// Failures are logged only.
    ///
    /// The connection check runs even for extensions that push events, since
    /// an event sent before anyone subscribed is never replayed.
    pub async fn poll(&self) {
        let Some(kind) = self.active_kind().await else {
            return;
        };

        match self.sync_connection().await {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => warn!("connection check for {} wallet failed: {}", kind, err),
        }

        match self.refresh_balance().await {
            Ok(_) | Err(WalletError::NotConnected) => {}
            Err(err) => warn!("balance refresh for {} wallet failed: {}", kind, err),
        }
    }

    async fn active_kind(&self) -> Option<WalletKind> {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|session| session.wallet_kind)
    }

    fn available_provider(&self, kind: WalletKind) -> Option<Arc<dyn WalletProvider>> {
        self.providers
            .provider(kind)
            .filter(|provider| provider.is_available())
    }

    async fn still_connected(&self, kind: WalletKind) -> bool {
        let Some(provider) = self.available_provider(kind) else {
            return false;
        };
        if !provider.capabilities().connection_status {
            return true;
        }
        match provider.is_connected().await {
            Ok(connected) => connected,
            Err(err) => {
                warn!(
                    "could not confirm {} connection, keeping stored session: {}",
                    kind, err
                );
                true
            }
        }
    }

    async fn end_externally(&self, kind: WalletKind, reason: &str) -> Result<()> {
        let _mutation = self.mutations.lock().await;
        // The session may have been replaced after the signal was produced.
        if self.active_kind().await != Some(kind) {
            return Ok(());
        }
        info!("ending {} session: {}", kind, reason);
        self.clear().await
    }

    async fn release(&self, session: &WalletSession) {
        let Some(provider) = self.providers.provider(session.wallet_kind) else {
            return;
        };
        if !provider.capabilities().disconnect {
            debug!("{} extension has no disconnect call", session.wallet_kind);
            return;
        }
        if let Err(err) = provider.disconnect().await {
            warn!("failed to disconnect {} wallet: {}", session.wallet_kind, err);
        }
    }

    async fn persist(&self, session: &WalletSession, history: &[Transaction]) -> Result<()> {
        save_json(self.storage.as_ref(), keys::SESSION, session).await?;
        save_json(self.storage.as_ref(), keys::TRANSACTIONS, history).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.commit(None, Vec::new()).await;
        self.storage.remove(keys::SESSION).await?;
        self.storage.remove(keys::TRANSACTIONS).await?;
        Ok(())
    }

    async fn commit(&self, session: Option<WalletSession>, history: Vec<Transaction>) {
        let kind = session.as_ref().map(|session| session.wallet_kind);
        {
            let mut state = self.state.write().await;
            state.session = session;
            state.history = history;
        }
        self.active.send_if_modified(|active| {
            let changed = *active != kind;
            *active = kind;
            changed
        });
    }
}
