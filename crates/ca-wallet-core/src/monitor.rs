//! Background task keeping the session in line with the extension.
//!
//! Every `interval` the monitor runs [`WalletSessionStore::poll`]. When the
//! connected extension pushes events, the monitor also listens for them and
//! ends the session as soon as the account changes or the site is revoked.
//! It follows [`WalletSessionStore::watch_session`] so a session opened after
//! the monitor started is subscribed to right away.

use ca_types::WalletKind;
use ca_wallet_provider::WalletEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::store::WalletSessionStore;

pub struct SessionMonitor;

enum Wake {
    Shutdown,
    Tick,
    SessionChanged,
    Event(WalletKind, WalletEvent),
    EventsClosed,
}

struct Subscription {
    kind: WalletKind,
    receiver: Option<broadcast::Receiver<WalletEvent>>,
}

impl SessionMonitor {
    pub fn spawn(
        store: Arc<WalletSessionStore>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("session monitor started, polling every {:?}", interval);
            let mut subscription: Option<Subscription> = None;
            let mut session_changes = store.watch_session();

            loop {
                let active = *session_changes.borrow_and_update();
                if subscription.as_ref().map(|sub| sub.kind) != active {
                    subscription = active.map(|kind| Subscription {
                        kind,
                        receiver: store.subscribe(kind),
                    });
                }

                let wake = tokio::select! {
                    _ = shutdown.recv() => Wake::Shutdown,
                    _ = tokio::time::sleep(interval) => Wake::Tick,
                    Ok(()) = session_changes.changed() => Wake::SessionChanged,
                    wake = next_event(&mut subscription) => wake,
                };

                match wake {
                    Wake::Shutdown => break,
                    Wake::Tick => store.poll().await,
                    Wake::SessionChanged => {}
                    Wake::Event(kind, event) => {
                        if let Err(err) = store.apply_event(kind, event).await {
                            warn!("failed to apply {} wallet event: {}", kind, err);
                        }
                    }
                    Wake::EventsClosed => {
                        if let Some(sub) = subscription.as_mut() {
                            sub.receiver = None;
                        }
                    }
                }
            }

            info!("session monitor stopped");
        })
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Wake {
    let Some(Subscription {
        kind,
        receiver: Some(receiver),
    }) = subscription.as_mut()
    else {
        return std::future::pending().await;
    };

    loop {
        match receiver.recv().await {
            Ok(event) => return Wake::Event(*kind, event),
            Err(RecvError::Lagged(skipped)) => {
                warn!("{} wallet events lagged, {} skipped", kind, skipped);
            }
            Err(RecvError::Closed) => return Wake::EventsClosed,
        }
    }
}
