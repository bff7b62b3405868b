use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::{delete, get, post},
};
use ca_storage::{InMemoryStorage, RocksDbStorage, SessionStorage};
use ca_types::{
    BalanceResponse, ConnectRequest, HistoryResponse, SessionResponse, TransactRequest,
    TransactResponse, WalletKind, WalletListResponse, WalletSession,
};
use ca_wallet_core::{Checkout, SessionMonitor, WalletError, WalletSessionStore};
use ca_wallet_provider::ProviderRegistry;
use ca_wallet_simulated::SimulatedWallet;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

mod cart;
mod config;

use config::ServiceConfig;

#[derive(Debug, Serialize)]
struct HealthResponse {
    service: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    error: String,
}

pub(crate) type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<WalletSessionStore>,
    pub(crate) checkout: Arc<Checkout>,
}

impl AppState {
    fn new(store: Arc<WalletSessionStore>) -> Self {
        Self {
            checkout: Arc::new(Checkout::new(store.clone())),
            store,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::from_env()?;

    let storage: Arc<dyn SessionStorage> = match &config.storage_path {
        Some(path) => {
            info!("persisting session state in RocksDB at {}", path);
            Arc::new(RocksDbStorage::open_default(path)?)
        }
        None => {
            warn!(
                "{} not set, session state will not survive a restart",
                config::STORAGE_PATH
            );
            Arc::new(InMemoryStorage::default())
        }
    };

    let store = Arc::new(WalletSessionStore::new(
        simulated_providers(&config.simulated_wallets),
        storage,
        config.session.clone(),
    ));
    match store.restore().await? {
        Some(session) => info!(
            "resuming {} session for {}",
            session.wallet_kind, session.address
        ),
        None => info!("no stored wallet session"),
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    let monitor = SessionMonitor::spawn(
        store.clone(),
        config.session.refresh_interval,
        shutdown_tx.subscribe(),
    );

    let app = router(AppState::new(store));

    info!("session-service listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Fails only when the monitor has already exited.
    let _ = shutdown_tx.send(());
    monitor.await?;

    Ok(())
}

fn simulated_providers(kinds: &[WalletKind]) -> ProviderRegistry {
    let mut providers = ProviderRegistry::default();
    for &kind in kinds {
        info!("registering simulated {} wallet", kind);
        providers.register(Arc::new(SimulatedWallet::new(kind)));
    }
    providers
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/wallets", get(wallets))
        .route("/session", get(session))
        .route("/session/connect", post(session_connect))
        .route("/session/disconnect", post(session_disconnect))
        .route("/session/refresh", post(session_refresh))
        .route("/session/transact", post(session_transact))
        .route("/session/history", get(session_history))
        .route("/cart", get(cart::cart_get).delete(cart::cart_clear))
        .route("/cart/items", post(cart::cart_add))
        .route("/cart/items/{course_id}", delete(cart::cart_remove))
        .route("/cart/checkout", post(cart::cart_checkout))
        .route("/courses/{course_id}/enroll", post(cart::course_enroll))
        .route(
            "/courses/{course_id}/progress",
            get(cart::progress_get).put(cart::progress_set),
        )
        .route("/enrollments", get(cart::enrollments))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "session-service",
        status: "ok",
    })
}

async fn wallets(State(state): State<AppState>) -> Json<WalletListResponse> {
    Json(WalletListResponse {
        wallets: state.store.supported_wallets(),
    })
}

async fn session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(session_response(&state, state.store.session().await))
}

async fn session_connect(
    State(state): State<AppState>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> ApiResult<SessionResponse> {
    let request = json_body(payload)?;
    let session = state
        .store
        .connect(request.wallet_kind)
        .await
        .map_err(wallet_error)?;
    Ok(Json(session_response(&state, Some(session))))
}

async fn session_disconnect(State(state): State<AppState>) -> ApiResult<SessionResponse> {
    state.store.disconnect().await.map_err(wallet_error)?;
    Ok(Json(session_response(&state, None)))
}

async fn session_refresh(State(state): State<AppState>) -> ApiResult<BalanceResponse> {
    state.store.refresh_balance().await.map_err(wallet_error)?;
    let session = state
        .store
        .session()
        .await
        .ok_or_else(|| wallet_error(WalletError::NotConnected))?;

    Ok(Json(BalanceResponse {
        wallet_address: session.address.0,
        balance: session.balance,
        balance_origin: session.balance_origin,
    }))
}

async fn session_transact(
    State(state): State<AppState>,
    payload: Result<Json<TransactRequest>, JsonRejection>,
) -> ApiResult<TransactResponse> {
    let request = match payload {
        Ok(Json(request)) => request,
        // Negative and unparseable amounts already fail while decoding the body.
        Err(JsonRejection::JsonDataError(err)) if err.body_text().contains("amount") => {
            debug!("rejected transaction body: {}", err.body_text());
            return Err(wallet_error(WalletError::InvalidAmount));
        }
        Err(rejection) => return Err(rejected_body(rejection)),
    };
    let transaction = state
        .store
        .transact(request.amount, &request.recipient, &request.description)
        .await
        .map_err(wallet_error)?;
    let balance = state
        .store
        .session()
        .await
        .map(|session| session.balance)
        .unwrap_or_default();

    Ok(Json(TransactResponse {
        transaction,
        balance,
    }))
}

async fn session_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        transactions: state.store.history().await,
    })
}

fn session_response(state: &AppState, session: Option<WalletSession>) -> SessionResponse {
    let currency = &state.store.config().currency;
    SessionResponse {
        connected: session.is_some(),
        display_address: session.as_ref().map(|s| s.address.short()),
        display_balance: session.as_ref().map(|s| s.balance.format_crypto(currency)),
        session,
    }
}

pub(crate) fn wallet_error(err: WalletError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        WalletError::InvalidAmount
        | WalletError::InvalidRecipient
        | WalletError::EmptyCart
        | WalletError::InvalidProgress => StatusCode::BAD_REQUEST,
        WalletError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        WalletError::ConnectionRejected { .. } => StatusCode::FORBIDDEN,
        WalletError::WalletUnavailable { .. } => StatusCode::NOT_FOUND,
        WalletError::NotConnected | WalletError::AlreadyEnrolled(_) => StatusCode::CONFLICT,
        WalletError::ExtensionCallFailed(_) => StatusCode::BAD_GATEWAY,
        WalletError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("request failed: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Unwraps a JSON body, answering 400 with an [`ErrorResponse`] when it
/// cannot be decoded.
pub(crate) fn json_body<T>(
    payload: Result<Json<T>, JsonRejection>,
) -> Result<T, (StatusCode, Json<ErrorResponse>)> {
    payload.map(|Json(value)| value).map_err(rejected_body)
}

fn rejected_body(rejection: JsonRejection) -> (StatusCode, Json<ErrorResponse>) {
    let message = rejection.body_text();
    debug!("rejected request body: {}", message);
    bad_request(&message)
}

pub(crate) fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_owned(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use ca_types::Amount;
    use ca_wallet_core::SessionConfig;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app_with(wallets: Vec<SimulatedWallet>) -> Router {
        let mut providers = ProviderRegistry::default();
        for wallet in wallets {
            providers.register(Arc::new(wallet));
        }
        let store = Arc::new(WalletSessionStore::new(
            providers,
            Arc::new(InMemoryStorage::default()),
            SessionConfig::immediate(),
        ));
        router(AppState::new(store))
    }

    fn plug_app(tokens: u64) -> Router {
        app_with(vec![
            SimulatedWallet::new(WalletKind::Plug).with_balance(Amount::from_tokens(tokens)),
        ])
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let body = match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)?;

        let response = app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    async fn connect_plug(app: &Router) -> anyhow::Result<Value> {
        let (status, body) = send(
            app,
            "POST",
            "/session/connect",
            Some(json!({ "wallet_kind": "plug" })),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        Ok(body)
    }

    #[tokio::test]
    async fn health_reports_ok() -> anyhow::Result<()> {
        let (status, body) = send(&plug_app(1), "GET", "/health", None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        Ok(())
    }

    #[tokio::test]
    async fn wallets_lists_every_kind() -> anyhow::Result<()> {
        let (status, body) = send(&plug_app(1), "GET", "/wallets", None).await?;
        assert_eq!(status, StatusCode::OK);
        let wallets = body["wallets"].as_array().cloned().unwrap_or_default();
        assert_eq!(wallets.len(), 4);
        assert_eq!(wallets[0]["available"], true);
        assert_eq!(wallets[1]["available"], false);
        Ok(())
    }

    #[tokio::test]
    async fn connect_then_transact() -> anyhow::Result<()> {
        let app = plug_app(100);
        let body = connect_plug(&app).await?;
        assert_eq!(body["connected"], true);
        assert_eq!(body["display_balance"], "100.00 ICP");

        let (status, body) = send(
            &app,
            "POST",
            "/session/transact",
            Some(json!({ "amount": 40, "recipient": "0xProvider", "description": "course A" })),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], "60");
        assert_eq!(body["transaction"]["amount"], "40");

        let (_, body) = send(&app, "GET", "/session/history", None).await?;
        assert_eq!(body["transactions"].as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn error_statuses_follow_wallet_errors() -> anyhow::Result<()> {
        let app = plug_app(10);

        let (status, _) = send(
            &app,
            "POST",
            "/session/transact",
            Some(json!({ "amount": "1", "recipient": "0xProvider" })),
        )
        .await?;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "POST",
            "/session/connect",
            Some(json!({ "wallet_kind": "stoic" })),
        )
        .await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap_or_default().contains("stoicwallet.com"));

        connect_plug(&app).await?;
        let (status, _) = send(
            &app,
            "POST",
            "/session/transact",
            Some(json!({ "amount": 40, "recipient": "0xProvider" })),
        )
        .await?;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

        let (status, _) = send(
            &app,
            "POST",
            "/session/transact",
            Some(json!({ "amount": 0, "recipient": "0xProvider" })),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        for amount in [json!(-5), json!("-5"), json!("ten"), json!("0.000000001")] {
            let (status, body) = send(
                &app,
                "POST",
                "/session/transact",
                Some(json!({ "amount": amount, "recipient": "0xProvider" })),
            )
            .await?;
            assert_eq!(status, StatusCode::BAD_REQUEST, "amount {amount}");
            assert!(body["error"].is_string(), "amount {amount}");
        }

        let (status, body) = send(
            &app,
            "POST",
            "/session/connect",
            Some(json!({ "wallet_kind": "metamask" })),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (_, body) = send(&app, "GET", "/session/history", None).await?;
        assert_eq!(body["transactions"], json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn disconnect_ends_session() -> anyhow::Result<()> {
        let app = plug_app(10);
        connect_plug(&app).await?;

        let (status, body) = send(&app, "POST", "/session/disconnect", None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], false);

        let (_, body) = send(&app, "GET", "/session", None).await?;
        assert_eq!(body["session"], Value::Null);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_reports_balance_origin() -> anyhow::Result<()> {
        let app = plug_app(25);
        connect_plug(&app).await?;

        let (status, body) = send(&app, "POST", "/session/refresh", None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], "25");
        assert_eq!(body["balance_origin"], "extension");
        Ok(())
    }

    #[tokio::test]
    async fn cart_checkout_enrolls() -> anyhow::Result<()> {
        let app = plug_app(100);
        connect_plug(&app).await?;

        for (id, title, price) in [(1, "Rust Basics", 20), (2, "Async Rust", 35)] {
            let (status, _) = send(
                &app,
                "POST",
                "/cart/items",
                Some(json!({ "course_id": id, "title": title, "price": price })),
            )
            .await?;
            assert_eq!(status, StatusCode::OK);
        }
        let (_, body) = send(&app, "GET", "/cart", None).await?;
        assert_eq!(body["total"], "55");

        let (status, body) = send(&app, "POST", "/cart/checkout", None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enrollments"].as_array().map(Vec::len), Some(2));

        let (_, body) = send(&app, "GET", "/cart", None).await?;
        assert_eq!(body["items"].as_array().map(Vec::len), Some(0));

        let (status, _) = send(&app, "POST", "/cart/checkout", None).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        send(
            &app,
            "POST",
            "/cart/items",
            Some(json!({ "course_id": 3, "title": "Testing", "price": 5 })),
        )
        .await?;
        let (status, body) = send(&app, "DELETE", "/cart", None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], "0");
        Ok(())
    }

    #[tokio::test]
    async fn direct_enrollment_and_progress() -> anyhow::Result<()> {
        let app = plug_app(100);
        connect_plug(&app).await?;

        let enroll = json!({ "title": "Wallet Security", "price": "12.5" });
        let (status, body) = send(&app, "POST", "/courses/9/enroll", Some(enroll.clone())).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["course_id"], 9);
        assert_eq!(body["amount"], "12.5");

        let (status, _) = send(&app, "POST", "/courses/9/enroll", Some(enroll)).await?;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "PUT",
            "/courses/9/progress",
            Some(json!({ "percent": 40 })),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["percent"], 40);

        let (status, body) = send(
            &app,
            "PUT",
            "/courses/9/progress",
            Some(json!({ "percent": 300 })),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (_, body) = send(&app, "GET", "/enrollments", None).await?;
        assert_eq!(body["enrollments"].as_array().map(Vec::len), Some(1));
        Ok(())
    }
}
