use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{ConnectInfo, DefaultBodyLimit, Path, Query, State, WebSocketUpgrade},
        http::{HeaderMap, HeaderValue, Method, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    serde::Deserialize,
    tower_http::{
        cors::{AllowOrigin, Any, CorsLayer},
        services::ServeDir,
        trace::TraceLayer,
    },
    tracing::{error, info, warn},
};

use {
    clinic_common::ConsultationId,
    clinic_config::{ClinicConfig, CorsConfig},
    clinic_media::{UploadStore, store::URL_PREFIX},
    clinic_store::MessageStore,
};

use crate::{
    auth::{self, authorize, extract_token},
    chat::ChatService,
    state::GatewayState,
    upload::upload_handler,
    ws::handle_connection,
};

/// Headroom on top of the file limit for multipart framing.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct AppState {
    pub gateway: Arc<GatewayState>,
    pub chat: Arc<ChatService>,
    pub uploads: Arc<UploadStore>,
    pub public_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenQuery {
    pub token: Option<String>,
}

// ── Server startup ───────────────────────────────────────────────────────────

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);
    if cors.allows_any() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = cors
        .origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            },
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(
    chat: Arc<ChatService>,
    uploads: Arc<UploadStore>,
    config: &ClinicConfig,
) -> Router {
    let body_limit = uploads.max_bytes().saturating_add(MULTIPART_OVERHEAD);
    let app_state = AppState {
        gateway: Arc::clone(chat.state()),
        chat,
        uploads: Arc::clone(&uploads),
        public_base_url: config.server.public_base_url.clone(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .route("/api/chat/{consulta_id}", get(history_handler))
        .route(
            "/api/upload",
            post(upload_handler)
                .layer(DefaultBodyLimit::max(usize::try_from(body_limit).unwrap_or(usize::MAX))),
        )
        .nest_service(URL_PREFIX, ServeDir::new(uploads.dir()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors))
        .with_state(app_state)
}

/// Start the gateway HTTP + WebSocket server and run until ctrl-c.
pub async fn start_gateway(
    config: ClinicConfig,
    store: Arc<dyn MessageStore>,
) -> anyhow::Result<()> {
    let resolved_auth = auth::resolve_auth(
        config.auth.token.clone(),
        std::env::var("CLINIC_TOKEN").ok(),
    );
    let auth_mode = if resolved_auth.is_open() {
        "open"
    } else {
        "token"
    };

    let uploads = Arc::new(UploadStore::new(
        &config.uploads.dir,
        config.uploads.max_bytes,
        config.uploads.allowed_mime.clone(),
    ));
    uploads.ensure_dir().await?;

    let state = GatewayState::new(resolved_auth);
    let chat = Arc::new(
        ChatService::new(store, Arc::clone(&state)).with_error_events(config.chat.error_events),
    );
    let app = build_gateway_app(chat, Arc::clone(&uploads), &config);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("clinic gateway v{} on {}", state.version, state.hostname),
        format!(
            "protocol v{}, listening on {}",
            clinic_protocol::PROTOCOL_VERSION,
            addr
        ),
        format!("uploads: {}", uploads.dir().display()),
        format!("auth: {auth_mode}"),
    ];
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutting down");
    })
    .await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.gateway.version,
        "protocol": clinic_protocol::PROTOCOL_VERSION,
        "connections": state.gateway.client_count().await,
        "rooms": state.gateway.room_count().await,
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let token = extract_token(&headers, query.token.as_deref());
    let result = authorize(&state.gateway.auth, token.as_deref());
    if !result.ok {
        warn!(remote = %addr, reason = result.reason, "websocket upgrade rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_connection(socket, state.chat, addr))
}

async fn history_handler(
    Path(consulta_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let consultation = ConsultationId::new(consulta_id.trim());
    match state.chat.history(&consultation).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => {
            error!(consultation_id = %consultation, error = %e, "failed to load history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": "failed to load messages" })),
            )
                .into_response()
        },
    }
}
