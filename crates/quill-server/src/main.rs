use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use quill_api::auth::{self, AppState, AppStateInner};
use quill_api::middleware::{require_auth, require_confirmed, resolve_principal};
use quill_api::{admin, follows, profile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let secret_key =
        std::env::var("QUILL_SECRET_KEY").unwrap_or_else(|_| "dev-secret-change-me".into());
    let admin_email = std::env::var("QUILL_ADMIN_EMAIL").unwrap_or_default();
    let db_path = std::env::var("QUILL_DB_PATH").unwrap_or_else(|_| "quill.db".into());
    let host = std::env::var("QUILL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("QUILL_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database; seeding the canonical roles is part of startup and a
    // failure here is fatal.
    let db = quill_db::Database::open(&PathBuf::from(&db_path))?;
    db.seed_roles()?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        secret_key,
        admin_email,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    // Public profile pages resolve the actor to a Principal, anonymous
    // included.
    let profile_routes = Router::new()
        .route("/users/{username}", get(profile::public_profile))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_principal))
        .with_state(state.clone());

    // Reachable while the account is still unconfirmed.
    let account_routes = Router::new()
        .route("/auth/confirm", post(auth::confirm))
        .route("/auth/resend-confirmation", post(auth::resend_confirmation))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    // Everything else requires a confirmed account. The last-added layer
    // runs first: require_auth populates the extension that
    // require_confirmed reads.
    let confirmed_routes = Router::new()
        .route("/me", get(profile::me).put(profile::update_profile))
        .route(
            "/users/{username}/follow",
            post(follows::follow_user).delete(follows::unfollow_user),
        )
        .route("/users/{username}/relationship", get(follows::relationship))
        .layer(middleware::from_fn(require_confirmed))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(
            "/admin/users/{id}",
            patch(admin::update_user).delete(admin::delete_user),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(profile_routes)
        .merge(account_routes)
        .merge(confirmed_routes)
        .merge(admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Quill server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
