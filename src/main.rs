use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use http::header::{HeaderValue, CACHE_CONTROL};
use std::env;
use std::net::SocketAddr;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use marketplace_messages::services::message_store::MessageStore;
use marketplace_messages::web::middleware::auth as auth_middleware;
use marketplace_messages::web::routes::{health, messages};

#[tokio::main]
async fn main() {
    dotenv().ok();

    // 1. Logging
    tracing_subscriber::fmt::init();

    // 2. Backend client, shared through router state
    let store = MessageStore::from_env();

    // 3. Everything except the health probe requires a logged-in viewer
    let protected_routes = Router::new()
        .route(
            "/api/contact-messages",
            get(messages::list_messages_handler).patch(messages::update_status_handler),
        )
        .route(
            "/api/contact-messages/threads",
            get(messages::list_threads_handler),
        )
        .route(
            "/api/contact-messages/threads/:thread_id/open",
            post(messages::open_thread_handler),
        )
        .route(
            "/api/contact-messages/reply",
            post(messages::send_reply_handler),
        )
        .layer(middleware::from_fn(auth_middleware::require_auth));

    let app = Router::new()
        .route("/api/health", get(health::health_handler))
        .merge(protected_routes)
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CatchPanicLayer::new())
        .with_state(store);

    // 4. Bind, with a fallback port for dev machines where the default is taken
    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("invalid HOST/PORT");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!(error = %e, %addr, "bind_failed_trying_fallback");
            let fallback: SocketAddr = format!("{}:{}", host, port + 1)
                .parse()
                .expect("invalid fallback address");
            tokio::net::TcpListener::bind(fallback)
                .await
                .expect("could not bind fallback port")
        }
    };

    let bound_addr = listener.local_addr().expect("no local addr");
    tracing::info!(%bound_addr, "messages service listening");

    axum::serve(listener, app).await.expect("server error");
}
