//! HTTP Gateway
//!
//! Thin axum surface over the reservation engine, booking saga and
//! payment store. Auth, schema validation and API docs belong to the
//! outer gateway; prefixes here may be rewritten by it.

pub mod handlers;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::info;

pub use state::AppState;

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let inventory_routes = Router::new()
        .route("/lock", post(handlers::inventory::lock_seat))
        .route("/lock-multiple", post(handlers::inventory::lock_many))
        .route("/release", post(handlers::inventory::release_seat))
        .route(
            "/check/{event_id}/{seat_id}",
            get(handlers::inventory::check_seat),
        )
        .route("/status/{event_id}", get(handlers::inventory::event_status))
        .route(
            "/tatkal/init/{event_id}",
            post(handlers::inventory::tatkal_init),
        )
        .route(
            "/tatkal/reserve/{event_id}",
            post(handlers::inventory::tatkal_reserve),
        )
        .route(
            "/tatkal/release/{event_id}",
            post(handlers::inventory::tatkal_release),
        );

    let booking_routes = Router::new()
        .route("/", post(handlers::bookings::create_booking))
        .route(
            "/{booking_id}",
            get(handlers::bookings::get_booking).delete(handlers::bookings::cancel_booking),
        )
        .route(
            "/user/{user_id}",
            get(handlers::bookings::list_user_bookings),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/inventory", inventory_routes)
        .nest("/bookings", booking_routes)
        .route(
            "/payments/{transaction_id}",
            get(handlers::payments::get_transaction),
        )
        .with_state(state)
}

/// Start the HTTP gateway server.
pub async fn run_server(port: u16, state: Arc<AppState>) {
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("FATAL: Failed to bind to {}: {}", addr, e);
            eprintln!(
                "   Hint: Port {} may already be in use. Check with: lsof -i :{}",
                port, port
            );
            std::process::exit(1);
        }
    };

    info!(addr = %addr, "Gateway listening");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("FATAL: Server error: {}", e);
        std::process::exit(1);
    }
}
