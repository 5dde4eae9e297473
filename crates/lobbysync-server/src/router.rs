//! Axum router wiring (HTTP -> WS upgrade).
//!
//! Exposes a single `<server.path>/:lobby` route for WebSocket upgrades.

use axum::{routing::get, Router};

use crate::{app_state::AppState, transport};

pub fn build_router(state: AppState) -> Router {
    let route = format!("{}/:lobby", state.cfg().server.path);
    Router::new()
        .route(&route, get(transport::ws::ws_upgrade))
        .with_state(state)
}
