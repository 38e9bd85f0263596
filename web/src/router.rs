use crate::{controller::health_check_controller, ws, AppState};
use axum::{routing::get, Router};

pub fn define_routes(app_state: AppState) -> Router {
    let ws_path = app_state.config.ws_path.clone();

    Router::new()
        .route(&ws_path, get(ws::handler::ws_handler))
        .route("/health", get(health_check_controller::health_check))
        .with_state(app_state)
}
