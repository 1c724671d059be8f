//! Library half of `veritas-server`: `AppState` construction and the
//! axum router, split out of `main.rs` so integration tests can build
//! a router without going through `AppState::build`'s real config
//! loading and network clients.

pub mod app_state;
pub mod routes;

pub use app_state::AppState;

pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .merge(routes::health::router())
        .merge(routes::truth_check::router())
        .merge(routes::wiki::router())
        .with_state(state)
}
