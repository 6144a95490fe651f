// Export route modules
pub mod health;
pub mod reply;
pub mod session;
pub mod socket;
pub mod stream;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(stream::routes(state.clone()))
        .merge(socket::routes(state.clone()))
        .merge(reply::routes(state.clone()))
        .merge(session::routes(state))
}
