pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    /// Static credentials for the auth gate; open access when empty.
    pub auth: auth::AuthConfig,
}

pub use server::{resolve_data_dir, router, run, ServerConfig};
