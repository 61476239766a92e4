//! # VM Feature Manager Webhook
//!
//! HTTPS front end for the admission mutator: an axum router, a
//! tokio-rustls listener loop, an in-cluster secret lookup, and logging
//! setup.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vmfm_webhook::prelude::*;
//!
//! let app = router(AppState::new(Arc::new(mutator)));
//! let listener = bind("0.0.0.0:8443".parse()?).await?;
//! let tls = load_server_config(&config.cert_path(), &config.key_path())?;
//! serve(listener, app, Transport::Tls(tls), shutdown_signal()).await?;
//! ```

pub mod handler;
pub mod kube;
pub mod server;
pub mod telemetry;
pub mod tls;

// Re-exports
pub use handler::{router, AppState};
pub use kube::{KubeError, KubeSecretLookup};
pub use server::{bind, serve, shutdown_signal, ServerError, Transport};
pub use tls::{load_server_config, TlsError};

/// Webhook version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::handler::{router, AppState};
    pub use crate::kube::KubeSecretLookup;
    pub use crate::server::{bind, serve, shutdown_signal, Transport};
    pub use crate::tls::load_server_config;
}
