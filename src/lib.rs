pub mod auth;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod translate;
pub mod vendor;

pub use auth::CredentialIssuer;
pub use config::AdaptorConfig;
pub use error::{AdaptorError, Result};
pub use relay::{Adaptor, RelayOutcome};
pub use server::{build_router, AppState, StreamStats};
pub use vendor::RelayMode;
