pub mod config;
pub mod error;
pub mod intercept;
pub mod logging;
pub mod providers;
pub mod proxy;
pub mod server;
pub mod translate;

pub use config::ShimConfig;
pub use error::{Result, ShimError};
pub use intercept::InterceptorChain;
pub use logging::SharedLogger;
pub use server::{build_router, AppState};
