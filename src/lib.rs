pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};

pub use config::GatewayConfig;
pub use core::{Gateway, GatewaySettings, ModemSession};
pub use utils::error::{GatewayError, Result};
