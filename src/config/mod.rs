//! Configuration management.

mod settings;
mod xdg;

pub use settings::{ClientConfig, ConfigError, ENV_SERVER_URL, ENV_SOCKET_PATH};
pub use xdg::XdgDirs;
