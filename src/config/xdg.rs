//! XDG Base Directory support.

use std::path::PathBuf;

/// Application directory name under each XDG base.
const APP_DIR: &str = "confchat";

/// XDG directory paths for confchat.
pub struct XdgDirs {
    /// Config directory (~/.config/confchat or XDG_CONFIG_HOME/confchat)
    pub config: PathBuf,
}

impl XdgDirs {
    /// Get XDG directories, respecting environment variables.
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            config: std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join(".config"))
                .join(APP_DIR),
        }
    }
}

impl Default for XdgDirs {
    fn default() -> Self {
        Self::new()
    }
}
