//! Where the daemon keeps `config.json` and the rendered `overlay.png`.

use std::path::{Path, PathBuf};

use thiserror::Error;

const APP_DIR: &str = "beltwatch";

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("no per-user data directory on this platform")]
    NoDataDir,
    #[error("failed to create {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    /// `<platform data dir>/beltwatch`, created if missing.
    pub fn from_platform() -> Result<Self, PathsError> {
        let base = dirs::data_dir().ok_or(PathsError::NoDataDir)?;
        Self::at(base.join(APP_DIR))
    }

    pub fn at(root: impl AsRef<Path>) -> Result<Self, PathsError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|source| PathsError::Create {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Latest rendered overlay, rewritten after every applied measurement.
    pub fn overlay_file(&self) -> PathBuf {
        self.root.join("overlay.png")
    }
}
