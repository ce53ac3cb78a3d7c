use std::env::{current_exe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use directories_next::{ProjectDirs};
use tokio::fs::{File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use serde_json;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{info, warn};
use std::fs::OpenOptions;
use std::str;

use crate::config::types::DriverConfig;
use crate::error::ConfigError;

// creates a path to <exe>.json in the same directory as the executable
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // /opt/dymo-scale/dymo-scale => /opt/dymo-scale/dymo-scale.json
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to dymo-scale.json in an os dependent standard directory, such as ~/.config on
// linux.
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "dymo-scale", "dymo-scale").map(|dirs| {
        dirs.config_dir().join("dymo-scale.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        match std::fs::metadata(&path) {
            Ok(attr) => {
                if attr.is_file() {
                    return Ok(path);
                }
            }
            Err(err) => {
                info!("Could not read metadata of: {}; Using local path instead. ({})", path.to_string_lossy(), err);
            },
        }
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    /// Only one process can hold this lock, and with it, the scale.
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        self.rw_lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

struct ConfigIOInner {
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    /// Open (or create) the config file at `path`, or at the default location if `path` is None.
    pub fn new_sync(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => get_config_path()?,
        };
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            if !directory.as_os_str().is_empty() {
                std::fs::create_dir_all(directory)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        let inner = ConfigIOInner {
            file,
        };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    pub fn locker(&self) -> Result<ConfigIOLocker, ConfigError> {
        let file = self.try_clone_std()?;

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(file),
        })
    }

    fn try_clone_std(&self) -> Result<std::fs::File, ConfigError> {
        let inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(inner.file.try_clone()?)
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        let file = self.try_clone_std()?; // std File
        Ok(File::from_std(file)) // tokio File
    }

    /// Read and validate the config. An empty file is initialized with the defaults.
    pub async fn read(&self) -> Result<DriverConfig, ConfigError> {
        let mut file = self.get_file()?;
        info!("Reading config file");

        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            let config = DriverConfig::default();
            self.save(&config).await?;
            return Ok(config);
        }

        let content = str::from_utf8(&content)?;

        let config: DriverConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, config: &DriverConfig) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        info!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
