//! Test configuration loaders covering success and failure paths.

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use mgmtwire_config::Config;
use ortho_config::OrthoError;
use tempfile::TempDir;

use crate::bootstrap::ConfigLoader;

fn load_file(dir: &TempDir, contents: &str) -> Result<Config, Arc<OrthoError>> {
    let path: PathBuf = dir.path().join("mgmtwire.toml");
    fs::write(&path, contents).expect("write configuration file");
    Config::load_from_iter([
        OsString::from("mgmtwired"),
        OsString::from("--config-path"),
        path.into_os_string(),
    ])
}

/// Loader reading a small, valid configuration file from a temporary directory.
pub struct TestConfigLoader {
    dir: TempDir,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temporary configuration directory"),
        }
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        load_file(
            &self.dir,
            "log_filter = \"off\"\nexecution_threads = 2\nmax_in_flight_queries = 16\npooled_frame_buffers = 4\n",
        )
    }
}

/// Loader whose configuration file does not parse.
pub struct FailingConfigLoader {
    dir: TempDir,
}

impl FailingConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temporary configuration directory"),
        }
    }
}

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        load_file(&self.dir, "execution_threads = = 4\n")
    }
}

/// Loader producing a configuration that loads but fails validation.
pub struct InvalidConfigLoader;

impl ConfigLoader for InvalidConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            execution_threads: Some(0),
            ..Config::default()
        })
    }
}
