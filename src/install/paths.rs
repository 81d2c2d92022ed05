use std::path::{Path, PathBuf};

/// Where the pipeline reads and writes on the host.
#[derive(Debug, Clone)]
pub struct InstallPaths {
    plugins_dir: PathBuf,
    temp_dir: PathBuf,
    script_path: PathBuf,
}

impl InstallPaths {
    /// Standard layout under the host's user data directory.
    pub fn discover(app_name: &str) -> Self {
        let data_dir = directories::ProjectDirs::from("", "", app_name)
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(format!(".{app_name}")));
        Self::new(data_dir.join("plugins"), data_dir.join("plugins-temp"))
    }

    pub fn new(plugins_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        let temp_dir = temp_dir.into();
        let script_path = temp_dir.join("action.script");
        Self {
            plugins_dir: plugins_dir.into(),
            temp_dir,
            script_path,
        }
    }

    /// Live plugin installations; only ever touched by the
    /// bootstrapper, never by a running session.
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Downloaded artifacts awaiting the next startup.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Startup action script consumed by the bootstrapper.
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }
}
