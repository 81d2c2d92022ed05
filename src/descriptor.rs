use std::fs;
use std::path::Path;

use serde::Deserialize;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::archive;
use crate::error::{Error, Result};
use crate::version::BuildNumber;

/// Name of the descriptor file at the root of a plugin directory or
/// package archive.
pub const DESCRIPTOR_FILE: &str = "plugin.toml";

/// Parsed plugin metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Earliest compatible host build, inclusive.
    #[serde(default)]
    pub since_build: Option<String>,
    /// Latest compatible host build, inclusive.
    #[serde(default)]
    pub until_build: Option<String>,
}

impl PluginDescriptor {
    pub fn parse(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Read the descriptor of an unpacked plugin directory. `None`
    /// when the directory has no descriptor file.
    pub fn from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(DESCRIPTOR_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Self::parse(&raw).map(Some).map_err(|err| Error::Descriptor {
            path,
            reason: err.to_string(),
        })
    }

    /// Read the descriptor from the root of a package archive. `None`
    /// when the file is not an archive or carries no root descriptor.
    pub fn from_package_archive(artifact: &Path) -> Result<Option<Self>> {
        let Some(raw) = archive::read_root_entry(artifact, DESCRIPTOR_FILE)? else {
            return Ok(None);
        };
        Self::parse(&raw).map(Some).map_err(|err| Error::Descriptor {
            path: artifact.to_path_buf(),
            reason: err.to_string(),
        })
    }

    /// Probe a downloaded artifact for its descriptor.
    ///
    /// Package archives carry the descriptor at their root. A
    /// container `.zip` is extracted into a scratch directory and its
    /// single top-level entry probed instead; the scratch directory is
    /// released on every exit path. Artifacts the probe does not
    /// understand yield `None`, and the caller accepts them as-is.
    pub fn from_artifact(artifact: &Path) -> Result<Option<Self>> {
        if let Some(descriptor) = Self::from_package_archive(artifact)? {
            return Ok(Some(descriptor));
        }

        let is_container = artifact
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(".zip"));
        if !is_container {
            return Ok(None);
        }

        let scratch = TempDir::new()?;
        archive::extract(artifact, scratch.path())?;

        let mut entries = fs::read_dir(scratch.path())?.collect::<std::io::Result<Vec<_>>>()?;
        if entries.len() != 1 {
            debug!(
                artifact = %artifact.display(),
                entries = entries.len(),
                "container archive has no single top-level entry"
            );
            return Ok(None);
        }

        let root = entries.remove(0).path();
        if root.is_dir() {
            Self::from_dir(&root)
        } else {
            Self::from_package_archive(&root)
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Whether the declared `[since_build, until_build]` range admits
    /// the given host build. Missing bounds are open; bounds that do
    /// not parse are ignored.
    pub fn is_compatible_with(&self, build: &BuildNumber) -> bool {
        if let Some(since) = parse_bound(self.since_build.as_deref(), "since_build") {
            if *build < since {
                return false;
            }
        }
        if let Some(until) = parse_bound(self.until_build.as_deref(), "until_build") {
            if *build > until {
                return false;
            }
        }
        true
    }
}

fn parse_bound(raw: Option<&str>, which: &str) -> Option<BuildNumber> {
    let raw = raw?;
    let parsed = BuildNumber::parse(raw);
    if parsed.is_none() {
        warn!(bound = which, value = raw, "ignoring unparseable build bound");
    }
    parsed
}
