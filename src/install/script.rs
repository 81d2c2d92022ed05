use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::archive;
use crate::error::Result;

/// One deferred filesystem operation, replayed by the bootstrapper
/// before the host starts and its plugin directories get locked.
///
/// Paths are stored as UTF-8 strings with forward-slash separators so
/// a script written on one OS replays on another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionCommand {
    /// Remove a file or directory tree.
    Delete { path: String },
    /// Copy a file, creating parent directories.
    Copy { src: String, dst: String },
    /// Extract an archive into a directory.
    Unzip { src: String, dst_dir: String },
}

impl ActionCommand {
    pub fn delete(path: &Path) -> Self {
        Self::Delete {
            path: portable(path),
        }
    }

    pub fn copy(src: &Path, dst: &Path) -> Self {
        Self::Copy {
            src: portable(src),
            dst: portable(dst),
        }
    }

    pub fn unzip(src: &Path, dst_dir: &Path) -> Self {
        Self::Unzip {
            src: portable(src),
            dst_dir: portable(dst_dir),
        }
    }
}

fn portable(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn native(path: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(path.replace('/', "\\"))
    } else {
        PathBuf::from(path)
    }
}

/// Append-only startup action script. Sessions only append; replay
/// belongs to the bootstrapper.
pub trait ActionScript {
    fn append(&self, command: ActionCommand) -> Result<()>;
}

/// JSON-lines action script on disk, one tagged record per command.
#[derive(Debug)]
pub struct StartupActionFile {
    path: PathBuf,
    // Serialises appends from concurrent sessions.
    write_lock: Mutex<()>,
}

impl StartupActionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Commands currently staged, oldest first. Unreadable records are
    /// skipped with a warning rather than wedging startup.
    pub fn load(&self) -> Result<Vec<ActionCommand>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        let mut commands = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(command) => commands.push(command),
                Err(err) => {
                    warn!(script = %self.path.display(), %err, "skipping unreadable action record");
                }
            }
        }
        Ok(commands)
    }

    /// Execute every staged command in order, then remove the script.
    /// Bootstrapper-side; never called from a running session.
    pub fn replay(&self) -> anyhow::Result<()> {
        let commands = self.load()?;
        for command in &commands {
            execute(command).with_context(|| format!("replaying {command:?}"))?;
        }
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        if !commands.is_empty() {
            info!(count = commands.len(), "startup actions replayed");
        }
        Ok(())
    }
}

impl ActionScript for StartupActionFile {
    fn append(&self, command: ActionCommand) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|err| err.into_inner());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let record = serde_json::to_string(&command).expect("action command serializes");
        writeln!(file, "{record}")?;
        Ok(())
    }
}

fn execute(command: &ActionCommand) -> anyhow::Result<()> {
    match command {
        ActionCommand::Delete { path } => {
            let path = native(path);
            if path.is_dir() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("delete dir {}", path.display()))?;
            } else if path.exists() {
                fs::remove_file(&path).with_context(|| format!("delete {}", path.display()))?;
            }
        }
        ActionCommand::Copy { src, dst } => {
            let src = native(src);
            let dst = native(dst);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, &dst)
                .with_context(|| format!("copy {} -> {}", src.display(), dst.display()))?;
        }
        ActionCommand::Unzip { src, dst_dir } => {
            let src = native(src);
            let dst_dir = native(dst_dir);
            fs::create_dir_all(&dst_dir)?;
            archive::extract(&src, &dst_dir)
                .with_context(|| format!("unzip {} -> {}", src.display(), dst_dir.display()))?;
        }
    }
    Ok(())
}
