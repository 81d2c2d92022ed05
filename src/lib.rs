//! Staged plugin download & install pipeline.
//!
//! A session downloads one plugin artifact over HTTP on a caller-owned
//! worker thread, gates it against the installed registry and the host
//! build number, and stages the actual install as startup action
//! script commands. A bootstrapper replays the script before the next
//! launch, when the plugin directories are not locked by a running
//! host.
//!
//! The host supplies the collaborators: a [`PluginRegistry`] snapshot
//! of what is installed, an [`ActionScript`] to append to, the
//! [`InstallPaths`] layout, and a [`ProgressIndicator`] for progress
//! and cancellation. [`PluginDownloader::prepare`] runs the pipeline
//! up to the accept decision; [`PluginDownloader::schedule_install`]
//! appends the deferred commands.

pub mod archive;
pub mod descriptor;
pub mod error;
pub mod install;
pub mod net;
pub mod progress;
pub mod registry;
pub mod version;

pub use descriptor::{DESCRIPTOR_FILE, PluginDescriptor};
pub use error::{Error, Result};
pub use install::downloader::{
    DownloadRequest, DownloadSession, HostNotifier, PluginDownloader, SessionState,
};
pub use install::paths::InstallPaths;
pub use install::scheduler::PACKAGE_EXT;
pub use install::script::{ActionCommand, ActionScript, StartupActionFile};
pub use progress::{ProgressIndicator, SilentProgress};
pub use registry::{InstalledPlugin, PluginRegistry};
pub use version::{BuildNumber, compare_skip_broken, compare_version_numbers};
