use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::Builder;
use tracing::{debug, info, warn};

use crate::descriptor::PluginDescriptor;
use crate::error::{Error, Result};
use crate::install::paths::InstallPaths;
use crate::install::scheduler;
use crate::install::script::ActionScript;
use crate::net::{filename, transport};
use crate::progress::ProgressIndicator;
use crate::registry::{InstalledPlugin, PluginRegistry};
use crate::version::{BuildNumber, compare_skip_broken};

/// Host callback for surfacing failures; implementations post to
/// their UI thread. The pipeline never blocks on it.
pub trait HostNotifier {
    fn notify_error(&self, title: &str, message: &str);
}

/// Immutable input of one pipeline invocation.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub plugin_id: String,
    pub url: String,
    /// Version advertised by the repository. Only used for the early
    /// skip check; the downloaded descriptor has the final word.
    pub version: Option<String>,
    /// Artifact name advertised by the repository; when present, the
    /// response headers are not consulted.
    pub file_name: Option<String>,
    pub display_name: Option<String>,
    /// Host build to check the descriptor's declared range against.
    pub build: Option<BuildNumber>,
}

impl DownloadRequest {
    pub fn new(plugin_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            url: url.into(),
            version: None,
            file_name: None,
            display_name: None,
            build: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Fresh,
    Downloaded,
    Probed,
    Accepted,
    Rejected,
}

/// Mutable state of one `prepare` run. States only advance; a
/// rejected session never reaches the scheduler.
#[derive(Debug)]
pub struct DownloadSession {
    request: DownloadRequest,
    state: SessionState,
    effective_url: String,
    file_name: Option<String>,
    file: Option<PathBuf>,
    old_install_path: Option<PathBuf>,
    descriptor: Option<PluginDescriptor>,
    version: Option<String>,
}

impl DownloadSession {
    pub fn new(request: DownloadRequest) -> Self {
        let effective_url = request.url.clone();
        let file_name = request.file_name.clone();
        let version = request.version.clone();
        Self {
            request,
            state: SessionState::Fresh,
            effective_url,
            file_name,
            file: None,
            old_install_path: None,
            descriptor: None,
            version,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn plugin_id(&self) -> &str {
        &self.request.plugin_id
    }

    /// URL the artifact was actually served from, after redirects.
    pub fn effective_url(&self) -> &str {
        &self.effective_url
    }

    /// Downloaded artifact, present from the downloaded state on.
    pub fn artifact(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn descriptor(&self) -> Option<&PluginDescriptor> {
        self.descriptor.as_ref()
    }

    /// Version the accept decision was made on: the descriptor's once
    /// probed, the advertised one before that.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Resolved artifact name, falling back to the tail of the
    /// requested URL.
    pub fn file_name(&self) -> String {
        self.file_name.clone().unwrap_or_else(|| {
            self.request
                .url
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        })
    }

    /// Name shown to the user, also used for an enclosing install
    /// directory when the artifact archive lacks one.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.request.display_name {
            return name.clone();
        }
        let file_name = self.file_name();
        match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => file_name,
        }
    }

    fn advance(&mut self, state: SessionState) {
        debug_assert!(!matches!(
            self.state,
            SessionState::Accepted | SessionState::Rejected
        ));
        self.state = state;
    }

    fn reject(&mut self) {
        self.state = SessionState::Rejected;
    }
}

/// The pipeline itself, borrowing the host collaborators for the
/// duration of a session. Runs on a caller-owned worker thread; only
/// the download blocks for long.
pub struct PluginDownloader<'a> {
    registry: &'a dyn PluginRegistry,
    script: &'a dyn ActionScript,
    paths: &'a InstallPaths,
    client: reqwest::blocking::Client,
    wizard_mode: bool,
}

impl<'a> PluginDownloader<'a> {
    pub fn new(
        registry: &'a dyn PluginRegistry,
        script: &'a dyn ActionScript,
        paths: &'a InstallPaths,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            script,
            paths,
            client: transport::client()?,
            wizard_mode: false,
        })
    }

    /// First-run wizard installs do not consult the registry; nothing
    /// is installed yet.
    pub fn wizard_mode(mut self, wizard_mode: bool) -> Self {
        self.wizard_mode = wizard_mode;
        self
    }

    /// Run the pipeline up to the accept decision.
    ///
    /// `Ok(true)` leaves the session accepted, with the artifact on
    /// disk and ready for [`schedule_install`]. `Ok(false)` means
    /// nothing to do: the installed version is current, another
    /// session got there first, or the plugin cannot run on this host
    /// build. Transport, filename, and descriptor failures surface as
    /// errors; [`prepare_or_notify`] is the dialog-reporting wrapper.
    ///
    /// [`schedule_install`]: PluginDownloader::schedule_install
    /// [`prepare_or_notify`]: PluginDownloader::prepare_or_notify
    pub fn prepare(
        &self,
        session: &mut DownloadSession,
        progress: &dyn ProgressIndicator,
    ) -> Result<bool> {
        if session.state == SessionState::Accepted {
            return Ok(true);
        }
        if session.state == SessionState::Rejected {
            return Ok(false);
        }

        // Early skip on the advertised version. Only the descriptor
        // can make the final call, but a repository that advertises an
        // older version saves us the download entirely.
        let installed = if self.wizard_mode {
            None
        } else {
            self.registry.installed(session.plugin_id())
        };
        if let Some(installed) = &installed {
            if let Some(advertised) = session.request.version.as_deref() {
                if self.is_at_most_installed(advertised, installed) {
                    info!(
                        plugin = session.plugin_id(),
                        advertised,
                        installed = installed.version.as_deref().unwrap_or("?"),
                        "installed version is current, skipping download"
                    );
                    session.reject();
                    return Ok(false);
                }
            }
            session.old_install_path = Some(installed.install_path.clone());
        }

        let file = match self.download(session, progress) {
            Ok(file) => file,
            Err(err) => {
                session.reject();
                return Err(err);
            }
        };
        session.file = Some(file.clone());
        session.advance(SessionState::Downloaded);

        let descriptor = match PluginDescriptor::from_artifact(&file) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                self.discard(session);
                return Err(err);
            }
        };
        session.advance(SessionState::Probed);

        if let Some(descriptor) = descriptor {
            if self.registry.was_updated_this_session(&descriptor.id) {
                info!(plugin = %descriptor.id, "already updated by another session");
                self.discard(session);
                return Ok(false);
            }

            session.version = descriptor.version.clone();

            if let (Some(installed), Some(version)) = (&installed, descriptor.version.as_deref()) {
                if self.is_at_most_installed(version, installed) {
                    info!(
                        plugin = session.plugin_id(),
                        version,
                        installed = installed.version.as_deref().unwrap_or("?"),
                        "descriptor version is not newer, skipping"
                    );
                    self.discard(session);
                    return Ok(false);
                }
            }

            if self
                .registry
                .is_incompatible(&descriptor, session.request.build.as_ref())
            {
                let build = session
                    .request
                    .build
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "?".to_string());
                info!(
                    plugin = %descriptor.id,
                    since = descriptor.since_build.as_deref().unwrap_or("*"),
                    until = descriptor.until_build.as_deref().unwrap_or("*"),
                    build = %build,
                    "plugin cannot run on this host build"
                );
                self.discard(session);
                return Ok(false);
            }

            session.descriptor = Some(descriptor);
        } else {
            debug!(
                plugin = session.plugin_id(),
                "no descriptor in artifact, accepting as-is"
            );
        }

        // Flag the id for this process lifetime; a concurrent session
        // for the same plugin sees it in the post-probe gate and bows
        // out without touching the script.
        let session_key = session
            .descriptor
            .as_ref()
            .map(|descriptor| descriptor.id.clone())
            .unwrap_or_else(|| session.plugin_id().to_string());
        self.registry.mark_updated(&session_key);

        session.advance(SessionState::Accepted);
        Ok(true)
    }

    /// The host-facing boundary: cancellation propagates unchanged,
    /// the other failures are reported through `notifier` and collapse
    /// into an "installed nothing" result.
    pub fn prepare_or_notify(
        &self,
        session: &mut DownloadSession,
        progress: &dyn ProgressIndicator,
        notifier: &dyn HostNotifier,
    ) -> Result<bool> {
        match self.prepare(session, progress) {
            Ok(accepted) => Ok(accepted),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(err) => {
                warn!(plugin = session.plugin_id(), %err, "plugin download failed");
                notifier.notify_error(
                    "Failed to download plugin",
                    &format!("Plugin {} was not installed: {err}", session.display_name()),
                );
                Ok(false)
            }
        }
    }

    /// Append the deferred install commands for an accepted session:
    /// delete-old when upgrading, one copy or unzip, delete-temp.
    pub fn schedule_install(&self, session: &DownloadSession) -> Result<()> {
        if session.state != SessionState::Accepted {
            return Err(Error::NotAccepted(session.plugin_id().to_string()));
        }
        let Some(file) = session.file.clone() else {
            return Err(Error::NotAccepted(session.plugin_id().to_string()));
        };

        scheduler::schedule(
            self.script,
            self.paths,
            &file,
            &session.display_name(),
            session.old_install_path.as_deref(),
            true,
        )
    }

    /// Pre- and post-download gate: not newer than a healthy install.
    fn is_at_most_installed(&self, candidate: &str, installed: &InstalledPlugin) -> bool {
        let Some(installed_version) = installed.version.as_deref() else {
            return false;
        };
        let broken = self.registry.is_broken(installed);
        compare_skip_broken(candidate, installed_version, broken) != Ordering::Greater
    }

    fn download(
        &self,
        session: &mut DownloadSession,
        progress: &dyn ProgressIndicator,
    ) -> Result<PathBuf> {
        fs::create_dir_all(self.paths.temp_dir())?;

        progress.check_cancelled()?;
        progress.set_text(&format!("Downloading plugin {}", session.display_name()));

        // Removed on any early exit below; persisted under its real
        // name only once that name is accepted.
        let mut temp = Builder::new()
            .prefix("plugin_")
            .suffix("_download")
            .tempfile_in(self.paths.temp_dir())?;

        let fetched = transport::fetch(
            &self.client,
            &session.request.url,
            temp.as_file_mut(),
            progress,
        )?;
        session.effective_url = fetched.effective_url;

        progress.check_cancelled()?;

        let file_name = match &session.file_name {
            Some(name) => name.clone(),
            None => filename::resolve(
                &session.effective_url,
                fetched.content_disposition.as_deref(),
                &session.request.url,
            )?,
        };
        session.file_name = Some(file_name.clone());

        let target = self.paths.temp_dir().join(&file_name);
        temp.persist(&target).map_err(|err| Error::Io(err.error))?;
        Ok(target)
    }

    /// Release a rejected session's artifact; the temp file belongs to
    /// the session until it is accepted.
    fn discard(&self, session: &mut DownloadSession) {
        if let Some(file) = session.file.take() {
            if let Err(err) = fs::remove_file(&file) {
                warn!(file = %file.display(), %err, "failed to remove rejected artifact");
            }
        }
        session.reject();
    }
}
