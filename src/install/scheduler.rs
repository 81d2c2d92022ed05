use std::path::Path;

use tracing::info;

use crate::archive;
use crate::error::Result;
use crate::install::paths::InstallPaths;
use crate::install::script::{ActionCommand, ActionScript};

/// Extension of a single-file plugin package: a zip with the
/// descriptor at its root, loaded by the host in place and therefore
/// installed by plain copy.
pub const PACKAGE_EXT: &str = ".plug";

/// Stage the installation of a downloaded artifact.
///
/// Appends, in order: a delete of the prior installation when one
/// exists, exactly one copy or unzip, and a delete of the temp
/// artifact when requested. Everything is deferred to the
/// bootstrapper; live plugin directories are never touched here.
pub fn schedule(
    script: &dyn ActionScript,
    paths: &InstallPaths,
    artifact: &Path,
    display_name: &str,
    old_install_path: Option<&Path>,
    delete_artifact_after: bool,
) -> Result<()> {
    if let Some(old) = old_install_path {
        script.append(ActionCommand::delete(old))?;
    }

    let file_name = artifact
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if file_name.ends_with(PACKAGE_EXT) {
        let dst = paths.plugins_dir().join(&file_name);
        script.append(ActionCommand::copy(artifact, &dst))?;
    } else {
        // A container that already carries its own folder unpacks
        // straight into the plugins dir; otherwise the display name
        // supplies the enclosing directory the archive lacks.
        let dst_dir = if archive::contains_single_root_dir(artifact)? {
            paths.plugins_dir().to_path_buf()
        } else {
            paths.plugins_dir().join(display_name)
        };
        script.append(ActionCommand::unzip(artifact, &dst_dir))?;
    }

    if delete_artifact_after {
        script.append(ActionCommand::delete(artifact))?;
    }

    info!(artifact = %artifact.display(), plugin = display_name, "install staged for next startup");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixtures::write_zip;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingScript(Mutex<Vec<ActionCommand>>);

    impl RecordingScript {
        fn commands(&self) -> Vec<ActionCommand> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ActionScript for RecordingScript {
        fn append(&self, command: ActionCommand) -> Result<()> {
            self.0.lock().unwrap().push(command);
            Ok(())
        }
    }

    #[test]
    fn package_artifacts_are_copied() {
        let dir = tempdir().unwrap();
        let paths = InstallPaths::new(dir.path().join("plugins"), dir.path().join("temp"));
        let artifact = dir.path().join("temp/plugin.plug");
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        fs::write(&artifact, b"pkg").unwrap();

        let script = RecordingScript::default();
        schedule(&script, &paths, &artifact, "plugin", None, true).unwrap();

        assert_eq!(
            script.commands(),
            vec![
                ActionCommand::copy(&artifact, &paths.plugins_dir().join("plugin.plug")),
                ActionCommand::delete(&artifact),
            ]
        );
    }

    #[test]
    fn foldered_archives_unzip_into_the_plugins_dir() {
        let dir = tempdir().unwrap();
        let paths = InstallPaths::new(dir.path().join("plugins"), dir.path().join("temp"));
        let artifact = dir.path().join("temp/foo.zip");
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        write_zip(&artifact, &[("foo/", ""), ("foo/plugin.toml", "id = \"foo\"")]);

        let script = RecordingScript::default();
        let old = dir.path().join("plugins/foo");
        schedule(&script, &paths, &artifact, "foo", Some(&old), true).unwrap();

        assert_eq!(
            script.commands(),
            vec![
                ActionCommand::delete(&old),
                ActionCommand::unzip(&artifact, paths.plugins_dir()),
                ActionCommand::delete(&artifact),
            ]
        );
    }

    #[test]
    fn flat_archives_get_an_enclosing_directory() {
        let dir = tempdir().unwrap();
        let paths = InstallPaths::new(dir.path().join("plugins"), dir.path().join("temp"));
        let artifact = dir.path().join("temp/bar.zip");
        fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        write_zip(&artifact, &[("plugin.toml", "id = \"bar\""), ("entry.wasm", "")]);

        let script = RecordingScript::default();
        schedule(&script, &paths, &artifact, "Bar Plugin", None, false).unwrap();

        assert_eq!(
            script.commands(),
            vec![ActionCommand::unzip(
                &artifact,
                &paths.plugins_dir().join("Bar Plugin")
            )]
        );
    }
}
