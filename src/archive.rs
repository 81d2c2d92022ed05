use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Error, Result};

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|source| archive_error(path, source))
}

fn archive_error(path: &Path, source: ZipError) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        reason: source.to_string(),
    }
}

/// Reject entry names that would land outside the destination.
fn sanitize_entry_path(archive_path: &Path, raw: &Path) -> Result<PathBuf> {
    let mut cleaned = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                return Err(Error::Archive {
                    path: archive_path.to_path_buf(),
                    reason: format!("entry escapes destination: {}", raw.display()),
                });
            }
            Component::CurDir => {}
            Component::Normal(part) => cleaned.push(part),
        }
    }
    if cleaned.as_os_str().is_empty() {
        return Err(Error::Archive {
            path: archive_path.to_path_buf(),
            reason: "entry has an empty path".to_string(),
        });
    }
    Ok(cleaned)
}

/// Extract `archive_path` into `dest_dir`, creating directories as
/// needed.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let mut archive = open(archive_path)?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|source| archive_error(archive_path, source))?;
        let raw = entry.name().replace('\\', "/");
        let rel = sanitize_entry_path(archive_path, Path::new(&raw))?;
        let out = dest_dir.join(&rel);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out)?;
        io::copy(&mut entry, &mut out_file)?;
    }
    Ok(())
}

/// Whether every entry lives under one top-level directory, i.e. the
/// archive already carries its own plugin folder.
pub fn contains_single_root_dir(archive_path: &Path) -> Result<bool> {
    let mut archive = open(archive_path)?;
    let mut root: Option<String> = None;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|source| archive_error(archive_path, source))?;
        let name = entry.name().replace('\\', "/");
        let name = name.trim_start_matches('/');
        let Some(first) = name.split('/').next().filter(|first| !first.is_empty()) else {
            continue;
        };
        if !entry.is_dir() && !name.trim_end_matches('/').contains('/') {
            // A file sitting at the archive root: no enclosing folder.
            return Ok(false);
        }
        match &root {
            Some(existing) if existing != first => return Ok(false),
            Some(_) => {}
            None => root = Some(first.to_string()),
        }
    }
    Ok(root.is_some())
}

/// Read a UTF-8 entry at the archive root.
///
/// `None` when the file is not a zip archive or has no such entry; the
/// caller decides whether that is fatal.
pub fn read_root_entry(archive_path: &Path, entry_name: &str) -> Result<Option<String>> {
    let file = File::open(archive_path)?;
    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(_) => return Ok(None),
    };
    let mut entry = match archive.by_name(entry_name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(source) => return Err(archive_error(archive_path, source)),
    };
    let mut raw = String::new();
    entry.read_to_string(&mut raw)?;
    Ok(Some(raw))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    /// Author a zip at `path` from `(entry name, contents)` pairs;
    /// names ending in `/` become directory entries.
    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).expect("create zip fixture");
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, contents) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).expect("add directory");
            } else {
                writer.start_file(*name, options).expect("start entry");
                writer.write_all(contents.as_bytes()).expect("write entry");
            }
        }
        writer.finish().expect("finish zip");
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::write_zip;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn extracts_nested_entries() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("plugin.zip");
        write_zip(
            &zip_path,
            &[
                ("foo/", ""),
                ("foo/plugin.toml", "id = \"foo\"\n"),
                ("foo/lib/data.txt", "payload"),
            ],
        );

        let out = dir.path().join("out");
        extract(&zip_path, &out).unwrap();
        assert_eq!(
            fs::read_to_string(out.join("foo/plugin.toml")).unwrap(),
            "id = \"foo\"\n"
        );
        assert_eq!(fs::read_to_string(out.join("foo/lib/data.txt")).unwrap(), "payload");
    }

    #[test]
    fn traversal_entries_are_rejected() {
        let archive_path = Path::new("evil.zip");
        for raw in ["../escape.txt", "/etc/passwd", ""] {
            let err = sanitize_entry_path(archive_path, Path::new(raw)).unwrap_err();
            assert!(matches!(err, Error::Archive { .. }), "accepted {raw:?}");
        }
        assert_eq!(
            sanitize_entry_path(archive_path, Path::new("./foo/bar.txt")).unwrap(),
            PathBuf::from("foo/bar.txt")
        );
    }

    #[test]
    fn detects_single_root_folder() {
        let dir = tempdir().unwrap();
        let with_folder = dir.path().join("foldered.zip");
        write_zip(
            &with_folder,
            &[("foo/", ""), ("foo/plugin.toml", ""), ("foo/a.txt", "x")],
        );
        assert!(contains_single_root_dir(&with_folder).unwrap());

        let flat = dir.path().join("flat.zip");
        write_zip(&flat, &[("plugin.toml", ""), ("a.txt", "x")]);
        assert!(!contains_single_root_dir(&flat).unwrap());

        let two_roots = dir.path().join("two.zip");
        write_zip(&two_roots, &[("foo/a.txt", "x"), ("bar/b.txt", "y")]);
        assert!(!contains_single_root_dir(&two_roots).unwrap());
    }

    #[test]
    fn reads_root_entry_when_present() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("pkg.plug");
        write_zip(&zip_path, &[("plugin.toml", "id = \"pkg\"\n"), ("entry.wasm", "")]);

        assert_eq!(
            read_root_entry(&zip_path, "plugin.toml").unwrap().as_deref(),
            Some("id = \"pkg\"\n")
        );
        assert!(read_root_entry(&zip_path, "missing.toml").unwrap().is_none());

        let not_a_zip = dir.path().join("raw.bin");
        fs::write(&not_a_zip, b"just bytes").unwrap();
        assert!(read_root_entry(&not_a_zip, "plugin.toml").unwrap().is_none());
    }
}
