//! Archive extraction
//!
//! Materializes an uploaded zip archive into a job's working directory:
//! - Every entry must resolve lexically inside the destination
//! - The entry count and each file's decompressed size are capped
//! - Any failing entry aborts the whole extraction
//!
//! Extraction is synchronous; callers on the async runtime wrap it in
//! `spawn_blocking`.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::ArchiveLimits;
use texforge_core::domain::job::SOURCE_EXTENSION;

/// Errors raised while extracting an archive
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read archive: {0}")]
    Malformed(#[from] zip::result::ZipError),

    #[error("too many files in archive ({count}, max {max})")]
    TooManyEntries { count: usize, max: usize },

    #[error("illegal file path: {0}")]
    UnsafePath(String),

    #[error("file too large: {name} (max {limit} bytes)")]
    EntryTooLarge { name: String, limit: u64 },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolves `relative` against `root` without touching the file system
///
/// `.` segments are dropped and `..` segments pop the previous one. Returns
/// `None` when the path is absolute or climbs above `root`.
pub fn resolve_inside(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut parts = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    let mut resolved = root.to_path_buf();
    resolved.extend(parts);
    Some(resolved)
}

/// Lists the source files (`.tex`, any case) an archive contains
pub fn source_entries(data: &[u8]) -> Result<Vec<String>, ExtractError> {
    let archive = zip::ZipArchive::new(Cursor::new(data))?;
    Ok(archive
        .file_names()
        .filter(|name| !name.ends_with('/') && is_source_file(name))
        .map(str::to_string)
        .collect())
}

/// True when a path names a document source file
pub fn is_source_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
}

/// Extracts `data` into `dest`, returning the number of files written
///
/// The entry count and every entry name are checked before anything is
/// written, so a rejected archive leaves `dest` untouched.
pub fn extract_archive(
    data: &[u8],
    dest: &Path,
    limits: &ArchiveLimits,
) -> Result<usize, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;

    if archive.len() > limits.max_entries {
        return Err(ExtractError::TooManyEntries {
            count: archive.len(),
            max: limits.max_entries,
        });
    }

    for name in archive.file_names() {
        if resolve_inside(dest, name).is_none() {
            return Err(ExtractError::UnsafePath(name.to_string()));
        }
    }

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let path = resolve_inside(dest, &name)
            .ok_or_else(|| ExtractError::UnsafePath(name.clone()))?;

        if entry.is_dir() {
            create_dir(&path)?;
            apply_mode(&path, entry.unix_mode(), 0o700)?;
            continue;
        }

        if path == dest {
            return Err(ExtractError::UnsafePath(name));
        }
        if let Some(parent) = path.parent() {
            create_dir(parent)?;
        }

        let mut out = fs::File::create(&path).map_err(|source| ExtractError::Io {
            path: path.clone(),
            source,
        })?;
        let copied = io::copy(&mut (&mut entry).take(limits.max_entry_size + 1), &mut out)
            .map_err(|source| ExtractError::Io {
                path: path.clone(),
                source,
            })?;
        if copied > limits.max_entry_size {
            return Err(ExtractError::EntryTooLarge {
                name,
                limit: limits.max_entry_size,
            });
        }
        drop(out);
        apply_mode(&path, entry.unix_mode(), 0o600)?;

        debug!("Extracted {} ({} bytes)", name, copied);
        written += 1;
    }

    Ok(written)
}

fn create_dir(path: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Applies an entry's declared permission bits, keeping `owner` bits set so
/// the job can still read and clean up what it extracted
#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>, owner: u32) -> Result<(), ExtractError> {
    use std::os::unix::fs::PermissionsExt;

    let Some(mode) = mode else {
        return Ok(());
    };
    let permissions = fs::Permissions::from_mode((mode & 0o777) | owner);
    fs::set_permissions(path, permissions).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>, _owner: u32) -> Result<(), ExtractError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::archive;

    fn limits(max_entries: usize, max_entry_size: u64) -> ArchiveLimits {
        ArchiveLimits {
            max_entries,
            max_entry_size,
        }
    }

    #[test]
    fn test_resolve_inside() {
        let root = Path::new("/work/job");
        assert_eq!(
            resolve_inside(root, "chapters/one.tex"),
            Some(PathBuf::from("/work/job/chapters/one.tex"))
        );
        assert_eq!(
            resolve_inside(root, "a/../b.tex"),
            Some(PathBuf::from("/work/job/b.tex"))
        );
        assert_eq!(
            resolve_inside(root, "./main.tex"),
            Some(PathBuf::from("/work/job/main.tex"))
        );
        assert_eq!(resolve_inside(root, "../../etc/passthrough"), None);
        assert_eq!(resolve_inside(root, "a/../../escape"), None);
        assert_eq!(resolve_inside(root, "/etc/passwd"), None);
    }

    #[test]
    fn test_extracts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let data = archive(&[
            ("main.tex", b"\\input{chapters/one}".as_slice()),
            ("chapters/one.tex", b"Hello".as_slice()),
            ("figures/", b"".as_slice()),
        ]);

        let written = extract_archive(&data, dir.path(), &ArchiveLimits::default()).unwrap();

        assert_eq!(written, 2);
        assert_eq!(
            fs::read(dir.path().join("chapters/one.tex")).unwrap(),
            b"Hello"
        );
        assert!(dir.path().join("figures").is_dir());
    }

    #[test]
    fn test_zip_slip_is_rejected_without_writing() {
        let outer = tempfile::tempdir().unwrap();
        let dest = outer.path().join("a/b");
        fs::create_dir_all(&dest).unwrap();
        let data = archive(&[
            ("main.tex", b"ok".as_slice()),
            ("../../etc/passthrough", b"pwned".as_slice()),
        ]);

        let err = extract_archive(&data, &dest, &ArchiveLimits::default()).unwrap_err();

        assert!(matches!(err, ExtractError::UnsafePath(ref name) if name == "../../etc/passthrough"));
        assert!(!outer.path().join("etc/passthrough").exists());
        assert!(!dest.join("main.tex").exists());
    }

    #[test]
    fn test_too_many_entries_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..4).map(|i| format!("file{}.tex", i)).collect();
        let entries: Vec<(&str, &[u8])> =
            names.iter().map(|n| (n.as_str(), b"x".as_slice())).collect();
        let data = archive(&entries);

        let err = extract_archive(&data, dir.path(), &limits(3, 1024)).unwrap_err();

        assert!(matches!(
            err,
            ExtractError::TooManyEntries { count: 4, max: 3 }
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_entry_at_the_limit_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let data = archive(&[("main.tex", [b'a'; 16].as_slice())]);

        assert_eq!(extract_archive(&data, dir.path(), &limits(10, 16)).unwrap(), 1);
    }

    #[test]
    fn test_oversized_entry_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let data = archive(&[("big.tex", [b'a'; 17].as_slice())]);

        let err = extract_archive(&data, dir.path(), &limits(10, 16)).unwrap_err();

        assert!(matches!(err, ExtractError::EntryTooLarge { ref name, limit: 16 } if name == "big.tex"));
    }

    #[test]
    fn test_malformed_archive() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_archive(b"not a zip", dir.path(), &ArchiveLimits::default()).unwrap_err();
        assert!(matches!(err, ExtractError::Malformed(_)));
    }

    #[test]
    fn test_source_entries() {
        let data = archive(&[
            ("main.tex", b"".as_slice()),
            ("sub/Appendix.TEX", b"".as_slice()),
            ("refs.bib", b"".as_slice()),
            ("dir.tex/", b"".as_slice()),
        ]);

        let mut entries = source_entries(&data).unwrap();
        entries.sort();

        assert_eq!(entries, vec!["main.tex", "sub/Appendix.TEX"]);
    }
}
