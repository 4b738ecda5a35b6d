use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use globset::{Glob, GlobMatcher};
use walkdir::WalkDir;

use crate::error::{LogQueryError, Result};
use crate::model::LogFile;

/// The configured log directory: lists log files and resolves caller-supplied
/// file names without letting them leave the directory.
#[derive(Clone, Debug)]
pub struct LogDirectory {
    root: PathBuf,
    matcher: GlobMatcher,
}

impl LogDirectory {
    /// `root` should already be canonical (see `Config::resolve_log_dir`).
    pub fn new(root: impl Into<PathBuf>, file_pattern: &str) -> Result<Self> {
        let matcher = Glob::new(file_pattern)
            .map_err(|e| LogQueryError::Config(format!("bad file pattern {file_pattern}: {e}")))?
            .compile_matcher();
        Ok(Self {
            root: root.into(),
            matcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Non-recursive scan for files whose name matches the pattern, sorted by
    /// file name. Symlinks are listed when `resolve` would accept them.
    pub fn list(&self) -> Result<Vec<LogFile>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| match e.into_io_error() {
                Some(io) => LogQueryError::Io(io),
                None => LogQueryError::Config("filesystem loop in log directory".into()),
            })?;
            let file_type = entry.file_type();
            if !file_type.is_file() && !file_type.is_symlink() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.matcher.is_match(&name) {
                continue;
            }
            // same rules as `resolve`: links must land on a file inside the root
            let path = match self.resolve(&name) {
                Ok(path) => path,
                Err(e) if e.is_soft() => continue,
                Err(e) => return Err(e),
            };
            let meta = std::fs::metadata(&path)?;
            files.push(LogFile {
                name,
                path,
                size_bytes: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        Ok(files)
    }

    /// Map a caller-supplied file name to a path inside the directory.
    ///
    /// Only a single plain file name is accepted. Missing files yield
    /// `NotFound`; anything that would resolve outside the root (parent
    /// components, absolute paths, symlinks pointing away) yields `PathEscape`.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf> {
        let escape = || LogQueryError::PathEscape {
            filename: filename.to_string(),
        };

        let candidate = Path::new(filename);
        let mut components = candidate.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            (None, _) => {
                return Err(LogQueryError::NotFound {
                    filename: filename.to_string(),
                })
            }
            _ => return Err(escape()),
        }

        let path = self.root.join(candidate);
        let canonical = match std::fs::canonicalize(&path) {
            Ok(p) => p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogQueryError::NotFound {
                    filename: filename.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        if !canonical.starts_with(&self.root) {
            return Err(escape());
        }
        if !canonical.is_file() {
            return Err(LogQueryError::NotFound {
                filename: filename.to_string(),
            });
        }
        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path, body: &[u8]) {
        std::fs::write(path, body).unwrap();
    }

    fn log_dir(root: &Path) -> LogDirectory {
        LogDirectory::new(std::fs::canonicalize(root).unwrap(), "*.log").unwrap()
    }

    #[test]
    fn list_only_top_level_log_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.log"), b"12345");
        touch(&root.join("a.log"), b"1");
        touch(&root.join("c.txt"), b"nope");
        std::fs::create_dir_all(root.join("nested.log")).unwrap();
        touch(&root.join("nested.log").join("d.log"), b"deep");

        let files = log_dir(root).list().unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.log", "b.log"]);
        assert_eq!(files[1].size_bytes, 5);
        assert!(files[0].modified.is_some());
    }

    #[test]
    fn list_empty_directory() {
        let dir = tempdir().unwrap();
        assert!(log_dir(dir.path()).list().unwrap().is_empty());
    }

    #[test]
    fn resolve_plain_name() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("app.log"), b"x\n");
        let logs = log_dir(dir.path());
        let path = logs.resolve("app.log").unwrap();
        assert!(path.ends_with("app.log"));
    }

    #[test]
    fn resolve_rejects_traversal_and_absolute_paths() {
        let outer = tempdir().unwrap();
        let inner = outer.path().join("logs");
        std::fs::create_dir_all(&inner).unwrap();
        touch(&outer.path().join("secret.log"), b"secret\n");
        let logs = log_dir(&inner);

        for name in ["../secret.log", "sub/../../secret.log", "/etc/passwd", "./app.log"] {
            let err = logs.resolve(name).unwrap_err();
            assert!(matches!(err, LogQueryError::PathEscape { .. }), "{name}: {err:?}");
        }
    }

    #[test]
    fn resolve_missing_and_directory_are_not_found() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("folder.log")).unwrap();
        let logs = log_dir(dir.path());
        assert!(matches!(logs.resolve("missing.log"), Err(LogQueryError::NotFound { .. })));
        assert!(matches!(logs.resolve("folder.log"), Err(LogQueryError::NotFound { .. })));
        assert!(matches!(logs.resolve(""), Err(LogQueryError::NotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_symlink_leaving_root() {
        let outer = tempdir().unwrap();
        let inner = outer.path().join("logs");
        std::fs::create_dir_all(&inner).unwrap();
        let target = outer.path().join("secret.log");
        touch(&target, b"secret\n");
        std::os::unix::fs::symlink(&target, inner.join("link.log")).unwrap();

        let logs = log_dir(&inner);
        assert!(matches!(logs.resolve("link.log"), Err(LogQueryError::PathEscape { .. })));
        assert!(logs.list().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn list_includes_symlink_inside_root() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("real.txt"), b"[ERROR] via link\n");
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.log")).unwrap();
        std::os::unix::fs::symlink(root.join("gone.txt"), root.join("broken.log")).unwrap();

        let files = log_dir(root).list().unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["link.log"]);
        assert_eq!(files[0].size_bytes, 17);
    }
}
