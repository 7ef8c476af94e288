//! Path boundary validation.
//!
//! A pure function invoked at every external-path ingress — HTTP query
//! params, schedule `cwd`, directory-picker payloads, MCP tool arguments
//! that name paths. Boundary checking is never a
//! library-internal concern baked into one call site; callers must invoke
//! [`validate_boundary`] explicitly wherever an untrusted path enters the
//! system.

use std::path::{Path, PathBuf};

use crate::errors::{BoundaryError, BoundaryKind};

/// Validate that `path` is safe to use under `root`.
///
/// Rejects paths containing a NUL byte outright. Otherwise canonicalises
/// `path` (resolving symlinks and `..` components) and rejects the result if
/// it falls outside the canonicalised `root`.
///
/// # Errors
/// Returns [`BoundaryError`] with [`BoundaryKind::NullByte`] or
/// [`BoundaryKind::OutsideBoundary`].
pub fn validate_boundary(path: &str, root: &Path) -> Result<PathBuf, BoundaryError> {
    if path.as_bytes().contains(&0) {
        return Err(BoundaryError {
            path: path.to_owned(),
            kind: BoundaryKind::NullByte,
        });
    }

    let candidate = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        root.join(path)
    };

    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let canonical_candidate = canonical_root.join(
        candidate
            .strip_prefix(root)
            .unwrap_or(&candidate)
            .components()
            .collect::<PathBuf>(),
    );
    let canonical_candidate = canonical_candidate
        .canonicalize()
        .unwrap_or(canonical_candidate);

    if !canonical_candidate.starts_with(&canonical_root) {
        return Err(BoundaryError {
            path: path.to_owned(),
            kind: BoundaryKind::OutsideBoundary,
        });
    }

    Ok(canonical_candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn rejects_null_byte() {
        let root = tempfile::tempdir().unwrap();
        let err = validate_boundary("foo\0bar", root.path()).unwrap_err();
        assert_eq!(err.kind, BoundaryKind::NullByte);
        assert_eq!(err.code(), "NULL_BYTE");
    }

    #[test]
    fn accepts_path_within_root() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("sub")).unwrap();
        let result = validate_boundary("sub", root.path()).unwrap();
        assert!(result.starts_with(root.path().canonicalize().unwrap()));
    }

    #[test]
    fn rejects_dotdot_escape() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("sub")).unwrap();
        let err = validate_boundary("sub/../../etc", root.path()).unwrap_err();
        assert_eq!(err.kind, BoundaryKind::OutsideBoundary);
        assert_eq!(err.code(), "OUTSIDE_BOUNDARY");
    }

    #[test]
    fn rejects_absolute_path_outside_root() {
        let root = tempfile::tempdir().unwrap();
        let err = validate_boundary("/etc/passwd", root.path()).unwrap_err();
        assert_eq!(err.kind, BoundaryKind::OutsideBoundary);
    }

    #[test]
    fn accepts_symlink_resolving_inside_root() {
        let root = tempfile::tempdir().unwrap();
        let real = root.path().join("real");
        fs::create_dir_all(&real).unwrap();
        #[cfg(unix)]
        {
            let link = root.path().join("link");
            std::os::unix::fs::symlink(&real, &link).unwrap();
            let result = validate_boundary("link", root.path()).unwrap();
            assert!(result.starts_with(real.canonicalize().unwrap()));
        }
    }

    #[test]
    fn rejects_symlink_escaping_root() {
        #[cfg(unix)]
        {
            let root = tempfile::tempdir().unwrap();
            let outside = tempfile::tempdir().unwrap();
            let link = root.path().join("escape");
            std::os::unix::fs::symlink(outside.path(), &link).unwrap();
            let err = validate_boundary("escape", root.path()).unwrap_err();
            assert_eq!(err.kind, BoundaryKind::OutsideBoundary);
        }
    }
}
