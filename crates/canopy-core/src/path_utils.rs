//! Project-root-relative POSIX path normalization (C13).

use std::collections::HashSet;
use std::path::{Component as PathComponent, Path, PathBuf};

/// Normalizes `path` to a POSIX, project-root-relative string.
///
/// `path` may be absolute or relative; it is first made relative to `root`
/// (if it lies under it), then its components are rejoined with `/`
/// regardless of host path separator, with `.`/`..` resolved lexically.
pub fn to_project_relative_posix(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            PathComponent::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            PathComponent::ParentDir => {
                parts.pop();
            }
            PathComponent::CurDir | PathComponent::RootDir | PathComponent::Prefix(_) => {}
        }
    }
    parts.join("/")
}

/// Returns true if `candidate` (already normalized, project-relative) stays
/// within the workspace — i.e. it has no leading `..` segment.
pub fn is_within_workspace(candidate: &str) -> bool {
    !candidate.split('/').any(|seg| seg == "..") && !candidate.starts_with('/')
}

/// Identity used to de-duplicate files reached through symlinks: `(dev, ino)`
/// on unix, or the canonicalized path on platforms without that metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RealIdentity {
    DevIno(u64, u64),
    CanonicalPath(PathBuf),
}

pub fn real_identity(path: &Path) -> std::io::Result<RealIdentity> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let meta = std::fs::symlink_metadata(path).and_then(|m| {
            if m.file_type().is_symlink() {
                std::fs::metadata(path)
            } else {
                Ok(m)
            }
        })?;
        Ok(RealIdentity::DevIno(meta.dev(), meta.ino()))
    }
    #[cfg(not(unix))]
    {
        Ok(RealIdentity::CanonicalPath(std::fs::canonicalize(path)?))
    }
}

/// Tracks visited real identities while descending a tree, so symlink loops
/// terminate instead of being walked forever.
#[derive(Debug, Default)]
pub struct VisitGuard {
    visited: HashSet<RealIdentity>,
}

impl VisitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time this path's real identity is seen.
    pub fn visit(&mut self, path: &Path) -> bool {
        match real_identity(path) {
            Ok(identity) => self.visited.insert(identity),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_root_and_rejoins_posix() {
        let root = Path::new("/home/user/project");
        let file = Path::new("/home/user/project/src/a.ts");
        assert_eq!(to_project_relative_posix(root, file), "src/a.ts");
    }

    #[test]
    fn resolves_dot_dot_lexically() {
        let root = Path::new("/root");
        let file = Path::new("/root/src/../lib/a.rs");
        assert_eq!(to_project_relative_posix(root, file), "lib/a.rs");
    }

    #[test]
    fn within_workspace_rejects_escaping_paths() {
        assert!(is_within_workspace("src/a.ts"));
        assert!(!is_within_workspace("../outside.ts"));
        assert!(!is_within_workspace("/abs/path.ts"));
    }

    #[test]
    fn visit_guard_rejects_repeat_identity() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();

        let mut guard = VisitGuard::new();
        assert!(guard.visit(&file));
        assert!(!guard.visit(&file));
    }
}
