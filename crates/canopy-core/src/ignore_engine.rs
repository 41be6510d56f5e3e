//! Ignore engine (C11): defaults + discovered `.gitignore`s + user patterns.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Hardcoded defaults: VCS, build output, caches, db files, binaries.
const DEFAULT_EXCLUDES: &[&str] = &[
    ".git/**",
    ".hg/**",
    ".svn/**",
    "node_modules/**",
    "target/**",
    "dist/**",
    "build/**",
    ".canopy/**",
    "**/__pycache__/**",
    "**/*.pyc",
    "**/*.db",
    "**/*.db-wal",
    "**/*.db-shm",
    "**/*.sqlite",
    "**/*.sqlite3",
    "**/*.so",
    "**/*.dylib",
    "**/*.dll",
    "**/*.exe",
];

/// Matcher composed from defaults, every `.gitignore` discovered while
/// descending the tree, and user-supplied patterns from config.
pub struct IgnoreEngine {
    root: std::path::PathBuf,
    defaults: GlobSet,
    gitignore: Gitignore,
    user: GlobSet,
}

impl IgnoreEngine {
    /// Builds an engine rooted at `root`, merging in `.gitignore` files found
    /// under it and `user_patterns` from config.
    pub fn build(root: &Path, user_patterns: &[String]) -> Self {
        let mut defaults_builder = GlobSetBuilder::new();
        for pat in DEFAULT_EXCLUDES {
            if let Ok(glob) = Glob::new(pat) {
                defaults_builder.add(glob);
            }
        }

        let mut gi_builder = GitignoreBuilder::new(root);
        collect_gitignores(root, &mut gi_builder);
        let gitignore = gi_builder.build().unwrap_or_else(|_| Gitignore::empty());

        let mut user_builder = GlobSetBuilder::new();
        for pat in user_patterns {
            if let Ok(glob) = Glob::new(pat) {
                user_builder.add(glob);
            }
        }

        IgnoreEngine {
            root: root.to_path_buf(),
            defaults: defaults_builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap()),
            gitignore,
            user: user_builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap()),
        }
    }

    /// `shouldIgnore(absOrRelPath): bool`. Resolution is path-root-relative POSIX.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if self.defaults.is_match(relative) || self.user.is_match(relative) {
            return true;
        }
        matches!(
            self.gitignore.matched(relative, path.is_dir()),
            ignore::Match::Ignore(_)
        )
    }

    /// True if `path` is under the engine's internal state directory or looks
    /// like its database files — paths the watcher must never treat as project input.
    pub fn is_internal_state_path(path: &Path) -> bool {
        let s = path.to_string_lossy();
        s.contains("/.canopy/")
            || s.starts_with(".canopy/")
            || s.ends_with(".db")
            || s.ends_with(".db-wal")
            || s.ends_with(".db-shm")
            || s.ends_with(".sqlite")
            || s.ends_with(".sqlite3")
    }
}

fn collect_gitignores(root: &Path, builder: &mut GitignoreBuilder) {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let candidate = dir.join(".gitignore");
        if candidate.is_file() {
            let _ = builder.add(candidate);
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && path.file_name().map_or(true, |n| n != ".git") {
                stack.push(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_ignore_build_output_and_vcs() {
        let dir = tempfile::tempdir().unwrap();
        let engine = IgnoreEngine::build(dir.path(), &[]);
        assert!(engine.should_ignore(&dir.path().join("target/debug/foo")));
        assert!(engine.should_ignore(&dir.path().join(".git/HEAD")));
        assert!(!engine.should_ignore(&dir.path().join("src/main.rs")));
    }

    #[test]
    fn user_patterns_extend_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let engine = IgnoreEngine::build(dir.path(), &["**/*.generated.rs".to_string()]);
        assert!(engine.should_ignore(&dir.path().join("src/foo.generated.rs")));
    }

    #[test]
    fn internal_state_paths_detected() {
        assert!(IgnoreEngine::is_internal_state_path(Path::new(".canopy/docs.db")));
        assert!(IgnoreEngine::is_internal_state_path(Path::new("project/.canopy/index.sqlite")));
        assert!(!IgnoreEngine::is_internal_state_path(Path::new("src/a.ts")));
    }
}
