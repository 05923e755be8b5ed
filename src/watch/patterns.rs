// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::WatchSection;
use crate::fs::FileSystem;

/// Compiled include/exclude globs deciding which changed paths count as a
/// formula/config change.
///
/// Patterns are evaluated against paths relative to `base` (the directory
/// containing the config file), with forward slashes, e.g.
/// `"formula/deploy.toml"`.
#[derive(Clone)]
pub struct WatchFilter {
    base: PathBuf,
    include: GlobSet,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for WatchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchFilter")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl WatchFilter {
    pub fn new(base: impl Into<PathBuf>, include: &[String], exclude: &[String]) -> Result<Self> {
        let include = build_globset(include).context("building watch include globset")?;
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building watch exclude globset")?)
        };
        Ok(Self {
            base: base.into(),
            include,
            exclude,
        })
    }

    pub fn from_section(base: impl Into<PathBuf>, section: &WatchSection) -> Result<Self> {
        Self::new(base, &section.include, &section.exclude)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Match a path already relative to `base`.
    pub fn matches_relative(&self, rel_path: &str) -> bool {
        if !self.include.is_match(rel_path) {
            return false;
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(rel_path),
            None => true,
        }
    }

    /// Match an absolute (or base-joined) path. Paths outside `base` never
    /// match.
    pub fn matches(&self, path: &Path) -> bool {
        match relative_str(&self.base, path) {
            Some(rel) => self.matches_relative(&rel),
            None => false,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?);
    }
    Ok(builder.build()?)
}

/// `path` relative to `root` with forward slashes.
///
/// Falls back to comparing canonicalized paths, since notify may report a
/// different absolute prefix for the same directory (symlinked temp dirs on
/// macOS, for instance).
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }
    let (Ok(root), Ok(path)) = (root.canonicalize(), path.canonicalize()) else {
        return None;
    };
    path.strip_prefix(&root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

/// Every file under `roots` accepted by `filter`, sorted and deduplicated.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    roots: &[PathBuf],
    filter: &WatchFilter,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack: Vec<PathBuf> = roots.iter().filter(|r| fs.is_dir(r)).cloned().collect();

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) && filter.matches(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn filter(include: &[&str], exclude: &[&str]) -> WatchFilter {
        let to_vec = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        WatchFilter::new("/srv/deck", &to_vec(include), &to_vec(exclude)).unwrap()
    }

    #[test]
    fn include_and_exclude_are_relative_to_base() {
        let f = filter(&["formula/**/*.toml"], &["**/*.bak.toml"]);

        assert!(f.matches(Path::new("/srv/deck/formula/ops/deploy.toml")));
        assert!(!f.matches(Path::new("/srv/deck/formula/deploy.bak.toml")));
        assert!(!f.matches(Path::new("/srv/deck/config/deploy.toml")));
        assert!(!f.matches(Path::new("/elsewhere/formula/deploy.toml")));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let err = WatchFilter::new("/srv", &["formula/[".to_string()], &[]).unwrap_err();
        assert!(format!("{err:#}").contains("invalid glob pattern"));
    }

    #[test]
    fn collects_matching_files_across_roots() {
        let fs = MockFileSystem::new();
        fs.add_file("/srv/deck/config/a.toml", "a");
        fs.add_file("/srv/deck/config/notes.txt", "n");
        fs.add_file("/srv/deck/formula/nested/b.toml", "b");

        let f = filter(&["**/*.toml"], &[]);
        let roots = vec![
            PathBuf::from("/srv/deck/config"),
            PathBuf::from("/srv/deck/formula"),
            PathBuf::from("/srv/deck/missing"),
        ];

        let files = collect_matching_files(&fs, &roots, &f).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/srv/deck/config/a.toml"),
                PathBuf::from("/srv/deck/formula/nested/b.toml"),
            ]
        );
    }
}
