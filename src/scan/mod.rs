//! Directory scanning for candidate backend libraries.
//!
//! Matches the platform name patterns, canonicalizes each hit, and
//! deduplicates against the running candidate set. A directory that cannot
//! be enumerated is skipped; discovery never fails outright.

use std::fs;
use std::path::Path;

use tracing::{debug, trace};

use crate::paths::SearchPriority;
use crate::runtime::LibInfo;

/// Name fragments that are never backends: the dispatcher itself and the
/// tracer library.
#[cfg(unix)]
const EXCLUDED_FRAGMENTS: &[&str] = &["libmfx.so", "libvpl.so", "libmfx-tracer"];

#[cfg(windows)]
const EXCLUDED_FRAGMENTS: &[&str] = &["libmfx.dll", "libvpl.dll", "libvpld.dll"];

/// Whether a file name matches the backend candidate patterns.
#[cfg(unix)]
fn is_candidate(name: &str) -> bool {
    if !name.contains(".so") {
        return false;
    }
    if !(name.starts_with("libvpl") || name.starts_with("libmfx")) {
        return false;
    }
    !EXCLUDED_FRAGMENTS.iter().any(|ex| name.contains(ex))
}

#[cfg(windows)]
fn is_candidate(name: &str) -> bool {
    if !name.ends_with(".dll") {
        return false;
    }
    if !(name.starts_with("libvpl") || name.starts_with("libmfx")) {
        return false;
    }
    !EXCLUDED_FRAGMENTS.iter().any(|ex| name.contains(ex))
}

/// Scan one directory and append new candidates to `libs`.
///
/// Candidates already present (by canonical path) are dropped silently, so
/// a library reachable from several rungs keeps the tag of the first rung
/// that found it.
pub(crate) fn scan_dir(dir: &Path, priority: SearchPriority, libs: &mut Vec<LibInfo>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            trace!("skipping {}: {e}", dir.display());
            return;
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_candidate(name) {
            continue;
        }

        // symlink resolution; unreadable candidates are skipped
        let full_path = match fs::canonicalize(entry.path()) {
            Ok(p) => p,
            Err(e) => {
                trace!("cannot canonicalize {}: {e}", entry.path().display());
                continue;
            }
        };

        if libs.iter().any(|li| li.full_path == full_path) {
            continue;
        }

        debug!(
            "candidate {} ({:?})",
            full_path.display(),
            priority
        );
        libs.push(LibInfo::discovered(full_path, priority));
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::fs::File;

    fn scan_temp(names: &[&str]) -> Vec<String> {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            File::create(dir.path().join(name)).unwrap();
        }
        let mut libs = Vec::new();
        scan_dir(dir.path(), SearchPriority::EnvOnevpl, &mut libs);
        let mut found: Vec<String> = libs.iter().map(|li| li.basename()).collect();
        found.sort();
        found
    }

    #[test]
    #[cfg(unix)]
    fn test_matches_backend_patterns() {
        let found = scan_temp(&[
            "libvpl-backend.so",
            "libmfx-gen.so.1.2",
            "libmfxhw64.so.1",
            "readme.txt",
            "libfoo.so",
        ]);
        assert_eq!(
            found,
            vec!["libmfx-gen.so.1.2", "libmfxhw64.so.1", "libvpl-backend.so"]
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_excludes_dispatcher_and_tracer() {
        let found = scan_temp(&[
            "libmfx.so",
            "libmfx.so.1",
            "libvpl.so.2",
            "libmfx-tracer.so",
            "libvpl-real.so",
        ]);
        assert_eq!(found, vec!["libvpl-real.so"]);
    }

    #[test]
    #[cfg(unix)]
    fn test_requires_so_suffix() {
        let found = scan_temp(&["libvplrt", "libmfx-gen.a"]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_missing_directory_is_soft() {
        let mut libs = Vec::new();
        scan_dir(
            Path::new("/nonexistent/vpl-dispatch-test"),
            SearchPriority::CurrentDir,
            &mut libs,
        );
        assert!(libs.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_dedup_by_canonical_path() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("libvpl-backend.so");
        File::create(&real).unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("libvpl-alias.so")).unwrap();

        let mut libs = Vec::new();
        scan_dir(dir.path(), SearchPriority::DriverStore, &mut libs);
        // the symlink resolves to the same canonical file
        assert_eq!(libs.len(), 1);

        // a second pass over the same directory adds nothing
        scan_dir(dir.path(), SearchPriority::EnvOnevpl, &mut libs);
        assert_eq!(libs.len(), 1);
        assert_eq!(libs[0].priority, SearchPriority::DriverStore);
    }
}
