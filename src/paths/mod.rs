//! Platform search-path policy.
//!
//! Produces the ordered list of directories the scanner will visit, each
//! tagged with its rung on the priority ladder. This module only expands
//! environment variables and platform knowledge; it never touches the
//! filesystem.

use std::env;
use std::path::PathBuf;

use tracing::debug;

/// Environment variable naming extra directories to scan.
pub const ENV_SEARCH_PATH: &str = "ONEVPL_SEARCH_PATH";

/// Values longer than this are treated as unset.
pub(crate) const ENV_VAR_MAX_LEN: usize = 32 * 1024;

#[cfg(target_os = "android")]
const ANDROID_DEFAULT_SEARCH_PATH: &str = "/system/vendor/lib64";

/// Rung on the library search ladder. Lower ranks beat higher ranks.
///
/// The rung names follow the Windows ladder. POSIX reuses the same rungs
/// for its own sources: `LD_LIBRARY_PATH` lands on `DriverStore`, the
/// platform default library directories on `CurrentDir`, and the working
/// directory on `EnvPath`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SearchPriority {
    /// Windows driver store (one directory per adapter).
    DriverStore = 1,
    /// Directory of the current executable.
    CurrentExe = 2,
    /// Current working directory.
    CurrentDir = 3,
    /// Entries of the `PATH` environment variable.
    EnvPath = 4,
    /// Entries of `ONEVPL_SEARCH_PATH`.
    EnvOnevpl = 5,
    /// Legacy runtime installation directories.
    Legacy = 6,
}

/// One directory to scan, tagged with where on the ladder it came from.
#[derive(Debug, Clone)]
pub struct SearchDir {
    /// Directory to scan. May not exist; the scanner treats that as soft.
    pub dir: PathBuf,
    /// Ladder rung this directory belongs to.
    pub priority: SearchPriority,
}

impl SearchDir {
    pub(crate) fn new(dir: impl Into<PathBuf>, priority: SearchPriority) -> Self {
        Self {
            dir: dir.into(),
            priority,
        }
    }
}

/// Split an environment variable into directories.
///
/// The separator is `;` on Windows and `:` elsewhere. An unset, empty, or
/// oversized value yields an empty list. Never fails.
pub(crate) fn parse_env_dirs(name: &str) -> Vec<PathBuf> {
    let Ok(value) = env::var(name) else {
        return Vec::new();
    };
    split_path_list(&value)
}

fn split_path_list(value: &str) -> Vec<PathBuf> {
    if value.is_empty() || value.len() >= ENV_VAR_MAX_LEN {
        return Vec::new();
    }
    let sep = if cfg!(windows) { ';' } else { ':' };
    value
        .split(sep)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Produce the full ordered directory list for the current platform.
pub fn produce_directories() -> Vec<SearchDir> {
    let dirs = platform_directories();
    debug!("search ladder: {} directories", dirs.len());
    dirs
}

#[cfg(unix)]
fn platform_directories() -> Vec<SearchDir> {
    let mut dirs = Vec::new();

    // highest rung: LD_LIBRARY_PATH
    for dir in parse_env_dirs("LD_LIBRARY_PATH") {
        dirs.push(SearchDir::new(dir, SearchPriority::DriverStore));
    }

    // platform default library directories, multi-arch first
    for dir in [
        "/usr/lib/x86_64-linux-gnu",
        "/lib",
        "/usr/lib",
        "/lib64",
        "/usr/lib64",
    ] {
        dirs.push(SearchDir::new(dir, SearchPriority::CurrentDir));
    }

    if let Ok(cwd) = env::current_dir() {
        dirs.push(SearchDir::new(cwd, SearchPriority::EnvPath));
    }

    for dir in onevpl_search_dirs() {
        dirs.push(SearchDir::new(dir, SearchPriority::EnvOnevpl));
    }

    // legacy runtime installation
    dirs.push(SearchDir::new(
        "/opt/intel/mediasdk/lib",
        SearchPriority::Legacy,
    ));
    dirs.push(SearchDir::new(
        "/opt/intel/mediasdk/lib64",
        SearchPriority::Legacy,
    ));

    dirs
}

#[cfg(windows)]
fn platform_directories() -> Vec<SearchDir> {
    let mut dirs = Vec::new();

    // TODO: driver-store and registry rungs need SetupAPI bindings; until
    // then those sources contribute no directories on Windows.

    if let Ok(exe) = env::current_exe() {
        if let Some(parent) = exe.parent() {
            dirs.push(SearchDir::new(parent, SearchPriority::CurrentExe));
        }
    }

    if let Ok(cwd) = env::current_dir() {
        dirs.push(SearchDir::new(cwd, SearchPriority::CurrentDir));
    }

    for dir in parse_env_dirs("PATH") {
        dirs.push(SearchDir::new(dir, SearchPriority::EnvPath));
    }

    for dir in onevpl_search_dirs() {
        dirs.push(SearchDir::new(dir, SearchPriority::EnvOnevpl));
    }

    // legacy: %windir%\system32 and %windir%\syswow64
    let windir = parse_env_dirs("windir");
    if windir.len() == 1 {
        dirs.push(SearchDir::new(
            windir[0].join("system32"),
            SearchPriority::Legacy,
        ));
        dirs.push(SearchDir::new(
            windir[0].join("syswow64"),
            SearchPriority::Legacy,
        ));
    }

    dirs
}

fn onevpl_search_dirs() -> Vec<PathBuf> {
    let dirs = parse_env_dirs(ENV_SEARCH_PATH);

    #[cfg(target_os = "android")]
    if dirs.is_empty() {
        return vec![PathBuf::from(ANDROID_DEFAULT_SEARCH_PATH)];
    }

    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_split_path_list() {
        let sep = if cfg!(windows) { ';' } else { ':' };
        let value = format!("/a{sep}/b/c{sep}{sep}/d");
        let dirs = split_path_list(&value);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/a"),
                PathBuf::from("/b/c"),
                PathBuf::from("/d")
            ]
        );
    }

    #[test]
    fn test_empty_value_yields_empty_list() {
        assert!(split_path_list("").is_empty());
    }

    #[test]
    fn test_oversized_value_yields_empty_list() {
        let value = "x".repeat(ENV_VAR_MAX_LEN);
        assert!(split_path_list(&value).is_empty());
    }

    #[test]
    #[serial]
    fn test_parse_env_dirs_unset() {
        std::env::remove_var("VPL_DISPATCH_TEST_UNSET");
        assert!(parse_env_dirs("VPL_DISPATCH_TEST_UNSET").is_empty());
    }

    #[test]
    #[serial]
    fn test_parse_env_dirs_set() {
        let sep = if cfg!(windows) { ";" } else { ":" };
        std::env::set_var("VPL_DISPATCH_TEST_SET", format!("/x{sep}/y"));
        let dirs = parse_env_dirs("VPL_DISPATCH_TEST_SET");
        std::env::remove_var("VPL_DISPATCH_TEST_SET");
        assert_eq!(dirs, vec![PathBuf::from("/x"), PathBuf::from("/y")]);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(SearchPriority::DriverStore < SearchPriority::EnvOnevpl);
        assert!(SearchPriority::EnvOnevpl < SearchPriority::Legacy);
    }
}
