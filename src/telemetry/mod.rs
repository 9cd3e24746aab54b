//! Dispatcher log activation.
//!
//! The loader logs through `tracing` unconditionally; this module wires a
//! subscriber when the environment asks for one, matching the external
//! contract: `ONEVPL_DISPATCHER_LOG=ON` turns logging on,
//! `ONEVPL_DISPATCHER_LOG_FILE` redirects it from stderr to a file.
//!
//! Embedding applications that install their own subscriber are left
//! alone; initialization is attempted once and silently yields if a global
//! subscriber already exists.

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;
use std::sync::Arc;

use tracing::info;

/// Environment variable that enables the dispatcher log.
pub const ENV_LOG: &str = "ONEVPL_DISPATCHER_LOG";

/// Environment variable naming the log destination file.
pub const ENV_LOG_FILE: &str = "ONEVPL_DISPATCHER_LOG_FILE";

#[derive(Debug, PartialEq, Eq)]
enum LogDest {
    Stderr,
    File(PathBuf),
}

fn log_destination() -> Option<LogDest> {
    let enabled = env::var(ENV_LOG).ok()?;
    if enabled.len() >= crate::paths::ENV_VAR_MAX_LEN || enabled != "ON" {
        return None;
    }

    match env::var(ENV_LOG_FILE) {
        Ok(file) if !file.is_empty() && file.len() < crate::paths::ENV_VAR_MAX_LEN => {
            Some(LogDest::File(PathBuf::from(file)))
        }
        _ => Some(LogDest::Stderr),
    }
}

/// Install the dispatcher log subscriber if the environment requests it.
/// Safe to call from every loader construction; only the first call does
/// work.
pub fn init_dispatcher_log() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let Some(dest) = log_destination() else {
            return;
        };

        let installed = match &dest {
            LogDest::Stderr => tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .try_init()
                .is_ok(),
            LogDest::File(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path);
                match file {
                    Ok(file) => tracing_subscriber::fmt()
                        .with_max_level(tracing::Level::DEBUG)
                        .with_writer(Arc::new(file))
                        .with_ansi(false)
                        .try_init()
                        .is_ok(),
                    Err(e) => {
                        eprintln!("dispatcher log: cannot open {}: {e}", path.display());
                        false
                    }
                }
            }
        };

        if installed {
            info!("dispatcher log enabled ({dest:?})");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_disabled_without_env() {
        env::remove_var(ENV_LOG);
        assert_eq!(log_destination(), None);
    }

    #[test]
    #[serial]
    fn test_requires_exact_on_value() {
        env::set_var(ENV_LOG, "on");
        assert_eq!(log_destination(), None);
        env::set_var(ENV_LOG, "ON");
        env::remove_var(ENV_LOG_FILE);
        assert_eq!(log_destination(), Some(LogDest::Stderr));
        env::remove_var(ENV_LOG);
    }

    #[test]
    #[serial]
    fn test_log_file_destination() {
        env::set_var(ENV_LOG, "ON");
        env::set_var(ENV_LOG_FILE, "/tmp/vpl-dispatch.log");
        assert_eq!(
            log_destination(),
            Some(LogDest::File(PathBuf::from("/tmp/vpl-dispatch.log")))
        );
        env::remove_var(ENV_LOG);
        env::remove_var(ENV_LOG_FILE);
    }
}
