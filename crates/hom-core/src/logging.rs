//! File logging bootstrap for the host app.
//!
//! The app calls [`init_logging`] once at startup with a directory it
//! owns; log files rotate by size so the sandbox never fills up.
//! Initialization is idempotent for the same configuration and never
//! panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::PathBuf;

const LOG_BASENAME: &str = "hom-core";
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;
const KEEP_LOG_FILES: usize = 3;

static LOGGER: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    level: String,
    dir: PathBuf,
    _handle: LoggerHandle,
}

/// Start file logging.
///
/// Repeat calls with the same level and directory succeed; a call with a
/// different configuration is rejected, since the backend cannot be
/// reconfigured once running.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let level = normalize_level(level)?;
    let dir = PathBuf::from(log_dir.trim());
    if dir.as_os_str().is_empty() {
        return Err("log directory cannot be empty".to_string());
    }

    let state = LOGGER.get_or_try_init(|| -> Result<LoggingState, String> {
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("cannot create log directory `{}`: {e}", dir.display()))?;

        let handle = Logger::try_with_str(level)
            .map_err(|e| format!("invalid log level `{level}`: {e}"))?
            .log_to_file(
                FileSpec::default()
                    .directory(dir.as_path())
                    .basename(LOG_BASENAME),
            )
            .rotate(
                Criterion::Size(MAX_LOG_BYTES),
                Naming::Numbers,
                Cleanup::KeepLogFiles(KEEP_LOG_FILES),
            )
            .write_mode(WriteMode::BufferAndFlush)
            .append()
            .format_for_files(flexi_logger::detailed_format)
            .start()
            .map_err(|e| format!("cannot start logger: {e}"))?;

        install_panic_hook();

        info!(
            "logging started (level {level}, version {})",
            env!("CARGO_PKG_VERSION")
        );
        Ok(LoggingState {
            level: level.to_string(),
            dir: dir.clone(),
            _handle: handle,
        })
    })?;

    if state.dir != dir || state.level != level {
        return Err(format!(
            "logging already initialized at `{}` with level {}",
            state.dir.display(),
            state.level
        ));
    }
    Ok(())
}

/// Default level for the current build mode.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

// Panics on FFI threads otherwise disappear into an abort; get them on
// disk first.
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!("panic at {location}: {panic_info}");
        previous(panic_info);
    }));
}
