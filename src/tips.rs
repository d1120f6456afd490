//! First-run marker mechanism.
//!
//! `index` and `search` each check [`is_first_run`] once at dispatch; the
//! CLI layer decides what, if anything, to print with that boolean. This
//! module only owns the marker file, not tip text.
use std::io;
use std::path::PathBuf;

fn marker_path(command: &str) -> PathBuf {
    crate::paths::first_run_marker_path(command)
}

/// True if `${HOME}/.gitctx/.{command}_run` does not yet exist.
pub fn is_first_run(command: &str) -> bool {
    !marker_path(command).exists()
}

/// Creates the empty marker file, creating `${HOME}/.gitctx` if needed.
pub fn mark_run(command: &str) -> io::Result<()> {
    let path = marker_path(command);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, b"")
}
