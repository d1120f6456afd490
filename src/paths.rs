//! Fixed dotfile layout per the specification: everything lives under
//! `${HOME}/.gitctx/` (user scope) or `${repo}/.gitctx/` (repo scope). No
//! XDG/per-OS split is needed since the layout is normative, not
//! platform-conventional.
use std::path::{Path, PathBuf};

/// `${HOME}/.gitctx`.
pub fn gitctx_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gitctx")
}

/// `${HOME}/.gitctx/config.yml`.
pub fn user_config_path() -> PathBuf {
    gitctx_home().join("config.yml")
}

/// `${HOME}/.gitctx/.{command}_run`.
pub fn first_run_marker_path(command: &str) -> PathBuf {
    gitctx_home().join(format!(".{command}_run"))
}

/// `${repo}/.gitctx`.
pub fn repo_gitctx_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(".gitctx")
}

/// `${repo}/.gitctx/config.yml`.
pub fn repo_config_path(repo_root: &Path) -> PathBuf {
    repo_gitctx_dir(repo_root).join("config.yml")
}

/// `${repo}/.gitctx/db`.
pub fn repo_db_path(repo_root: &Path) -> PathBuf {
    repo_gitctx_dir(repo_root).join("db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_paths_nest_under_gitctx_dir() {
        let root = Path::new("/tmp/some-repo");
        assert_eq!(
            repo_config_path(root),
            PathBuf::from("/tmp/some-repo/.gitctx/config.yml")
        );
        assert_eq!(
            repo_db_path(root),
            PathBuf::from("/tmp/some-repo/.gitctx/db")
        );
    }

    #[test]
    fn first_run_marker_is_per_command() {
        let index_marker = first_run_marker_path("index");
        let search_marker = first_run_marker_path("search");
        assert_ne!(index_marker, search_marker);
        assert!(index_marker.to_string_lossy().ends_with(".index_run"));
    }
}
