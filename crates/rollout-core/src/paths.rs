use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "rollout.yaml";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Expand a leading `~/` against the current user's home directory.
/// Paths without the prefix, or when no home directory is known, pass through.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
