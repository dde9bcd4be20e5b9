use dirs::data_dir;
use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

pub const HOME_ENV: &str = "EVENTS_HUB_HOME";

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let root = match std::env::var_os(HOME_ENV) {
        Some(home) => PathBuf::from(home),
        None => data_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("events-hub"),
    };
    if let Err(err) = fs::create_dir_all(&root) {
        warn!(root = %root.display(), "failed to create data root: {err}");
    }
    root
});

pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

pub fn database_path() -> PathBuf {
    data_root().join("events-hub.sqlite")
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn feed_dir() -> PathBuf {
    data_root().join("feeds")
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            warn!(parent = %parent.display(), "failed to create parent: {err}");
        }
    }
}

/// File-name friendly form of a city name: "Gold Coast" -> "gold-coast".
pub fn slug(input: &str) -> String {
    input
        .split_whitespace()
        .map(|part| {
            part.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::slug;

    #[test]
    fn slugs_city_names() {
        assert_eq!(slug("Sydney"), "sydney");
        assert_eq!(slug("  Gold   Coast "), "gold-coast");
        assert_eq!(slug("St. Kilda"), "st-kilda");
    }
}
