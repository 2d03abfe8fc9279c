//! Configuration – reads/writes `~/.gatelap/config.toml`.

use gatelap_runtime::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.gatelap/config.toml`.
///
/// ```toml
/// [session]
/// checkpoint_file = "/var/lib/gatelap/checkpoints.json"
/// lidar_threshold = 0.5
///
/// [session.course]
/// max_laps = 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Recording, planning and lap parameters.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Return the path to `~/.gatelap/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".gatelap").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// The config this process runs with: the file when present, defaults
/// otherwise, then `GATELAP_*` overrides.
pub fn effective() -> Result<Config, String> {
    match load()? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `GATELAP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `GATELAP_CHECKPOINT_FILE` | `session.checkpoint_file` |
/// | `GATELAP_ROUTE_DIR` | `session.route_dir` |
/// | `GATELAP_MAX_LAPS` | `session.course.max_laps` |
/// | `GATELAP_LIDAR_THRESHOLD` | `session.lidar_threshold` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("GATELAP_CHECKPOINT_FILE") {
        cfg.session.checkpoint_file = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("GATELAP_ROUTE_DIR") {
        cfg.session.route_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("GATELAP_MAX_LAPS")
        && let Ok(laps) = v.trim().parse::<u32>()
    {
        cfg.session.course.max_laps = laps;
    }
    if let Ok(v) = std::env::var("GATELAP_LIDAR_THRESHOLD")
        && let Ok(threshold) = v.trim().parse::<f64>()
        && threshold > 0.0
    {
        cfg.session.lidar_threshold = threshold;
    }
}

/// Save the config to disk, creating `~/.gatelap/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        // Fields without an env override, so parallel override tests cannot
        // interfere.
        assert_eq!(loaded.session.min_region_distance, 2.0);
        assert_eq!(loaded.session.dedupe_radius, 1.0);
        assert_eq!(loaded.session.course.stabilization_time, 0.2);
        assert_eq!(loaded.session.planner.corner_offset, 0.2);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[session]\nedge_radius = 4.5\n\n[session.course]\nlap_pause = 0.5\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.session.edge_radius, 4.5);
        assert_eq!(cfg.session.dedupe_radius, 1.0);
        assert_eq!(cfg.session.course.lap_pause, 0.5);
        assert_eq!(cfg.session.course.stabilization_time, 0.2);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session\nlidar_threshold = ").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_gatelap_dir() {
        let p = config_path_for_home("/home/pilot");
        assert_eq!(p, PathBuf::from("/home/pilot/.gatelap/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    // Each override test touches a distinct variable so they can run in
    // parallel.

    #[test]
    fn apply_env_overrides_changes_checkpoint_file() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("GATELAP_CHECKPOINT_FILE", "/tmp/gates.json") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.session.checkpoint_file, PathBuf::from("/tmp/gates.json"));
        unsafe { std::env::remove_var("GATELAP_CHECKPOINT_FILE") };
    }

    #[test]
    fn apply_env_overrides_changes_route_dir() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("GATELAP_ROUTE_DIR", "/tmp/laps") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.session.route_dir, PathBuf::from("/tmp/laps"));
        unsafe { std::env::remove_var("GATELAP_ROUTE_DIR") };
    }

    #[test]
    fn apply_env_overrides_max_laps_ignores_garbage() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("GATELAP_MAX_LAPS", "seven") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.session.course.max_laps, 3);

        unsafe { std::env::set_var("GATELAP_MAX_LAPS", "7") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.session.course.max_laps, 7);
        unsafe { std::env::remove_var("GATELAP_MAX_LAPS") };
    }

    #[test]
    fn apply_env_overrides_rejects_non_positive_threshold() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("GATELAP_LIDAR_THRESHOLD", "-1") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.session.lidar_threshold, 0.5);

        unsafe { std::env::set_var("GATELAP_LIDAR_THRESHOLD", "0.35") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.session.lidar_threshold, 0.35);
        unsafe { std::env::remove_var("GATELAP_LIDAR_THRESHOLD") };
    }
}
