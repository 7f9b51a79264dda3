use std::path::PathBuf;

/// Returns the default config file path.
/// Search order:
/// 1. `$XDG_CONFIG_HOME/bcn-layer/bcn_layer.toml` (Linux/macOS) or
///    `%APPDATA%\bcn-layer\bcn_layer.toml` (Windows)
/// 2. System-wide: `/etc/bcn-layer/bcn_layer.toml` or
///    `%PROGRAMDATA%\bcn-layer\bcn_layer.toml`
///
/// The first existing file wins; when none exists the user path is returned
/// so callers can report where a config would be read from.
pub fn default_config_path() -> PathBuf {
    let user = user_config_dir().join("bcn-layer").join("bcn_layer.toml");
    if user.exists() {
        return user;
    }
    let system = system_config_dir().join("bcn-layer").join("bcn_layer.toml");
    if system.exists() {
        return system;
    }
    user
}

/// Returns the default directory searched for decode kernel blobs.
pub fn default_shader_dir() -> PathBuf {
    #[cfg(windows)]
    {
        let programdata = std::env::var("PROGRAMDATA")
            .unwrap_or_else(|_| r"C:\ProgramData".to_string());
        PathBuf::from(programdata).join("bcn-layer").join("shaders")
    }
    #[cfg(not(windows))]
    {
        PathBuf::from("/usr/share/bcn-layer/shaders")
    }
}

fn user_config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        PathBuf::from(std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string()))
    }
    #[cfg(not(windows))]
    {
        match std::env::var("XDG_CONFIG_HOME") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".config")
            }
        }
    }
}

fn system_config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        let programdata = std::env::var("PROGRAMDATA")
            .unwrap_or_else(|_| r"C:\ProgramData".to_string());
        PathBuf::from(programdata)
    }
    #[cfg(not(windows))]
    {
        PathBuf::from("/etc")
    }
}
