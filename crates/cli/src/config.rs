//! Configuration file loading and environment variable handling.
//!
//! Precedence: CLI args > Environment vars > Config file > Defaults

use fmtbridge_core::LayoutConfig;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Default config file content for `--config-init`.
pub const DEFAULT_CONFIG: &str = r#"# fmtb configuration
# See: fmtb --help for all options

# Spaces per indentation level
indent_width = 2

# Longest run of blank lines kept
max_blank_lines = 1

# File extensions picked up when walking directories
extensions = ["rb"]

# Disable colored output
no_color = false

# Shared library providing the engine (empty = built-in engine)
# engine = "/usr/local/lib/libextfmt.so"
# engine_prefix = "extfmt"
"#;

/// Configuration loaded from file and environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub indent_width: Option<usize>,
    pub max_blank_lines: Option<usize>,
    pub extensions: Option<Vec<String>>,
    pub no_color: Option<bool>,
    pub engine: Option<PathBuf>,
    pub engine_prefix: Option<String>,
}

impl Config {
    /// Get the config file path.
    ///
    /// - Linux/macOS: `~/.config/fmtb/config.toml`
    /// - Windows: `%APPDATA%\fmtb\config.toml`
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("fmtb").join("config.toml"))
    }

    /// Load config from file. Returns default if file doesn't exist.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };

        let Ok(contents) = fs::read_to_string(&path) else {
            return Self::default();
        };

        toml::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
            Self::default()
        })
    }

    fn env_var<T: std::str::FromStr>(name: &str) -> Option<T> {
        std::env::var(name).ok()?.parse().ok()
    }

    /// Get indent_width with precedence: env > config > default.
    pub fn indent_width(&self) -> usize {
        Self::env_var("FMTB_INDENT_WIDTH")
            .or(self.indent_width)
            .unwrap_or(LayoutConfig::default().indent_width)
    }

    /// Get max_blank_lines with precedence: env > config > default.
    pub fn max_blank_lines(&self) -> usize {
        Self::env_var("FMTB_MAX_BLANK_LINES")
            .or(self.max_blank_lines)
            .unwrap_or(LayoutConfig::default().max_blank_lines)
    }

    pub fn layout(&self) -> LayoutConfig {
        LayoutConfig {
            indent_width: self.indent_width(),
            max_blank_lines: self.max_blank_lines(),
        }
    }

    /// Get extensions with precedence: env (comma separated) > config > default.
    pub fn extensions(&self) -> Vec<String> {
        if let Ok(list) = std::env::var("FMTB_EXTENSIONS") {
            return parse_extensions(&list);
        }
        self.extensions
            .clone()
            .unwrap_or_else(|| vec!["rb".to_string()])
    }

    /// Get the engine library with precedence: env > config. `None` is the
    /// built-in engine.
    pub fn engine(&self) -> Option<PathBuf> {
        std::env::var_os("FMTB_ENGINE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.engine.clone())
    }

    /// Get the engine symbol prefix with precedence: env > config.
    pub fn engine_prefix(&self) -> Option<String> {
        Self::env_var::<String>("FMTB_ENGINE_PREFIX")
            .filter(|v| !v.is_empty())
            .or_else(|| self.engine_prefix.clone())
    }

    /// Get no_color with precedence: env > config > default.
    ///
    /// Respects the `NO_COLOR` standard (https://no-color.org/).
    pub fn no_color(&self) -> bool {
        // NO_COLOR is a standard - presence means disable color
        if std::env::var("NO_COLOR").is_ok() {
            return true;
        }
        if std::env::var("FMTB_NO_COLOR").is_ok() {
            return true;
        }
        self.no_color.unwrap_or(false)
    }
}

fn parse_extensions(list: &str) -> Vec<String> {
    list.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Create a default config file at the standard location.
pub fn init_config() -> Result<PathBuf, String> {
    let path = Config::path().ok_or("Cannot determine config directory")?;

    if path.exists() {
        return Err(format!("Config file already exists: {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create directory: {}", e))?;
    }

    fs::write(&path, DEFAULT_CONFIG).map_err(|e| format!("Failed to write config: {}", e))?;

    Ok(path)
}
