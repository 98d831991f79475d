use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = "data/sessions";
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Runtime settings taken from the environment and command line
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Reads `MEZZO_DATA_DIR` and `MEZZO_BIND`; unset values keep their defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("MEZZO_DATA_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            bind: lookup("MEZZO_BIND")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.bind),
            port: defaults.port,
        }
    }

    /// Port from a positional argument, falling back to the default
    pub fn with_port_arg(mut self, arg: Option<&String>) -> Self {
        if let Some(port) = arg.and_then(|p| p.parse::<u16>().ok()) {
            self.port = port;
        }
        self
    }
}
