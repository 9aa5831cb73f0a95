//! `~/.rushrc` loader: simple `key=value` lines, `#` comments, with
//! `alias.NAME=` and `env.NAME=` prefixes for tables.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub prompt: String,
    pub history_file: String,
    pub history_max: usize,
    pub aliases: HashMap<String, String>,
    pub env_vars: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prompt: "rush$ ".to_string(),
            history_file: "~/.rush_history".to_string(),
            history_max: 500,
            aliases: HashMap::new(),
            env_vars: HashMap::new(),
        }
    }
}

impl Config {
    /// History file path with a leading `~` resolved against `$HOME`.
    pub fn history_path(&self) -> String {
        match (self.history_file.strip_prefix("~/"), std::env::var("HOME")) {
            (Some(rest), Ok(home)) => format!("{home}/{rest}"),
            _ => self.history_file.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the rc file; a missing file silently yields the defaults.
    pub fn load_default() -> Result<Config, ConfigError> {
        let Ok(home) = std::env::var("HOME") else {
            return Ok(Config::default());
        };
        let path = format!("{home}/.rushrc");
        if !std::path::Path::new(&path).exists() {
            return Ok(Config::default());
        }
        Self::load_from_file(&path)
    }

    pub fn load_from_file(path: &str) -> Result<Config, ConfigError> {
        let file = File::open(path)?;
        let mut src = String::new();
        for line in BufReader::new(file).lines() {
            src.push_str(&line?);
            src.push('\n');
        }
        Self::load_from_str(&src)
    }

    pub fn load_from_str(src: &str) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        for (lineno, raw) in src.lines().enumerate() {
            // Only leading whitespace is insignificant: a prompt may well
            // end in a space.
            let line = raw.trim_start();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Parse {
                    line: lineno + 1,
                    message: format!("no '=' found: {line}"),
                });
            };
            let key = key.trim();

            match key {
                "prompt" => config.prompt = value.to_string(),
                "history_file" => config.history_file = value.to_string(),
                "history_max" => {
                    config.history_max = value.trim().parse().map_err(|_| ConfigError::Parse {
                        line: lineno + 1,
                        message: format!("invalid number: {value}"),
                    })?;
                }
                k if k.starts_with("alias.") => {
                    let name = k.trim_start_matches("alias.").to_string();
                    config.aliases.insert(name, value.to_string());
                }
                k if k.starts_with("env.") => {
                    let name = k.trim_start_matches("env.").to_string();
                    config.env_vars.insert(name, value.to_string());
                }
                _ => {
                    return Err(ConfigError::Parse {
                        line: lineno + 1,
                        message: format!("unknown key: {key}"),
                    });
                }
            }
        }
        Ok(config)
    }
}
