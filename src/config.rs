//! Configuration loading from `.env` files.

use std::{env, path::PathBuf};

use anyhow::{Context, Result};

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for all storage.
    pub store_root: PathBuf,
    /// HTTP bind address, e.g. `127.0.0.1:7878`.
    pub bind_http: String,
    /// Whether the data-submission form is currently open.
    pub guoba_active: bool,
    /// Log each request to stdout.
    pub verbose: bool,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let store_root = PathBuf::from(env::var("STORE_ROOT")?);
        let bind_http = env::var("BIND_HTTP")?;
        let guoba_active = env::var("GUOBA_ACTIVE").unwrap_or_else(|_| "1".into()) == "1";
        let verbose = env::var("VERBOSE").unwrap_or_else(|_| "0".into()) == "1";
        Ok(Self {
            store_root,
            bind_http,
            guoba_active,
            verbose,
        })
    }
}

/// Serializes access to process environment variables across test modules.
#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Environment variables consumed by [`Settings::from_env`].
#[cfg(test)]
pub(crate) const ENV_VARS: [&str; 4] = ["STORE_ROOT", "BIND_HTTP", "GUOBA_ACTIVE", "VERBOSE"];

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_env() {
        let _g = ENV_MUTEX.lock().unwrap();
        for v in ENV_VARS {
            env::remove_var(v);
        }
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(
            &env_path,
            concat!(
                "STORE_ROOT=/tmp\n",
                "BIND_HTTP=127.0.0.1:8080\n",
                "GUOBA_ACTIVE=0\n",
                "VERBOSE=1\n"
            ),
        )
        .unwrap();
        let cfg = Settings::from_env(env_path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.store_root, PathBuf::from("/tmp"));
        assert_eq!(cfg.bind_http, "127.0.0.1:8080");
        assert!(!cfg.guoba_active);
        assert!(cfg.verbose);
    }

    #[test]
    fn defaults_when_optional_absent() {
        let _g = ENV_MUTEX.lock().unwrap();
        for v in ENV_VARS {
            env::remove_var(v);
        }
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(
            &env_path,
            concat!("STORE_ROOT=/tmp\n", "BIND_HTTP=127.0.0.1:8080\n"),
        )
        .unwrap();
        let cfg = Settings::from_env(env_path.to_str().unwrap()).unwrap();
        assert!(cfg.guoba_active);
        assert!(!cfg.verbose);
    }

    #[test]
    fn missing_required_fields_error() {
        let _g = ENV_MUTEX.lock().unwrap();
        for v in ENV_VARS {
            env::remove_var(v);
        }
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, "BIND_HTTP=127.0.0.1:8080\n").unwrap();
        assert!(Settings::from_env(env_path.to_str().unwrap()).is_err());
    }
}
