//! Configuration resolution for the fixture server.
//!
//! Precedence is explicit overrides, then environment variables, then
//! hard defaults. The environment is read once into a snapshot and the
//! resulting [`ServerConfig`] is immutable after the server starts;
//! core logic never touches `std::env` directly.
//!
//! Environment keys:
//! - `FTP_USER` / `FTP_PASS` / `FTP_CERTFILE` -- shared by both variants
//! - `FTP_HOME` / `FTP_PORT` -- plaintext fixture
//! - `FTP_HOME_TLS` / `FTP_PORT_TLS` -- TLS fixture
//! - `FTP_FIXTURE_SCOPE` -- `function` | `module` | `session`

use std::collections::HashMap;

pub const DEFAULT_USERNAME: &str = "fakeusername";
pub const DEFAULT_PASSWORD: &str = "qweqwe";

/// Resolved, immutable server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub username: String,
    pub password: String,
    /// Caller-supplied home directory; `None` means the fixture creates
    /// (and later deletes) a temporary one.
    pub home_dir: Option<std::path::PathBuf>,
    /// Port to request from the OS, 0 meaning "any free port".
    pub requested_port: u16,
    pub use_tls: bool,
    /// Certificate file to serve with; `None` means a default certificate
    /// is generated at construction. Ignored unless `use_tls` is set.
    pub cert_path: Option<std::path::PathBuf>,
}

/// Explicit per-call overrides, taking precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub username: Option<String>,
    pub password: Option<String>,
    pub home_dir: Option<std::path::PathBuf>,
    pub port: Option<u16>,
    pub cert_path: Option<std::path::PathBuf>,
}

fn env_snapshot() -> HashMap<String, String> {
    std::env::vars().collect()
}

fn parse_port(env: &HashMap<String, String>, key: &str) -> u16 {
    match env.get(key) {
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                tracing::warn!(
                    "the value '{raw}' of the environment variable '{key}' is not a valid \
                     port number, falling back to an OS-assigned port"
                );
                0
            }
        },
        None => 0,
    }
}

impl ServerConfig {
    /// Resolves a configuration from overrides and the current process
    /// environment.
    pub fn resolve(overrides: Overrides, use_tls: bool) -> Self {
        Self::resolve_from(overrides, use_tls, &env_snapshot())
    }

    /// Same as [`ServerConfig::resolve`] but against an explicit environment
    /// snapshot.
    pub fn resolve_from(
        overrides: Overrides,
        use_tls: bool,
        env: &HashMap<String, String>,
    ) -> Self {
        let (home_key, port_key) = if use_tls {
            ("FTP_HOME_TLS", "FTP_PORT_TLS")
        } else {
            ("FTP_HOME", "FTP_PORT")
        };
        let username = overrides
            .username
            .or_else(|| env.get("FTP_USER").cloned())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        let password = overrides
            .password
            .or_else(|| env.get("FTP_PASS").cloned())
            .unwrap_or_else(|| DEFAULT_PASSWORD.to_string());
        let home_dir = overrides.home_dir.or_else(|| {
            env.get(home_key)
                .filter(|value| !value.is_empty())
                .map(std::path::PathBuf::from)
        });
        let requested_port = overrides.port.unwrap_or_else(|| parse_port(env, port_key));
        let cert_path = overrides.cert_path.or_else(|| {
            env.get("FTP_CERTFILE")
                .filter(|value| !value.is_empty())
                .map(std::path::PathBuf::from)
        });
        ServerConfig {
            username,
            password,
            home_dir,
            requested_port,
            use_tls,
            cert_path,
        }
    }
}

/// Lifetime scope consumers give their fixture (how long one server
/// instance is shared across tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixtureScope {
    Function,
    #[default]
    Module,
    Session,
}

impl std::str::FromStr for FixtureScope {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "function" => Ok(FixtureScope::Function),
            "module" => Ok(FixtureScope::Module),
            "session" => Ok(FixtureScope::Session),
            other => Err(format!("'{other}' is not a valid fixture scope")),
        }
    }
}

impl std::fmt::Display for FixtureScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FixtureScope::Function => "function",
            FixtureScope::Module => "module",
            FixtureScope::Session => "session",
        };
        write!(f, "{name}")
    }
}

impl FixtureScope {
    /// Reads `FTP_FIXTURE_SCOPE`, warning and falling back to `module` on
    /// an unknown value. Never fails.
    pub fn from_env() -> Self {
        Self::from_env_snapshot(&env_snapshot())
    }

    pub fn from_env_snapshot(env: &HashMap<String, String>) -> Self {
        match env.get("FTP_FIXTURE_SCOPE") {
            None => FixtureScope::default(),
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    "the scope '{raw}', given by the environment variable 'FTP_FIXTURE_SCOPE', \
                     is not a valid scope, using the default scope 'module'; \
                     valid scopes are 'function', 'module' and 'session'"
                );
                FixtureScope::default()
            }),
        }
    }
}
