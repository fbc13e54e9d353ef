use anyhow::{Result, anyhow, bail};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub identity: Identity,
    pub store: Store,
    pub http: Http,
    pub log: Log,
}

#[derive(Deserialize)]
pub struct Auth {
    pub signing_key: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
}

// The signing key must never end up in logs.
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("signing_key", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Identity {
    pub backend: String, // "fake" or "firebase"
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory", "mysql" or "redis"
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default = "default_store_prefix")]
    pub prefix: String,
    pub timeout_ms: u64,
}

fn default_store_prefix() -> String {
    "refresh".to_string()
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub secure_cookie: bool,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Http {
    pub fn tls(&self) -> Option<(&str, &str)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }

    /// Cookies served over TLS are always marked `Secure`.
    pub fn cookie_secure(&self) -> bool {
        self.secure_cookie || self.tls().is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

pub const MIN_SIGNING_KEY_LEN: usize = 32;

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.auth.signing_key.len() < MIN_SIGNING_KEY_LEN {
            bail!("auth.signing_key must be at least {} bytes", MIN_SIGNING_KEY_LEN);
        }
        if self.auth.access_ttl_secs == 0 || self.auth.refresh_ttl_secs == 0 {
            bail!("auth TTLs must be non-zero");
        }
        if self.identity.timeout_ms == 0 || self.store.timeout_ms == 0 {
            bail!("dependency timeouts must be non-zero");
        }
        match self.identity.backend.as_str() {
            "fake" => {}
            "firebase" if self.identity.project_id.is_some() => {}
            "firebase" => bail!("identity.project_id is required for the firebase backend"),
            other => bail!("unknown identity backend: {}", other),
        }
        match self.store.backend.as_str() {
            "memory" => {}
            "mysql" | "redis" if self.store.dsn.is_some() => {}
            "mysql" | "redis" => bail!("store.dsn is required for the {} backend", self.store.backend),
            other => bail!("unknown store backend: {}", other),
        }
        if self.http.cert_path.is_some() != self.http.key_path.is_some() {
            bail!("http.cert_path and http.key_path must be set together");
        }
        Ok(())
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub const ENV_PREFIX: &str = "TURNSTILE";

/// `TURNSTILE_AUTH__SIGNING_KEY` overrides `auth.signing_key`.
fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    load_settings(path.unwrap_or(SETTINGS_PATH), env_source())
}

fn load_settings(path: &str, env: Environment) -> Result<Settings> {
    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(env)
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const DEV: &str = r#"
[auth]
signing_key = "0123456789abcdef0123456789abcdef"
access_ttl_secs = 900
refresh_ttl_secs = 604800

[identity]
backend = "fake"
timeout_ms = 3000

[store]
backend = "memory"
timeout_ms = 2000

[http]
address = "127.0.0.1:8080"

[log]
filter = "info"
"#;

    fn load(toml: &str) -> Result<Settings> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    #[test]
    fn loads_minimal_dev_settings() {
        let settings = load(DEV).unwrap();
        assert_eq!(settings.auth.refresh_ttl_secs, 604800);
        assert_eq!(settings.store.prefix, "refresh");
        assert_eq!(settings.log.format, LogFormat::Pretty);
        assert!(!settings.http.cookie_secure());
    }

    #[test]
    fn rejects_short_signing_key() {
        let toml = DEV.replace("0123456789abcdef0123456789abcdef", "short");
        assert!(load(&toml).is_err());
    }

    #[test]
    fn rejects_remote_store_without_dsn() {
        let toml = DEV.replace(r#"backend = "memory""#, r#"backend = "mysql""#);
        assert!(load(&toml).is_err());
    }

    #[test]
    fn tls_forces_secure_cookie() {
        let toml = DEV.replace(
            r#"address = "127.0.0.1:8080""#,
            "address = \"0.0.0.0:8443\"\ncert_path = \"cert.pem\"\nkey_path = \"key.pem\"",
        );
        assert!(load(&toml).unwrap().http.cookie_secure());
    }

    #[test]
    fn env_supplies_release_signing_key() {
        let env = config::Map::from([(
            "TURNSTILE_AUTH__SIGNING_KEY".to_string(),
            "k".repeat(34),
        )]);
        let settings =
            load_settings("settings/release.toml", env_source().source(Some(env))).unwrap();
        assert_eq!(settings.auth.signing_key.len(), 34);
        assert_eq!(settings.store.backend, "mysql");
    }

    #[test]
    fn release_settings_need_a_signing_key() {
        let env = config::Map::new();
        assert!(load_settings("settings/release.toml", env_source().source(Some(env))).is_err());
    }

    #[test]
    fn debug_output_redacts_signing_key() {
        let settings = load(DEV).unwrap();
        let printed = format!("{:?}", settings);
        assert!(!printed.contains("0123456789abcdef"));
    }
}
