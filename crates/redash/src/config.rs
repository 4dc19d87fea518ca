use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RedashError, Result};

/// Default per-request timeout, matching the service's typical gateway limit.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Upper bound for the whole poll loop of one job.
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 300;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
/// Floor for the delay between two job-status checks.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Env helpers ──────────────────────────────────────────────────

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.as_str(), "true" | "1"),
        None => default,
    }
}

fn active_profile() -> String {
    env_opt("REDASH_PROFILE")
        .map(|s| s.to_uppercase())
        .unwrap_or_default()
}

// ── Credential ───────────────────────────────────────────────────

/// On-disk credential file:
///
/// ```json
/// { "endpoint": "https://redash.example.com", "apikey": "YOUR_API_KEY" }
/// ```
#[derive(Debug, Default, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    apikey: Option<String>,
}

const MISSING_CREDENTIAL: &str = "missing the Redash API key or endpoint; supply a credentials file or both `apikey` and `endpoint`";

/// Endpoint + API key pair used to authenticate every request.
///
/// Both fields are guaranteed non-empty and the endpoint is a valid
/// http(s) URL without a trailing slash.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    endpoint: String,
    api_key: String,
}

impl Credential {
    /// Build a credential from explicit values.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::validated(Some(endpoint.into()), Some(api_key.into()))
    }

    /// Load a credential from a JSON file with `endpoint` and `apikey` keys.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::resolve(Some(path.as_ref()), None, None)
    }

    /// Merge a credential file with explicit values.
    ///
    /// Non-empty explicit values override whatever the file provides.
    /// Fails unless both fields are non-empty after merging.
    pub fn resolve(
        file: Option<&Path>,
        api_key: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        let from_file = match file {
            Some(path) => read_credential_file(path)?,
            None => CredentialFile::default(),
        };

        let endpoint = endpoint
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or(from_file.endpoint);
        let api_key = api_key
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or(from_file.apikey);

        Self::validated(endpoint, api_key)
    }

    /// Build from environment variables.
    ///
    /// Reads `REDASH_PROFILE` to determine the profile prefix. For each key,
    /// `{PROFILE}_REDASH_*` is tried before `REDASH_*`. `REDASH_CREDENTIALS`
    /// may point at a credential file; `REDASH_ENDPOINT` and `REDASH_API_KEY`
    /// override its contents.
    pub fn from_env() -> Result<Self> {
        Self::from_env_profiled(&active_profile())
    }

    /// Build from environment variables for a specific named profile.
    pub fn from_env_profiled(profile: &str) -> Result<Self> {
        let file = profiled_env_opt(profile, "REDASH_CREDENTIALS");
        let api_key = profiled_env_opt(profile, "REDASH_API_KEY");
        let endpoint = profiled_env_opt(profile, "REDASH_ENDPOINT");
        Self::resolve(
            file.as_deref().map(Path::new),
            api_key.as_deref(),
            endpoint.as_deref(),
        )
    }

    fn validated(endpoint: Option<String>, api_key: Option<String>) -> Result<Self> {
        let endpoint = endpoint.map(|e| e.trim().trim_end_matches('/').to_string());
        let api_key = api_key.map(|k| k.trim().to_string());

        let (endpoint, api_key) = match (endpoint, api_key) {
            (Some(e), Some(k)) if !e.is_empty() && !k.is_empty() => (e, k),
            _ => return Err(RedashError::Configuration(MISSING_CREDENTIAL.into())),
        };

        let parsed = url::Url::parse(&endpoint).map_err(|e| {
            RedashError::Configuration(format!("invalid endpoint `{endpoint}`: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RedashError::Configuration(format!(
                "endpoint `{endpoint}` must use http or https"
            )));
        }

        Ok(Self { endpoint, api_key })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

fn read_credential_file(path: &Path) -> Result<CredentialFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RedashError::Configuration(format!(
            "cannot read credentials file {}: {e}",
            path.display()
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        RedashError::Configuration(format!(
            "malformed credentials file {}: {e}",
            path.display()
        ))
    })
}

// ── ClientConfig ─────────────────────────────────────────────────

/// What to do when the result fetch answers 502 Bad Gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BadGatewayPolicy {
    /// Treat it as transient and return an empty frame.
    #[default]
    EmptyFrame,
    /// Surface it as a request error.
    Error,
}

/// Timeouts and behaviour knobs for [`crate::RedashClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TCP connect timeout for each HTTP request.
    pub connect_timeout: Duration,
    /// Total timeout for each HTTP request (connect + response).
    pub request_timeout: Duration,
    /// Upper bound on waiting for a job to reach a terminal state.
    pub job_timeout: Duration,
    /// Delay between two job-status checks. Values below
    /// [`MIN_POLL_INTERVAL`] are raised to it.
    pub poll_interval: Duration,
    /// Print a dot to stderr on every poll tick.
    pub progress: bool,
    pub bad_gateway: BadGatewayPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            progress: false,
            bad_gateway: BadGatewayPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Poll delay actually used, never below [`MIN_POLL_INTERVAL`].
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }

    /// Build config from environment variables, honouring `REDASH_PROFILE`.
    pub fn from_env() -> Self {
        Self::from_env_profiled(&active_profile())
    }

    /// Build config for a specific named profile. Unparseable values fall
    /// back to the defaults.
    pub fn from_env_profiled(profile: &str) -> Self {
        let bad_gateway = match profiled_env_opt(profile, "REDASH_BAD_GATEWAY").as_deref() {
            Some("error") => BadGatewayPolicy::Error,
            _ => BadGatewayPolicy::EmptyFrame,
        };

        Self {
            connect_timeout: Duration::from_secs(profiled_env_u64(
                profile,
                "REDASH_CONNECT_TIMEOUT_SECONDS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
            request_timeout: Duration::from_secs(profiled_env_u64(
                profile,
                "REDASH_REQUEST_TIMEOUT_SECONDS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            job_timeout: Duration::from_secs(profiled_env_u64(
                profile,
                "REDASH_JOB_TIMEOUT_SECONDS",
                DEFAULT_JOB_TIMEOUT_SECS,
            )),
            poll_interval: Duration::from_millis(profiled_env_u64(
                profile,
                "REDASH_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            ))
            .max(MIN_POLL_INTERVAL),
            progress: profiled_env_bool(profile, "REDASH_PROGRESS", false),
            bad_gateway,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Env-based tests must run serially to avoid interfering with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_redash_env() {
        let keys = [
            "REDASH_PROFILE",
            "REDASH_ENDPOINT",
            "REDASH_API_KEY",
            "REDASH_CREDENTIALS",
            "REDASH_JOB_TIMEOUT_SECONDS",
            "REDASH_REQUEST_TIMEOUT_SECONDS",
            "REDASH_CONNECT_TIMEOUT_SECONDS",
            "REDASH_POLL_INTERVAL_MS",
            "REDASH_PROGRESS",
            "REDASH_BAD_GATEWAY",
            "TEST_REDASH_ENDPOINT",
            "TEST_REDASH_API_KEY",
            "TEST_REDASH_JOB_TIMEOUT_SECONDS",
        ];
        for k in keys {
            env::remove_var(k);
        }
    }

    fn credential_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn explicit_values() {
        let cred = Credential::new("https://redash.example.com/", "secret").unwrap();
        assert_eq!(cred.endpoint(), "https://redash.example.com");
        assert_eq!(cred.api_key(), "secret");
    }

    #[test]
    fn empty_fields_are_rejected() {
        assert!(matches!(
            Credential::new("", "secret"),
            Err(RedashError::Configuration(_))
        ));
        assert!(matches!(
            Credential::new("https://redash.example.com", "  "),
            Err(RedashError::Configuration(_))
        ));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(matches!(
            Credential::new("redash.example.com", "secret"),
            Err(RedashError::Configuration(_))
        ));
        assert!(matches!(
            Credential::new("ftp://redash.example.com", "secret"),
            Err(RedashError::Configuration(_))
        ));
    }

    #[test]
    fn file_values_are_loaded() {
        let file = credential_file(r#"{"endpoint": "https://a.example.com", "apikey": "k1"}"#);
        let cred = Credential::from_file(file.path()).unwrap();
        assert_eq!(cred.endpoint(), "https://a.example.com");
        assert_eq!(cred.api_key(), "k1");
    }

    #[test]
    fn explicit_values_override_file() {
        let file = credential_file(r#"{"endpoint": "https://a.example.com", "apikey": "k1"}"#);
        let cred = Credential::resolve(Some(file.path()), Some("k2"), None).unwrap();
        assert_eq!(cred.endpoint(), "https://a.example.com");
        assert_eq!(cred.api_key(), "k2");

        // Empty explicit values do not shadow the file.
        let cred = Credential::resolve(Some(file.path()), Some(""), Some("")).unwrap();
        assert_eq!(cred.api_key(), "k1");
    }

    #[test]
    fn file_missing_key_can_be_completed_explicitly() {
        let file = credential_file(r#"{"endpoint": "https://a.example.com"}"#);
        assert!(Credential::from_file(file.path()).is_err());
        let cred = Credential::resolve(Some(file.path()), Some("k3"), None).unwrap();
        assert_eq!(cred.api_key(), "k3");
    }

    #[test]
    fn unreadable_or_malformed_file() {
        let err = Credential::from_file("/nonexistent/redash-creds.json").unwrap_err();
        assert!(matches!(err, RedashError::Configuration(_)));

        let file = credential_file("not json");
        let err = Credential::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let cred = Credential::new("https://redash.example.com", "topsecret").unwrap();
        let dbg = format!("{cred:?}");
        assert!(!dbg.contains("topsecret"));
        assert!(dbg.contains("redacted"));
    }

    #[test]
    fn credential_from_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_redash_env();

        assert!(Credential::from_env_profiled("").is_err());

        env::set_var("REDASH_ENDPOINT", "https://env.example.com");
        env::set_var("REDASH_API_KEY", "env-key");
        let cred = Credential::from_env_profiled("").unwrap();
        assert_eq!(cred.endpoint(), "https://env.example.com");
        assert_eq!(cred.api_key(), "env-key");

        clear_redash_env();
    }

    #[test]
    fn profiled_env_takes_precedence() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_redash_env();

        env::set_var("REDASH_ENDPOINT", "https://base.example.com");
        env::set_var("REDASH_API_KEY", "base-key");
        env::set_var("TEST_REDASH_API_KEY", "test-key");

        let cred = Credential::from_env_profiled("TEST").unwrap();
        assert_eq!(cred.endpoint(), "https://base.example.com");
        assert_eq!(cred.api_key(), "test-key");

        clear_redash_env();
    }

    #[test]
    fn client_config_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_redash_env();

        let cfg = ClientConfig::from_env_profiled("");
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));
        assert_eq!(cfg.connect_timeout, Duration::from_secs(10));
        assert_eq!(cfg.job_timeout, Duration::from_secs(300));
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert!(!cfg.progress);
        assert_eq!(cfg.bad_gateway, BadGatewayPolicy::EmptyFrame);
    }

    #[test]
    fn client_config_from_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_redash_env();

        env::set_var("REDASH_JOB_TIMEOUT_SECONDS", "900");
        env::set_var("TEST_REDASH_JOB_TIMEOUT_SECONDS", "30");
        env::set_var("REDASH_POLL_INTERVAL_MS", "250");
        env::set_var("REDASH_PROGRESS", "1");
        env::set_var("REDASH_BAD_GATEWAY", "error");
        env::set_var("REDASH_REQUEST_TIMEOUT_SECONDS", "not_a_number");

        let cfg = ClientConfig::from_env_profiled("");
        assert_eq!(cfg.job_timeout, Duration::from_secs(900));
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert!(cfg.progress);
        assert_eq!(cfg.bad_gateway, BadGatewayPolicy::Error);
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));

        let cfg = ClientConfig::from_env_profiled("TEST");
        assert_eq!(cfg.job_timeout, Duration::from_secs(30));

        clear_redash_env();
    }

    #[test]
    fn zero_poll_interval_is_raised_to_floor() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_redash_env();

        env::set_var("REDASH_POLL_INTERVAL_MS", "0");
        let cfg = ClientConfig::from_env_profiled("");
        assert_eq!(cfg.poll_interval, MIN_POLL_INTERVAL);

        let cfg = ClientConfig {
            poll_interval: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert_eq!(cfg.effective_poll_interval(), MIN_POLL_INTERVAL);
        assert_eq!(
            ClientConfig::default().effective_poll_interval(),
            Duration::from_secs(1)
        );

        clear_redash_env();
    }
}
