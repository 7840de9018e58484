//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or an explicit path) relative to the current
//! working directory, then applies `PROMPTGATE_BIND`, `PROMPTGATE_LOG_LEVEL`
//! and `PROMPTGATE_BACKEND` env overrides. When no path is given and the
//! default file does not exist, built-in defaults are used.
//!
//! The hosted-provider credential is read from `HF_TOKEN`, then
//! `AI_API_KEY`. It is never sourced from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Credential env vars, checked in order.
pub const CREDENTIAL_VARS: [&str; 2] = ["HF_TOKEN", "AI_API_KEY"];

/// Which generation backend the process should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Hosted provider when a credential is present, local pipeline otherwise.
    Auto,
    Hosted,
    Local,
}

impl BackendKind {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "hosted" => Ok(Self::Hosted),
            "local" => Ok(Self::Local),
            other => Err(AppError::Config(format!(
                "unknown backend kind '{other}' (expected auto, hosted or local)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Hosted => "hosted",
            Self::Local => "local",
        }
    }
}

/// OpenAI-compatible hosted provider configuration (`[backend.hosted]`).
#[derive(Debug, Clone)]
pub struct HostedConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model identifier passed in the request body.
    pub model: String,
    /// Per-request HTTP timeout. `None` leaves the call unbounded.
    pub timeout_seconds: Option<u64>,
}

/// Local pipeline configuration (`[backend.local]`).
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Hub repository holding the quantized weights.
    pub model: String,
    /// GGUF file inside `model`.
    pub gguf_file: String,
    /// Hub repository holding `tokenizer.json`.
    pub tokenizer_repo: String,
    /// Sampling seed.
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub hosted: HostedConfig,
    pub local: LocalConfig,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address for the HTTP listener.
    pub bind: String,
    pub log_level: String,
    pub backend: BackendConfig,
    /// Hosted credential from `HF_TOKEN` / `AI_API_KEY`.
    pub api_key: Option<String>,
}

/// Raw TOML shape: `serde` target before resolution.
#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    backend: RawBackend,
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawServer {
    fn default() -> Self {
        Self { bind: default_bind(), log_level: default_log_level() }
    }
}

#[derive(Deserialize)]
struct RawBackend {
    #[serde(default = "default_backend_kind")]
    kind: String,
    #[serde(default)]
    hosted: RawHosted,
    #[serde(default)]
    local: RawLocal,
}

impl Default for RawBackend {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            hosted: RawHosted::default(),
            local: RawLocal::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawHosted {
    #[serde(default = "default_hosted_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_hosted_model")]
    model: String,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

impl Default for RawHosted {
    fn default() -> Self {
        Self {
            api_base_url: default_hosted_api_base_url(),
            model: default_hosted_model(),
            timeout_seconds: None,
        }
    }
}

#[derive(Deserialize)]
struct RawLocal {
    #[serde(default = "default_local_model")]
    model: String,
    #[serde(default = "default_local_gguf_file")]
    gguf_file: String,
    #[serde(default = "default_local_tokenizer_repo")]
    tokenizer_repo: String,
    #[serde(default = "default_local_seed")]
    seed: u64,
}

impl Default for RawLocal {
    fn default() -> Self {
        Self {
            model: default_local_model(),
            gguf_file: default_local_gguf_file(),
            tokenizer_repo: default_local_tokenizer_repo(),
            seed: default_local_seed(),
        }
    }
}

fn default_bind() -> String { "127.0.0.1:8000".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_backend_kind() -> String { "auto".to_string() }
fn default_hosted_api_base_url() -> String {
    "https://router.huggingface.co/v1/chat/completions".to_string()
}
fn default_hosted_model() -> String { "MiniMaxAI/MiniMax-M2:novita".to_string() }
fn default_local_model() -> String { "TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF".to_string() }
fn default_local_gguf_file() -> String { "tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf".to_string() }
fn default_local_tokenizer_repo() -> String { "TinyLlama/TinyLlama-1.1B-Chat-v1.0".to_string() }
fn default_local_seed() -> u64 { 299_792_458 }

/// Env-sourced values that override or complement the TOML file.
///
/// Collected in one place so tests can pass them explicitly instead of
/// mutating process env.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub bind: Option<String>,
    pub log_level: Option<String>,
    pub backend: Option<String>,
    pub api_key: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            bind: env::var("PROMPTGATE_BIND").ok(),
            log_level: env::var("PROMPTGATE_LOG_LEVEL").ok(),
            backend: env::var("PROMPTGATE_BACKEND").ok(),
            api_key: credential_from(|name| env::var(name).ok()),
        }
    }
}

/// First non-empty credential among [`CREDENTIAL_VARS`], in order.
pub fn credential_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    CREDENTIAL_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Load config from the given path, or `config/default.toml`, then apply
/// env-var overrides.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = EnvOverrides::from_env();
    match config_path {
        Some(p) => load_from(Path::new(p), &overrides),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                load_from(&default, &overrides)
            } else {
                resolve(RawConfig::default(), &overrides)
            }
        }
    }
}

/// Internal loader: accepts an explicit path and overrides.
pub fn load_from(path: &Path, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, overrides)
}

fn resolve(parsed: RawConfig, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let kind_str = overrides.backend.as_deref().unwrap_or(&parsed.backend.kind);
    let kind = BackendKind::parse(kind_str)?;

    let hosted = parsed.backend.hosted;
    if hosted.api_base_url.trim().is_empty() {
        return Err(AppError::Config("backend.hosted.api_base_url must not be empty".into()));
    }

    Ok(Config {
        bind: overrides.bind.clone().unwrap_or(parsed.server.bind),
        log_level: overrides.log_level.clone().unwrap_or(parsed.server.log_level),
        backend: BackendConfig {
            kind,
            hosted: HostedConfig {
                api_base_url: hosted.api_base_url,
                model: hosted.model,
                timeout_seconds: hosted.timeout_seconds,
            },
            local: LocalConfig {
                model: parsed.backend.local.model,
                gguf_file: parsed.backend.local.gguf_file,
                tokenizer_repo: parsed.backend.local.tokenizer_repo,
                seed: parsed.backend.local.seed,
            },
        },
        api_key: overrides.api_key.clone(),
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: no credential, no external calls.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        resolve(RawConfig::default(), &EnvOverrides::default())
            .expect("built-in defaults must resolve")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[server]
bind = "0.0.0.0:9000"
log_level = "debug"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.bind, "0.0.0.0:9000");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.backend.kind, BackendKind::Auto);
        assert_eq!(cfg.backend.hosted.model, "MiniMaxAI/MiniMax-M2:novita");
        assert!(cfg.backend.hosted.timeout_seconds.is_none());
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let f = write_toml("");
        let cfg = load_from(f.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:8000");
        assert_eq!(
            cfg.backend.hosted.api_base_url,
            "https://router.huggingface.co/v1/chat/completions"
        );
    }

    #[test]
    fn backend_sections_parse() {
        let f = write_toml(
            r#"
[backend]
kind = "local"

[backend.hosted]
model = "org/other"
timeout_seconds = 30

[backend.local]
model = "org/weights-GGUF"
gguf_file = "w.Q4.gguf"
tokenizer_repo = "org/weights"
seed = 7
"#,
        );
        let cfg = load_from(f.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.backend.kind, BackendKind::Local);
        assert_eq!(cfg.backend.hosted.model, "org/other");
        assert_eq!(cfg.backend.hosted.timeout_seconds, Some(30));
        assert_eq!(cfg.backend.local.gguf_file, "w.Q4.gguf");
        assert_eq!(cfg.backend.local.seed, 7);
    }

    #[test]
    fn unknown_backend_kind_errors() {
        let f = write_toml("[backend]\nkind = \"magic\"\n");
        let err = load_from(f.path(), &EnvOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("unknown backend kind"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &EnvOverrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn env_overrides_win() {
        let f = write_toml(MINIMAL_TOML);
        let overrides = EnvOverrides {
            bind: Some("127.0.0.1:1".into()),
            log_level: Some("trace".into()),
            backend: Some("Hosted".into()),
            api_key: Some("hf_secret".into()),
        };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:1");
        assert_eq!(cfg.log_level, "trace");
        assert_eq!(cfg.backend.kind, BackendKind::Hosted);
        assert_eq!(cfg.api_key.as_deref(), Some("hf_secret"));
    }

    #[test]
    fn credential_prefers_hf_token() {
        let key = credential_from(|name| match name {
            "HF_TOKEN" => Some("hf".into()),
            "AI_API_KEY" => Some("ai".into()),
            _ => None,
        });
        assert_eq!(key.as_deref(), Some("hf"));
    }

    #[test]
    fn credential_skips_blank_values() {
        let key = credential_from(|name| match name {
            "HF_TOKEN" => Some("  ".into()),
            "AI_API_KEY" => Some("ai".into()),
            _ => None,
        });
        assert_eq!(key.as_deref(), Some("ai"));
        assert!(credential_from(|_| None).is_none());
    }
}
