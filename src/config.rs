//! Runtime settings.
//!
//! Each setting is resolved from, highest priority first: a command-line
//! flag, an environment variable, a value stored with `medrag config set`,
//! and finally a built-in default.

use std::{fmt, str::FromStr, time::Duration};

use serde::Serialize;

use crate::{
    config_db::ConfigDb,
    data_dir::DataDir,
    error::{Error, Result},
    generation::{API_KEY_ENV_VAR, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL},
    model_manager::DEFAULT_MODEL_ID,
};

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

/// A persistable setting: stored key, environment variable, description.
pub struct SettingKey {
    pub key: &'static str,
    pub env: &'static str,
    pub description: &'static str,
}

/// Every key accepted by `medrag config set`.
pub const SETTING_KEYS: &[SettingKey] = &[
    SettingKey {
        key: "embedder",
        env: "MEDRAG_EMBEDDER",
        description: "embedding provider: colbert or hashing",
    },
    SettingKey {
        key: "model_name",
        env: "MEDRAG_MODEL",
        description: "ColBERT model id or local path",
    },
    SettingKey {
        key: "qdrant_url",
        env: "MEDRAG_QDRANT_URL",
        description: "Qdrant gRPC URL; unset uses the local store",
    },
    SettingKey {
        key: "llm_model",
        env: "MEDRAG_LLM_MODEL",
        description: "language model used for answers",
    },
    SettingKey {
        key: "llm_base_url",
        env: "OPENAI_BASE_URL",
        description: "base URL of the Responses API",
    },
    SettingKey {
        key: "http_timeout_secs",
        env: "MEDRAG_HTTP_TIMEOUT",
        description: "timeout for Qdrant and model API requests",
    },
];

fn setting_key(key: &str) -> Result<&'static SettingKey> {
    SETTING_KEYS.iter().find(|k| k.key == key).ok_or_else(|| {
        Error::NotFound {
            kind: "setting",
            name: key.to_string(),
        }
    })
}

/// Reject unknown keys and values that would fail at startup.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    setting_key(key)?;
    match key {
        "embedder" => value.parse::<EmbedderKind>().map(|_| ()),
        "http_timeout_secs" => parse_timeout(value).map(|_| ()),
        _ if value.trim().is_empty() => {
            Err(Error::Config(format!("{key} must not be empty")))
        }
        _ => Ok(()),
    }
}

fn parse_timeout(value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::Config(format!(
            "http_timeout_secs must be a positive integer, got '{value}'"
        ))),
    }
}

/// Which embedding provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// ColBERT token embeddings, mean-pooled.
    Colbert,
    /// Model-free feature hashing.
    Hashing,
}

impl FromStr for EmbedderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "colbert" => Ok(Self::Colbert),
            "hashing" => Ok(Self::Hashing),
            other => Err(Error::Config(format!(
                "unknown embedder '{other}' (expected colbert or hashing)"
            ))),
        }
    }
}

impl fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Colbert => "colbert",
            Self::Hashing => "hashing",
        })
    }
}

/// Values given on the command line. `None` falls through to the next
/// source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub embedder: Option<String>,
    pub model_name: Option<String>,
    pub qdrant_url: Option<String>,
    pub llm_model: Option<String>,
}

/// Fully resolved settings for opening a [`Pipeline`](crate::Pipeline).
#[derive(Clone, Serialize)]
pub struct Settings {
    #[serde(skip)]
    pub data_dir: DataDir,
    pub embedder: EmbedderKind,
    pub model_name: String,
    pub qdrant_url: Option<String>,
    pub llm_model: String,
    pub llm_base_url: String,
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(serialize_with = "serialize_secs")]
    pub http_timeout: Duration,
}

fn serialize_secs<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn resolve(
        data_dir: DataDir,
        config_db: &ConfigDb,
        overrides: &Overrides,
    ) -> Result<Self> {
        Self::resolve_with(data_dir, config_db, overrides, |name| {
            std::env::var(name).ok()
        })
    }

    /// Resolve settings with `env` standing in for the process environment.
    pub fn resolve_with(
        data_dir: DataDir,
        config_db: &ConfigDb,
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let lookup = |flag: &Option<String>, key: &str| -> Result<Option<String>> {
            if let Some(value) = flag {
                return Ok(Some(value.clone()));
            }
            let setting = setting_key(key)?;
            if let Some(value) = env(setting.env).filter(|v| !v.is_empty()) {
                return Ok(Some(value));
            }
            config_db.get_setting(key)
        };

        let embedder = lookup(&overrides.embedder, "embedder")?
            .map(|v| v.parse::<EmbedderKind>())
            .transpose()?
            .unwrap_or(EmbedderKind::Colbert);
        let model_name = lookup(&overrides.model_name, "model_name")?
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());
        let qdrant_url = lookup(&overrides.qdrant_url, "qdrant_url")?;
        let llm_model = lookup(&overrides.llm_model, "llm_model")?
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());
        let llm_base_url = lookup(&None, "llm_base_url")?
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
        let http_timeout = lookup(&None, "http_timeout_secs")?
            .map(|v| parse_timeout(&v))
            .transpose()?
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        let api_key = env(API_KEY_ENV_VAR).filter(|k| !k.is_empty());

        Ok(Self {
            data_dir,
            embedder,
            model_name,
            qdrant_url,
            llm_model,
            llm_base_url,
            api_key,
            http_timeout,
        })
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("data_dir", &self.data_dir.root())
            .field("embedder", &self.embedder)
            .field("model_name", &self.model_name)
            .field("qdrant_url", &self.qdrant_url)
            .field("llm_model", &self.llm_model)
            .field("llm_base_url", &self.llm_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn fixture() -> (tempfile::TempDir, DataDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let config_db = ConfigDb::open(&data_dir.config_db()).unwrap();
        (tmp, data_dir, config_db)
    }

    fn env_from(
        pairs: &[(&str, &str)],
    ) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let (_tmp, data_dir, db) = fixture();
        let settings =
            Settings::resolve_with(data_dir, &db, &Overrides::default(), env_from(&[]))
                .unwrap();

        assert_eq!(settings.embedder, EmbedderKind::Colbert);
        assert_eq!(settings.model_name, DEFAULT_MODEL_ID);
        assert_eq!(settings.qdrant_url, None);
        assert_eq!(settings.llm_model, "gpt-4o");
        assert_eq!(settings.llm_base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(settings.api_key, None);
        assert_eq!(settings.http_timeout, Duration::from_secs(120));
    }

    #[test]
    fn flag_beats_env_beats_stored() {
        let (_tmp, data_dir, db) = fixture();
        db.set_setting("llm_model", "gpt-4").unwrap();
        db.set_setting("embedder", "hashing").unwrap();
        db.set_setting("model_name", "stored/model").unwrap();

        let env = env_from(&[
            ("MEDRAG_LLM_MODEL", "gpt-3.5-turbo"),
            ("MEDRAG_MODEL", "env/model"),
        ]);
        let overrides = Overrides {
            model_name: Some("flag/model".to_string()),
            ..Default::default()
        };
        let settings =
            Settings::resolve_with(data_dir, &db, &overrides, env).unwrap();

        assert_eq!(settings.model_name, "flag/model");
        assert_eq!(settings.llm_model, "gpt-3.5-turbo");
        assert_eq!(settings.embedder, EmbedderKind::Hashing);
    }

    #[test]
    fn empty_env_value_falls_through() {
        let (_tmp, data_dir, db) = fixture();
        db.set_setting("qdrant_url", "http://qdrant:6334").unwrap();

        let settings = Settings::resolve_with(
            data_dir,
            &db,
            &Overrides::default(),
            env_from(&[("MEDRAG_QDRANT_URL", ""), ("OPENAI_API_KEY", "sk-1")]),
        )
        .unwrap();

        assert_eq!(settings.qdrant_url.as_deref(), Some("http://qdrant:6334"));
        assert_eq!(settings.api_key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn invalid_embedder_is_rejected() {
        let (_tmp, data_dir, db) = fixture();
        let overrides = Overrides {
            embedder: Some("word2vec".to_string()),
            ..Default::default()
        };
        let err =
            Settings::resolve_with(data_dir, &db, &overrides, env_from(&[]))
                .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_setting_checks_keys_and_values() {
        assert!(validate_setting("embedder", "HASHING").is_ok());
        assert!(validate_setting("embedder", "bert").is_err());
        assert!(validate_setting("http_timeout_secs", "30").is_ok());
        assert!(validate_setting("http_timeout_secs", "0").is_err());
        assert!(validate_setting("llm_model", " ").is_err());
        assert!(matches!(
            validate_setting("colour", "blue"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn debug_hides_api_key() {
        let (_tmp, data_dir, db) = fixture();
        let settings = Settings::resolve_with(
            data_dir,
            &db,
            &Overrides::default(),
            env_from(&[("OPENAI_API_KEY", "sk-very-secret")]),
        )
        .unwrap();
        assert!(!format!("{settings:?}").contains("sk-very-secret"));
    }
}
