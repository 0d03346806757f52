use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::rag::ChatOptions;
use crate::util::write_atomic;

const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level ragchat configuration, loaded from `config.toml`.
///
/// Resolution order: `RAGCHAT_CONFIG_DIR` env → `--config-dir` flag → `~/.ragchat/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `config.toml` - computed, not serialized
    #[serde(skip)]
    pub config_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Session document location. Relative paths resolve against the config directory.
    /// Overridden by `RAGCHAT_SESSIONS_FILE`.
    #[serde(default = "default_sessions_file")]
    pub sessions_file: String,
    /// Model recorded on new sessions and used for generation. Overridden by `RAGCHAT_MODEL`.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Generation temperature (0.0–2.0), passed to the generator on every turn. Default: `0.1`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Conversation settings (`[chat]`).
    #[serde(default)]
    pub chat: ChatConfig,
}

fn default_sessions_file() -> String {
    "conversational_sessions.json".into()
}

fn default_model() -> String {
    "llama3.1:8b-instruct-q8_0".into()
}

fn default_temperature() -> f64 {
    0.1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::new(),
            config_path: PathBuf::new(),
            sessions_file: default_sessions_file(),
            default_model: default_model(),
            temperature: default_temperature(),
            chat: ChatConfig::default(),
        }
    }
}

/// Conversation configuration (`[chat]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Chunks requested from the retriever per question. Default: `4`.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Messages shown by `sessions show` when no limit is given. Default: `10`.
    #[serde(default = "default_history_display_limit")]
    pub history_display_limit: usize,
    /// Prior messages rendered into each prompt; `0` keeps all of them.
    #[serde(default)]
    pub max_prompt_history: usize,
}

fn default_top_k() -> usize {
    4
}

fn default_history_display_limit() -> usize {
    10
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_display_limit: default_history_display_limit(),
            max_prompt_history: 0,
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".ragchat"))
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
}

/// Pick the config directory: env, then the explicit flag, then the default.
pub fn resolve_config_dir(flag: Option<&Path>) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("RAGCHAT_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return Ok(expand_path(&dir));
        }
    }
    if let Some(dir) = flag {
        return Ok(expand_path(&dir.to_string_lossy()));
    }
    default_config_dir()
}

impl Config {
    pub async fn load_or_init(config_dir_flag: Option<&Path>) -> Result<Self> {
        let config_dir = resolve_config_dir(config_dir_flag)?;
        Self::load_or_init_in(&config_dir).await
    }

    /// Load `config.toml` from `config_dir`, writing a default one first if missing.
    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let initialized = !fs::try_exists(&config_path).await.unwrap_or(false);
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_dir = config_dir.to_path_buf();
            config.config_path = config_path;
            config.save().await?;
            config
        } else {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_dir = config_dir.to_path_buf();
            config.config_path = config_path;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            sessions_file = %config.sessions_path().display(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.sessions_file.trim().is_empty() {
            anyhow::bail!("sessions_file must not be empty");
        }
        if self.default_model.trim().is_empty() {
            anyhow::bail!("default_model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "temperature must be between 0.0 and 2.0 (got {})",
                self.temperature
            );
        }
        if self.chat.top_k == 0 {
            anyhow::bail!("chat.top_k must be greater than 0");
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("RAGCHAT_SESSIONS_FILE") {
            if !path.trim().is_empty() {
                self.sessions_file = path;
            }
        }

        if let Ok(model) = std::env::var("RAGCHAT_MODEL") {
            if !model.trim().is_empty() {
                self.default_model = model;
            }
        }

        if let Ok(temp_str) = std::env::var("RAGCHAT_TEMPERATURE") {
            match temp_str.trim().parse::<f64>() {
                Ok(temp) if (0.0..=2.0).contains(&temp) => self.temperature = temp,
                _ => tracing::warn!(
                    value = %temp_str,
                    "Ignoring invalid RAGCHAT_TEMPERATURE (expected 0.0-2.0)"
                ),
            }
        }

        if let Ok(top_k_str) = std::env::var("RAGCHAT_TOP_K") {
            match top_k_str.trim().parse::<usize>() {
                Ok(top_k) if top_k > 0 => self.chat.top_k = top_k,
                _ => tracing::warn!(value = %top_k_str, "Ignoring invalid RAGCHAT_TOP_K"),
            }
        }
    }

    /// Absolute location of the session document.
    pub fn sessions_path(&self) -> PathBuf {
        let path = expand_path(&self.sessions_file);
        if path.is_absolute() {
            path
        } else {
            self.config_dir.join(path)
        }
    }

    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            top_k: self.chat.top_k,
            max_prompt_history: self.chat.max_prompt_history,
            temperature: self.temperature,
        }
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        write_atomic(&self.config_path, toml_str.as_bytes())
            .await
            .with_context(|| {
                format!(
                    "Failed to write config file: {}",
                    self.config_path.display()
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::sync::{Mutex, MutexGuard};
    use tokio::test;

    const ENV_VARS: &[&str] = &[
        "RAGCHAT_CONFIG_DIR",
        "RAGCHAT_SESSIONS_FILE",
        "RAGCHAT_MODEL",
        "RAGCHAT_TEMPERATURE",
        "RAGCHAT_TOP_K",
    ];

    async fn env_override_lock() -> MutexGuard<'static, ()> {
        static ENV_OVERRIDE_TEST_LOCK: Mutex<()> = Mutex::const_new(());
        let guard = ENV_OVERRIDE_TEST_LOCK.lock().await;
        for key in ENV_VARS {
            std::env::remove_var(key);
        }
        guard
    }

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    async fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.sessions_file, "conversational_sessions.json");
        assert_eq!(c.default_model, "llama3.1:8b-instruct-q8_0");
        assert!((c.temperature - 0.1).abs() < f64::EPSILON);
        assert_eq!(c.chat.top_k, 4);
        assert_eq!(c.chat.history_display_limit, 10);
        assert_eq!(c.chat.max_prompt_history, 0);
        assert!(c.validate().is_ok());
    }

    #[test]
    async fn missing_sections_fall_back_to_defaults() {
        let parsed: Config = toml::from_str("default_model = \"mistral\"\n").unwrap();
        assert_eq!(parsed.default_model, "mistral");
        assert_eq!(parsed.sessions_file, "conversational_sessions.json");
        assert_eq!(parsed.chat.top_k, 4);
    }

    // ── Load / save ──────────────────────────────────────────

    #[test]
    async fn load_or_init_writes_default_file() {
        let _env_guard = env_override_lock().await;
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested");

        let config = Config::load_or_init_in(&dir).await.unwrap();

        assert_eq!(config.config_path, dir.join("config.toml"));
        let written = fs::read_to_string(&config.config_path).await.unwrap();
        assert!(written.contains("llama3.1:8b-instruct-q8_0"));
        assert!(written.contains("[chat]"));
        assert_eq!(
            config.sessions_path(),
            dir.join("conversational_sessions.json")
        );
    }

    #[test]
    async fn load_or_init_reads_existing_file() {
        let _env_guard = env_override_lock().await;
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            "sessions_file = \"/var/lib/ragchat/s.json\"\ntemperature = 0.5\n\n[chat]\ntop_k = 8\n",
        )
        .await
        .unwrap();

        let config = Config::load_or_init_in(tmp.path()).await.unwrap();

        assert_eq!(config.sessions_path(), PathBuf::from("/var/lib/ragchat/s.json"));
        assert!((config.temperature - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.chat.top_k, 8);
        let options = config.chat_options();
        assert_eq!(options.top_k, 8);
        assert!((options.temperature - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    async fn load_or_init_rejects_invalid_values() {
        let _env_guard = env_override_lock().await;
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "[chat]\ntop_k = 0\n")
            .await
            .unwrap();

        let err = Config::load_or_init_in(tmp.path()).await.unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    async fn load_or_init_reports_parse_errors() {
        let _env_guard = env_override_lock().await;
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "temperature = \"hot\"")
            .await
            .unwrap();

        let err = Config::load_or_init_in(tmp.path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    async fn save_roundtrips_through_load() {
        let _env_guard = env_override_lock().await;
        let tmp = TempDir::new().unwrap();
        let mut config = Config::load_or_init_in(tmp.path()).await.unwrap();
        config.default_model = "qwen2.5:7b".into();
        config.chat.history_display_limit = 25;
        config.save().await.unwrap();

        let reloaded = Config::load_or_init_in(tmp.path()).await.unwrap();
        assert_eq!(reloaded.default_model, "qwen2.5:7b");
        assert_eq!(reloaded.chat.history_display_limit, 25);
    }

    // ── Env overrides ────────────────────────────────────────

    #[test]
    async fn env_override_model_and_sessions_file() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("RAGCHAT_MODEL", "phi3:mini");
        std::env::set_var("RAGCHAT_SESSIONS_FILE", "other.json");
        config.apply_env_overrides();
        assert_eq!(config.default_model, "phi3:mini");
        assert_eq!(config.sessions_file, "other.json");

        std::env::remove_var("RAGCHAT_MODEL");
        std::env::remove_var("RAGCHAT_SESSIONS_FILE");
    }

    #[test]
    async fn env_override_temperature_ignores_out_of_range() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("RAGCHAT_TEMPERATURE", "0.7");
        config.apply_env_overrides();
        assert!((config.temperature - 0.7).abs() < f64::EPSILON);

        std::env::set_var("RAGCHAT_TEMPERATURE", "3.5");
        config.apply_env_overrides();
        assert!((config.temperature - 0.7).abs() < f64::EPSILON);

        std::env::remove_var("RAGCHAT_TEMPERATURE");
    }

    #[test]
    async fn env_override_top_k_ignores_zero_and_garbage() {
        let _env_guard = env_override_lock().await;
        let mut config = Config::default();

        std::env::set_var("RAGCHAT_TOP_K", "6");
        config.apply_env_overrides();
        assert_eq!(config.chat.top_k, 6);

        for bad in ["0", "many"] {
            std::env::set_var("RAGCHAT_TOP_K", bad);
            config.apply_env_overrides();
            assert_eq!(config.chat.top_k, 6);
        }

        std::env::remove_var("RAGCHAT_TOP_K");
    }

    #[test]
    async fn config_dir_env_wins_over_flag() {
        let _env_guard = env_override_lock().await;
        let flag = PathBuf::from("/from/flag");

        assert_eq!(resolve_config_dir(Some(flag.as_path())).unwrap(), flag);

        std::env::set_var("RAGCHAT_CONFIG_DIR", "/from/env");
        assert_eq!(
            resolve_config_dir(Some(flag.as_path())).unwrap(),
            PathBuf::from("/from/env")
        );

        std::env::remove_var("RAGCHAT_CONFIG_DIR");
    }

    #[test]
    async fn sessions_path_expands_tilde() {
        let config = Config {
            sessions_file: "~/chats.json".into(),
            ..Config::default()
        };
        let expected = PathBuf::from(shellexpand::tilde("~/chats.json").into_owned());
        assert_eq!(config.sessions_path(), expected);
    }
}
