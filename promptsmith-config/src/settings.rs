//! The enumerated configuration surface (spec §6), loaded through a small
//! `figment` stack of built-in defaults overridden by the process
//! environment — following `swissarmyhammer-config::defaults::ConfigDefaults`'s
//! `Figment` composition style.

use std::collections::HashSet;
use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Which transport the MCP server should bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Standard input/output framing (the default).
    #[default]
    Stdio,
    /// Plain HTTP.
    Http,
    /// Server-sent events.
    Sse,
}

/// UI/log message language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English.
    #[default]
    En,
    /// Chinese.
    Zh,
}

/// Raw, directly-deserializable shape of the environment surface. Field
/// names match the `PROMPT_REPO_URL`-style environment variables once
/// lower-cased by `figment`'s `Env` provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawSettings {
    prompt_repo_url: Option<String>,
    prompt_repo_urls: Option<String>,
    system_repo_url: Option<String>,
    storage_dir: Option<String>,
    mcp_groups: Option<String>,
    git_branch: Option<String>,
    git_max_retries: Option<u32>,
    git_polling_interval: Option<u64>,
    watch_mode: Option<bool>,
    cache_cleanup_interval: Option<u64>,
    transport_type: Option<TransportType>,
    log_level: Option<String>,
    log_file: Option<String>,
    mcp_language: Option<Language>,
}

fn raw_defaults() -> RawSettings {
    RawSettings {
        storage_dir: Some("./.prompts_cache".to_string()),
        git_branch: Some("main".to_string()),
        git_max_retries: Some(3),
        git_polling_interval: Some(300_000),
        watch_mode: Some(false),
        transport_type: Some(TransportType::Stdio),
        log_level: Some("info".to_string()),
        mcp_language: Some(Language::En),
        ..Default::default()
    }
}

/// One ordered, priority-ranked user source: a local path or a Git URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    /// Lower = earlier / higher priority.
    pub priority: usize,
    /// Absolute local path, or an `http(s)://`/`git@` URL.
    pub url: String,
}

/// The fully validated, typed configuration surface.
#[derive(Debug, Clone)]
pub struct Settings {
    /// User sources in ascending priority order.
    pub prompt_sources: Vec<SourceSpec>,
    /// Optional system source supplying the `common` group.
    pub system_repo_url: Option<String>,
    /// Working directory sources sync into.
    pub storage_dir: PathBuf,
    /// Active group set (plus `common` implicitly when a system source exists).
    pub mcp_groups: HashSet<String>,
    /// Default branch for Git sources.
    pub git_branch: String,
    /// Max sync retry attempts.
    pub git_max_retries: u32,
    /// Poll interval for Git sources, in milliseconds.
    pub git_polling_interval_ms: u64,
    /// Whether watchers/pollers are enabled.
    pub watch_mode: bool,
    /// `FileCache` sweep interval, in milliseconds.
    pub cache_cleanup_interval_ms: Option<u64>,
    /// MCP transport.
    pub transport_type: TransportType,
    /// Tracing log level filter.
    pub log_level: String,
    /// Optional log file path.
    pub log_file: Option<String>,
    /// UI/log message language.
    pub mcp_language: Language,
}

impl Settings {
    /// Load settings layered defaults → `STORAGE_DIR`-relative config file
    /// (if present) → process environment, and validate them.
    pub fn load() -> Result<Self> {
        // STORAGE_DIR can itself be set by the environment, so resolve it
        // from defaults+env first to find where the optional config file
        // lives, then re-extract with the file spliced in at its tier.
        let preliminary: RawSettings = Figment::new()
            .merge(Serialized::defaults(raw_defaults()))
            .merge(Env::raw())
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let storage_dir = preliminary
            .storage_dir
            .unwrap_or_else(|| "./.prompts_cache".to_string());
        let config_file = PathBuf::from(storage_dir).join("promptsmith.toml");

        let figment = Figment::new()
            .merge(Serialized::defaults(raw_defaults()))
            .merge(Toml::file(config_file))
            .merge(Env::raw());

        let raw: RawSettings = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self> {
        let urls = raw
            .prompt_repo_urls
            .or(raw.prompt_repo_url)
            .ok_or_else(|| ConfigError::Missing("PROMPT_REPO_URL or PROMPT_REPO_URLS".into()))?;

        let mut prompt_sources = Vec::new();
        for (priority, url) in urls.split(',').map(str::trim).filter(|s| !s.is_empty()).enumerate() {
            validate_source_url(url)?;
            prompt_sources.push(SourceSpec {
                priority,
                url: url.to_string(),
            });
        }
        if prompt_sources.is_empty() {
            return Err(ConfigError::Invalid {
                field: "PROMPT_REPO_URL(S)".into(),
                reason: "at least one source is required".into(),
            });
        }

        if let Some(url) = &raw.system_repo_url {
            validate_source_url(url)?;
        }

        let mcp_groups = raw
            .mcp_groups
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            prompt_sources,
            system_repo_url: raw.system_repo_url,
            storage_dir: PathBuf::from(raw.storage_dir.unwrap_or_else(|| "./.prompts_cache".into())),
            mcp_groups,
            git_branch: raw.git_branch.unwrap_or_else(|| "main".into()),
            git_max_retries: raw.git_max_retries.unwrap_or(3),
            git_polling_interval_ms: raw.git_polling_interval.unwrap_or(300_000),
            watch_mode: raw.watch_mode.unwrap_or(false),
            cache_cleanup_interval_ms: raw.cache_cleanup_interval,
            transport_type: raw.transport_type.unwrap_or_default(),
            log_level: raw.log_level.unwrap_or_else(|| "info".into()),
            log_file: raw.log_file,
            mcp_language: raw.mcp_language.unwrap_or_default(),
        })
    }
}

/// Reject any source value containing `..` or NUL; local paths must be absolute.
pub fn validate_source_url(value: &str) -> Result<()> {
    if value.contains("..") || value.contains('\0') {
        return Err(ConfigError::Invalid {
            field: "source url".into(),
            reason: format!("'{value}' contains '..' or a NUL byte"),
        });
    }
    let is_remote = value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with("git@");
    if !is_remote && !PathBuf::from(value).is_absolute() {
        return Err(ConfigError::Invalid {
            field: "source url".into(),
            reason: format!("local path '{value}' must be absolute"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_local_path() {
        assert!(validate_source_url("relative/path").is_err());
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(validate_source_url("/abs/../etc").is_err());
    }

    #[test]
    fn accepts_absolute_path() {
        assert!(validate_source_url("/abs/path").is_ok());
    }

    #[test]
    fn accepts_git_urls() {
        assert!(validate_source_url("https://example.com/repo.git").is_ok());
        assert!(validate_source_url("git@example.com:repo.git").is_ok());
    }

    #[test]
    fn from_raw_requires_at_least_one_source() {
        let raw = RawSettings::default();
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn from_raw_parses_comma_separated_urls_in_priority_order() {
        let raw = RawSettings {
            prompt_repo_urls: Some("/a,/b".to_string()),
            ..Default::default()
        };
        let settings = Settings::from_raw(raw).unwrap();
        assert_eq!(settings.prompt_sources.len(), 2);
        assert_eq!(settings.prompt_sources[0].priority, 0);
        assert_eq!(settings.prompt_sources[0].url, "/a");
        assert_eq!(settings.prompt_sources[1].url, "/b");
    }

    #[test]
    fn defaults_apply_when_unset() {
        let raw = RawSettings {
            prompt_repo_url: Some("/a".to_string()),
            ..Default::default()
        };
        let settings = Settings::from_raw(raw).unwrap();
        assert_eq!(settings.git_branch, "main");
        assert_eq!(settings.git_max_retries, 3);
        assert!(!settings.watch_mode);
        assert_eq!(settings.storage_dir, PathBuf::from("./.prompts_cache"));
    }

    #[test]
    #[allow(clippy::result_large_err)]
    fn load_honors_storage_dir_relative_config_file_between_defaults_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PROMPT_REPO_URL", "/from-env");
            jail.set_env("STORAGE_DIR", ".");
            jail.set_env("LOG_LEVEL", "trace");
            jail.create_file(
                "promptsmith.toml",
                r#"
                git_branch = "from-file"
                log_level = "debug"
                "#,
            )?;

            let settings = Settings::load().expect("load should succeed");
            // File tier overrides the built-in default ("main")...
            assert_eq!(settings.git_branch, "from-file");
            // ...but the environment still overrides the file tier.
            assert_eq!(settings.log_level, "trace");
            assert_eq!(settings.prompt_sources[0].url, "/from-env");
            Ok(())
        });
    }
}
