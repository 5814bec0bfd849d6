use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use smartdo_ai::{
    client::{DEFAULT_HOSTED_MODEL, DEFAULT_HOSTED_URL, DEFAULT_LOCAL_MODEL, DEFAULT_LOCAL_URL},
    Backend, ClientConfig, RateLimitConfig, DEFAULT_BATCH_CONCURRENCY,
};
use smartdo_core::time::parse_timezone;
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::ensure_smartdo_home;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Zone for naive deadlines coming back from the model.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub cache: CacheSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub backend: Backend,
    pub local_url: String,
    pub local_model: String,
    pub hosted_url: String,
    pub hosted_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub batch_concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Keep the result cache in cache.json between runs.
    pub persist: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            llm: LlmSection::default(),
            pipeline: PipelineSection::default(),
            limits: LimitsSection::default(),
            cache: CacheSection::default(),
        }
    }
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            local_url: DEFAULT_LOCAL_URL.to_string(),
            local_model: DEFAULT_LOCAL_MODEL.to_string(),
            hosted_url: DEFAULT_HOSTED_URL.to_string(),
            hosted_model: DEFAULT_HOSTED_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            requests_per_minute: RateLimitConfig::default().max_requests,
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { persist: true }
    }
}

impl Config {
    pub fn timezone(&self) -> Result<Tz> {
        parse_timezone(&self.timezone).context("config.toml: timezone")
    }

    pub fn client_config(&self, api_key: Option<String>) -> ClientConfig {
        ClientConfig {
            local_url: self.llm.local_url.clone(),
            local_model: self.llm.local_model.clone(),
            hosted_url: self.llm.hosted_url.clone(),
            hosted_model: self.llm.hosted_model.clone(),
            api_key,
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
        }
    }

    pub fn rate_limits(&self) -> RateLimitConfig {
        RateLimitConfig::per_minute(self.limits.requests_per_minute)
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_smartdo_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config_to(cfg: &Config, p: &Path) -> Result<()> {
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config_to(&Config::default(), &p)?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        save_config_to(&Config::default(), &p).unwrap();
        assert_eq!(load_config_from(&p).unwrap(), Config::default());
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(
            &p,
            "timezone = \"America/Chicago\"\n[llm]\nbackend = \"hosted\"\n[limits]\nrequests_per_minute = 3\n",
        )
        .unwrap();

        let cfg = load_config_from(&p).unwrap();
        assert_eq!(cfg.llm.backend, Backend::Hosted);
        assert_eq!(cfg.llm.hosted_model, DEFAULT_HOSTED_MODEL);
        assert_eq!(cfg.pipeline.batch_concurrency, 4);
        assert_eq!(cfg.rate_limits().max_requests, 3);
        assert!(cfg.cache.persist);
        assert_eq!(cfg.timezone().unwrap(), chrono_tz::America::Chicago);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.llm.backend, Backend::Local);
        assert_eq!(cfg.client_config(None).local_url, DEFAULT_LOCAL_URL);
    }
}
