//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! and applies `PAPERBOT_WORK_DIR` and `PAPERBOT_LOG_LEVEL` env overrides.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

use super::raw::RawConfig;
use super::types::*;

/// Deep-merge two TOML values.
/// Tables are merged recursively — the overlay only needs to specify keys that
/// differ from the base. For every other type (string, integer, array, …)
/// the overlay value replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// fully merged `toml::Value`. `visited` carries canonicalized paths already
/// seen in this chain so circular references are caught early.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml`, then apply
/// env-var overrides. If no path is given and `config/default.toml` does not
/// exist, the built-in defaults from `raw.rs` apply.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("PAPERBOT_WORK_DIR").ok();
    let log_level_override = env::var("PAPERBOT_LOG_LEVEL").ok();

    if let Some(path) = config_path {
        return load_from(
            Path::new(path),
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        );
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(
            default_path,
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )
    } else {
        // No file — resolve from the serde defaults alone.
        let parsed: RawConfig = toml::from_str("")
            .map_err(|e| AppError::Config(format!("built-in defaults failed to parse: {e}")))?;
        resolve(
            parsed,
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )
    }
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
/// Follows `[meta] base = "..."` inheritance chains before resolving.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val).map_err(|e: toml::de::Error| {
        AppError::Config(format!("config error in {}: {e}", path.display()))
    })?;

    resolve(parsed, work_dir_override, log_level_override)
}

fn resolve(
    parsed: RawConfig,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let s = parsed.service;

    let work_dir_str = work_dir_override.unwrap_or(&s.work_dir).to_string();
    let work_dir = expand_home(&work_dir_str);
    let log_level = log_level_override.unwrap_or(&s.log_level).to_string();

    let agent = parsed.agent;
    validate_range("agent.guardrail_threshold", agent.guardrail_threshold as i64, 0, 100)?;
    validate_range("agent.top_k", agent.top_k as i64, 1, 10)?;
    validate_range("agent.max_retrieval_attempts", agent.max_retrieval_attempts as i64, 1, 5)?;
    validate_range("agent.conversation_window", agent.conversation_window as i64, 1, 10)?;
    if agent.max_iterations == 0 {
        return Err(AppError::Config("agent.max_iterations must be >= 1".into()));
    }
    if parsed.embeddings.dimension == 0 {
        return Err(AppError::Config("embeddings.dimension must be >= 1".into()));
    }

    Ok(Config {
        service: ServiceConfig {
            name: s.name,
            work_dir,
            log_level,
            bind: s.bind,
        },
        llm: LlmConfig {
            default_provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
            zai: ZaiConfig {
                api_base_url: parsed.llm.zai.api_base_url,
                model: parsed.llm.zai.model,
                timeout_seconds: parsed.llm.zai.timeout_seconds,
            },
        },
        embeddings: EmbeddingsConfig {
            provider: parsed.embeddings.provider,
            api_base_url: parsed.embeddings.api_base_url,
            model: parsed.embeddings.model,
            dimension: parsed.embeddings.dimension,
            timeout_seconds: parsed.embeddings.timeout_seconds,
        },
        agent: AgentDefaults {
            guardrail_threshold: agent.guardrail_threshold,
            top_k: agent.top_k,
            max_retrieval_attempts: agent.max_retrieval_attempts,
            max_iterations: agent.max_iterations,
            conversation_window: agent.conversation_window,
            temperature: agent.temperature,
        },
        llm_api_key: env::var("LLM_API_KEY").ok(),
        embeddings_api_key: env::var("EMBEDDINGS_API_KEY").ok(),
    })
}

fn validate_range(key: &str, value: i64, min: i64, max: i64) -> Result<(), AppError> {
    if value < min || value > max {
        return Err(AppError::Config(format!(
            "{key} must be in {min}..={max}, got {value}"
        )));
    }
    Ok(())
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
