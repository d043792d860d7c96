//! Loop configuration stored in `armloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::kinematic::CUBE;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "armloop.toml";

/// Loop configuration (TOML).
///
/// Missing fields default to the values the pick task was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopConfig {
    /// Attempt budget per run (plan → execute → judge → critique cycles).
    pub max_attempts: u32,

    /// Object the referee judges.
    pub target_object: String,

    pub executor: ExecutorConfig,

    pub llm: LlmConfig,

    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Simulation steps advanced after every plan step.
    pub settle_steps: u32,

    /// Per-finger aperture commanded by `OPEN_GRIPPER` (metres).
    pub open_aperture_m: f64,

    /// Travel height used by `APPROACH` and `RETRACT` (metres).
    pub safe_height_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API root (without `/chat/completions`).
    pub base_url: String,

    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Sampling temperature for planning requests.
    pub planner_temperature: f64,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// When set, per-attempt artifacts are written under this directory.
    pub dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            settle_steps: 80,
            open_aperture_m: 0.04,
            safe_height_m: 0.3,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            planner_temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            target_object: CUBE.to_string(),
            executor: ExecutorConfig::default(),
            llm: LlmConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.target_object.trim().is_empty() {
            return Err(anyhow!("target_object must be non-empty"));
        }
        if self.executor.settle_steps == 0 {
            return Err(anyhow!("executor.settle_steps must be > 0"));
        }
        if !self.executor.open_aperture_m.is_finite() || self.executor.open_aperture_m <= 0.0 {
            return Err(anyhow!("executor.open_aperture_m must be > 0"));
        }
        if !self.executor.safe_height_m.is_finite() || self.executor.safe_height_m <= 0.0 {
            return Err(anyhow!("executor.safe_height_m must be > 0"));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(anyhow!("llm.base_url must be non-empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model must be non-empty"));
        }
        if self.llm.api_key_env.trim().is_empty() {
            return Err(anyhow!("llm.api_key_env must be non-empty"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LoopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LoopConfig::default());
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.executor.settle_steps, 80);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("armloop.toml");
        let cfg = LoopConfig {
            max_attempts: 5,
            log: LogConfig {
                dir: Some(PathBuf::from("logs")),
            },
            ..LoopConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("armloop.toml");
        fs::write(&path, "max_attempts = 7\n\n[executor]\nsettle_steps = 10\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_attempts, 7);
        assert_eq!(cfg.executor.settle_steps, 10);
        assert_eq!(cfg.executor.safe_height_m, 0.3);
        assert_eq!(cfg.llm, LlmConfig::default());
    }

    #[test]
    fn rejects_zero_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("armloop.toml");
        fs::write(&path, "max_attempts = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_attempts must be > 0"));
    }
}
