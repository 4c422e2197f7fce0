use anyhow::Context;
use log::LevelFilter;
use std::str::FromStr;
use std::time::Duration;

use crate::game::shared::structs::LoopMode;
use crate::game::shared::systems::DEFAULT_WORKER_COUNT;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub log_level: LevelFilter,
    pub worker_count: usize,
    pub model_path: Option<String>,
    pub instance_count: usize,
    pub frame_count: u32,
    pub loop_mode: LoopMode,
    pub job_jitter: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            log_level: LevelFilter::Info,
            worker_count: DEFAULT_WORKER_COUNT.min(num_cpus::get()),
            model_path: None,
            instance_count: 8,
            frame_count: 120,
            loop_mode: LoopMode::Restart,
            job_jitter: None,
        }
    }
}

impl EngineConfig {
    /// Reads the configuration from the environment, after loading `.env`.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let log_level = match lookup("LOG") {
            Some(level) => parse_log_level(&level)?,
            None => defaults.log_level,
        };
        let job_jitter = parse_var::<u64, _>(&lookup, "JOB_JITTER_US")?
            .filter(|micros| *micros > 0)
            .map(Duration::from_micros);
        Ok(EngineConfig {
            log_level,
            worker_count: parse_var(&lookup, "WORKER_COUNT")?.unwrap_or(defaults.worker_count),
            model_path: lookup("MODEL").filter(|path| !path.trim().is_empty()),
            instance_count: parse_var(&lookup, "INSTANCES")?.unwrap_or(defaults.instance_count),
            frame_count: parse_var(&lookup, "FRAMES")?.unwrap_or(defaults.frame_count),
            loop_mode: parse_var(&lookup, "LOOP_MODE")?.unwrap_or(defaults.loop_mode),
            job_jitter,
        })
    }
}

fn parse_log_level(level: &str) -> anyhow::Result<LevelFilter> {
    let level = match level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => anyhow::bail!("Invalid value for LOG: {}", level),
    };
    Ok(level)
}

fn parse_var<T, F>(lookup: &F, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: {}", key, value)),
        None => Ok(None),
    }
}
