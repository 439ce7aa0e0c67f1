//! Serializable queue configuration.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, QueueError};

/// Upper bound for a configured thread count.
pub const MAX_THREADS: usize = 1024;

/// Storage × dispatch combination backing a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadQueueMode {
    /// Blocking buffer drained by N long-lived threads.
    #[default]
    Dedicated,
    /// Monitor queue drained by N threads woken on enqueue.
    Event,
    /// Dispatcher spawning a thread per item, gated by a (named) mutex.
    Mutex,
    /// Dispatcher spawning a thread per item, gated by a (named) semaphore.
    Semaphore,
    /// Dispatcher spawning a thread per item, gated by an in-process semaphore.
    LocalSemaphore,
    /// Dispatcher scheduling long-running runtime tasks, gated by a semaphore.
    Task,
    /// Dispatcher running fixed-size batches of runtime tasks.
    TaskGroup,
    /// Dispatcher posting work items to a shared thread pool.
    ThreadPool,
}

impl ThreadQueueMode {
    /// Every mode, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Dedicated,
        Self::Event,
        Self::Mutex,
        Self::Semaphore,
        Self::LocalSemaphore,
        Self::Task,
        Self::TaskGroup,
        Self::ThreadPool,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dedicated => "dedicated",
            Self::Event => "event",
            Self::Mutex => "mutex",
            Self::Semaphore => "semaphore",
            Self::LocalSemaphore => "local_semaphore",
            Self::Task => "task",
            Self::TaskGroup => "task_group",
            Self::ThreadPool => "thread_pool",
        }
    }

    /// Whether queues of this mode support `pause`/`resume`.
    #[must_use]
    pub const fn can_pause(self) -> bool {
        !matches!(self, Self::Event | Self::Mutex | Self::Semaphore)
    }

    /// Whether this mode can be backed by a named, process-wide token.
    #[must_use]
    pub const fn supports_name(self) -> bool {
        matches!(self, Self::Mutex | Self::Semaphore)
    }
}

impl fmt::Display for ThreadQueueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreadQueueMode {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| QueueError::Configuration(format!("unknown queue mode `{s}`")))
    }
}

/// Queue configuration as loaded from JSON or the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue variant.
    #[serde(default)]
    pub mode: ThreadQueueMode,
    /// Worker count; 0 selects the processor count.
    #[serde(default)]
    pub threads: usize,
    /// Drain queued items on dispose instead of discarding them.
    #[serde(default)]
    pub wait_on_dispose: bool,
    /// Fixed pause after every enqueue, in milliseconds.
    #[serde(default)]
    pub sleep_after_enqueue_ms: Option<u64>,
    /// Minimum duration of a task-group batch, in milliseconds.
    #[serde(default)]
    pub threshold_ms: Option<u64>,
    /// Name of the process-wide token (mutex/semaphore modes).
    #[serde(default)]
    pub name: Option<String>,
    /// Unix permission bits applied by the owner of a named token.
    #[serde(default)]
    pub access_mode: Option<u32>,
}

impl QueueConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// `QueueError::Configuration` describing the first invalid field.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.threads > MAX_THREADS {
            return Err(QueueError::Configuration(format!(
                "threads must be at most {MAX_THREADS}, got {}",
                self.threads
            )));
        }
        if self.threshold_ms == Some(0) {
            return Err(QueueError::Configuration("threshold_ms must be greater than 0".into()));
        }
        if self.name.is_some() && !self.mode.supports_name() {
            return Err(QueueError::Configuration(format!(
                "{} queues cannot be named",
                self.mode
            )));
        }
        if self.access_mode.is_some() && self.name.is_none() {
            return Err(QueueError::Configuration("access_mode requires a name".into()));
        }
        if self.access_mode.is_some_and(|m| m > 0o777) {
            return Err(QueueError::Configuration("access_mode must be within 0o777".into()));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// `QueueError::Configuration` for malformed JSON or invalid values.
    pub fn from_json_str(input: &str) -> Result<Self, QueueError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| QueueError::Configuration(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or holds an invalid configuration;
    /// the error names the file.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("reading queue config {}", path.display()))?;
        Self::from_json_str(&input).with_context(|| format!("loading queue config {}", path.display()))
    }

    /// Load configuration from `THREAD_QUEUE_*` environment variables, reading `.env` first.
    ///
    /// # Errors
    ///
    /// `QueueError::Configuration` for unparsable or invalid values.
    pub fn from_env() -> Result<Self, QueueError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// `QueueError::Configuration` for unparsable or invalid values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, QueueError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(mode) = lookup("THREAD_QUEUE_MODE") {
            cfg.mode = mode.parse()?;
        }
        if let Some(threads) = lookup("THREAD_QUEUE_THREADS") {
            cfg.threads = parse_number("THREAD_QUEUE_THREADS", &threads)?;
        }
        if let Some(flag) = lookup("THREAD_QUEUE_WAIT_ON_DISPOSE") {
            cfg.wait_on_dispose = parse_bool("THREAD_QUEUE_WAIT_ON_DISPOSE", &flag)?;
        }
        if let Some(ms) = lookup("THREAD_QUEUE_SLEEP_AFTER_ENQUEUE_MS") {
            cfg.sleep_after_enqueue_ms = Some(parse_number("THREAD_QUEUE_SLEEP_AFTER_ENQUEUE_MS", &ms)?);
        }
        if let Some(ms) = lookup("THREAD_QUEUE_THRESHOLD_MS") {
            cfg.threshold_ms = Some(parse_number("THREAD_QUEUE_THRESHOLD_MS", &ms)?);
        }
        cfg.name = lookup("THREAD_QUEUE_NAME").filter(|n| !n.trim().is_empty());
        if let Some(mode) = lookup("THREAD_QUEUE_ACCESS_MODE") {
            let digits = mode.trim().trim_start_matches("0o");
            cfg.access_mode = Some(u32::from_str_radix(digits, 8).map_err(|e| {
                QueueError::Configuration(format!("THREAD_QUEUE_ACCESS_MODE: {e}"))
            })?);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_number<N>(key: &str, value: &str) -> Result<N, QueueError>
where
    N: FromStr,
    N::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| QueueError::Configuration(format!("{key}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, QueueError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(QueueError::Configuration(format!("{key}: not a boolean: {other}"))),
    }
}
