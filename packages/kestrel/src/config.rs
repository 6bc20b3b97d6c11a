//! Environment-variable driven configuration surface.
//!
//! `dotenvy::dotenv()` first (best-effort, ignored if absent), then
//! `anyhow::Context`-wrapped `std::env::var` reads for everything else.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::queue::QueueKind;

/// One entry of the priority surface: `priority -> queue name prefix`.
#[derive(Debug, Clone)]
pub struct PriorityMapping {
    /// The priority key jobs are submitted under.
    pub priority: i32,
    /// Prefix used to derive this priority's primary/error queue names.
    pub queue_name_prefix: String,
}

/// The engine's env-var configuration surface.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root filesystem directory for the durable queue backend.
    pub path: String,
    /// `durable` or `memory`; selects the queue variant.
    pub queue_kind: QueueKind,
    /// Worker count per scheduler.
    pub threads: usize,
    /// Mean period of the retry strobe.
    pub strobe_interval: Duration,
    /// Maximum `error_count` before a job is bad-sinked.
    pub error_limit: u32,
    /// Max per-strobe transfer count from error to primary.
    pub flush_limit: usize,
    /// Minimum age before an error-queue entry is drain-eligible.
    pub error_delay: Duration,
    /// Memory-queue bound (0 = unbounded).
    pub size_limit: usize,
    /// Standard deviation multiplier for strobe jitter.
    pub jitter_rate: f64,
    /// Name of the primary queue.
    pub job_queue: String,
    /// Name of the error queue.
    pub error_queue: String,
    /// Fixed `priority -> queue_name_prefix` mapping, one `JobScheduler`
    /// materialized per entry.
    pub priorities: Vec<PriorityMapping>,
}

impl Config {
    /// Load configuration from environment variables, reading a `.env`
    /// file first if one is present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let queue_kind: QueueKind = env::var("KESTREL_TYPE")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("KESTREL_TYPE must be \"durable\" or \"memory\"")?;

        Ok(Self {
            path: env::var("KESTREL_PATH").unwrap_or_else(|_| "/var/spool/kestrel".to_string()),
            queue_kind,
            threads: env::var("KESTREL_THREADS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("KESTREL_THREADS must be a valid number")?,
            strobe_interval: Duration::from_millis(
                env::var("KESTREL_STROBE_INTERVAL_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()
                    .context("KESTREL_STROBE_INTERVAL_MS must be a valid number")?,
            ),
            error_limit: env::var("KESTREL_ERROR_LIMIT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("KESTREL_ERROR_LIMIT must be a valid number")?,
            flush_limit: env::var("KESTREL_FLUSH_LIMIT")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("KESTREL_FLUSH_LIMIT must be a valid number")?,
            error_delay: Duration::from_secs(
                env::var("KESTREL_ERROR_DELAY_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .context("KESTREL_ERROR_DELAY_SECS must be a valid number")?,
            ),
            size_limit: env::var("KESTREL_SIZE_LIMIT")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("KESTREL_SIZE_LIMIT must be a valid number")?,
            jitter_rate: env::var("KESTREL_JITTER_RATE")
                .unwrap_or_else(|_| "0.1".to_string())
                .parse()
                .context("KESTREL_JITTER_RATE must be a valid number")?,
            job_queue: env::var("KESTREL_JOB_QUEUE").unwrap_or_else(|_| "primary".to_string()),
            error_queue: env::var("KESTREL_ERROR_QUEUE").unwrap_or_else(|_| "errors".to_string()),
            priorities: env::var("KESTREL_PRIORITIES")
                .ok()
                .map(|raw| parse_priorities(&raw))
                .transpose()
                .context("KESTREL_PRIORITIES must be a comma list of priority:queue_name_prefix")?
                .unwrap_or_default(),
        })
    }
}

fn parse_priorities(raw: &str) -> Result<Vec<PriorityMapping>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (priority, prefix) = entry
                .split_once(':')
                .context("each KESTREL_PRIORITIES entry must be priority:queue_name_prefix")?;
            Ok(PriorityMapping {
                priority: priority
                    .trim()
                    .parse()
                    .context("priority in KESTREL_PRIORITIES must be an integer")?,
                queue_name_prefix: prefix.trim().to_string(),
            })
        })
        .collect()
}
