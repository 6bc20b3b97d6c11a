//! Append-only log-backed [`JobQueue`] variant.
//!
//! Each queue owns one log file: a `Put`/`Ack` record per line, newline
//! delimited JSON. `open` replays the file to reconstruct pending state and
//! `put`/`ack` each append a record before touching in-memory state, so a
//! crash between the two leaves the log as the source of truth on the next
//! `open`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;

use super::fifo::Fifo;
use super::{AckToken, JobQueue, QueueEntry, Ticket};
use crate::codec::JobCodec;
use crate::error::{KestrelError, QueueError, Result};
use crate::job::Job;
use crate::lifecycle::Lifecycle;

#[derive(Serialize, Deserialize)]
#[serde(tag = "op")]
enum LogRecord {
    Put {
        entry_id: u64,
        enqueued_at: DateTime<Utc>,
        payload: String,
    },
    Ack {
        entry_id: u64,
    },
}

/// Log-backed FIFO: every `put`/`ack` is durable before it is visible in
/// memory, and `open` replays the log to restore pending state across
/// restarts.
pub struct DurableJobQueue {
    name: String,
    path: PathBuf,
    codec: Arc<dyn JobCodec>,
    fifo: Fifo,
    append: AsyncMutex<()>,
}

impl DurableJobQueue {
    /// Open (creating if absent) the log file at `path`, replaying any
    /// existing records to reconstruct pending entries.
    pub async fn open(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        codec: Arc<dyn JobCodec>,
    ) -> Result<Self> {
        let name = name.into();
        let path = path.as_ref().to_path_buf();

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(QueueError::Io {
                    name: name.clone(),
                    source,
                }
                .into())
            }
        };

        let (entries, max_id) = Self::replay(&name, &contents, codec.as_ref())?;

        Ok(Self {
            name,
            path,
            codec,
            fifo: Fifo::restore(entries, max_id),
            append: AsyncMutex::new(()),
        })
    }

    fn replay(
        name: &str,
        contents: &str,
        codec: &dyn JobCodec,
    ) -> Result<(VecDeque<QueueEntry>, u64)> {
        let mut live: VecDeque<QueueEntry> = VecDeque::new();
        let mut max_id = 0u64;

        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record: LogRecord = serde_json::from_str(line).map_err(|source| QueueError::Codec {
                name: name.to_string(),
                source,
            })?;
            match record {
                LogRecord::Put {
                    entry_id,
                    enqueued_at,
                    payload,
                } => {
                    max_id = max_id.max(entry_id);
                    let job = codec.decode(payload.as_bytes())?;
                    live.push_back(QueueEntry {
                        entry_id,
                        job,
                        enqueued_at,
                    });
                }
                LogRecord::Ack { entry_id } => {
                    live.retain(|e| e.entry_id != entry_id);
                }
            }
        }

        Ok((live, max_id))
    }

    async fn append(&self, record: &LogRecord) -> Result<()> {
        let _guard = self.append.lock().await;
        let mut line = serde_json::to_vec(record).map_err(|source| QueueError::Codec {
            name: self.name.clone(),
            source,
        })?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| QueueError::Io {
                name: self.name.clone(),
                source,
            })?;
        file.write_all(&line).await.map_err(|source| QueueError::Io {
            name: self.name.clone(),
            source,
        })?;
        file.flush().await.map_err(|source| QueueError::Io {
            name: self.name.clone(),
            source,
        })?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Lifecycle for DurableJobQueue {
    async fn start(&self) -> Result<()> {
        self.fifo.state.start();
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.fifo.state.pause();
        self.fifo.wake();
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.fifo.state.resume();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.fifo.state.shutdown();
        self.fifo.wake();
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.fifo.state.is_shutdown()
    }
}

#[async_trait::async_trait]
impl JobQueue for DurableJobQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, job: Job) -> Result<()> {
        let entry_id = self.fifo.next_entry_id();
        let enqueued_at = Utc::now();
        let payload = self.codec.encode(&job)?;
        let payload = String::from_utf8(payload).map_err(|_| {
            KestrelError::Queue(QueueError::Codec {
                name: self.name.clone(),
                source: serde::de::Error::custom("codec produced non-UTF-8 payload"),
            })
        })?;

        self.append(&LogRecord::Put {
            entry_id,
            enqueued_at,
            payload,
        })
        .await?;

        self.fifo.push(
            QueueEntry {
                entry_id,
                job,
                enqueued_at,
            },
            0,
        );
        Ok(())
    }

    async fn get(&self) -> Option<Ticket> {
        self.fifo.get().await
    }

    async fn ack(&self, token: AckToken) -> Result<()> {
        self.fifo.ack(token)?;
        self.append(&LogRecord::Ack { entry_id: token.0 }).await
    }

    fn size(&self) -> usize {
        self.fifo.size()
    }

    fn drain_to(&self, target: Arc<dyn JobQueue>, delay: Duration) {
        self.fifo.drain_to(target, delay);
    }

    async fn check_expiration(&self, flush_limit: usize) -> Result<usize> {
        let expired = self.fifo.pop_expired(flush_limit);
        let count = expired.len();
        if count == 0 {
            return Ok(0);
        }
        let Some(target) = self.fifo.drain_target() else {
            return Ok(0);
        };
        for entry in expired {
            self.append(&LogRecord::Ack {
                entry_id: entry.entry_id,
            })
            .await?;
            target.put(entry.job).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecRegistry, JsonJobCodec};
    use crate::job::ClassifiedError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ping;

    #[async_trait::async_trait]
    impl crate::job::JobBody for Ping {
        async fn execute(&self) -> std::result::Result<(), ClassifiedError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "ping".to_string()
        }

        fn job_type(&self) -> &'static str {
            "test:ping"
        }

        fn to_json(&self) -> serde_json::Value {
            serde_json::json!({})
        }
    }

    fn codec() -> Arc<dyn JobCodec> {
        let mut registry = CodecRegistry::new();
        registry.register::<Ping>("test:ping");
        Arc::new(JsonJobCodec::new(Arc::new(registry)))
    }

    #[tokio::test]
    async fn put_get_ack_appends_and_clears() {
        let dir = tempdir();
        let path = dir.join("queue.ndjson");
        let queue = DurableJobQueue::open("durable", &path, codec()).await.unwrap();
        queue.start().await.unwrap();

        queue.put(Job::new(Ping)).await.unwrap();
        assert_eq!(queue.size(), 1);

        let ticket = queue.get().await.unwrap();
        let (_, token) = ticket.split();
        queue.ack(token).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn replay_restores_unacked_entries_only() {
        let dir = tempdir();
        let path = dir.join("queue.ndjson");

        {
            let queue = DurableJobQueue::open("durable", &path, codec()).await.unwrap();
            queue.start().await.unwrap();
            queue.put(Job::new(Ping)).await.unwrap();
            queue.put(Job::new(Ping)).await.unwrap();
            let ticket = queue.get().await.unwrap();
            let (_, token) = ticket.split();
            queue.ack(token).await.unwrap();
        }

        let reopened = DurableJobQueue::open("durable", &path, codec()).await.unwrap();
        assert_eq!(reopened.size(), 1);
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("kestrel-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
