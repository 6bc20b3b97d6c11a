//! Wire codec for serializing jobs to/from durable queue payloads.
//!
//! The `JobCodec` trait is the `bytes ↔ Job` transform a
//! [`crate::queue::DurableJobQueue`] uses internally; the engine's core
//! never looks at bytes directly.
//!
//! Job bodies are trait objects, so decoding needs to recover a concrete
//! type from a type tag. [`CodecRegistry`] registers a deserializer per
//! `job_type` and looks it up again on decode.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{KestrelError, QueueError};
use crate::job::{Job, JobBody};

/// Transform between a [`Job`] and the bytes a durable queue persists.
pub trait JobCodec: Send + Sync {
    /// Encode a job for durable storage.
    fn encode(&self, job: &Job) -> Result<Vec<u8>, KestrelError>;
    /// Decode a job previously produced by [`JobCodec::encode`].
    fn decode(&self, bytes: &[u8]) -> Result<Job, KestrelError>;
}

#[derive(serde::Serialize, serde::Deserialize)]
struct Envelope {
    id: Uuid,
    job_type: String,
    error_count: u32,
    error_message: Option<String>,
    payload: Value,
}

type DecodeFn = Box<dyn Fn(&Value) -> Result<Box<dyn JobBody>, serde_json::Error> + Send + Sync>;

/// Registry mapping a job body's `job_type` tag to its deserializer.
///
/// Register each concrete `JobBody` type under the tag it reports from
/// `job_type()`, then hand the registry to a [`JsonJobCodec`].
#[derive(Default)]
pub struct CodecRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concrete job body type under `job_type`.
    ///
    /// # Panics
    ///
    /// Panics if a decoder is already registered for this tag.
    pub fn register<B>(&mut self, job_type: &'static str)
    where
        B: JobBody + DeserializeOwned + 'static,
    {
        if self.decoders.contains_key(job_type) {
            panic!("codec already registered for job type: {job_type}");
        }
        let decode: DecodeFn = Box::new(|payload: &Value| {
            let body: B = serde_json::from_value(payload.clone())?;
            Ok(Box::new(body) as Box<dyn JobBody>)
        });
        self.decoders.insert(job_type, decode);
    }

    fn decode(&self, job_type: &str, payload: &Value) -> Result<Box<dyn JobBody>, serde_json::Error> {
        match self.decoders.get(job_type) {
            Some(decode) => decode(payload),
            None => Err(serde::de::Error::custom(format!(
                "unknown job type: {job_type}"
            ))),
        }
    }

    /// Whether a decoder is registered for `job_type`.
    pub fn has(&self, job_type: &str) -> bool {
        self.decoders.contains_key(job_type)
    }
}

/// JSON-backed [`JobCodec`] driven by a [`CodecRegistry`].
///
/// `DurableJobQueue` requires the encoded bytes to be valid UTF-8 (they are
/// stored as one JSON line per log record); `JsonJobCodec` always satisfies
/// that since `serde_json::to_vec` emits UTF-8.
pub struct JsonJobCodec {
    registry: Arc<CodecRegistry>,
}

impl JsonJobCodec {
    /// Build a codec backed by the given registry.
    pub fn new(registry: Arc<CodecRegistry>) -> Self {
        Self { registry }
    }
}

impl JobCodec for JsonJobCodec {
    fn encode(&self, job: &Job) -> Result<Vec<u8>, KestrelError> {
        let envelope = Envelope {
            id: job.id,
            job_type: job.job_type().to_string(),
            error_count: job.error_count,
            error_message: job.error_message.clone(),
            payload: job.body.to_json(),
        };
        serde_json::to_vec(&envelope)
            .map_err(|source| QueueError::Codec {
                name: "json".to_string(),
                source,
            })
            .map_err(Into::into)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Job, KestrelError> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|source| QueueError::Codec {
                name: "json".to_string(),
                source,
            })?;
        let body = self
            .registry
            .decode(&envelope.job_type, &envelope.payload)
            .map_err(|source| QueueError::Codec {
                name: "json".to_string(),
                source,
            })?;
        Ok(Job::from_parts(
            envelope.id,
            body,
            envelope.error_count,
            envelope.error_message,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ClassifiedError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Greet {
        name: String,
    }

    #[async_trait::async_trait]
    impl JobBody for Greet {
        async fn execute(&self) -> Result<(), ClassifiedError> {
            Ok(())
        }

        fn describe(&self) -> String {
            format!("greet:{}", self.name)
        }

        fn job_type(&self) -> &'static str {
            "test:greet"
        }

        fn to_json(&self) -> Value {
            serde_json::to_value(self).unwrap()
        }
    }

    #[test]
    fn round_trips_through_registry() {
        let mut registry = CodecRegistry::new();
        registry.register::<Greet>("test:greet");
        let codec = JsonJobCodec::new(Arc::new(registry));

        let job = Job::new(Greet {
            name: "ada".to_string(),
        });
        let original_id = job.id;

        let bytes = codec.encode(&job).unwrap();
        let decoded = codec.decode(&bytes).unwrap();

        assert_eq!(decoded.id, original_id);
        assert_eq!(decoded.describe(), "greet:ada");
    }

    #[test]
    fn unknown_job_type_fails_to_decode() {
        let registry = CodecRegistry::new();
        let codec = JsonJobCodec::new(Arc::new(registry));

        let job = Job::new(Greet {
            name: "ada".to_string(),
        });
        let bytes = codec.encode(&job).unwrap();

        assert!(codec.decode(&bytes).is_err());
    }
}
