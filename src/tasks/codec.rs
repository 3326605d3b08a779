//! # Serialization boundary for task payloads.
//!
//! [`Codec`] is the seam between the in-memory [`Task`] and the bytes a broker
//! moves around. Publishers encode, subscribers decode; the engine itself never
//! inspects wire bytes. [`JsonCodec`] is the local default; a distributed
//! backend brings its own implementation behind the same trait.

use crate::error::CodecError;
use crate::tasks::Task;

/// Encodes tasks to wire bytes and back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes the task for transport.
    fn encode(&self, task: &Task) -> Result<Vec<u8>, CodecError>;

    /// Reconstructs a task from wire bytes.
    ///
    /// The returned task has `meta.received` unset; the subscriber stamps it.
    fn decode(&self, bytes: &[u8]) -> Result<Task, CodecError>;
}

/// JSON wire format backed by serde_json.
///
/// Human-readable and good enough for the in-process broker; swap for a binary
/// codec behind the same trait when wire size matters.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, task: &Task) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(task).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Task, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_routing_and_payload() {
        let codec = JsonCodec;
        let task = Task::new("echo", b"hi".to_vec())
            .with_queue("main")
            .with_max_retries(3);

        let bytes = codec.encode(&task).expect("encode");
        let back = codec.decode(&bytes).expect("decode");

        assert_eq!(back.task_type, "echo");
        assert_eq!(back.payload, b"hi");
        assert_eq!(back.meta.queue_name, "main");
        assert_eq!(back.meta.max_retries, Some(3));
        assert_eq!(back.correlation_id, task.correlation_id);
    }

    #[test]
    fn garbage_bytes_fail_with_decode_error() {
        let codec = JsonCodec;
        let err = codec.decode(b"not json at all").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
