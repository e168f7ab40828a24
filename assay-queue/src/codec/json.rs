use super::SnapshotCodec;
use crate::{job::JobRecord, QueueResult};

/// JSON records; larger than MessagePack but easy to inspect.
pub struct JsonCodec;

impl SnapshotCodec for JsonCodec {
    fn encode_record(&self, record: &JobRecord) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(record)?)
    }

    fn decode_record(&self, bytes: &[u8]) -> QueueResult<JobRecord> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn codec_id(&self) -> &'static str {
        "json"
    }

    fn tag(&self) -> u8 {
        2
    }
}
