use super::SnapshotCodec;
use crate::{job::JobRecord, QueueResult};

/// MessagePack with named fields, so records stay readable after fields are added.
pub struct MsgpackCodec;

impl SnapshotCodec for MsgpackCodec {
    fn encode_record(&self, record: &JobRecord) -> QueueResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(record)?)
    }

    fn decode_record(&self, bytes: &[u8]) -> QueueResult<JobRecord> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    fn codec_id(&self) -> &'static str {
        "msgpack"
    }

    fn tag(&self) -> u8 {
        1
    }
}
