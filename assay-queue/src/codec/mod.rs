//! Snapshot encoding.
//!
//! A snapshot is a small header followed by length-prefixed job records:
//!
//! ```text
//! magic "ASQ1" | version u16 | codec tag u8 | count u32 | (len u32 | record)*
//! ```
//!
//! All integers are big-endian. The codec tag tells the reader which
//! [`SnapshotCodec`] encoded the records, so the default codec can change
//! without breaking existing snapshots.

pub mod json;
pub mod msgpack;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tracing::warn;

use crate::{job::JobRecord, QueueError, QueueResult};

pub use json::JsonCodec;
pub use msgpack::MsgpackCodec;

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"ASQ1";
pub const SNAPSHOT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 1 + 4;

/// Encodes a single job record.
pub trait SnapshotCodec: Send + Sync {
    fn encode_record(&self, record: &JobRecord) -> QueueResult<Vec<u8>>;

    fn decode_record(&self, bytes: &[u8]) -> QueueResult<JobRecord>;

    /// Codec name used in configuration
    fn codec_id(&self) -> &'static str;

    /// Tag written in the snapshot header
    fn tag(&self) -> u8;
}

/// Codecs known to this process, one of them used for writing.
pub struct CodecRegistry {
    codecs: HashMap<u8, Arc<dyn SnapshotCodec>>,
    default_tag: u8,
}

impl CodecRegistry {
    /// Registry with MessagePack as default and JSON available.
    pub fn new() -> Self {
        let mut registry = Self {
            codecs: HashMap::new(),
            default_tag: MsgpackCodec.tag(),
        };
        registry.register(Arc::new(MsgpackCodec));
        registry.register(Arc::new(JsonCodec));
        registry
    }

    pub fn register(&mut self, codec: Arc<dyn SnapshotCodec>) {
        self.codecs.insert(codec.tag(), codec);
    }

    /// Select the codec used by [`CodecRegistry::encode`].
    pub fn set_default_codec(&mut self, codec_id: &str) -> QueueResult<()> {
        let tag = self
            .codecs
            .values()
            .find(|codec| codec.codec_id() == codec_id)
            .map(|codec| codec.tag())
            .ok_or_else(|| QueueError::invalid_argument(format!("unknown snapshot codec: {}", codec_id)))?;
        self.default_tag = tag;
        Ok(())
    }

    pub fn default_codec(&self) -> QueueResult<Arc<dyn SnapshotCodec>> {
        self.by_tag(self.default_tag)
    }

    fn by_tag(&self, tag: u8) -> QueueResult<Arc<dyn SnapshotCodec>> {
        self.codecs
            .get(&tag)
            .cloned()
            .ok_or_else(|| QueueError::SnapshotCorrupt(format!("unknown codec tag {}", tag)))
    }

    pub fn encode(&self, records: &[JobRecord]) -> QueueResult<Vec<u8>> {
        let codec = self.default_codec()?;
        let count = u32::try_from(records.len())
            .map_err(|_| QueueError::Serialization("too many records".to_string()))?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + records.len() * 256);
        buf.put_slice(SNAPSHOT_MAGIC);
        buf.put_u16(SNAPSHOT_VERSION);
        buf.put_u8(codec.tag());
        buf.put_u32(count);

        for record in records {
            let encoded = codec.encode_record(record)?;
            let len = u32::try_from(encoded.len())
                .map_err(|_| QueueError::Serialization(format!("record {} too large", record.id)))?;
            buf.put_u32(len);
            buf.put_slice(&encoded);
        }
        Ok(buf.to_vec())
    }

    /// Decode a snapshot. Records that fail to decode are logged and
    /// skipped; a damaged header or a truncated stream is an error.
    pub fn decode(&self, bytes: &[u8]) -> QueueResult<Vec<JobRecord>> {
        let mut buf = bytes;
        if buf.remaining() < HEADER_LEN {
            return Err(QueueError::SnapshotCorrupt("truncated header".to_string()));
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != SNAPSHOT_MAGIC {
            return Err(QueueError::SnapshotCorrupt("bad magic".to_string()));
        }
        let version = buf.get_u16();
        if version != SNAPSHOT_VERSION {
            return Err(QueueError::SnapshotCorrupt(format!(
                "unsupported version {}",
                version
            )));
        }
        let codec = self.by_tag(buf.get_u8())?;
        let count = buf.get_u32() as usize;

        let mut records = Vec::with_capacity(count.min(4096));
        for index in 0..count {
            if buf.remaining() < 4 {
                return Err(QueueError::SnapshotCorrupt(format!("record {} truncated", index)));
            }
            let len = buf.get_u32() as usize;
            if buf.remaining() < len {
                return Err(QueueError::SnapshotCorrupt(format!("record {} truncated", index)));
            }
            let (record, rest) = buf.split_at(len);
            buf = rest;

            match codec.decode_record(record) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping unreadable snapshot record {}: {}", index, e),
            }
        }

        if buf.has_remaining() {
            return Err(QueueError::SnapshotCorrupt(format!(
                "{} trailing bytes",
                buf.remaining()
            )));
        }
        Ok(records)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::types::{JobResult, JobStatus};
    use std::path::Path;

    fn records() -> Vec<JobRecord> {
        let done = Job::new_uploaded(None, None, Path::new("/srv/results"));
        done.start().unwrap();
        done.complete(None, JobResult { num_cases: 12.0, ..Default::default() }).unwrap();
        let pending = Job::new_remote(
            url::Url::parse("https://example.com/log.csv").unwrap(),
            Some(url::Url::parse("https://example.com/hook").unwrap()),
            None,
            Path::new("/srv/results"),
        );
        vec![done.record(), pending.record()]
    }

    #[test]
    fn round_trip_with_each_codec() {
        for codec in ["msgpack", "json"] {
            let mut registry = CodecRegistry::new();
            registry.set_default_codec(codec).unwrap();
            let original = records();

            let bytes = registry.encode(&original).unwrap();
            let decoded = CodecRegistry::new().decode(&bytes).unwrap();

            assert_eq!(decoded, original, "codec {}", codec);
            assert_eq!(decoded[0].status, JobStatus::Completed);
            assert_eq!(decoded[0].completed_at, original[0].completed_at);
        }
    }

    #[test]
    fn unknown_codec_name_is_rejected() {
        let mut registry = CodecRegistry::new();
        assert!(registry.set_default_codec("gob").is_err());
    }

    #[test]
    fn damaged_headers_are_corrupt() {
        let registry = CodecRegistry::new();
        assert!(matches!(registry.decode(b"AS"), Err(QueueError::SnapshotCorrupt(_))));
        assert!(matches!(
            registry.decode(b"NOPE\x00\x01\x01\x00\x00\x00\x00"),
            Err(QueueError::SnapshotCorrupt(_))
        ));
        assert!(matches!(
            registry.decode(b"ASQ1\x00\x09\x01\x00\x00\x00\x00"),
            Err(QueueError::SnapshotCorrupt(_))
        ));
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let registry = CodecRegistry::new();
        let bytes = registry.encode(&records()).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(registry.decode(cut), Err(QueueError::SnapshotCorrupt(_))));
    }

    #[test]
    fn unreadable_record_is_skipped() {
        let registry = CodecRegistry::new();
        let good = records().remove(0);
        let encoded = MsgpackCodec.encode_record(&good).unwrap();

        let mut buf = BytesMut::new();
        buf.put_slice(SNAPSHOT_MAGIC);
        buf.put_u16(SNAPSHOT_VERSION);
        buf.put_u8(MsgpackCodec.tag());
        buf.put_u32(2);
        buf.put_u32(3);
        buf.put_slice(b"\xc1\xc1\xc1");
        buf.put_u32(encoded.len() as u32);
        buf.put_slice(&encoded);

        let decoded = registry.decode(&buf).unwrap();
        assert_eq!(decoded, vec![good]);
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let registry = CodecRegistry::new();
        let bytes = registry.encode(&[]).unwrap();
        assert!(registry.decode(&bytes).unwrap().is_empty());
    }
}
