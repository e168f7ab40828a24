//! Content fingerprints used to detect resubmitted inputs.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::{types::Fingerprint, QueueError, QueueResult};

const CHUNK_SIZE: usize = 64 * 1024;

pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    Fingerprint(hex::encode(Sha256::digest(bytes)))
}

/// Hash a file without loading it in memory.
pub async fn fingerprint_file(path: &Path) -> QueueResult<Fingerprint> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| QueueError::io(format!("open {}", path.display()), e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|e| QueueError::io(format!("read {}", path.display()), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(Fingerprint(hex::encode(hasher.finalize())))
}
