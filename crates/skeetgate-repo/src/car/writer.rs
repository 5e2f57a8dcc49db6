//! CAR file writing utilities

use crate::error::{ProofError, Result};
use bytes::Bytes;
use cid::Cid as IpldCid;
use iroh_car::CarWriter;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Write blocks to CAR file
///
/// Roots should contain the commit CID.
/// Blocks are written in sorted CID order (BTreeMap) for determinism.
pub async fn write_car(
    path: impl AsRef<Path>,
    roots: Vec<IpldCid>,
    blocks: BTreeMap<IpldCid, Bytes>,
) -> Result<()> {
    let file = File::create(path).await.map_err(ProofError::storage)?;

    let header = iroh_car::CarHeader::new_v1(roots);
    let mut writer = CarWriter::new(header, file);

    for (cid, data) in blocks {
        writer
            .write(cid, data.as_ref())
            .await
            .map_err(ProofError::car)?;
    }

    writer.finish().await.map_err(ProofError::car)?;

    Ok(())
}

/// Write blocks to CAR bytes (in-memory)
///
/// Like `write_car()` but writes to a `Vec<u8>` with a single root.
pub async fn write_car_bytes(root: IpldCid, blocks: BTreeMap<IpldCid, Bytes>) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let header = iroh_car::CarHeader::new_v1(vec![root]);
    let mut writer = CarWriter::new(header, &mut buffer);

    for (cid, data) in blocks {
        writer
            .write(cid, data.as_ref())
            .await
            .map_err(ProofError::car)?;
    }

    writer.finish().await.map_err(ProofError::car)?;

    buffer.flush().await.map_err(ProofError::storage)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::reader::{parse_car_bytes, read_car};
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_write_then_parse_bytes() {
        let mut blocks = BTreeMap::new();
        let data = Bytes::from_static(b"commit");
        let root = crate::hash::compute_cid(&data).unwrap();
        blocks.insert(root, data.clone());
        let other = Bytes::from_static(b"node");
        let other_cid = crate::hash::compute_cid(&other).unwrap();
        blocks.insert(other_cid, other.clone());

        let car = write_car_bytes(root, blocks).await.unwrap();
        let parsed = parse_car_bytes(&car).await.unwrap();

        assert_eq!(parsed.roots, vec![root]);
        assert_eq!(parsed.blocks.get(&root), Some(&data));
        assert_eq!(parsed.blocks.get(&other_cid), Some(&other));
    }

    #[tokio::test]
    async fn test_write_car_file() {
        let mut blocks = BTreeMap::new();
        let data = Bytes::from_static(b"record");
        let cid = crate::hash::compute_cid(&data).unwrap();
        blocks.insert(cid, data);

        let temp_file = NamedTempFile::new().unwrap();
        write_car(temp_file.path(), vec![cid], blocks).await.unwrap();

        let parsed = read_car(temp_file.path()).await.unwrap();
        assert_eq!(parsed.roots, vec![cid]);
        assert_eq!(parsed.blocks.len(), 1);
    }
}
