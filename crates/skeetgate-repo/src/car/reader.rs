//! CAR file reading utilities

use crate::error::{ProofError, Result};
use bytes::Bytes;
use cid::Cid as IpldCid;
use iroh_car::CarReader;
use n0_future::stream::StreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncRead;

/// Parsed CAR file data
#[derive(Debug, Clone)]
pub struct ParsedCar {
    /// Root CIDs from the CAR header, in header order
    pub roots: Vec<IpldCid>,
    /// All blocks in the CAR file
    pub blocks: BTreeMap<IpldCid, Bytes>,
}

/// Read entire CAR file into memory
///
/// For large CAR files this holds everything in memory; proof CARs are small.
pub async fn read_car(path: impl AsRef<Path>) -> Result<ParsedCar> {
    let file = File::open(path).await.map_err(ProofError::storage)?;
    parse_car(file).await
}

/// Parse CAR bytes into roots and block map
///
/// For in-memory CAR data (e.g. a `sync.getRecord` response body).
/// Blocks are taken as-is; their hashes are checked when proof code reads them.
pub async fn parse_car_bytes(data: &[u8]) -> Result<ParsedCar> {
    parse_car(data).await
}

async fn parse_car<R: AsyncRead + Send + Unpin>(input: R) -> Result<ParsedCar> {
    let reader = CarReader::new(input).await.map_err(ProofError::car)?;
    let roots = reader.header().roots().to_vec();

    let mut blocks = BTreeMap::new();
    let stream = reader.stream();
    n0_future::pin!(stream);

    while let Some(result) = stream.next().await {
        let (cid, data) = result.map_err(ProofError::car)?;
        blocks.insert(cid, Bytes::from(data));
    }

    tracing::trace!(roots = roots.len(), blocks = blocks.len(), "parsed CAR");
    Ok(ParsedCar { roots, blocks })
}
