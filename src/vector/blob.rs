//! `vectors.idx` codec.
//!
//! ```text
//! offset  size              field
//! 0       4                 magic "QIDX"
//! 4       4                 format version (u32)
//! 8       4                 variant tag (u32: 0 flat, 1 ivf-flat)
//! 12      4                 dimension (u32)
//! 16      8                 vector count (u64)
//! 24      4                 list count (u32, 0 for flat)
//! 28      nlist*dim*4       centroids (f32)
//! ..      count*4           list assignment per vector (u32, absent when nlist = 0)
//! ..      count*dim*4       vectors (f32)
//! ```
//!
//! All integers and floats are little-endian. The file is read through a
//! read-only memory map and every section is bounds-checked against the
//! header before any value is decoded.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use super::types::{IndexVariant, VectorDimension};
use super::{VectorStoreError, VectorStoreResult};

pub(crate) const BLOB_MAGIC: &[u8; 4] = b"QIDX";
pub(crate) const BLOB_VERSION: u32 = 1;
pub(crate) const HEADER_LEN: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlobHeader {
    pub variant: IndexVariant,
    pub dimension: usize,
    pub count: usize,
    pub nlist: usize,
}

impl BlobHeader {
    fn assignment_count(&self) -> usize {
        if self.nlist == 0 { 0 } else { self.count }
    }

    /// Total file length implied by the header, `None` on overflow.
    fn expected_len(&self) -> Option<usize> {
        let centroids = self.nlist.checked_mul(self.dimension)?.checked_mul(4)?;
        let assignments = self.assignment_count().checked_mul(4)?;
        let vectors = self.count.checked_mul(self.dimension)?.checked_mul(4)?;
        HEADER_LEN
            .checked_add(centroids)?
            .checked_add(assignments)?
            .checked_add(vectors)
    }

    fn parse(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("file is {} bytes, shorter than the header", bytes.len()));
        }
        if &bytes[0..4] != BLOB_MAGIC {
            return Err("bad magic".to_string());
        }
        let version = read_u32(bytes, 4);
        if version != BLOB_VERSION {
            return Err(format!("unsupported format version {version}"));
        }
        let tag = read_u32(bytes, 8);
        let variant =
            IndexVariant::from_tag(tag).ok_or_else(|| format!("unknown variant tag {tag}"))?;
        let dimension = read_u32(bytes, 12) as usize;
        let count = usize::try_from(read_u64(bytes, 16))
            .map_err(|_| "vector count does not fit in memory".to_string())?;
        let nlist = read_u32(bytes, 24) as usize;

        if dimension == 0 {
            return Err("dimension is zero".to_string());
        }
        match variant {
            IndexVariant::Flat if nlist != 0 => {
                return Err(format!("flat index declares {nlist} lists"));
            }
            IndexVariant::IvfFlat if nlist == 0 => {
                return Err("ivf-flat index declares no lists".to_string());
            }
            _ => {}
        }

        Ok(Self {
            variant,
            dimension,
            count,
            nlist,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(BLOB_MAGIC);
        out.extend_from_slice(&BLOB_VERSION.to_le_bytes());
        out.extend_from_slice(&self.variant.tag().to_le_bytes());
        out.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        out.extend_from_slice(&(self.count as u64).to_le_bytes());
        out.extend_from_slice(&(self.nlist as u32).to_le_bytes());
    }
}

/// Owned contents of a validated blob.
#[derive(Debug)]
pub(crate) struct DecodedBlob {
    pub variant: IndexVariant,
    pub dimension: VectorDimension,
    pub count: usize,
    pub nlist: usize,
    pub centroids: Vec<f32>,
    pub assignments: Vec<u32>,
    pub vectors: Vec<f32>,
}

pub(crate) fn encode(
    header: &BlobHeader,
    centroids: &[f32],
    assignments: &[u32],
    vectors: &[f32],
) -> Vec<u8> {
    debug_assert_eq!(centroids.len(), header.nlist * header.dimension);
    debug_assert_eq!(assignments.len(), header.assignment_count());
    debug_assert_eq!(vectors.len(), header.count * header.dimension);

    let mut out = Vec::with_capacity(header.expected_len().unwrap_or(HEADER_LEN));
    header.write(&mut out);
    for value in centroids {
        out.extend_from_slice(&value.to_le_bytes());
    }
    for list in assignments {
        out.extend_from_slice(&list.to_le_bytes());
    }
    for value in vectors {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub(crate) fn decode(bytes: &[u8]) -> Result<DecodedBlob, String> {
    let header = BlobHeader::parse(bytes)?;
    let expected = header
        .expected_len()
        .ok_or_else(|| "section sizes overflow".to_string())?;
    if bytes.len() != expected {
        return Err(format!(
            "header declares {} vectors of dimension {} ({expected} bytes) but file is {} bytes",
            header.count,
            header.dimension,
            bytes.len()
        ));
    }

    let centroid_end = HEADER_LEN + header.nlist * header.dimension * 4;
    let assignment_end = centroid_end + header.assignment_count() * 4;

    let centroids = read_f32s(&bytes[HEADER_LEN..centroid_end]);
    let assignments: Vec<u32> = bytes[centroid_end..assignment_end]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if let Some(bad) = assignments.iter().find(|&&list| list as usize >= header.nlist) {
        return Err(format!(
            "vector assigned to list {bad} of {}",
            header.nlist
        ));
    }
    let vectors = read_f32s(&bytes[assignment_end..]);

    Ok(DecodedBlob {
        variant: header.variant,
        dimension: VectorDimension::new(header.dimension).map_err(|e| e.to_string())?,
        count: header.count,
        nlist: header.nlist,
        centroids,
        assignments,
        vectors,
    })
}

/// Map and decode the blob at `path`.
pub(crate) fn read_blob(path: &Path) -> VectorStoreResult<DecodedBlob> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(VectorStoreError::integrity(
                path,
                "index blob is missing next to its sidecar",
            ));
        }
        Err(e) => return Err(VectorStoreError::Io(e)),
    };
    let len = file.metadata()?.len();
    if (len as usize) < HEADER_LEN {
        return Err(VectorStoreError::integrity(
            path,
            format!("file is {len} bytes, shorter than the header"),
        ));
    }

    // SAFETY: the map is read-only and dropped before this function returns;
    // the artifact is only replaced by atomic rename, never modified in place.
    let mmap = unsafe { Mmap::map(&file)? };
    decode(&mmap).map_err(|reason| VectorStoreError::integrity(path, reason))
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

fn read_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
