//! Flat L2 Index
//!
//! Brute-force Euclidean search over vectors stored contiguously in memory.
//!
//! On-disk layout (all little-endian):
//!
//! ```text
//! magic    8 bytes  "DRAGFLAT"
//! version  u32
//! dim      u32
//! count    u64
//! vectors  count × dim × f32
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::{IndexError, NearestNeighbors, Neighbor};

const MAGIC: &[u8; 8] = b"DRAGFLAT";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dim: usize) -> Self {
        Self { dim, data: Vec::new() }
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch { expected: self.dim, actual: vector.len() });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), IndexError> {
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&(self.dim as u32).to_le_bytes())?;
        writer.write_all(&(self.len() as u64).to_le_bytes())?;
        for val in &self.data {
            writer.write_all(&val.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, IndexError> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(IndexError::InvalidFormat("bad magic".to_string()));
        }

        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        let version = u32::from_le_bytes(word);
        if version != FORMAT_VERSION {
            return Err(IndexError::InvalidFormat(format!("unsupported version {}", version)));
        }

        reader.read_exact(&mut word)?;
        let dim = u32::from_le_bytes(word) as usize;

        let mut long = [0u8; 8];
        reader.read_exact(&mut long)?;
        let count = u64::from_le_bytes(long) as usize;

        let expected = count
            .checked_mul(dim)
            .and_then(|total| total.checked_mul(4))
            .ok_or_else(|| IndexError::InvalidFormat("vector count overflows".to_string()))?;

        // One byte past the expected size is enough to detect trailing data.
        let mut bytes = Vec::new();
        reader
            .by_ref()
            .take((expected as u64).saturating_add(1))
            .read_to_end(&mut bytes)?;
        if bytes.len() != expected {
            return Err(IndexError::InvalidFormat(format!(
                "expected {} bytes of vector data, found {}",
                expected,
                bytes.len()
            )));
        }

        let data = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dim, data })
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl NearestNeighbors for FlatL2Index {
    fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    /// Returns `min(k, len)` neighbors ordered by ascending distance, ties
    /// broken by position.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if k == 0 || self.dim == 0 {
            return Ok(Vec::new());
        }

        let mut scores: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(position, vector)| Neighbor { position, distance: squared_l2(query, vector) })
            .collect();

        scores.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.position.cmp(&b.position))
        });
        scores.truncate(k);
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatL2Index {
        let mut index = FlatL2Index::new(2);
        index.add(&[0.0, 0.0]).unwrap();
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 3.0]).unwrap();
        index.add(&[1.0, 0.0]).unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_distance_then_position() {
        let index = sample();
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 3, 0]);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[2].distance, 1.0);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = sample();
        assert_eq!(index.search(&[0.0, 0.0], 10).unwrap().len(), 4);
        assert!(index.search(&[0.0, 0.0], 0).unwrap().is_empty());
        assert!(FlatL2Index::new(2).search(&[0.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatL2Index::new(3);
        assert!(matches!(
            index.add(&[1.0]),
            Err(IndexError::DimensionMismatch { expected: 3, actual: 1 })
        ));
        assert!(matches!(index.search(&[1.0, 2.0], 1), Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let index = sample();
        index.save(&path).unwrap();

        let loaded = FlatL2Index::load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.search(&[0.0, 3.0], 1).unwrap()[0].position, 2);
    }

    #[test]
    fn test_header_layout() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[..8], b"DRAGFLAT");
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 2);
        assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), 4);
        assert_eq!(bytes.len(), 24 + 4 * 2 * 4);
    }

    #[test]
    fn test_rejects_bad_magic_and_truncation() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes).unwrap();

        let mut wrong = bytes.clone();
        wrong[0] = b'X';
        assert!(matches!(
            FlatL2Index::read_from(&mut wrong.as_slice()),
            Err(IndexError::InvalidFormat(_))
        ));

        let mut trailing = bytes.clone();
        trailing.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            FlatL2Index::read_from(&mut trailing.as_slice()),
            Err(IndexError::InvalidFormat(_))
        ));

        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            FlatL2Index::read_from(&mut bytes.as_slice()),
            Err(IndexError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_header_count() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&(1u64 << 62).to_le_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes());

        assert!(matches!(
            FlatL2Index::read_from(&mut bytes.as_slice()),
            Err(IndexError::InvalidFormat(_))
        ));
    }
}
