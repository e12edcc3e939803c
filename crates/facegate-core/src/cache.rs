//! On-disk gallery cache.
//!
//! Layout (all integers little endian):
//!
//! ```text
//! magic    "FGC1"
//! version  u32
//! dim      u32            embedding length shared by every record
//! count    u32
//! record*  name_len u32, name (UTF-8), dim × f32
//! digest   32 bytes       SHA-256 of everything above
//! ```

use crate::types::{Embedding, GalleryEntry};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CACHE_MAGIC: &[u8; 4] = b"FGC1";
const CACHE_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O: {0}")]
    Io(#[from] io::Error),
    #[error("cache corrupt: {0}")]
    Corrupt(String),
    #[error("unsupported cache version {0}")]
    UnsupportedVersion(u32),
    #[error("embedding dimension mismatch: expected {expected}, got {got} for {person_id}")]
    DimensionMismatch {
        person_id: String,
        expected: usize,
        got: usize,
    },
}

/// Serialize gallery entries into the cache format.
pub fn encode(entries: &[GalleryEntry]) -> Result<Vec<u8>, CacheError> {
    let dim = entries.first().map(|e| e.embedding.dim()).unwrap_or(0);

    let mut buf = Vec::with_capacity(HEADER_LEN + entries.len() * (8 + dim * 4) + DIGEST_LEN);
    buf.extend_from_slice(CACHE_MAGIC);
    buf.extend_from_slice(&CACHE_VERSION.to_le_bytes());
    buf.extend_from_slice(&(dim as u32).to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    for entry in entries {
        if entry.embedding.dim() != dim {
            return Err(CacheError::DimensionMismatch {
                person_id: entry.person_id.clone(),
                expected: dim,
                got: entry.embedding.dim(),
            });
        }
        let name = entry.person_id.as_bytes();
        buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
        buf.extend_from_slice(name);
        for v in &entry.embedding.values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    let digest = Sha256::digest(&buf);
    buf.extend_from_slice(&digest);
    Ok(buf)
}

/// Byte cursor over a cache body.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CacheError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| CacheError::Corrupt(format!("truncated at byte {}", self.pos)))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, CacheError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self) -> Result<f32, CacheError> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Parse a cache blob, verifying magic, version, and digest.
pub fn decode(data: &[u8]) -> Result<Vec<GalleryEntry>, CacheError> {
    if data.len() < HEADER_LEN + DIGEST_LEN {
        return Err(CacheError::Corrupt(format!("file too short ({} bytes)", data.len())));
    }
    let (body, digest) = data.split_at(data.len() - DIGEST_LEN);
    if Sha256::digest(body).as_slice() != digest {
        return Err(CacheError::Corrupt("checksum mismatch".into()));
    }

    let mut r = Reader { data: body, pos: 0 };
    if r.take(4)? != CACHE_MAGIC {
        return Err(CacheError::Corrupt("bad magic".into()));
    }
    let version = r.u32()?;
    if version != CACHE_VERSION {
        return Err(CacheError::UnsupportedVersion(version));
    }
    let dim = r.u32()? as usize;
    let count = r.u32()? as usize;

    let mut entries = Vec::new();
    for _ in 0..count {
        let name_len = r.u32()? as usize;
        let person_id = std::str::from_utf8(r.take(name_len)?)
            .map_err(|e| CacheError::Corrupt(format!("person id not UTF-8: {e}")))?
            .to_string();
        let values = (0..dim).map(|_| r.f32()).collect::<Result<Vec<_>, _>>()?;
        entries.push(GalleryEntry {
            person_id,
            embedding: Embedding::new(values),
        });
    }

    if r.pos != body.len() {
        return Err(CacheError::Corrupt(format!(
            "{} trailing bytes after {count} records",
            body.len() - r.pos
        )));
    }
    Ok(entries)
}

/// Read the cache at `path`. `Ok(None)` when no cache file exists.
pub fn read(path: &Path) -> Result<Option<Vec<GalleryEntry>>, CacheError> {
    match std::fs::read(path) {
        Ok(data) => decode(&data).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write the cache atomically (temp file + rename).
pub fn write(path: &Path, entries: &[GalleryEntry]) -> Result<(), CacheError> {
    let data = encode(entries)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let result = std::fs::write(&tmp, &data).and_then(|_| std::fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Delete the cache file if present.
pub fn invalidate(path: &Path) -> Result<(), CacheError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<GalleryEntry> {
        vec![
            GalleryEntry {
                person_id: "alice".into(),
                embedding: Embedding::new(vec![0.125, -0.5, 1.0e-7]),
            },
            GalleryEntry {
                person_id: "björn".into(),
                embedding: Embedding::new(vec![f32::MAX, 0.0, -3.25]),
            },
        ]
    }

    #[test]
    fn test_file_roundtrip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.bin");

        write(&path, &sample()).unwrap();
        let loaded = read(&path).unwrap().unwrap();

        assert_eq!(loaded.len(), 2);
        for (a, b) in loaded.iter().zip(sample().iter()) {
            assert_eq!(a.person_id, b.person_id);
            for (x, y) in a.embedding.values.iter().zip(b.embedding.values.iter()) {
                assert!((x - y).abs() <= 1e-6 * y.abs().max(1.0));
            }
        }
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&dir.path().join("absent.bin")).unwrap().is_none());
    }

    #[test]
    fn test_flipped_byte_is_corrupt() {
        let mut data = encode(&sample()).unwrap();
        data[HEADER_LEN + 2] ^= 0xff;
        assert!(matches!(decode(&data), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        assert!(matches!(decode(b"not a cache"), Err(CacheError::Corrupt(_))));
        assert!(matches!(decode(&[0u8; 64]), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut body = encode(&sample()).unwrap();
        body.truncate(body.len() - DIGEST_LEN);
        body[4..8].copy_from_slice(&9u32.to_le_bytes());
        let digest = Sha256::digest(&body);
        body.extend_from_slice(&digest);
        assert!(matches!(decode(&body), Err(CacheError::UnsupportedVersion(9))));
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        let mut entries = sample();
        entries[1].embedding.values.pop();
        assert!(matches!(
            encode(&entries),
            Err(CacheError::DimensionMismatch { expected: 3, got: 2, .. })
        ));
    }

    #[test]
    fn test_empty_roundtrip() {
        assert!(decode(&encode(&[]).unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_invalidate_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.bin");
        invalidate(&path).unwrap();
        write(&path, &sample()).unwrap();
        invalidate(&path).unwrap();
        assert!(!path.exists());
    }
}
