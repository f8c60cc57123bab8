use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use crc32fast::Hasher;
use log::error;
use memmap2::Mmap;

use crate::common::errors::BlockError;

/// Marks the end of every stream, followed by the crc32 of all preceding bytes.
pub const FOOTER_MAGIC: u32 = 0x3fd7_6c17;

/// Footer magic + crc32, both big-endian u32.
pub const FOOTER_LEN: usize = 8;

const WRITE_BUFFER_LEN: usize = 8192;

/// Appends a variable-length u32 (7 bits per byte, high bit = continuation).
pub fn put_vint(buf: &mut Vec<u8>, mut value: u32) {
    while value & !0x7F != 0 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Appends a variable-length u64.
pub fn put_vlong(buf: &mut Vec<u8>, mut value: u64) {
    while value & !0x7F != 0 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Reads a variable-length u32 from the front of `bytes`, advancing it.
pub fn get_vint(bytes: &mut &[u8]) -> Result<u32, BlockError> {
    let v = get_vlong(bytes)?;
    if v > u32::MAX as u64 {
        return Err(BlockError::DataCorruption(format!(
            "vint out of range: {v}"
        )));
    }
    Ok(v as u32)
}

/// Reads a variable-length u64 from the front of `bytes`, advancing it.
pub fn get_vlong(bytes: &mut &[u8]) -> Result<u64, BlockError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let Some((&byte, rest)) = bytes.split_first() else {
            return Err(BlockError::DataCorruption(
                "truncated variable-length integer".to_string(),
            ));
        };
        *bytes = rest;
        if shift >= 64 {
            return Err(BlockError::DataCorruption(
                "malformed variable-length integer".to_string(),
            ));
        }
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Append-only stream writer with a running crc32 over everything written.
///
/// `file_pointer` counts logical bytes, independent of the internal buffer, so
/// bookmarks taken while data is still buffered stay valid.
pub struct IndexOutput {
    file: File,
    path: PathBuf,
    buffer: Vec<u8>,
    crc: Hasher,
    fp: u64,
}

impl IndexOutput {
    pub fn create(path: &Path) -> Result<IndexOutput, BlockError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                error!("failed to create {:?}: {}", path, e);
                BlockError::from(e)
            })?;
        Ok(IndexOutput {
            file,
            path: path.to_path_buf(),
            buffer: Vec::with_capacity(WRITE_BUFFER_LEN),
            crc: Hasher::new(),
            fp: 0,
        })
    }

    pub fn file_pointer(&self) -> u64 {
        self.fp
    }

    pub fn write_byte(&mut self, b: u8) -> Result<(), BlockError> {
        self.write_bytes(&[b])
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BlockError> {
        self.crc.update(bytes);
        self.fp += bytes.len() as u64;
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() >= WRITE_BUFFER_LEN {
            self.flush_buffer()?;
        }
        Ok(())
    }

    pub fn write_vint(&mut self, value: u32) -> Result<(), BlockError> {
        self.write_vlong(value as u64)
    }

    pub fn write_vlong(&mut self, mut value: u64) -> Result<(), BlockError> {
        let mut scratch = [0u8; 10];
        let mut n = 0;
        while value & !0x7F != 0 {
            scratch[n] = (value as u8 & 0x7F) | 0x80;
            value >>= 7;
            n += 1;
        }
        scratch[n] = value as u8;
        self.write_bytes(&scratch[..=n])
    }

    /// Writes the footer magic and the stream checksum, then flushes. The
    /// footer bytes themselves are not part of the checksum.
    pub fn write_footer(&mut self) -> Result<(), BlockError> {
        let mut footer = [0u8; FOOTER_LEN];
        BigEndian::write_u32(&mut footer[..4], FOOTER_MAGIC);
        let crc = self.crc.clone().finalize();
        BigEndian::write_u32(&mut footer[4..], crc);
        self.fp += FOOTER_LEN as u64;
        self.buffer.extend_from_slice(&footer);
        self.flush_buffer()
    }

    pub fn flush(&mut self) -> Result<(), BlockError> {
        self.flush_buffer()?;
        self.file.flush().map_err(BlockError::from)
    }

    fn flush_buffer(&mut self) -> Result<(), BlockError> {
        if !self.buffer.is_empty() {
            self.file.write_all(&self.buffer).map_err(|e| {
                error!("failed to write {:?}: {}", self.path, e);
                BlockError::from(e)
            })?;
            self.buffer.clear();
        }
        Ok(())
    }
}

/// Read-only view over a memory-mapped stream.
///
/// Cloning shares the underlying map and gives the clone its own cursor, so a
/// clone per reader is the way to read one file from several positions.
#[derive(Clone)]
pub struct IndexInput {
    data: Arc<Mmap>,
    pos: usize,
}

impl IndexInput {
    pub fn open(path: &Path) -> Result<IndexInput, BlockError> {
        let file = File::open(path).map_err(|e| {
            error!("failed to open {:?}: {}", path, e);
            BlockError::from(e)
        })?;
        let meta = file.metadata().map_err(BlockError::from)?;
        if meta.len() == 0 {
            return Err(BlockError::DataCorruption(format!(
                "empty stream file: {:?}",
                path
            )));
        }
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
            error!("failed to mmap {:?}: {}", path, e);
            BlockError::from(e)
        })?;
        Ok(IndexInput {
            data: Arc::new(mmap),
            pos: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    pub fn seek(&mut self, fp: u64) -> Result<(), BlockError> {
        if fp as usize > self.data.len() {
            return Err(BlockError::DataCorruption(format!(
                "seek to {} past end of stream ({} bytes)",
                fp,
                self.data.len()
            )));
        }
        self.pos = fp as usize;
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8, BlockError> {
        if self.pos >= self.data.len() {
            return Err(self.eof_error(1));
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), BlockError> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            return Err(self.eof_error(buf.len()));
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    /// Reads `len` bytes into `scratch`, replacing its contents.
    pub fn read_into(&mut self, scratch: &mut Vec<u8>, len: usize) -> Result<(), BlockError> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(self.eof_error(len));
        }
        scratch.clear();
        scratch.extend_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    pub fn read_vint(&mut self) -> Result<u32, BlockError> {
        let mut rest = &self.data[self.pos..];
        let before = rest.len();
        let value = get_vint(&mut rest)?;
        self.pos += before - rest.len();
        Ok(value)
    }

    pub fn read_vlong(&mut self) -> Result<u64, BlockError> {
        let mut rest = &self.data[self.pos..];
        let before = rest.len();
        let value = get_vlong(&mut rest)?;
        self.pos += before - rest.len();
        Ok(value)
    }

    /// Recomputes the whole-stream checksum and compares it with the footer.
    pub fn verify_footer(&self) -> Result<(), BlockError> {
        let len = self.data.len();
        if len < FOOTER_LEN {
            return Err(BlockError::DataCorruption(format!(
                "stream too short for a footer: {} bytes",
                len
            )));
        }
        let body = &self.data[..len - FOOTER_LEN];
        let footer = &self.data[len - FOOTER_LEN..];
        let magic = BigEndian::read_u32(&footer[..4]);
        if magic != FOOTER_MAGIC {
            return Err(BlockError::DataCorruption(format!(
                "bad footer magic: {magic:#010x}"
            )));
        }
        let expected = BigEndian::read_u32(&footer[4..]);
        let mut hasher = Hasher::new();
        hasher.update(body);
        let actual = hasher.finalize();
        if actual != expected {
            error!(
                "checksum mismatch: expected {:#010x}, got {:#010x}",
                expected, actual
            );
            return Err(BlockError::ChecksumMismatch { expected, actual });
        }
        Ok(())
    }

    fn eof_error(&self, wanted: usize) -> BlockError {
        BlockError::DataCorruption(format!(
            "read of {} bytes at {} past end of stream ({} bytes)",
            wanted,
            self.pos,
            self.data.len()
        ))
    }
}

#[cfg(test)]
mod test {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_vint_roundtrip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream");
        let values = [0u32, 1, 127, 128, 16383, 16384, u32::MAX];
        let longs = [0u64, 5, 1 << 35, u64::MAX];

        let mut out = IndexOutput::create(&path).unwrap();
        for &v in &values {
            out.write_vint(v).unwrap();
        }
        for &v in &longs {
            out.write_vlong(v).unwrap();
        }
        out.write_footer().unwrap();

        let mut input = IndexInput::open(&path).unwrap();
        input.verify_footer().unwrap();
        for &v in &values {
            assert_eq!(input.read_vint().unwrap(), v);
        }
        for &v in &longs {
            assert_eq!(input.read_vlong().unwrap(), v);
        }
    }

    #[test]
    fn test_file_pointer_counts_buffered_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream");
        let mut out = IndexOutput::create(&path).unwrap();
        assert_eq!(out.file_pointer(), 0);
        out.write_byte(1).unwrap();
        out.write_bytes(&[2, 3, 4]).unwrap();
        assert_eq!(out.file_pointer(), 4);
        out.write_footer().unwrap();
        assert_eq!(out.file_pointer(), 4 + FOOTER_LEN as u64);
    }

    #[test]
    fn test_footer_detects_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream");
        let mut out = IndexOutput::create(&path).unwrap();
        out.write_bytes(b"hello postings").unwrap();
        out.write_footer().unwrap();
        drop(out);

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[3] ^= 0x40;
        std::fs::write(&path, &bytes).unwrap();

        let input = IndexInput::open(&path).unwrap();
        let err = input.verify_footer().unwrap_err();
        assert!(matches!(err, BlockError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_clone_has_independent_cursor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream");
        let mut out = IndexOutput::create(&path).unwrap();
        for b in 0u8..32 {
            out.write_byte(b).unwrap();
        }
        out.write_footer().unwrap();

        let mut a = IndexInput::open(&path).unwrap();
        let mut b = a.clone();
        a.seek(10).unwrap();
        assert_eq!(a.read_byte().unwrap(), 10);
        assert_eq!(b.read_byte().unwrap(), 0);
        b.seek(31).unwrap();
        assert_eq!(b.read_byte().unwrap(), 31);
        assert_eq!(a.position(), 11);
    }
}
