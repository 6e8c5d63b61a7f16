//! Response buffer used by the emulators
//!
//! Emulators build their parameter data into a zeroed, fixed-capacity
//! buffer addressed by absolute offset, patch length fields once the
//! variable-length tail is known, then copy the result into the command's
//! data buffer. Writes that would run past the capacity are truncated
//! instead of panicking.

use byteorder::{BigEndian, ByteOrder};

/// INQUIRY response buffer size
pub const SE_INQUIRY_BUF: usize = 1024;

/// MODE SENSE / MODE SELECT scratch buffer size
pub const SE_MODE_PAGE_BUF: usize = 512;

/// REQUEST SENSE buffer size
pub const SE_SENSE_BUF: usize = 96;

/// Fixed-capacity, zero-initialized response buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBuf {
    data: Vec<u8>,
}

impl ResponseBuf {
    pub fn new(capacity: usize) -> Self {
        ResponseBuf {
            data: vec![0u8; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Mutable view starting at `off`, empty if `off` is past the end
    pub fn tail_mut(&mut self, off: usize) -> &mut [u8] {
        let off = off.min(self.data.len());
        &mut self.data[off..]
    }

    pub fn get(&self, off: usize) -> u8 {
        self.data.get(off).copied().unwrap_or(0)
    }

    pub fn put_u8(&mut self, off: usize, val: u8) {
        if let Some(b) = self.data.get_mut(off) {
            *b = val;
        }
    }

    /// OR `bits` into the byte at `off`
    pub fn set_bits(&mut self, off: usize, bits: u8) {
        if let Some(b) = self.data.get_mut(off) {
            *b |= bits;
        }
    }

    pub fn put_be16(&mut self, off: usize, val: u16) {
        let mut raw = [0u8; 2];
        BigEndian::write_u16(&mut raw, val);
        self.put_bytes(off, &raw);
    }

    pub fn put_be24(&mut self, off: usize, val: u32) {
        let mut raw = [0u8; 3];
        BigEndian::write_u24(&mut raw, val);
        self.put_bytes(off, &raw);
    }

    pub fn put_be32(&mut self, off: usize, val: u32) {
        let mut raw = [0u8; 4];
        BigEndian::write_u32(&mut raw, val);
        self.put_bytes(off, &raw);
    }

    pub fn put_be64(&mut self, off: usize, val: u64) {
        let mut raw = [0u8; 8];
        BigEndian::write_u64(&mut raw, val);
        self.put_bytes(off, &raw);
    }

    pub fn get_be16(&self, off: usize) -> u16 {
        match self.data.get(off..off + 2) {
            Some(raw) => BigEndian::read_u16(raw),
            None => 0,
        }
    }

    /// Copy `bytes` to `off`, returning how many bytes fit
    pub fn put_bytes(&mut self, off: usize, bytes: &[u8]) -> usize {
        if off >= self.data.len() {
            return 0;
        }
        let n = bytes.len().min(self.data.len() - off);
        self.data[off..off + n].copy_from_slice(&bytes[..n]);
        n
    }

    /// Write a left-aligned ASCII field of exactly `width` bytes
    ///
    /// Unused trailing bytes are ASCII spaces; longer strings are cut at
    /// `width`.
    pub fn put_ascii_padded(&mut self, off: usize, s: &str, width: usize) {
        let mut field = vec![b' '; width];
        let src = s.as_bytes();
        let n = src.len().min(width);
        field[..n].copy_from_slice(&src[..n]);
        self.put_bytes(off, &field);
    }

    /// Copy the first `len` bytes into `dst`, bounded by `dst`'s length
    pub fn copy_to(&self, dst: &mut [u8], len: usize) -> usize {
        let n = len.min(self.data.len()).min(dst.len());
        dst[..n].copy_from_slice(&self.data[..n]);
        n
    }
}

/// Decode a big-endian 16-bit CDB field, zero if the CDB is too short
pub fn cdb_be16(cdb: &[u8], off: usize) -> u16 {
    cdb.get(off..off + 2).map(BigEndian::read_u16).unwrap_or(0)
}

/// Decode a big-endian 24-bit CDB field, zero if the CDB is too short
pub fn cdb_be24(cdb: &[u8], off: usize) -> u32 {
    cdb.get(off..off + 3).map(BigEndian::read_u24).unwrap_or(0)
}

/// Decode a big-endian 32-bit CDB field, zero if the CDB is too short
pub fn cdb_be32(cdb: &[u8], off: usize) -> u32 {
    cdb.get(off..off + 4).map(BigEndian::read_u32).unwrap_or(0)
}

/// Byte `off` of the CDB, zero if the CDB is too short
pub fn cdb_byte(cdb: &[u8], off: usize) -> u8 {
    cdb.get(off).copied().unwrap_or(0)
}
