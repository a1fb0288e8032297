//! Memory-backed block device.

use alloc::vec;
use alloc::vec::Vec;

use derive_more::Display;

use crate::sync::{acquire, shared, Shared};

use super::BlockDevice;

#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum RamDiskError {
    #[display("range {offset}+{len} outside device of {size} bytes")]
    OutOfRange { offset: u64, len: usize, size: u64 },
    #[display("device already closed")]
    Closed,
}

/// A block device held entirely in memory.
///
/// Clones share the same backing buffer, so a caller can keep one handle
/// while handing another to a filesystem and inspect (or reopen) the bytes
/// afterwards.
pub struct RamDisk {
    data: Shared<Vec<u8>>,
    sector_size: u32,
    closed: bool,
    read_only: bool,
}

impl Clone for RamDisk {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            sector_size: self.sector_size,
            closed: self.closed,
            read_only: self.read_only,
        }
    }
}

impl RamDisk {
    pub fn new(size: usize) -> Self {
        Self::with_data(vec![0u8; size])
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data: shared(data), sector_size: 512, closed: false, read_only: false }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Copy of the current device contents.
    pub fn snapshot(&self) -> Vec<u8> {
        acquire!(self.data).clone()
    }

    fn check(&self, offset: u64, len: usize) -> Result<(), RamDiskError> {
        if self.closed {
            return Err(RamDiskError::Closed);
        }
        let size = self.size();
        if offset + len as u64 > size {
            return Err(RamDiskError::OutOfRange { offset, len, size });
        }
        Ok(())
    }
}

impl BlockDevice for RamDisk {
    type Error = RamDiskError;

    fn size(&self) -> u64 {
        acquire!(self.data).len() as u64
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read_at(&mut self, offset: u64, dst: &mut [u8]) -> Result<(), Self::Error> {
        self.check(offset, dst.len())?;
        let data = acquire!(self.data);
        dst.copy_from_slice(&data[offset as usize..offset as usize + dst.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, src: &[u8]) -> Result<(), Self::Error> {
        self.check(offset, src.len())?;
        let mut data = acquire!(self.data);
        data[offset as usize..offset as usize + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.closed {
            return Err(RamDiskError::Closed);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
