//! Dirty-tracked sector page.
//!
//! A [`Sector`] owns an in-memory copy of a fixed-size region of the device
//! at a fixed offset. Mutating accessors mark the page dirty; a write is
//! only issued when the page is dirty.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::endian;
use crate::error::Error;
use crate::io::BlockDevice;

#[derive(Debug)]
pub(crate) struct Sector {
    offset: u64,
    buffer: Vec<u8>,
    dirty: bool,
}

impl Sector {
    pub fn read<E: Debug, D: BlockDevice<Error = E>>(
        device: &mut D,
        offset: u64,
        size: usize,
    ) -> Result<Self, Error<E>> {
        let mut buffer = vec![0u8; size];
        device.read_at(offset, &mut buffer).map_err(Error::Io)?;
        Ok(Self { offset, buffer, dirty: false })
    }

    /// A fresh all-zero page, born dirty so the next write persists it.
    pub fn zeroed(offset: u64, size: usize) -> Self {
        Self { offset, buffer: vec![0u8; size], dirty: true }
    }

    pub fn write<E: Debug, D: BlockDevice<Error = E>>(
        &mut self,
        device: &mut D,
    ) -> Result<(), Error<E>> {
        if !self.dirty {
            return Ok(());
        }
        device.write_at(self.offset, &self.buffer).map_err(Error::Io)?;
        self.dirty = false;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn get_u8(&self, offset: usize) -> u8 {
        endian::get_u8(&self.buffer, offset)
    }

    pub fn get_u16(&self, offset: usize) -> u16 {
        endian::get_u16(&self.buffer, offset)
    }

    pub fn get_u32(&self, offset: usize) -> u32 {
        endian::get_u32(&self.buffer, offset)
    }

    pub fn get_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.buffer[offset..offset + len]
    }

    pub fn set_u8(&mut self, offset: usize, value: u8) {
        endian::set_u8(&mut self.buffer, offset, value);
        self.dirty = true;
    }

    pub fn set_u16(&mut self, offset: usize, value: u16) {
        endian::set_u16(&mut self.buffer, offset, value);
        self.dirty = true;
    }

    pub fn set_u32(&mut self, offset: usize, value: u32) {
        endian::set_u32(&mut self.buffer, offset, value);
        self.dirty = true;
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.dirty = true;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::ram::RamDisk;

    #[test]
    fn write_through_only_when_dirty() {
        let mut disk = RamDisk::new(2048);
        disk.write_at(512, &[0xAA; 512]).unwrap();

        let mut sector = Sector::read(&mut disk, 512, 512).unwrap();
        assert!(!sector.is_dirty());
        assert_eq!(sector.get_u8(0), 0xAA);

        // A clean page writes nothing back.
        disk.write_at(512, &[0xBB; 512]).unwrap();
        sector.write(&mut disk).unwrap();
        assert_eq!(disk.snapshot()[512], 0xBB);

        sector.set_u16(4, 0x1234);
        assert!(sector.is_dirty());
        sector.write(&mut disk).unwrap();
        assert!(!sector.is_dirty());
        let bytes = disk.snapshot();
        assert_eq!(bytes[512], 0xAA);
        assert_eq!(bytes[516], 0x34);
        assert_eq!(bytes[517], 0x12);
    }
}
