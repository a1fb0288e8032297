//! File-backed block device for std targets.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::BlockDevice;

pub struct FileDisk {
    file: fs::File,
    size: u64,
    sector_size: u32,
    closed: bool,
    read_only: bool,
}

impl FileDisk {
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> io::Result<Self> {
        let file = fs::File::options().read(true).write(!read_only).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size, sector_size: 512, closed: false, read_only })
    }

    /// Create (or truncate) an image file of `size` bytes.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> io::Result<Self> {
        let file = fs::File::options().read(true).write(true).create(true).truncate(true).open(path)?;
        file.set_len(size)?;
        Ok(Self { file, size, sector_size: 512, closed: false, read_only: false })
    }

    fn check(&self, offset: u64, len: usize) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::other("device already closed"));
        }
        if offset + len as u64 > self.size {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "range outside device"));
        }
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    type Error = io::Error;

    fn size(&self) -> u64 {
        self.size
    }

    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn read_at(&mut self, offset: u64, dst: &mut [u8]) -> Result<(), Self::Error> {
        self.check(offset, dst.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(dst)
    }

    fn write_at(&mut self, offset: u64, src: &[u8]) -> Result<(), Self::Error> {
        self.check(offset, src.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(src)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.file.flush()?;
        self.file.sync_data()
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        if !self.closed && !self.read_only {
            self.file.flush()?;
            self.file.sync_data()?;
        }
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
