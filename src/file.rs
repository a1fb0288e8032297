//! The file façade: a cluster chain plus the directory entry recording its
//! logical length and timestamps.

use core::fmt::Debug;

use crate::chain::ClusterChain;
use crate::dir::entry::{Attributes, DirEntry, DosDate, DosDateTime};
use crate::error::{Error, InputError, OperationError};
use crate::io::BlockDevice;
use crate::sync::{acquire, Shared};
use crate::FsContext;

pub(crate) struct FileNode<D: BlockDevice> {
    chain: ClusterChain<D>,
    entry: Shared<DirEntry>,
    pub valid: bool,
}

impl<E: Debug, D: BlockDevice<Error = E>> FileNode<D> {
    pub fn new(chain: ClusterChain<D>, entry: Shared<DirEntry>) -> Self {
        Self { chain, entry, valid: true }
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// The logical length from the directory entry, not the on-disk chain
    /// capacity.
    pub fn length(&self) -> u32 {
        acquire!(self.entry).file_size()
    }

    pub fn set_length(&mut self, length: u32) -> Result<(), Error<E>> {
        self.chain.set_size(length as u64)?;
        let mut entry = acquire!(self.entry);
        entry.set_start_cluster(self.chain.start());
        entry.set_file_size(length);
        let now = DosDateTime::now();
        entry.set_modified(now);
        entry.set_accessed(now.date);
        Ok(())
    }

    pub fn read(&mut self, offset: u32, dst: &mut [u8], touch: bool) -> Result<(), Error<E>> {
        if offset as u64 + dst.len() as u64 > self.length() as u64 {
            return Err(OperationError::EndOfData.into());
        }
        self.chain.read(offset as u64, dst)?;
        if touch && !self.is_read_only() {
            acquire!(self.entry).set_accessed(DosDateTime::now().date);
        }
        Ok(())
    }

    pub fn write(&mut self, offset: u32, src: &[u8]) -> Result<(), Error<E>> {
        if self.is_read_only() {
            return Err(OperationError::ReadOnly.into());
        }
        let end = offset as u64 + src.len() as u64;
        if end > u32::MAX as u64 {
            return Err(InputError::InvalidArgument("file size limit exceeded").into());
        }
        self.chain.write(offset as u64, src)?;
        let mut entry = acquire!(self.entry);
        entry.set_start_cluster(self.chain.start());
        if end as u32 > entry.file_size() {
            entry.set_file_size(end as u32);
        }
        let now = DosDateTime::now();
        entry.set_modified(now);
        entry.set_accessed(now.date);
        Ok(())
    }

    pub fn is_read_only(&self) -> bool {
        acquire!(self.entry).attributes().read_only() > 0
    }

    pub fn attributes(&self) -> Attributes {
        acquire!(self.entry).attributes()
    }

    pub fn set_attributes(&mut self, attributes: Attributes) {
        acquire!(self.entry).set_attributes(attributes);
    }

    pub fn created(&self) -> DosDateTime {
        acquire!(self.entry).created()
    }

    pub fn modified(&self) -> DosDateTime {
        acquire!(self.entry).modified()
    }

    pub fn accessed(&self) -> DosDate {
        acquire!(self.entry).accessed()
    }
}

/// Handle to a regular file. All operations fail with AlreadyClosed after
/// the filesystem is closed and with AlreadyInvalid after the entry is
/// removed.
pub struct File<D: BlockDevice> {
    pub(crate) node: Shared<FileNode<D>>,
    pub(crate) ctx: Shared<FsContext>,
}

impl<D: BlockDevice> Clone for File<D> {
    fn clone(&self) -> Self {
        Self { node: self.node.clone(), ctx: self.ctx.clone() }
    }
}

impl<E: Debug, D: BlockDevice<Error = E>> File<D> {
    fn check(&self) -> Result<(), Error<E>> {
        if acquire!(self.ctx).closed {
            return Err(OperationError::AlreadyClosed.into());
        }
        if !acquire!(self.node).valid {
            return Err(OperationError::AlreadyInvalid.into());
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), Error<E>> {
        self.check()?;
        if acquire!(self.ctx).read_only {
            return Err(OperationError::ReadOnly.into());
        }
        Ok(())
    }

    pub fn len(&self) -> Result<u32, Error<E>> {
        self.check()?;
        Ok(acquire!(self.node).length())
    }

    pub fn is_empty(&self) -> Result<bool, Error<E>> {
        Ok(self.len()? == 0)
    }

    /// Read exactly `dst.len()` bytes at `offset`; the whole range must lie
    /// within the file. The last-accessed date is updated on writable
    /// mounts.
    pub fn read(&self, offset: u32, dst: &mut [u8]) -> Result<(), Error<E>> {
        self.check()?;
        let touch = !acquire!(self.ctx).read_only;
        acquire!(self.node).read(offset, dst, touch)
    }

    /// Write `src` at `offset`, growing the file as needed.
    pub fn write(&self, offset: u32, src: &[u8]) -> Result<(), Error<E>> {
        self.check_writable()?;
        acquire!(self.node).write(offset, src)
    }

    /// Truncate or extend to exactly `length` bytes.
    pub fn set_len(&self, length: u32) -> Result<(), Error<E>> {
        self.check_writable()?;
        let mut node = acquire!(self.node);
        node.set_length(length)
    }

    pub fn flush(&self) -> Result<(), Error<E>> {
        self.check_writable()?;
        if acquire!(self.node).is_read_only() {
            return Err(OperationError::ReadOnly.into());
        }
        Ok(())
    }

    pub fn attributes(&self) -> Result<Attributes, Error<E>> {
        self.check()?;
        Ok(acquire!(self.node).attributes())
    }

    pub fn set_attributes(&self, attributes: Attributes) -> Result<(), Error<E>> {
        self.check_writable()?;
        acquire!(self.node).set_attributes(attributes);
        Ok(())
    }

    pub fn created(&self) -> Result<DosDateTime, Error<E>> {
        self.check()?;
        Ok(acquire!(self.node).created())
    }

    pub fn modified(&self) -> Result<DosDateTime, Error<E>> {
        self.check()?;
        Ok(acquire!(self.node).modified())
    }

    pub fn accessed(&self) -> Result<DosDate, Error<E>> {
        self.check()?;
        Ok(acquire!(self.node).accessed())
    }
}
