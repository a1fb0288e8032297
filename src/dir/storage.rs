//! Raw directory storage: a capacity-bounded vector of 32-byte records plus
//! an optional volume-label record, persisted either in the fixed FAT12/16
//! root region or in a cluster chain.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::chain::ClusterChain;
use crate::dir::entry::{DirEntry, ENTRY_SIZE};
use crate::error::{AllocationError, Error, InputError};
use crate::io::BlockDevice;
use crate::sync::{acquire, Shared};

/// A chain-backed directory may not outgrow 65536 records.
pub(crate) const MAX_DIRECTORY_BYTES: u64 = 65536 * 32;

enum Backing<D: BlockDevice> {
    /// The FAT12/16 root region: fixed device offset, fixed capacity.
    FixedRoot { device: Shared<D>, offset: u64 },
    Chain(ClusterChain<D>),
}

pub(crate) struct RawDirectory<D: BlockDevice> {
    backing: Backing<D>,
    is_root: bool,
    capacity: u32,
    pub entries: Vec<DirEntry>,
    pub label: Option<DirEntry>,
}

impl<E: Debug, D: BlockDevice<Error = E>> RawDirectory<D> {
    pub fn open_fixed_root(
        device: Shared<D>,
        offset: u64,
        capacity: u32,
    ) -> Result<Self, Error<E>> {
        let backing = Backing::FixedRoot { device, offset };
        let mut dir =
            Self { backing, is_root: true, capacity, entries: Vec::new(), label: None };
        dir.read()?;
        Ok(dir)
    }

    pub fn open_chain(chain: ClusterChain<D>, is_root: bool) -> Result<Self, Error<E>> {
        let capacity = (chain.length_on_disk()? / ENTRY_SIZE as u64) as u32;
        let backing = Backing::Chain(chain);
        let mut dir = Self { backing, is_root, capacity, entries: Vec::new(), label: None };
        dir.read()?;
        Ok(dir)
    }

    /// Wrap a freshly allocated chain without reading it; the cluster still
    /// holds stale bytes until the first flush.
    pub fn create_chain(chain: ClusterChain<D>) -> Result<Self, Error<E>> {
        let capacity = (chain.length_on_disk()? / ENTRY_SIZE as u64) as u32;
        let backing = Backing::Chain(chain);
        Ok(Self { backing, is_root: false, capacity, entries: Vec::new(), label: None })
    }

    /// Decode records up to the first free (first-byte-zero) entry. The
    /// volume label, if present, lands in its own slot.
    fn read(&mut self) -> Result<(), Error<E>> {
        let mut buffer = vec![0u8; self.capacity as usize * ENTRY_SIZE];
        match &mut self.backing {
            Backing::FixedRoot { device, offset } => {
                acquire!(device).read_at(*offset, &mut buffer).map_err(Error::Io)?
            }
            Backing::Chain(chain) => chain.read(0, &mut buffer)?,
        }
        for raw in buffer.chunks_exact(ENTRY_SIZE) {
            let mut data = [0u8; ENTRY_SIZE];
            data.copy_from_slice(raw);
            let entry = DirEntry::from_bytes(data);
            if entry.is_free() {
                break;
            }
            if entry.is_volume_label() && !entry.is_deleted() {
                self.label = Some(entry);
            } else {
                self.entries.push(entry);
            }
        }
        Ok(())
    }

    /// Encode entries, then the label, then leave the terminator and the
    /// rest of the capacity zeroed.
    pub fn flush(&mut self) -> Result<(), Error<E>> {
        let mut buffer = vec![0u8; self.capacity as usize * ENTRY_SIZE];
        let mut pos = 0;
        for entry in &self.entries {
            buffer[pos..pos + ENTRY_SIZE].copy_from_slice(entry.bytes());
            pos += ENTRY_SIZE;
        }
        if let Some(label) = &self.label {
            buffer[pos..pos + ENTRY_SIZE].copy_from_slice(label.bytes());
        }
        match &mut self.backing {
            Backing::FixedRoot { device, offset } => {
                acquire!(device).write_at(*offset, &buffer).map_err(Error::Io)
            }
            Backing::Chain(chain) => chain.write(0, &buffer),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// What a child's ".." must point at: 0 for any root, the chain start
    /// otherwise.
    pub fn storage_cluster(&self) -> u32 {
        match &self.backing {
            Backing::FixedRoot { .. } => 0,
            Backing::Chain(_) if self.is_root => 0,
            Backing::Chain(chain) => chain.start(),
        }
    }

    /// Resize to hold `entry_count` records. The fixed root cannot grow;
    /// chain directories grow in whole clusters up to the format limit.
    pub fn change_size(&mut self, entry_count: u32) -> Result<(), Error<E>> {
        match &mut self.backing {
            Backing::FixedRoot { .. } => match entry_count > self.capacity {
                true => Err(AllocationError::DirectoryFull {
                    capacity: self.capacity,
                    requested: entry_count,
                }
                .into()),
                false => Ok(()),
            },
            Backing::Chain(chain) => {
                if entry_count == 0 {
                    return Err(
                        InputError::InvalidArgument("directories keep at least one cluster").into()
                    );
                }
                let bytes =
                    (entry_count as u64 * ENTRY_SIZE as u64).max(chain.cluster_size() as u64);
                if bytes > MAX_DIRECTORY_BYTES {
                    return Err(AllocationError::DirectoryFull {
                        capacity: self.capacity,
                        requested: entry_count,
                    }
                    .into());
                }
                chain.set_size(bytes)?;
                self.capacity = (chain.length_on_disk()? / ENTRY_SIZE as u64) as u32;
                Ok(())
            }
        }
    }

    pub fn ensure_capacity(&mut self, entry_count: u32) -> Result<(), Error<E>> {
        if entry_count > self.capacity {
            self.change_size(entry_count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chain::Geometry;
    use crate::dir::entry::DosDateTime;
    use crate::dir::short_name::ShortName;
    use crate::fat::{Fat, FatType};
    use crate::io::ram::RamDisk;
    use crate::sync::shared;

    fn chain_dir() -> RawDirectory<RamDisk> {
        let geometry = Geometry { bytes_per_sector: 512, sectors_per_cluster: 1, files_offset: 0 };
        let fat = shared(Fat::create(FatType::Fat16, 512, 64, 0xF8));
        let device = shared(RamDisk::new(64 * 512));
        let start = acquire!(fat).alloc_new().unwrap();
        let chain = ClusterChain::new(device, fat, geometry, start);
        RawDirectory::create_chain(chain).unwrap()
    }

    #[test]
    fn fixed_root_round_trip() {
        let device = shared(RamDisk::new(4096));
        let mut dir = RawDirectory::open_fixed_root(device.clone(), 1024, 64).unwrap();
        assert!(dir.entries.is_empty());
        let short = ShortName::new("BOOT", "CFG").unwrap();
        dir.entries.push(DirEntry::new_file(short, DosDateTime::epoch()));
        dir.label = Some(DirEntry::new_volume_label(*b"TESTVOL    "));
        dir.flush().unwrap();

        let dir = RawDirectory::open_fixed_root(device, 1024, 64).unwrap();
        assert_eq!(dir.entries.len(), 1);
        assert_eq!(dir.entries[0].short_name(), short);
        assert_eq!(dir.label.as_ref().unwrap().short_name().raw(), b"TESTVOL    ");
    }

    #[test]
    fn fixed_root_cannot_grow() {
        let device = shared(RamDisk::new(4096));
        let mut dir = RawDirectory::open_fixed_root(device, 1024, 64).unwrap();
        assert!(dir.ensure_capacity(64).is_ok());
        let err = dir.ensure_capacity(65).unwrap_err();
        assert_eq!(
            err,
            AllocationError::DirectoryFull { capacity: 64, requested: 65 }.into()
        );
    }

    #[test]
    fn chain_directory_grows_in_clusters() {
        let mut dir = chain_dir();
        assert_eq!(dir.capacity(), 16);
        dir.ensure_capacity(17).unwrap();
        assert_eq!(dir.capacity(), 32);
        assert!(dir.change_size(0).is_err());
    }

    #[test]
    fn flush_terminates_the_entry_list() {
        let mut dir = chain_dir();
        let short = ShortName::new("A", "").unwrap();
        dir.entries.push(DirEntry::new_file(short, DosDateTime::epoch()));
        dir.flush().unwrap();

        let chain = match dir.backing {
            Backing::Chain(chain) => chain,
            _ => unreachable!(),
        };
        let mut raw = [0u8; 96];
        chain.read(0, &mut raw).unwrap();
        assert_eq!(&raw[0..11], b"A          ");
        // The record after the last one is the all-zero terminator.
        assert!(raw[32..64].iter().all(|&b| b == 0));
    }
}
