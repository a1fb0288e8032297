//! FAT12/FAT16/FAT32 read/write filesystem over an abstract block device.
//!
//! The crate parses the on-disk structures (boot sector, FS information
//! sector, the File Allocation Tables, directory entries with long-name
//! extensions), allocates and frees clusters, grows and shrinks files and
//! directories, and persists changes back to the device on flush.
//!
//! ```no_run
//! use vfat::io::ram::RamDisk;
//! use vfat::{format, FatFileSystem, FormatOptions, MountOptions};
//!
//! let mut disk = RamDisk::new(16 << 20);
//! format(&mut disk, &FormatOptions::default()).unwrap();
//! let mut fs = FatFileSystem::open(disk, MountOptions::default()).unwrap();
//! let root = fs.root().unwrap();
//! let file = root.create_file("hello.txt").unwrap();
//! file.write(0, b"hello world").unwrap();
//! fs.close().unwrap();
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[macro_use]
extern crate hex_literal;
#[macro_use]
extern crate log;

mod chain;
mod dir;
mod endian;
pub mod error;
mod fat;
mod file;
mod format;
pub mod io;
mod region;
mod sector;
pub(crate) mod sync;

use core::fmt::Debug;

pub use dir::entry::{Attributes, DosDate, DosDateTime, DosTime};
pub use dir::{Directory, EntryInfo, FileOrDirectory};
pub use fat::FatType;
pub use file::File;
pub use format::{format, FormatOptions};

use chain::ClusterChain;
use dir::storage::RawDirectory;
use dir::DirNode;
use error::{DataError, Error, InputError, OperationError};
use fat::Fat;
use io::BlockDevice;
use region::boot::BootSector;
use region::fsinfo::FsInfoSector;
use sync::{acquire, shared, Shared};

/// State shared by every handle the filesystem gives out.
pub(crate) struct FsContext {
    pub closed: bool,
    pub read_only: bool,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct MountOptions {
    pub read_only: bool,
    /// Mount volumes whose FAT copies disagree, trusting copy #0.
    pub ignore_fat_differences: bool,
}

/// Seed for the dummy short-name generator; fixed so runs are reproducible.
const NAME_SEED: u32 = 0x1969_0420;

pub struct FatFileSystem<D: BlockDevice> {
    device: Shared<D>,
    boot: BootSector,
    fs_info: Option<FsInfoSector>,
    fat: Shared<Fat>,
    root: Shared<DirNode<D>>,
    ctx: Shared<FsContext>,
}

impl<E: Debug, D: BlockDevice<Error = E>> FatFileSystem<D> {
    /// Mount a volume: parse the boot sector, load and cross-check the FAT
    /// copies, verify the FS-info sector (FAT32) and index the root
    /// directory.
    pub fn open(mut device: D, options: MountOptions) -> Result<Self, Error<E>> {
        let read_only = options.read_only || device.is_read_only();
        let boot = BootSector::read(&mut device)?;
        let fat_type = boot.fat_type();
        let entry_count = boot.data_cluster_count() + 2;
        let fat_bytes = (boot.sectors_per_fat() * boot.bytes_per_sector()) as usize;
        let mut fat =
            Fat::read(&mut device, fat_type, boot.fat_offset(0), fat_bytes, entry_count)?;
        for index in 1..boot.fat_count() {
            let copy =
                Fat::read(&mut device, fat_type, boot.fat_offset(index), fat_bytes, entry_count)?;
            if copy != fat {
                if !options.ignore_fat_differences {
                    return Err(DataError::FatMismatch.into());
                }
                warn!("FAT copy {} differs from copy 0, using copy 0", index);
            }
        }

        let fs_info = match fat_type {
            FatType::Fat32 => {
                let offset = boot.fs_info_sector() as u64 * boot.bytes_per_sector() as u64;
                let info = FsInfoSector::read(&mut device, offset)?;
                if let Some(free) = info.free_cluster_count() {
                    if free != fat.free_cluster_count() {
                        return Err(DataError::FreeCountMismatch.into());
                    }
                }
                if let Some(hint) = info.last_allocated() {
                    fat.set_last_alloc(hint);
                }
                Some(info)
            }
            _ => None,
        };

        if fat.media_descriptor() != boot.media_descriptor() {
            warn!(
                "media descriptor mismatch: boot sector {:#04x}, FAT {:#04x}",
                boot.media_descriptor(),
                fat.media_descriptor()
            );
        }

        let geometry = boot.geometry();
        debug!(
            "mounted {:?}: {} data clusters of {} bytes, {} free",
            fat_type,
            boot.data_cluster_count(),
            geometry.cluster_size(),
            fat.free_cluster_count()
        );

        let device = shared(device);
        let fat = shared(fat);
        let root_storage = match fat_type {
            FatType::Fat32 => {
                let chain = ClusterChain::new(
                    device.clone(),
                    fat.clone(),
                    geometry,
                    boot.root_dir_cluster(),
                );
                RawDirectory::open_chain(chain, true)?
            }
            _ => RawDirectory::open_fixed_root(
                device.clone(),
                boot.root_dir_offset(),
                boot.root_entry_count(),
            )?,
        };
        let root =
            shared(DirNode::from_storage(root_storage, device.clone(), fat.clone(), geometry, NAME_SEED));
        let ctx = shared(FsContext { closed: false, read_only });
        Ok(Self { device, boot, fs_info, fat, root, ctx })
    }

    fn check(&self) -> Result<(), Error<E>> {
        if acquire!(self.ctx).closed {
            return Err(OperationError::AlreadyClosed.into());
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

    pub fn fat_type(&self) -> FatType {
        self.boot.fat_type()
    }

    pub fn is_read_only(&self) -> bool {
        acquire!(self.ctx).read_only
    }

    pub fn root(&self) -> Result<Directory<D>, Error<E>> {
        self.check()?;
        Ok(Directory { node: self.root.clone(), ctx: self.ctx.clone() })
    }

    pub fn cluster_size(&self) -> u32 {
        self.boot.geometry().cluster_size()
    }

    pub fn total_space(&self) -> Result<u64, Error<E>> {
        self.check()?;
        Ok(self.boot.data_cluster_count() as u64 * self.cluster_size() as u64)
    }

    pub fn free_space(&self) -> Result<u64, Error<E>> {
        self.check()?;
        Ok(acquire!(self.fat).free_cluster_count() as u64 * self.cluster_size() as u64)
    }

    pub fn usable_space(&self) -> Result<u64, Error<E>> {
        self.free_space()
    }

    pub fn free_cluster_count(&self) -> Result<u32, Error<E>> {
        self.check()?;
        Ok(acquire!(self.fat).free_cluster_count())
    }

    /// The volume label, trailing padding stripped. The root directory's
    /// label entry wins over the boot sector copy when both exist.
    pub fn volume_label(&self) -> Result<heapless::String<11>, Error<E>> {
        self.check()?;
        let raw = acquire!(self.root).label().unwrap_or_else(|| self.boot.volume_label());
        let len = raw.iter().rposition(|&b| b != b' ' && b != 0).map_or(0, |i| i + 1);
        let mut label = heapless::String::new();
        for &b in &raw[..len] {
            label.push(b as char).ok();
        }
        Ok(label)
    }

    /// Write the label to the boot sector and the root directory's label
    /// entry.
    pub fn set_volume_label(&mut self, label: &str) -> Result<(), Error<E>> {
        self.check_writable()?;
        if label.len() > 11 || !label.bytes().all(|b| (0x20..0x7F).contains(&b)) {
            return Err(InputError::InvalidArgument("label must be at most 11 ASCII bytes").into());
        }
        let mut raw = [b' '; 11];
        raw[..label.len()].copy_from_slice(label.as_bytes());
        self.boot.set_volume_label(&raw);
        acquire!(self.root).set_label(raw)
    }

    /// Persist everything: boot sector, all FAT copies, the directory tree,
    /// and the FS-info sector. The FATs go out before the directories so no
    /// entry ever refers to a cluster an on-disk FAT still calls free.
    pub fn flush(&mut self) -> Result<(), Error<E>> {
        self.check()?;
        if acquire!(self.ctx).read_only {
            return Ok(());
        }
        {
            let mut device = acquire!(self.device);
            self.boot.write(&mut *device)?;
            let fat = acquire!(self.fat);
            for index in 0..self.boot.fat_count() {
                fat.write(&mut *device, self.boot.fat_offset(index))?;
            }
        }
        acquire!(self.root).flush()?;
        if let Some(info) = &mut self.fs_info {
            {
                let fat = acquire!(self.fat);
                info.set_free_cluster_count(fat.free_cluster_count());
                info.set_last_allocated(fat.last_alloc());
            }
            info.write(&mut *acquire!(self.device))?;
        }
        acquire!(self.device).flush().map_err(Error::Io)
    }

    /// Flush (when writable), mark every issued handle closed, release the
    /// device.
    pub fn close(&mut self) -> Result<(), Error<E>> {
        self.check()?;
        if !acquire!(self.ctx).read_only {
            self.flush()?;
        }
        acquire!(self.ctx).closed = true;
        acquire!(self.device).close().map_err(Error::Io)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::ram::RamDisk;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;

    fn open(disk: &RamDisk) -> FatFileSystem<RamDisk> {
        FatFileSystem::open(disk.clone(), MountOptions::default()).unwrap()
    }

    fn fat32_image() -> RamDisk {
        let mut disk = RamDisk::new(16_700_000);
        let options = FormatOptions { fat_type: Some(FatType::Fat32), ..Default::default() };
        format(&mut disk, &options).unwrap();
        disk
    }

    fn fat16_image() -> RamDisk {
        let mut disk = RamDisk::new(16 << 20);
        format(&mut disk, &FormatOptions::default()).unwrap();
        disk
    }

    fn fat12_image() -> RamDisk {
        let mut disk = RamDisk::new(1 << 20);
        format(&mut disk, &FormatOptions::default()).unwrap();
        disk
    }

    #[test]
    fn pristine_fat32_mounts_empty() {
        let disk = fat32_image();
        let fs = open(&disk);
        assert_eq!(fs.fat_type(), FatType::Fat32);
        assert!(fs.free_cluster_count().unwrap() > 0);
        assert!(fs.root().unwrap().entries().unwrap().is_empty());
    }

    #[test]
    fn file_survives_remount() {
        let disk = fat32_image();
        {
            let mut fs = open(&disk);
            let root = fs.root().unwrap();
            let file = root.create_file("Hello World.txt").unwrap();
            file.write(0, &[0xA5; 4096]).unwrap();
            fs.close().unwrap();
        }
        let fs = open(&disk);
        let root = fs.root().unwrap();
        // Lookup is case-insensitive.
        let file = root.open_file("hello world.txt").unwrap();
        assert_eq!(file.len().unwrap(), 4096);
        let mut buf = vec![0u8; 4096];
        file.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xA5));
        // The original capitalization is what the listing shows.
        assert_eq!(root.entries().unwrap()[0].name, "Hello World.txt");
    }

    #[test]
    fn mass_create_and_remove() {
        let disk = fat16_image();
        let free_before;
        {
            let mut fs = open(&disk);
            free_before = fs.free_cluster_count().unwrap();
            let root = fs.root().unwrap();
            for i in 0..200 {
                root.create_file(&alloc::format!("f{:04}", i)).unwrap();
            }
            for i in (0..200).step_by(2) {
                root.remove(&alloc::format!("f{:04}", i)).unwrap();
            }
            fs.close().unwrap();
        }
        let fs = open(&disk);
        let mut names: Vec<String> =
            fs.root().unwrap().entries().unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        let mut expected: Vec<String> =
            (0..200).filter(|i| i % 2 == 1).map(|i| alloc::format!("f{:04}", i)).collect();
        expected.sort();
        assert_eq!(names, expected);
        // Empty files consume directory slots only, never data clusters.
        assert_eq!(fs.free_cluster_count().unwrap(), free_before);
    }

    #[test]
    fn growth_past_one_cluster() {
        let disk = fat32_image();
        let mut fs = open(&disk);
        let cluster_size = fs.cluster_size();
        let free_before = fs.free_cluster_count().unwrap();
        let root = fs.root().unwrap();
        let file = root.create_file("big.bin").unwrap();
        file.write(0, &vec![7u8; cluster_size as usize + 1]).unwrap();
        assert_eq!(file.len().unwrap(), cluster_size + 1);
        // The chain holds exactly two clusters.
        assert_eq!(fs.free_cluster_count().unwrap(), free_before - 2);
        fs.close().unwrap();
    }

    #[test]
    fn rename_keeps_contents() {
        let disk = fat32_image();
        let long = "Long Name With Unicode — café.txt";
        {
            let mut fs = open(&disk);
            let root = fs.root().unwrap();
            let file = root.create_file(long).unwrap();
            file.write(0, b"contents").unwrap();
            fs.close().unwrap();
        }
        {
            let mut fs = open(&disk);
            let root = fs.root().unwrap();
            assert!(root.entry(long).unwrap().is_some());
            root.rename(long, &root, "short.txt").unwrap();
            fs.close().unwrap();
        }
        let fs = open(&disk);
        let root = fs.root().unwrap();
        assert!(root.entry(long).unwrap().is_none());
        let file = root.open_file("short.txt").unwrap();
        let mut buf = [0u8; 8];
        file.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"contents");
    }

    #[test]
    fn full_fat16_root_reports_capacities() {
        let disk = fat16_image();
        let mut fs = open(&disk);
        let root = fs.root().unwrap();
        // Each 5-unit name occupies one LFN slot plus the real entry, so
        // 255 files consume 510 of the 512 root slots.
        for i in 0..255 {
            root.create_file(&alloc::format!("n{:04}", i)).unwrap();
        }
        // A 257-unit name needs 20 LFN slots plus its real entry.
        let name: String = core::iter::repeat('x').take(257).collect();
        let err = root.create_file(&name).map(|_| ()).unwrap_err();
        assert_eq!(
            err,
            error::AllocationError::DirectoryFull { capacity: 512, requested: 531 }.into()
        );
        fs.close().unwrap();
    }

    #[test]
    fn both_fat_copies_are_written() {
        let disk = fat16_image();
        {
            let mut fs = open(&disk);
            let root = fs.root().unwrap();
            root.create_file("data.bin").unwrap().write(0, &[1u8; 100_000]).unwrap();
            fs.close().unwrap();
        }
        let mut probe = disk.clone();
        let boot = region::boot::BootSector::read(&mut probe).unwrap();
        let bytes = (boot.sectors_per_fat() * boot.bytes_per_sector()) as usize;
        let entries = boot.data_cluster_count() + 2;
        let first =
            Fat::read(&mut probe, boot.fat_type(), boot.fat_offset(0), bytes, entries).unwrap();
        let second =
            Fat::read(&mut probe, boot.fat_type(), boot.fat_offset(1), bytes, entries).unwrap();
        assert!(first == second);
        assert!(first.free_cluster_count() < entries - 2);
    }

    #[test]
    fn mismatched_fat_copies_fail_the_mount() {
        let disk = fat16_image();
        {
            let mut probe = disk.clone();
            let boot = region::boot::BootSector::read(&mut probe).unwrap();
            // Corrupt one entry of the second copy.
            probe.write_at(boot.fat_offset(1) + 8, &[0xAB]).unwrap();
        }
        let err = FatFileSystem::open(disk.clone(), MountOptions::default()).map(|_| ()).unwrap_err();
        assert_eq!(err, DataError::FatMismatch.into());
        let options = MountOptions { ignore_fat_differences: true, ..Default::default() };
        assert!(FatFileSystem::open(disk.clone(), options).is_ok());
    }

    #[test]
    fn directories_nest_and_survive_remount() {
        let disk = fat32_image();
        {
            let mut fs = open(&disk);
            let root = fs.root().unwrap();
            let sub = root.create_directory("nested").unwrap();
            let deeper = sub.create_directory("deeper").unwrap();
            deeper.create_file("leaf.txt").unwrap().write(0, b"leaf").unwrap();
            fs.close().unwrap();
        }
        let fs = open(&disk);
        let root = fs.root().unwrap();
        let sub = root.open_directory("nested").unwrap();
        let deeper = sub.open_directory("deeper").unwrap();
        let file = deeper.open_file("leaf.txt").unwrap();
        let mut buf = [0u8; 4];
        file.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"leaf");
    }

    #[test]
    fn dot_entries_are_protected() {
        let disk = fat32_image();
        let mut fs = open(&disk);
        let root = fs.root().unwrap();
        let sub = root.create_directory("d").unwrap();
        assert_eq!(sub.remove("."), Err(InputError::DotEntry.into()));
        assert_eq!(sub.remove(".."), Err(InputError::DotEntry.into()));
        // Removing something that is not there quietly succeeds.
        sub.remove("ghost.txt").unwrap();
        fs.close().unwrap();
    }

    #[test]
    fn non_empty_directories_cannot_be_removed() {
        let disk = fat32_image();
        let mut fs = open(&disk);
        let root = fs.root().unwrap();
        let sub = root.create_directory("d").unwrap();
        sub.create_file("f").unwrap();
        assert_eq!(root.remove("d"), Err(OperationError::DirectoryNotEmpty.into()));
        sub.remove("f").unwrap();
        root.remove("d").unwrap();
        assert!(root.entries().unwrap().is_empty());
        fs.close().unwrap();
    }

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let disk = fat32_image();
        let mut fs = open(&disk);
        let root = fs.root().unwrap();
        root.create_file("Foo.txt").unwrap();
        let err = root.create_file("  foo.TXT  ").map(|_| ()).unwrap_err();
        assert_eq!(err, OperationError::AlreadyExists.into());
        fs.close().unwrap();
    }

    #[test]
    fn move_between_directories() {
        let disk = fat32_image();
        {
            let mut fs = open(&disk);
            let root = fs.root().unwrap();
            let a = root.create_directory("a").unwrap();
            let b = root.create_directory("b").unwrap();
            a.create_file("f.txt").unwrap().write(0, b"payload").unwrap();
            a.rename("f.txt", &b, "g.txt").unwrap();
            fs.close().unwrap();
        }
        let fs = open(&disk);
        let root = fs.root().unwrap();
        assert!(root.open_directory("a").unwrap().entries().unwrap().is_empty());
        let file = root.open_directory("b").unwrap().open_file("g.txt").unwrap();
        let mut buf = [0u8; 7];
        file.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn handles_fail_after_close_and_remove() {
        let disk = fat32_image();
        let mut fs = open(&disk);
        let root = fs.root().unwrap();
        let file = root.create_file("f").unwrap();
        root.remove("f").unwrap();
        assert_eq!(file.len(), Err(OperationError::AlreadyInvalid.into()));

        let survivor = root.create_file("g").unwrap();
        fs.close().unwrap();
        assert_eq!(survivor.len(), Err(OperationError::AlreadyClosed.into()));
        assert_eq!(root.entries().map(|_| ()), Err(OperationError::AlreadyClosed.into()));
        assert_eq!(fs.flush(), Err(OperationError::AlreadyClosed.into()));
    }

    #[test]
    fn read_only_mounts_reject_mutation() {
        let disk = fat32_image();
        let options = MountOptions { read_only: true, ..Default::default() };
        let fs = FatFileSystem::open(disk.clone(), options).unwrap();
        let root = fs.root().unwrap();
        let err = root.create_file("f").map(|_| ()).unwrap_err();
        assert_eq!(err, OperationError::ReadOnly.into());
    }

    #[test]
    fn volume_label_round_trips() {
        let disk = fat16_image();
        {
            let mut fs = open(&disk);
            fs.set_volume_label("RUSTDISK").unwrap();
            fs.close().unwrap();
        }
        let fs = open(&disk);
        assert_eq!(fs.volume_label().unwrap().as_str(), "RUSTDISK");
    }

    #[test]
    fn fat12_end_to_end() {
        let disk = fat12_image();
        {
            let mut fs = open(&disk);
            assert_eq!(fs.fat_type(), FatType::Fat12);
            let root = fs.root().unwrap();
            let file = root.create_file("odd.bin").unwrap();
            // Odd sizes exercise the packed 12-bit entries on both halves.
            file.write(0, &vec![0x5A; 3 * 512 + 17]).unwrap();
            fs.close().unwrap();
        }
        let fs = open(&disk);
        let file = fs.root().unwrap().open_file("odd.bin").unwrap();
        assert_eq!(file.len().unwrap(), 3 * 512 + 17);
        let mut buf = vec![0u8; 3 * 512 + 17];
        file.read(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn shrinking_returns_clusters() {
        let disk = fat32_image();
        let mut fs = open(&disk);
        let free_before = fs.free_cluster_count().unwrap();
        let root = fs.root().unwrap();
        let file = root.create_file("shrink.me").unwrap();
        file.write(0, &vec![1u8; 5 * fs.cluster_size() as usize]).unwrap();
        assert_eq!(fs.free_cluster_count().unwrap(), free_before - 5);
        file.set_len(1).unwrap();
        assert_eq!(fs.free_cluster_count().unwrap(), free_before - 1);
        assert_eq!(file.len().unwrap(), 1);
        file.set_len(0).unwrap();
        assert_eq!(fs.free_cluster_count().unwrap(), free_before);
        fs.close().unwrap();
    }

    #[test]
    fn reads_past_the_length_fail() {
        let disk = fat32_image();
        let mut fs = open(&disk);
        let root = fs.root().unwrap();
        let file = root.create_file("f").unwrap();
        file.write(0, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(file.read(0, &mut buf), Err(OperationError::EndOfData.into()));
        assert_eq!(file.read(4, &mut []), Err(OperationError::EndOfData.into()));
        fs.close().unwrap();
    }
}
