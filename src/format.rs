//! Super-floppy formatter: lays down a pristine volume (boot sector, FAT
//! copies, empty root, FS-info for FAT32) on a block device.

use alloc::vec;
use core::fmt::Debug;

use crate::error::{Error, InputError};
use crate::fat::{Fat, FatType};
use crate::io::BlockDevice;
use crate::region::boot::BootSector;
use crate::region::fsinfo::FsInfoSector;

const MEDIA_FIXED: u8 = 0xF8;
const DEFAULT_LABEL: [u8; 11] = *b"NO NAME    ";

#[derive(Copy, Clone, Debug, Default)]
pub struct FormatOptions {
    /// Flavor to create; picked from the device size when absent.
    pub fat_type: Option<FatType>,
    pub volume_label: Option<[u8; 11]>,
    pub volume_id: u32,
}

/// Find the sectors-per-FAT fixed point for one cluster-size candidate;
/// `None` when the cluster count overflows the flavor.
fn layout(
    fat_type: FatType,
    total_sectors: u32,
    bytes_per_sector: u32,
    reserved: u32,
    root_entries: u32,
    fat_count: u32,
    sectors_per_cluster: u32,
) -> Option<(u32, u32)> {
    let root_sectors = (root_entries * 32 + bytes_per_sector - 1) / bytes_per_sector;
    let mut sectors_per_fat = 1u32;
    for _ in 0..32 {
        let overhead = reserved + fat_count * sectors_per_fat + root_sectors;
        if overhead >= total_sectors {
            return None;
        }
        let clusters = (total_sectors - overhead) / sectors_per_cluster;
        let bytes = ((clusters as u64 + 2) * fat_type.bits() as u64 + 7) / 8;
        let needed = ((bytes + bytes_per_sector as u64 - 1) / bytes_per_sector as u64) as u32;
        if needed == sectors_per_fat {
            if clusters > fat_type.max_clusters() {
                return None;
            }
            return Some((sectors_per_fat, clusters));
        }
        sectors_per_fat = needed;
    }
    None
}

pub fn format<E: Debug, D: BlockDevice<Error = E>>(
    device: &mut D,
    options: &FormatOptions,
) -> Result<(), Error<E>> {
    let bytes_per_sector = device.sector_size();
    let total_sectors = (device.size() / bytes_per_sector as u64).min(u32::MAX as u64) as u32;
    if total_sectors < 64 {
        return Err(InputError::InvalidArgument("device too small").into());
    }
    let fat_type = options.fat_type.unwrap_or(match total_sectors {
        0..=16383 => FatType::Fat12,
        16384..=1048575 => FatType::Fat16,
        _ => FatType::Fat32,
    });
    let (reserved, root_entries, fat_count) = match fat_type {
        FatType::Fat32 => (32u32, 0u32, 2u32),
        _ => (1, 512, 2),
    };

    let mut sectors_per_cluster = 1u32;
    let (sectors_per_fat, cluster_count) = loop {
        let candidate = layout(
            fat_type,
            total_sectors,
            bytes_per_sector,
            reserved,
            root_entries,
            fat_count,
            sectors_per_cluster,
        );
        match candidate {
            Some(layout) => break layout,
            None if sectors_per_cluster < 128 => sectors_per_cluster *= 2,
            None => return Err(InputError::InvalidArgument("device does not fit flavor").into()),
        }
    };
    // The mount side derives FAT12 vs FAT16 from the cluster count, so the
    // created geometry must land in the requested band.
    if fat_type == FatType::Fat16 && cluster_count <= 4084 {
        return Err(InputError::InvalidArgument("volume too small for FAT16").into());
    }
    debug!(
        "format {:?}: {} sectors, {} per cluster, {} per FAT, {} clusters",
        fat_type, total_sectors, sectors_per_cluster, sectors_per_fat, cluster_count
    );

    let mut boot = BootSector::create(fat_type);
    boot.set_bytes_per_sector(bytes_per_sector)?;
    boot.set_sectors_per_cluster(sectors_per_cluster)?;
    boot.set_reserved_sectors(reserved as u16);
    boot.set_fat_count(fat_count as u8);
    boot.set_root_entry_count(root_entries as u16);
    boot.set_media_descriptor(MEDIA_FIXED);
    boot.set_total_sectors(total_sectors);
    boot.set_sectors_per_fat(sectors_per_fat);
    boot.set_volume_id(options.volume_id);
    boot.set_volume_label(&options.volume_label.unwrap_or(DEFAULT_LABEL));

    let entry_count = cluster_count + 2;
    let fat_bytes = (sectors_per_fat * bytes_per_sector) as usize;
    let mut fat = Fat::create(fat_type, fat_bytes, entry_count, MEDIA_FIXED);

    if fat_type == FatType::Fat32 {
        boot.set_root_dir_cluster(2);
        boot.set_fs_info_sector(1);
        boot.set_boot_copy_sector(6);
        // The root directory occupies one pre-allocated cluster.
        fat.set_eof(2);
    }

    boot.write(device)?;
    for index in 0..fat_count {
        fat.write(device, boot.fat_offset(index))?;
    }
    match fat_type {
        FatType::Fat32 => {
            let cluster = vec![0u8; boot.geometry().cluster_size() as usize];
            device.write_at(boot.files_offset(), &cluster).map_err(Error::Io)?;

            let mut info = FsInfoSector::create(bytes_per_sector as u64);
            info.set_free_cluster_count(cluster_count - 1);
            info.set_last_allocated(2);
            info.write(device)?;

            device.write_at(6 * bytes_per_sector as u64, boot.bytes()).map_err(Error::Io)?;
        }
        _ => {
            let root = vec![0u8; root_entries as usize * 32];
            device.write_at(boot.root_dir_offset(), &root).map_err(Error::Io)?;
        }
    }
    device.flush().map_err(Error::Io)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::ram::RamDisk;

    #[test]
    fn fat12_fits_small_media() {
        let mut disk = RamDisk::new(1 << 20);
        format(&mut disk, &FormatOptions::default()).unwrap();
        let boot = BootSector::read(&mut disk).unwrap();
        assert_eq!(boot.fat_type(), FatType::Fat12);
        assert!(boot.data_cluster_count() <= 4084);
    }

    #[test]
    fn fat16_band_is_respected() {
        let mut disk = RamDisk::new(16 << 20);
        format(&mut disk, &FormatOptions::default()).unwrap();
        let boot = BootSector::read(&mut disk).unwrap();
        assert_eq!(boot.fat_type(), FatType::Fat16);
        let clusters = boot.data_cluster_count();
        assert!(clusters > 4084 && clusters <= 65524);
    }

    #[test]
    fn forced_fat32_on_small_media() {
        let mut disk = RamDisk::new(16_700_000);
        let options = FormatOptions { fat_type: Some(FatType::Fat32), ..Default::default() };
        format(&mut disk, &options).unwrap();
        let boot = BootSector::read(&mut disk).unwrap();
        assert_eq!(boot.fat_type(), FatType::Fat32);
        assert_eq!(boot.root_dir_cluster(), 2);
        // Backup boot sector at sector 6.
        let bytes = disk.snapshot();
        assert_eq!(&bytes[6 * 512..7 * 512], boot.bytes());
    }

    #[test]
    fn fat16_on_tiny_media_is_rejected() {
        let mut disk = RamDisk::new(1 << 20);
        let options = FormatOptions { fat_type: Some(FatType::Fat16), ..Default::default() };
        assert!(format(&mut disk, &options).is_err());
    }
}
