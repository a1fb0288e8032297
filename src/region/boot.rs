//! Boot sector layout and FAT flavor discrimination.

use core::fmt::Debug;

use crate::chain::Geometry;
use crate::error::{DataError, Error, InputError};
use crate::fat::FatType;
use crate::io::BlockDevice;
use crate::sector::Sector;

/// The boot sector itself is always 512 bytes, regardless of the volume's
/// logical sector size.
pub(crate) const BOOT_SECTOR_SIZE: usize = 512;

const JUMP: usize = 0x00;
const OEM_NAME: usize = 0x03;
const BYTES_PER_SECTOR: usize = 0x0B;
const SECTORS_PER_CLUSTER: usize = 0x0D;
const RESERVED_SECTORS: usize = 0x0E;
const FAT_COUNT: usize = 0x10;
const ROOT_ENTRY_COUNT: usize = 0x11;
const TOTAL_SECTORS_16: usize = 0x13;
const MEDIA_DESCRIPTOR: usize = 0x15;
const SECTORS_PER_FAT_16: usize = 0x16;
const TOTAL_SECTORS_32: usize = 0x20;

// FAT12/16 extended boot record.
const F16_EXT_BOOT_SIGNATURE: usize = 0x26;
const F16_VOLUME_ID: usize = 0x27;
const F16_VOLUME_LABEL: usize = 0x2B;
const F16_FS_TYPE_LABEL: usize = 0x36;

// FAT32 extended boot record.
const F32_SECTORS_PER_FAT: usize = 0x24;
const F32_ROOT_DIR_CLUSTER: usize = 0x2C;
const F32_FS_INFO_SECTOR: usize = 0x30;
const F32_BOOT_COPY_SECTOR: usize = 0x32;
const F32_EXT_BOOT_SIGNATURE: usize = 0x42;
const F32_VOLUME_ID: usize = 0x43;
const F32_VOLUME_LABEL: usize = 0x47;
const F32_FS_TYPE_LABEL: usize = 0x52;

const SIGNATURE: usize = 0x1FE;
const EXT_BOOT_SIGNATURE_VALUE: u8 = 0x29;

#[derive(Debug)]
pub(crate) struct BootSector {
    sector: Sector,
    fat_type: FatType,
}

impl BootSector {
    pub fn read<E: Debug, D: BlockDevice<Error = E>>(device: &mut D) -> Result<Self, Error<E>> {
        let sector = Sector::read(device, 0, BOOT_SECTOR_SIZE)?;
        if sector.get_u16(SIGNATURE) != 0xAA55 {
            return Err(DataError::BootSignature.into());
        }
        let fat_type = Self::detect(&sector)?;
        debug!("boot sector: {:?}", fat_type);
        Ok(Self { sector, fat_type })
    }

    /// A blank boot sector for a fresh volume: x86 jump prefix, signature,
    /// extended boot signature and the flavor's type label. Geometry fields
    /// are filled in by the caller.
    pub fn create(fat_type: FatType) -> Self {
        let mut sector = Sector::zeroed(0, BOOT_SECTOR_SIZE);
        sector.set_bytes(JUMP, &hex!("EB 3C 90"));
        sector.set_bytes(OEM_NAME, b"VFAT0.3 ");
        sector.set_u16(SIGNATURE, 0xAA55);
        let (sig, label_at) = match fat_type {
            FatType::Fat32 => (F32_EXT_BOOT_SIGNATURE, F32_FS_TYPE_LABEL),
            _ => (F16_EXT_BOOT_SIGNATURE, F16_FS_TYPE_LABEL),
        };
        sector.set_u8(sig, EXT_BOOT_SIGNATURE_VALUE);
        sector.set_bytes(label_at, fat_type.label());
        let mut this = Self { sector, fat_type };
        this.set_volume_label(&[b' '; 11]);
        this
    }

    /// Derive the flavor from the on-disk structure, never the type label.
    ///
    /// FAT32 is recognized by the zeroed 16-bit sectors-per-FAT field (its
    /// table size only exists in the 32-bit field); FAT12 and FAT16 are then
    /// split on the data cluster count.
    fn detect(sector: &Sector) -> Result<FatType, DataError> {
        let bytes_per_sector = sector.get_u16(BYTES_PER_SECTOR) as u32;
        if !matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            return Err(DataError::UnknownFileSystem);
        }
        let sectors_per_cluster = sector.get_u8(SECTORS_PER_CLUSTER) as u32;
        if sectors_per_cluster == 0 || !sectors_per_cluster.is_power_of_two() {
            return Err(DataError::UnknownFileSystem);
        }
        let fat_count = sector.get_u8(FAT_COUNT) as u32;
        let reserved = sector.get_u16(RESERVED_SECTORS) as u32;
        if fat_count == 0 || reserved == 0 {
            return Err(DataError::UnknownFileSystem);
        }

        let fat32 = sector.get_u16(SECTORS_PER_FAT_16) == 0;
        let sectors_per_fat = match fat32 {
            true => sector.get_u32(F32_SECTORS_PER_FAT),
            false => sector.get_u16(SECTORS_PER_FAT_16) as u32,
        };
        let total = match sector.get_u16(TOTAL_SECTORS_16) {
            0 => sector.get_u32(TOTAL_SECTORS_32),
            n => n as u32,
        };
        if sectors_per_fat == 0 || total == 0 {
            return Err(DataError::UnknownFileSystem);
        }

        let root_entries = sector.get_u16(ROOT_ENTRY_COUNT) as u32;
        let root_sectors = (root_entries * 32 + bytes_per_sector - 1) / bytes_per_sector;
        let overhead = reserved + fat_count * sectors_per_fat + root_sectors;
        if overhead >= total {
            return Err(DataError::UnknownFileSystem);
        }
        let clusters = (total - overhead) / sectors_per_cluster;

        if fat32 {
            if root_entries != 0 || clusters > FatType::Fat32.max_clusters() {
                return Err(DataError::UnknownFileSystem);
            }
            return Ok(FatType::Fat32);
        }
        match clusters {
            0..=4084 => Ok(FatType::Fat12),
            4085..=65524 => Ok(FatType::Fat16),
            _ => Err(DataError::UnknownFileSystem),
        }
    }

    pub fn write<E: Debug, D: BlockDevice<Error = E>>(
        &mut self,
        device: &mut D,
    ) -> Result<(), Error<E>> {
        self.sector.write(device)
    }

    /// Raw image of the sector, used for the FAT32 backup copy.
    pub fn bytes(&self) -> &[u8] {
        self.sector.buffer()
    }

    pub fn is_dirty(&self) -> bool {
        self.sector.is_dirty()
    }

    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    pub fn bytes_per_sector(&self) -> u32 {
        self.sector.get_u16(BYTES_PER_SECTOR) as u32
    }

    pub fn set_bytes_per_sector(&mut self, value: u32) -> Result<(), InputError> {
        if !matches!(value, 512 | 1024 | 2048 | 4096) {
            return Err(InputError::InvalidArgument("bytes per sector must be 512..4096"));
        }
        self.sector.set_u16(BYTES_PER_SECTOR, value as u16);
        Ok(())
    }

    pub fn sectors_per_cluster(&self) -> u32 {
        self.sector.get_u8(SECTORS_PER_CLUSTER) as u32
    }

    pub fn set_sectors_per_cluster(&mut self, value: u32) -> Result<(), InputError> {
        if value == 0 || value > 128 || !value.is_power_of_two() {
            return Err(InputError::InvalidArgument("sectors per cluster must be a power of two"));
        }
        self.sector.set_u8(SECTORS_PER_CLUSTER, value as u8);
        Ok(())
    }

    pub fn reserved_sectors(&self) -> u32 {
        self.sector.get_u16(RESERVED_SECTORS) as u32
    }

    pub fn set_reserved_sectors(&mut self, value: u16) {
        self.sector.set_u16(RESERVED_SECTORS, value);
    }

    pub fn fat_count(&self) -> u32 {
        self.sector.get_u8(FAT_COUNT) as u32
    }

    pub fn set_fat_count(&mut self, value: u8) {
        self.sector.set_u8(FAT_COUNT, value);
    }

    pub fn root_entry_count(&self) -> u32 {
        self.sector.get_u16(ROOT_ENTRY_COUNT) as u32
    }

    pub fn set_root_entry_count(&mut self, value: u16) {
        self.sector.set_u16(ROOT_ENTRY_COUNT, value);
    }

    pub fn media_descriptor(&self) -> u8 {
        self.sector.get_u8(MEDIA_DESCRIPTOR)
    }

    pub fn set_media_descriptor(&mut self, value: u8) {
        self.sector.set_u8(MEDIA_DESCRIPTOR, value);
    }

    /// The 16-bit sector count, falling back to the 32-bit field when zero.
    pub fn total_sectors(&self) -> u32 {
        match self.sector.get_u16(TOTAL_SECTORS_16) {
            0 => self.sector.get_u32(TOTAL_SECTORS_32),
            n => n as u32,
        }
    }

    pub fn set_total_sectors(&mut self, value: u32) {
        if self.fat_type != FatType::Fat32 && value <= u16::MAX as u32 {
            self.sector.set_u16(TOTAL_SECTORS_16, value as u16);
            self.sector.set_u32(TOTAL_SECTORS_32, 0);
        } else {
            self.sector.set_u16(TOTAL_SECTORS_16, 0);
            self.sector.set_u32(TOTAL_SECTORS_32, value);
        }
    }

    pub fn sectors_per_fat(&self) -> u32 {
        match self.fat_type {
            FatType::Fat32 => self.sector.get_u32(F32_SECTORS_PER_FAT),
            _ => self.sector.get_u16(SECTORS_PER_FAT_16) as u32,
        }
    }

    pub fn set_sectors_per_fat(&mut self, value: u32) {
        match self.fat_type {
            FatType::Fat32 => {
                self.sector.set_u16(SECTORS_PER_FAT_16, 0);
                self.sector.set_u32(F32_SECTORS_PER_FAT, value);
            }
            _ => self.sector.set_u16(SECTORS_PER_FAT_16, value as u16),
        }
    }

    pub fn root_dir_cluster(&self) -> u32 {
        self.sector.get_u32(F32_ROOT_DIR_CLUSTER)
    }

    pub fn set_root_dir_cluster(&mut self, value: u32) {
        self.sector.set_u32(F32_ROOT_DIR_CLUSTER, value);
    }

    pub fn fs_info_sector(&self) -> u32 {
        self.sector.get_u16(F32_FS_INFO_SECTOR) as u32
    }

    pub fn set_fs_info_sector(&mut self, value: u16) {
        self.sector.set_u16(F32_FS_INFO_SECTOR, value);
    }

    pub fn set_boot_copy_sector(&mut self, value: u16) {
        self.sector.set_u16(F32_BOOT_COPY_SECTOR, value);
    }

    pub fn set_volume_id(&mut self, value: u32) {
        let offset = match self.fat_type {
            FatType::Fat32 => F32_VOLUME_ID,
            _ => F16_VOLUME_ID,
        };
        self.sector.set_u32(offset, value);
    }

    pub fn volume_label(&self) -> [u8; 11] {
        let offset = match self.fat_type {
            FatType::Fat32 => F32_VOLUME_LABEL,
            _ => F16_VOLUME_LABEL,
        };
        let mut label = [0u8; 11];
        label.copy_from_slice(self.sector.get_bytes(offset, 11));
        label
    }

    pub fn set_volume_label(&mut self, label: &[u8; 11]) {
        let offset = match self.fat_type {
            FatType::Fat32 => F32_VOLUME_LABEL,
            _ => F16_VOLUME_LABEL,
        };
        self.sector.set_bytes(offset, label);
    }

    fn root_dir_sectors(&self) -> u32 {
        let bytes_per_sector = self.bytes_per_sector();
        (self.root_entry_count() * 32 + bytes_per_sector - 1) / bytes_per_sector
    }

    /// Device offset of the `index`-th FAT copy.
    pub fn fat_offset(&self, index: u32) -> u64 {
        let sectors = self.reserved_sectors() as u64 + index as u64 * self.sectors_per_fat() as u64;
        sectors * self.bytes_per_sector() as u64
    }

    /// Device offset of the fixed FAT12/16 root directory region.
    pub fn root_dir_offset(&self) -> u64 {
        self.fat_offset(self.fat_count())
    }

    /// Device offset of the data region (cluster 2).
    pub fn files_offset(&self) -> u64 {
        self.root_dir_offset() + self.root_entry_count() as u64 * 32
    }

    pub fn data_cluster_count(&self) -> u32 {
        let overhead = self.reserved_sectors()
            + self.fat_count() * self.sectors_per_fat()
            + self.root_dir_sectors();
        (self.total_sectors() - overhead) / self.sectors_per_cluster()
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            bytes_per_sector: self.bytes_per_sector(),
            sectors_per_cluster: self.sectors_per_cluster(),
            files_offset: self.files_offset(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::ram::RamDisk;

    fn sample_fat16() -> BootSector {
        let mut boot = BootSector::create(FatType::Fat16);
        boot.set_bytes_per_sector(512).unwrap();
        boot.set_sectors_per_cluster(4).unwrap();
        boot.set_reserved_sectors(1);
        boot.set_fat_count(2);
        boot.set_root_entry_count(512);
        boot.set_media_descriptor(0xF8);
        boot.set_total_sectors(65000);
        boot.set_sectors_per_fat(64);
        boot
    }

    #[test]
    fn fat16_round_trip() {
        let mut disk = RamDisk::new(512);
        sample_fat16().write(&mut disk).unwrap();

        let boot = BootSector::read(&mut disk).unwrap();
        assert_eq!(boot.fat_type(), FatType::Fat16);
        assert_eq!(boot.total_sectors(), 65000);
        assert_eq!(boot.sectors_per_fat(), 64);
        assert_eq!(boot.fat_offset(0), 512);
        assert_eq!(boot.fat_offset(1), 512 + 64 * 512);
        assert_eq!(boot.root_dir_offset(), 512 + 2 * 64 * 512);
        assert_eq!(boot.files_offset(), boot.root_dir_offset() + 512 * 32);
        // (65000 - 1 - 128 - 32) / 4
        assert_eq!(boot.data_cluster_count(), 16209);
    }

    #[test]
    fn signature_is_required() {
        let mut disk = RamDisk::new(512);
        let err = BootSector::read(&mut disk).unwrap_err();
        assert_eq!(err, DataError::BootSignature.into());
    }

    #[test]
    fn flavor_follows_cluster_count_not_label() {
        let mut boot = sample_fat16();
        // Shrink the volume until fewer than 4085 clusters remain; the type
        // label still says FAT16 but detection must say FAT12.
        boot.set_total_sectors(8000);
        let mut disk = RamDisk::new(512);
        boot.write(&mut disk).unwrap();
        let boot = BootSector::read(&mut disk).unwrap();
        assert_eq!(boot.fat_type(), FatType::Fat12);
    }

    #[test]
    fn fat32_is_recognized_structurally() {
        let mut boot = BootSector::create(FatType::Fat32);
        boot.set_bytes_per_sector(512).unwrap();
        boot.set_sectors_per_cluster(1).unwrap();
        boot.set_reserved_sectors(32);
        boot.set_fat_count(2);
        boot.set_root_entry_count(0);
        boot.set_media_descriptor(0xF8);
        boot.set_total_sectors(32617);
        boot.set_sectors_per_fat(255);
        boot.set_root_dir_cluster(2);
        boot.set_fs_info_sector(1);
        let mut disk = RamDisk::new(512);
        boot.write(&mut disk).unwrap();

        let boot = BootSector::read(&mut disk).unwrap();
        // Well under 65525 clusters, yet still FAT32: the 16-bit
        // sectors-per-FAT field is zero.
        assert_eq!(boot.fat_type(), FatType::Fat32);
        assert_eq!(boot.sectors_per_fat(), 255);
        assert_eq!(boot.root_dir_cluster(), 2);
    }
}
