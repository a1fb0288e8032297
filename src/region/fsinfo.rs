//! FAT32 FS information sector: cached free-cluster count and the
//! last-allocated-cluster hint.

use core::fmt::Debug;

use crate::error::{DataError, Error};
use crate::io::BlockDevice;
use crate::sector::Sector;

const LEAD_SIGNATURE: usize = 0x000;
const STRUCT_SIGNATURE: usize = 0x1E4;
const FREE_CLUSTER_COUNT: usize = 0x1E8;
const LAST_ALLOCATED: usize = 0x1EC;
const TRAIL_SIGNATURE: usize = 0x1FE;

const LEAD_SIGNATURE_VALUE: u32 = 0x41615252;
const STRUCT_SIGNATURE_VALUE: u32 = 0x61417272;
const TRAIL_SIGNATURE_VALUE: u16 = 0xAA55;

/// "Free count unknown" marker.
const UNKNOWN: u32 = 0xFFFFFFFF;

#[derive(Debug)]
pub(crate) struct FsInfoSector {
    sector: Sector,
}

impl FsInfoSector {
    pub fn read<E: Debug, D: BlockDevice<Error = E>>(
        device: &mut D,
        offset: u64,
    ) -> Result<Self, Error<E>> {
        let sector = Sector::read(device, offset, 512)?;
        if sector.get_u32(LEAD_SIGNATURE) != LEAD_SIGNATURE_VALUE
            || sector.get_u32(STRUCT_SIGNATURE) != STRUCT_SIGNATURE_VALUE
            || sector.get_u16(TRAIL_SIGNATURE) != TRAIL_SIGNATURE_VALUE
        {
            return Err(DataError::FsInfoSignature.into());
        }
        Ok(Self { sector })
    }

    pub fn create(offset: u64) -> Self {
        let mut sector = Sector::zeroed(offset, 512);
        sector.set_u32(LEAD_SIGNATURE, LEAD_SIGNATURE_VALUE);
        sector.set_u32(STRUCT_SIGNATURE, STRUCT_SIGNATURE_VALUE);
        sector.set_u16(TRAIL_SIGNATURE, TRAIL_SIGNATURE_VALUE);
        sector.set_u32(FREE_CLUSTER_COUNT, UNKNOWN);
        sector.set_u32(LAST_ALLOCATED, UNKNOWN);
        Self { sector }
    }

    pub fn write<E: Debug, D: BlockDevice<Error = E>>(
        &mut self,
        device: &mut D,
    ) -> Result<(), Error<E>> {
        self.sector.write(device)
    }

    /// `None` when the count on disk is the "unknown" marker.
    pub fn free_cluster_count(&self) -> Option<u32> {
        match self.sector.get_u32(FREE_CLUSTER_COUNT) {
            UNKNOWN => None,
            n => Some(n),
        }
    }

    pub fn set_free_cluster_count(&mut self, count: u32) {
        self.sector.set_u32(FREE_CLUSTER_COUNT, count);
    }

    pub fn last_allocated(&self) -> Option<u32> {
        match self.sector.get_u32(LAST_ALLOCATED) {
            UNKNOWN => None,
            n => Some(n),
        }
    }

    pub fn set_last_allocated(&mut self, cluster: u32) {
        self.sector.set_u32(LAST_ALLOCATED, cluster);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::ram::RamDisk;

    #[test]
    fn round_trip() {
        let mut disk = RamDisk::new(2048);
        let mut info = FsInfoSector::create(512);
        assert_eq!(info.free_cluster_count(), None);
        info.set_free_cluster_count(1234);
        info.set_last_allocated(56);
        info.write(&mut disk).unwrap();

        let info = FsInfoSector::read(&mut disk, 512).unwrap();
        assert_eq!(info.free_cluster_count(), Some(1234));
        assert_eq!(info.last_allocated(), Some(56));
    }

    #[test]
    fn bad_signature_is_corruption() {
        let mut disk = RamDisk::new(1024);
        let err = FsInfoSector::read(&mut disk, 512).unwrap_err();
        assert_eq!(err, DataError::FsInfoSignature.into());
    }
}
