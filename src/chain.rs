//! A cluster chain: the variable-length extent of clusters backing a file
//! or a non-root directory, addressed as a flat byte range.

use alloc::vec::Vec;
use core::fmt::Debug;

use crate::error::{Error, OperationError};
use crate::fat::Fat;
use crate::io::BlockDevice;
use crate::sync::{acquire, Shared};

/// Cluster arithmetic shared by everything that touches the data region.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    /// Device offset of cluster 2.
    pub files_offset: u64,
}

impl Geometry {
    pub fn cluster_size(&self) -> u32 {
        self.bytes_per_sector * self.sectors_per_cluster
    }
}

pub(crate) struct ClusterChain<D: BlockDevice> {
    device: Shared<D>,
    fat: Shared<Fat>,
    geometry: Geometry,
    /// 0 when the chain is empty.
    start: u32,
}

impl<D: BlockDevice> Clone for ClusterChain<D> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            fat: self.fat.clone(),
            geometry: self.geometry,
            start: self.start,
        }
    }
}

impl<E: Debug, D: BlockDevice<Error = E>> ClusterChain<D> {
    pub fn new(device: Shared<D>, fat: Shared<Fat>, geometry: Geometry, start: u32) -> Self {
        Self { device, fat, geometry, start }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn cluster_size(&self) -> u32 {
        self.geometry.cluster_size()
    }

    fn device_offset(&self, cluster: u32, intra: u32) -> u64 {
        self.geometry.files_offset
            + (cluster as u64 - 2) * self.geometry.cluster_size() as u64
            + intra as u64
    }

    pub fn clusters(&self) -> Result<Vec<u32>, Error<E>> {
        if self.start == 0 {
            return Ok(Vec::new());
        }
        Ok(acquire!(self.fat).chain(self.start)?)
    }

    pub fn chain_length(&self) -> Result<u32, Error<E>> {
        Ok(self.clusters()?.len() as u32)
    }

    pub fn length_on_disk(&self) -> Result<u64, Error<E>> {
        Ok(self.chain_length()? as u64 * self.geometry.cluster_size() as u64)
    }

    /// Grow or shrink the chain to exactly `length` clusters. On allocation
    /// failure while growing, the chain is left at its prior length.
    pub fn set_chain_length(&mut self, length: u32) -> Result<(), Error<E>> {
        let clusters = self.clusters()?;
        let current = clusters.len() as u32;
        if length == current {
            return Ok(());
        }
        let mut fat = acquire!(self.fat);
        if length == 0 {
            fat.free_chain(self.start)?;
            self.start = 0;
        } else if current == 0 {
            self.start = fat.alloc_chain(length)?;
        } else if length > current {
            let old_tail = clusters[current as usize - 1];
            let mut last = old_tail;
            let mut added = Vec::new();
            for _ in current..length {
                match fat.alloc_append(last) {
                    Ok(cluster) => {
                        last = cluster;
                        added.push(cluster);
                    }
                    Err(e) => {
                        for cluster in added {
                            fat.set_free(cluster);
                        }
                        fat.set_eof(old_tail);
                        return Err(e.into());
                    }
                }
            }
        } else {
            fat.set_eof(clusters[length as usize - 1]);
            for &cluster in &clusters[length as usize..] {
                fat.set_free(cluster);
            }
        }
        Ok(())
    }

    /// Resize so that `bytes` fit, rounding up to whole clusters.
    pub fn set_size(&mut self, bytes: u64) -> Result<(), Error<E>> {
        let cluster_size = self.geometry.cluster_size() as u64;
        self.set_chain_length(((bytes + cluster_size - 1) / cluster_size) as u32)
    }

    pub fn free(&mut self) -> Result<(), Error<E>> {
        self.set_chain_length(0)
    }

    pub fn read(&self, offset: u64, dst: &mut [u8]) -> Result<(), Error<E>> {
        if dst.is_empty() {
            return Ok(());
        }
        let clusters = self.clusters()?;
        let cluster_size = self.geometry.cluster_size() as u64;
        if offset + dst.len() as u64 > clusters.len() as u64 * cluster_size {
            return Err(OperationError::EndOfData.into());
        }
        let mut device = acquire!(self.device);
        let mut pos = offset;
        let mut done = 0;
        while done < dst.len() {
            let index = (pos / cluster_size) as usize;
            let intra = (pos % cluster_size) as u32;
            let chunk = ((cluster_size - intra as u64) as usize).min(dst.len() - done);
            let device_offset = self.device_offset(clusters[index], intra);
            device.read_at(device_offset, &mut dst[done..done + chunk]).map_err(Error::Io)?;
            pos += chunk as u64;
            done += chunk;
        }
        Ok(())
    }

    /// Write through to the device, growing the chain as needed to cover
    /// `offset + src.len()` bytes.
    pub fn write(&mut self, offset: u64, src: &[u8]) -> Result<(), Error<E>> {
        if src.is_empty() {
            return Ok(());
        }
        let end = offset + src.len() as u64;
        if end > self.length_on_disk()? {
            self.set_size(end)?;
        }
        let clusters = self.clusters()?;
        let cluster_size = self.geometry.cluster_size() as u64;
        let mut device = acquire!(self.device);
        let mut pos = offset;
        let mut done = 0;
        while done < src.len() {
            let index = (pos / cluster_size) as usize;
            let intra = (pos % cluster_size) as u32;
            let chunk = ((cluster_size - intra as u64) as usize).min(src.len() - done);
            let device_offset = self.device_offset(clusters[index], intra);
            device.write_at(device_offset, &src[done..done + chunk]).map_err(Error::Io)?;
            pos += chunk as u64;
            done += chunk;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fat::FatType;
    use crate::io::ram::RamDisk;
    use crate::sync::shared;

    fn setup() -> (ClusterChain<RamDisk>, Shared<Fat>) {
        let geometry = Geometry { bytes_per_sector: 512, sectors_per_cluster: 1, files_offset: 0 };
        let fat = shared(Fat::create(FatType::Fat16, 512, 64, 0xF8));
        let device = shared(RamDisk::new(64 * 512));
        (ClusterChain::new(device, fat.clone(), geometry, 0), fat)
    }

    #[test]
    fn grow_and_shrink() {
        let (mut chain, fat) = setup();
        assert_eq!(chain.length_on_disk().unwrap(), 0);
        chain.set_chain_length(3).unwrap();
        assert_ne!(chain.start(), 0);
        assert_eq!(chain.chain_length().unwrap(), 3);
        chain.set_chain_length(1).unwrap();
        assert_eq!(chain.chain_length().unwrap(), 1);
        assert_eq!(acquire!(fat).free_cluster_count(), 62 - 1);
        chain.free().unwrap();
        assert_eq!(chain.start(), 0);
        assert_eq!(acquire!(fat).free_cluster_count(), 62);
    }

    #[test]
    fn read_past_extent_is_end_of_data() {
        let (chain, _) = setup();
        let mut buf = [0u8; 1];
        assert_eq!(chain.read(0, &mut buf), Err(OperationError::EndOfData.into()));
    }

    #[test]
    fn write_grows_and_round_trips() {
        let (mut chain, _) = setup();
        // Straddles two clusters.
        let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        chain.write(300, &data).unwrap();
        assert_eq!(chain.chain_length().unwrap(), 3);

        let mut back = alloc::vec![0u8; 1000];
        chain.read(300, &mut back).unwrap();
        assert_eq!(back, data);

        // Zero-length IO is a no-op even at a wild offset.
        chain.write(1 << 40, &[]).unwrap();
        chain.read(1 << 40, &mut [0u8; 0]).unwrap();
    }

    #[test]
    fn set_size_rounds_up() {
        let (mut chain, _) = setup();
        chain.set_size(513).unwrap();
        assert_eq!(chain.chain_length().unwrap(), 2);
        chain.set_size(512).unwrap();
        assert_eq!(chain.chain_length().unwrap(), 1);
    }
}
