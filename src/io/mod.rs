pub mod ram;
#[cfg(feature = "std")]
pub mod std;

use core::fmt::Debug;

/// Sector-addressed storage underneath a filesystem instance.
///
/// Offsets are byte-granular; by convention the filesystem issues reads and
/// writes aligned to [`sector_size`](BlockDevice::sector_size). A device is
/// exclusively owned by one filesystem instance, which acquires it at open
/// and releases it with [`close`](BlockDevice::close). Ranges reaching past
/// [`size`](BlockDevice::size) must fail.
pub trait BlockDevice {
    type Error: Debug;

    /// Total capacity in bytes.
    fn size(&self) -> u64;
    /// Native sector size in bytes, usually 512.
    fn sector_size(&self) -> u32;
    fn read_at(&mut self, offset: u64, dst: &mut [u8]) -> Result<(), Self::Error>;
    fn write_at(&mut self, offset: u64, src: &[u8]) -> Result<(), Self::Error>;
    fn flush(&mut self) -> Result<(), Self::Error>;
    fn close(&mut self) -> Result<(), Self::Error>;
    fn is_closed(&self) -> bool;
    fn is_read_only(&self) -> bool;
}
