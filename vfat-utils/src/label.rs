use vfat::FatFileSystem;

use crate::filepath::{Disk, FsError};

pub fn label(fs: &mut FatFileSystem<Disk>, new_label: Option<&str>) -> Result<(), FsError> {
    match new_label {
        Some(new_label) => fs.set_volume_label(new_label),
        None => {
            println!("{}", fs.volume_label()?);
            Ok(())
        }
    }
}
