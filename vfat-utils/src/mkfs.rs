use vfat::error::InputError;
use vfat::io::std::FileDisk;
use vfat::{format, FatType, FormatOptions};

use crate::filepath::FsError;

#[derive(Debug, clap::Args)]
pub struct Mkfs {
    /// FAT flavor: 12, 16 or 32; picked from the device size when absent
    #[clap(short, long)]
    fat_type: Option<u8>,
    /// Volume label, at most 11 ASCII characters
    #[clap(short, long)]
    label: Option<String>,
}

pub fn mkfs(device: &str, options: &Mkfs) -> Result<(), FsError> {
    let fat_type = match options.fat_type {
        None => None,
        Some(12) => Some(FatType::Fat12),
        Some(16) => Some(FatType::Fat16),
        Some(32) => Some(FatType::Fat32),
        Some(_) => return Err(InputError::InvalidArgument("fat type must be 12, 16 or 32").into()),
    };
    let volume_label = match &options.label {
        None => None,
        Some(label) => {
            if label.len() > 11 || !label.is_ascii() {
                return Err(
                    InputError::InvalidArgument("label must be at most 11 ASCII bytes").into()
                );
            }
            let mut raw = [b' '; 11];
            raw[..label.len()].copy_from_slice(label.as_bytes());
            Some(raw)
        }
    };
    let mut disk = FileDisk::open(device, false).expect("cannot open device");
    format(&mut disk, &FormatOptions { fat_type, volume_label, volume_id: 0 })
}
