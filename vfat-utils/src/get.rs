use std::fs::File;
use std::io::Write;

use vfat::error::OperationError;
use vfat::{Directory, FileOrDirectory};

use crate::filepath::{open, Disk, FsError};

pub fn get(root: &Directory<Disk>, path: &str, dest: &str) -> Result<(), FsError> {
    let file = match open(root, path)? {
        FileOrDirectory::File(file) => file,
        FileOrDirectory::Directory(_) => return Err(OperationError::NotAFile.into()),
    };
    let mut dest = File::create(dest).expect("cannot create destination");
    let mut buffer = [0u8; 4096];
    let length = file.len()?;
    let mut offset = 0u32;
    while offset < length {
        let chunk = buffer.len().min((length - offset) as usize);
        file.read(offset, &mut buffer[..chunk])?;
        dest.write_all(&buffer[..chunk]).expect("unable to write destination");
        offset += chunk as u32;
    }
    Ok(())
}
