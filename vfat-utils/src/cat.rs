use std::io::Write;

use vfat::{Directory, FileOrDirectory};

use crate::filepath::{open, Disk, FsError};

pub fn cat(root: &Directory<Disk>, path: &str) -> Result<(), FsError> {
    let file = match open(root, path)? {
        FileOrDirectory::File(file) => file,
        FileOrDirectory::Directory(_) => return Err(vfat::error::OperationError::NotAFile.into()),
    };
    let mut stdout = std::io::stdout().lock();
    let mut buffer = [0u8; 4096];
    let length = file.len()?;
    let mut offset = 0u32;
    while offset < length {
        let chunk = buffer.len().min((length - offset) as usize);
        file.read(offset, &mut buffer[..chunk])?;
        stdout.write_all(&buffer[..chunk]).expect("unable to write to stdout");
        offset += chunk as u32;
    }
    Ok(())
}
