use std::fs::File;
use std::io::Read;

use vfat::error::OperationError;
use vfat::Directory;

use crate::filepath::{parent, Disk, FsError};

pub fn put(root: &Directory<Disk>, path: &str, source: &str) -> Result<(), FsError> {
    let (dir, name) = parent(root, path)?;
    if dir.entry(&name)?.is_some() {
        return Err(OperationError::AlreadyExists.into());
    }
    let mut source = File::open(source).expect("no such file");
    let file = dir.create_file(&name)?;
    let mut buffer = [0u8; 4096];
    let mut offset = 0u32;
    loop {
        let size = source.read(&mut buffer).expect("unable to read");
        if size == 0 {
            break;
        }
        file.write(offset, &buffer[..size])?;
        offset += size as u32;
    }
    Ok(())
}
