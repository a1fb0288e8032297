use std::io;

use vfat::error::{Error, OperationError};
use vfat::io::std::FileDisk;
use vfat::{Directory, FileOrDirectory};

pub type Disk = FileDisk;
pub type FsError = Error<io::Error>;

/// Resolve a slash-separated path against `root`.
pub fn open(root: &Directory<Disk>, path: &str) -> Result<FileOrDirectory<Disk>, FsError> {
    let path = path.trim().trim_matches('/');
    if path.is_empty() {
        return Ok(FileOrDirectory::Directory(root.clone()));
    }
    let mut dir = root.clone();
    let mut parts = path.split('/').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            return dir.open(part);
        }
        dir = dir.open_directory(part)?;
    }
    Err(OperationError::NotFound.into())
}

/// Split a path into its parent directory and final component.
pub fn parent(root: &Directory<Disk>, path: &str) -> Result<(Directory<Disk>, String), FsError> {
    let path = path.trim().trim_matches('/');
    if path.is_empty() {
        return Err(OperationError::NotFound.into());
    }
    match path.rsplit_once('/') {
        Some((base, name)) => match open(root, base)? {
            FileOrDirectory::Directory(dir) => Ok((dir, name.to_string())),
            FileOrDirectory::File(_) => Err(OperationError::NotADirectory.into()),
        },
        None => Ok((root.clone(), path.to_string())),
    }
}
