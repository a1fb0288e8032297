use vfat::Directory;

use crate::filepath::{parent, Disk, FsError};

pub fn mkdir(root: &Directory<Disk>, path: &str) -> Result<(), FsError> {
    let (dir, name) = parent(root, path)?;
    dir.create_directory(&name).map(|_| ())
}
