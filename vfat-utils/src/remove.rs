use vfat::Directory;

use crate::filepath::{parent, Disk, FsError};

pub fn remove(root: &Directory<Disk>, path: &str) -> Result<(), FsError> {
    let (dir, name) = parent(root, path)?;
    dir.remove(&name)
}
