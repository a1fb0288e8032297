use vfat::Directory;

use crate::filepath::{parent, Disk, FsError};

pub fn mv(root: &Directory<Disk>, path: &str, new_path: &str) -> Result<(), FsError> {
    let (source, name) = parent(root, path)?;
    let (target, new_name) = parent(root, new_path)?;
    source.rename(&name, &target, &new_name)
}
