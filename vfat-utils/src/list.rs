use chrono::NaiveDateTime;
use vfat::{Directory, FileOrDirectory};

use crate::filepath::{open, Disk, FsError};

pub fn list(root: &Directory<Disk>, path: &str) -> Result<(), FsError> {
    let dir = match open(root, path)? {
        FileOrDirectory::Directory(dir) => dir,
        FileOrDirectory::File(_) => {
            return Err(vfat::error::OperationError::NotADirectory.into())
        }
    };
    for info in dir.entries()? {
        let attrs = info.attributes;
        print!("{}", if attrs.directory() > 0 { "d" } else { "-" });
        print!("{}", if attrs.read_only() > 0 { "r" } else { "-" });
        print!("{}", if attrs.system() > 0 { "s" } else { "-" });
        print!("{}", if attrs.hidden() > 0 { "h" } else { "-" });
        print!("{}", if attrs.archive() > 0 { "a" } else { "-" });
        print!(" {:10}", info.size);
        let modified = NaiveDateTime::from(info.modified);
        print!(" {}", modified.format("%Y-%m-%d %H:%M:%S"));
        if attrs.directory() > 0 {
            println!(" {}/", info.name);
        } else {
            println!(" {}", info.name);
        }
    }
    Ok(())
}
