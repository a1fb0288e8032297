use core::fmt::{Display, Formatter, Result};

use derive_more::Display;

/// Structural corruption. The filesystem instance is not recoverable;
/// the caller must reopen the volume.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum DataError {
    #[display("boot sector signature mismatch")]
    BootSignature,
    #[display("unrecognized filesystem layout")]
    UnknownFileSystem,
    #[display("FAT copies disagree")]
    FatMismatch,
    #[display("invalid cluster chain at cluster {_0}")]
    InvalidChain(u32),
    #[display("FS information sector signature mismatch")]
    FsInfoSignature,
    #[display("FS information free cluster count disagrees with the FAT")]
    FreeCountMismatch,
}

/// Resource exhaustion. The volume is intact; the caller may retry after
/// freeing space.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum AllocationError {
    #[display("file allocation table is full")]
    FatFull,
    #[display("directory is full: capacity {capacity}, requested {requested}")]
    DirectoryFull { capacity: u32, requested: u32 },
}

/// Rejected input. The filesystem state is unchanged.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum InputError {
    #[display("not a valid 8.3 name")]
    InvalidShortName,
    #[display("name of {_0} UTF-16 units exceeds the long name limit")]
    NameTooLong(usize),
    #[display("dot entries cannot be changed")]
    DotEntry,
    #[display("{_0}")]
    InvalidArgument(&'static str),
}

/// Violation of object or filesystem state.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum OperationError {
    #[display("no such file or directory")]
    NotFound,
    #[display("name already exists")]
    AlreadyExists,
    #[display("filesystem is read-only")]
    ReadOnly,
    #[display("filesystem already closed")]
    AlreadyClosed,
    #[display("object no longer exists")]
    AlreadyInvalid,
    #[display("read past end of data")]
    EndOfData,
    #[display("not a directory")]
    NotADirectory,
    #[display("not a regular file")]
    NotAFile,
    #[display("directory not empty")]
    DirectoryNotEmpty,
}

/// Any failure a public operation can report. `E` is the block device's own
/// error type; device failures propagate verbatim inside [`Error::Io`].
#[derive(Debug, PartialEq)]
pub enum Error<E> {
    Io(E),
    Data(DataError),
    Allocation(AllocationError),
    Input(InputError),
    Operation(OperationError),
}

impl<E> From<DataError> for Error<E> {
    fn from(e: DataError) -> Self {
        Self::Data(e)
    }
}

impl<E> From<AllocationError> for Error<E> {
    fn from(e: AllocationError) -> Self {
        Self::Allocation(e)
    }
}

impl<E> From<InputError> for Error<E> {
    fn from(e: InputError) -> Self {
        Self::Input(e)
    }
}

impl<E> From<OperationError> for Error<E> {
    fn from(e: OperationError) -> Self {
        Self::Operation(e)
    }
}

impl<E: Display> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Self::Io(e) => write!(f, "IO({})", e),
            Self::Data(e) => e.fmt(f),
            Self::Allocation(e) => e.fmt(f),
            Self::Input(e) => e.fmt(f),
            Self::Operation(e) => e.fmt(f),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug + Display> std::error::Error for Error<E> {}

/// Internal union for FAT-level operations that can fail either way.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FatError {
    Data(DataError),
    Allocation(AllocationError),
}

impl From<DataError> for FatError {
    fn from(e: DataError) -> Self {
        Self::Data(e)
    }
}

impl From<AllocationError> for FatError {
    fn from(e: AllocationError) -> Self {
        Self::Allocation(e)
    }
}

impl<E> From<FatError> for Error<E> {
    fn from(e: FatError) -> Self {
        match e {
            FatError::Data(e) => Self::Data(e),
            FatError::Allocation(e) => Self::Allocation(e),
        }
    }
}
