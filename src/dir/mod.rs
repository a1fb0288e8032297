//! The long-file-name directory façade: uniqueness indexes over a raw
//! directory, lazy child caches, and the add/remove/move/flush operations.

pub(crate) mod entry;
pub(crate) mod lfn;
pub(crate) mod short_name;
pub(crate) mod storage;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::chain::{ClusterChain, Geometry};
use crate::dir::short_name::EntropySource;
use crate::error::{Error, InputError, OperationError};
use crate::fat::Fat;
use crate::file::{File, FileNode};
use crate::io::BlockDevice;
use crate::sync::{acquire, same, shared, Shared};
use crate::FsContext;

use entry::{Attributes, DirEntry, DosDate, DosDateTime};
use short_name::{generate_invalid, ShortName, XorShift32};
use storage::RawDirectory;

/// A listing snapshot of one directory entry.
#[derive(Clone, Debug)]
pub struct EntryInfo {
    pub name: String,
    pub short_name: heapless::String<12>,
    pub attributes: Attributes,
    pub size: u32,
    pub created: DosDateTime,
    pub modified: DosDateTime,
    pub accessed: DosDate,
}

impl EntryInfo {
    pub fn is_directory(&self) -> bool {
        self.attributes.directory() > 0
    }
}

fn lower(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

pub(crate) struct Slot<D: BlockDevice> {
    long_name: Option<String>,
    entry: Shared<DirEntry>,
    file: Option<Shared<FileNode<D>>>,
    dir: Option<Shared<DirNode<D>>>,
}

pub(crate) struct DirNode<D: BlockDevice> {
    storage: RawDirectory<D>,
    device: Shared<D>,
    fat: Shared<Fat>,
    geometry: Geometry,
    rng: XorShift32,
    slots: BTreeMap<ShortName, Slot<D>>,
    names: BTreeMap<String, ShortName>,
    /// 32-byte records the directory consumes, LFN slots and label included.
    used_entries: u32,
    pub valid: bool,
}

impl<E: Debug, D: BlockDevice<Error = E>> DirNode<D> {
    /// Index the records of `storage`: every run of LFN slots belongs to
    /// the real entry that follows it; deleted and inconsistent records are
    /// skipped.
    pub fn from_storage(
        mut storage: RawDirectory<D>,
        device: Shared<D>,
        fat: Shared<Fat>,
        geometry: Geometry,
        seed: u32,
    ) -> Self {
        let records = core::mem::take(&mut storage.entries);
        let mut node = Self {
            storage,
            device,
            fat,
            geometry,
            rng: XorShift32::new(seed),
            slots: BTreeMap::new(),
            names: BTreeMap::new(),
            used_entries: 0,
            valid: true,
        };
        let mut run: Vec<DirEntry> = Vec::new();
        for record in records {
            if record.is_deleted() {
                run.clear();
                continue;
            }
            if record.is_lfn() {
                run.push(record);
                continue;
            }
            let long = lfn::decode(&run, record.short_name().checksum());
            run.clear();
            node.insert_parsed(long, record);
        }
        if node.storage.label.is_some() {
            node.used_entries += 1;
        }
        node
    }

    fn insert_parsed(&mut self, long_name: Option<String>, record: DirEntry) {
        let short = record.short_name();
        if self.slots.contains_key(&short) {
            warn!("duplicate short name {:?}, entry skipped", short.to_display());
            return;
        }
        let display = match &long_name {
            Some(name) => name.clone(),
            None => short.to_display().as_str().to_string(),
        };
        let key = lower(display.trim());
        if self.names.contains_key(&key) {
            warn!("duplicate name {}, entry skipped", display);
            return;
        }
        self.used_entries += Self::record_count(&long_name);
        self.names.insert(key, short);
        self.slots.insert(short, Slot { long_name, entry: shared(record), file: None, dir: None });
    }

    fn record_count(long_name: &Option<String>) -> u32 {
        1 + match long_name {
            Some(name) => lfn::slot_count(name.encode_utf16().count()) as u32,
            None => 0,
        }
    }

    fn display_of(&self, short: ShortName) -> String {
        let slot = &self.slots[&short];
        match &slot.long_name {
            Some(name) => name.clone(),
            None => acquire!(slot.entry).short_name().to_display().as_str().to_string(),
        }
    }

    /// Uniqueness and length checks shared by create and move; returns the
    /// trimmed name and the record count it will occupy.
    fn validate_add(&self, name: &str) -> Result<(String, u32), Error<E>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InputError::InvalidArgument("empty name").into());
        }
        let units = name.encode_utf16().count();
        if units > lfn::MAX_NAME_UNITS {
            return Err(InputError::NameTooLong(units).into());
        }
        if self.names.contains_key(&lower(name)) {
            return Err(OperationError::AlreadyExists.into());
        }
        Ok((name.to_string(), 1 + lfn::slot_count(units) as u32))
    }

    fn generate_short(&mut self) -> ShortName {
        loop {
            let candidate = generate_invalid(&mut self.rng);
            if !self.slots.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn reserve(&mut self, extra: u32) -> Result<(), Error<E>> {
        trace!("{} of {} records used, need {} more", self.used_entries, self.storage.capacity(), extra);
        self.storage.ensure_capacity(self.used_entries + extra)
    }

    fn insert_new(&mut self, name: String, short: ShortName, entry: DirEntry, count: u32) {
        self.names.insert(lower(&name), short);
        self.slots
            .insert(short, Slot { long_name: Some(name), entry: shared(entry), file: None, dir: None });
        self.used_entries += count;
    }

    pub fn add_file(&mut self, name: &str) -> Result<ShortName, Error<E>> {
        let (name, count) = self.validate_add(name)?;
        self.reserve(count)?;
        let short = self.generate_short();
        debug!("create file {} ({})", name, short.to_display());
        let entry = DirEntry::new_file(short, DosDateTime::now());
        self.insert_new(name, short, entry, count);
        Ok(short)
    }

    /// Create a subdirectory: one cluster for its storage, "." and ".."
    /// entries, then the parent-side record. The cluster is released again
    /// if the parent cannot take the record.
    pub fn add_directory(&mut self, name: &str) -> Result<ShortName, Error<E>> {
        let (name, count) = self.validate_add(name)?;
        let short = self.generate_short();
        debug!("create directory {} ({})", name, short.to_display());
        let mut entry = DirEntry::new_directory(short, DosDateTime::now());
        let cluster = acquire!(self.fat).alloc_new()?;
        entry.set_start_cluster(cluster);
        if let Err(e) = self.create_sub(&entry, cluster, &name, short, count) {
            acquire!(self.fat).set_free(cluster);
            return Err(e);
        }
        Ok(short)
    }

    fn create_sub(
        &mut self,
        entry: &DirEntry,
        cluster: u32,
        name: &str,
        short: ShortName,
        count: u32,
    ) -> Result<(), Error<E>> {
        let chain =
            ClusterChain::new(self.device.clone(), self.fat.clone(), self.geometry, cluster);
        let mut child = RawDirectory::create_chain(chain)?;

        // Both dot entries carry the timestamps of the parent-side record.
        let mut dot = DirEntry::new_directory(ShortName::DOT, entry.created());
        dot.set_modified(entry.modified());
        dot.set_accessed(entry.accessed());
        dot.set_start_cluster(cluster);
        let mut dot_dot = DirEntry::new_directory(ShortName::DOT_DOT, entry.created());
        dot_dot.set_modified(entry.modified());
        dot_dot.set_accessed(entry.accessed());
        dot_dot.set_start_cluster(self.storage.storage_cluster());

        child.entries.push(dot);
        child.entries.push(dot_dot);
        child.flush()?;

        self.reserve(count)?;
        self.insert_new(name.to_string(), short, entry.clone(), count);
        Ok(())
    }

    /// Resolve a name: case-insensitive over trimmed display names first,
    /// then the short-name index when the argument parses as an 8.3 name.
    pub fn find(&self, name: &str) -> Option<ShortName> {
        let trimmed = name.trim();
        if let Some(&short) = self.names.get(&lower(trimmed)) {
            return Some(short);
        }
        match ShortName::parse(trimmed) {
            Ok(short) if self.slots.contains_key(&short) => Some(short),
            _ => None,
        }
    }

    pub fn is_directory_entry(&self, short: ShortName) -> bool {
        acquire!(self.slots[&short].entry).is_directory()
    }

    /// Lazily instantiated file node, cached by entry identity.
    pub fn file_node(&mut self, short: ShortName) -> Result<Shared<FileNode<D>>, Error<E>> {
        let device = self.device.clone();
        let fat = self.fat.clone();
        let geometry = self.geometry;
        let slot = self.slots.get_mut(&short).ok_or(OperationError::NotFound)?;
        if acquire!(slot.entry).is_directory() {
            return Err(OperationError::NotAFile.into());
        }
        if slot.file.is_none() {
            let start = acquire!(slot.entry).start_cluster();
            let chain = ClusterChain::new(device, fat, geometry, start);
            slot.file = Some(shared(FileNode::new(chain, slot.entry.clone())));
        }
        Ok(slot.file.as_ref().unwrap().clone())
    }

    /// Lazily instantiated subdirectory node, cached by entry identity.
    pub fn dir_node(&mut self, short: ShortName) -> Result<Shared<DirNode<D>>, Error<E>> {
        let device = self.device.clone();
        let fat = self.fat.clone();
        let geometry = self.geometry;
        let seed = self.rng.next_u32();
        let slot = self.slots.get_mut(&short).ok_or(OperationError::NotFound)?;
        if !acquire!(slot.entry).is_directory() {
            return Err(OperationError::NotADirectory.into());
        }
        if slot.dir.is_none() {
            let start = acquire!(slot.entry).start_cluster();
            let chain = ClusterChain::new(device.clone(), fat.clone(), geometry, start);
            let storage = RawDirectory::open_chain(chain, false)?;
            let node = DirNode::from_storage(storage, device, fat, geometry, seed);
            slot.dir = Some(shared(node));
        }
        Ok(slot.dir.as_ref().unwrap().clone())
    }

    pub fn info_of(&self, short: ShortName) -> EntryInfo {
        let slot = &self.slots[&short];
        let entry = acquire!(slot.entry);
        EntryInfo {
            name: match &slot.long_name {
                Some(name) => name.clone(),
                None => short.to_display().as_str().to_string(),
            },
            short_name: entry.short_name().to_display(),
            attributes: entry.attributes(),
            size: entry.file_size(),
            created: entry.created(),
            modified: entry.modified(),
            accessed: entry.accessed(),
        }
    }

    /// Everything except the dot entries.
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.slots.keys().filter(|short| !short.is_dot()).map(|&short| self.info_of(short)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.keys().all(ShortName::is_dot)
    }

    /// Remove by name; a missing entry is not an error. The entry's chain
    /// is released and the directory rewritten.
    pub fn remove(&mut self, name: &str) -> Result<(), Error<E>> {
        if matches!(name.trim(), "." | "..") {
            return Err(InputError::DotEntry.into());
        }
        let short = match self.find(name) {
            Some(short) => short,
            None => return Ok(()),
        };
        let entry = self.slots[&short].entry.clone();
        let (is_dir, start) = {
            let entry = acquire!(entry);
            (entry.is_directory(), entry.start_cluster())
        };
        if is_dir {
            let child = self.dir_node(short)?;
            if !acquire!(child).is_empty() {
                return Err(OperationError::DirectoryNotEmpty.into());
            }
        }
        debug!("remove {}", self.display_of(short));
        if start != 0 {
            ClusterChain::new(self.device.clone(), self.fat.clone(), self.geometry, start)
                .free()?;
        }
        self.detach(short);
        self.flush()
    }

    /// Unlink a slot from both indexes and hand it to the caller.
    fn detach(&mut self, short: ShortName) -> Slot<D> {
        let display = self.display_of(short);
        self.names.remove(&lower(display.trim()));
        let slot = self.slots.remove(&short).unwrap();
        self.used_entries -= Self::record_count(&slot.long_name);
        if let Some(file) = &slot.file {
            acquire!(file).invalidate();
        }
        if let Some(dir) = &slot.dir {
            acquire!(dir).invalidate_tree();
        }
        slot
    }

    /// Take `slot` out of this directory for a move, keeping its cached
    /// children alive.
    fn detach_for_move(&mut self, short: ShortName) -> Slot<D> {
        let display = self.display_of(short);
        self.names.remove(&lower(display.trim()));
        let slot = self.slots.remove(&short).unwrap();
        self.used_entries -= Self::record_count(&slot.long_name);
        slot
    }

    fn adopt(&mut self, mut slot: Slot<D>, name: String, count: u32) -> ShortName {
        let short = self.generate_short();
        acquire!(slot.entry).set_short_name(short);
        slot.long_name = Some(name.clone());
        self.names.insert(lower(&name), short);
        self.slots.insert(short, slot);
        self.used_entries += count;
        short
    }

    /// Point a moved subdirectory's ".." at this directory.
    fn update_dot_dot(&mut self, short: ShortName) -> Result<(), Error<E>> {
        if !self.is_directory_entry(short) {
            return Ok(());
        }
        let parent_cluster = self.storage.storage_cluster();
        let child = self.dir_node(short)?;
        let child = acquire!(child);
        if let Some(slot) = child.slots.get(&ShortName::DOT_DOT) {
            acquire!(slot.entry).set_start_cluster(parent_cluster);
        }
        Ok(())
    }

    /// Rename within this directory; a fresh short name is generated for
    /// the new long name.
    pub fn rename_within(&mut self, name: &str, new_name: &str) -> Result<(), Error<E>> {
        let short = self.find(name).ok_or(OperationError::NotFound)?;
        if short.is_dot() {
            return Err(InputError::DotEntry.into());
        }
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(InputError::InvalidArgument("empty name").into());
        }
        let units = new_name.encode_utf16().count();
        if units > lfn::MAX_NAME_UNITS {
            return Err(InputError::NameTooLong(units).into());
        }
        if let Some(&existing) = self.names.get(&lower(new_name)) {
            if existing != short {
                return Err(OperationError::AlreadyExists.into());
            }
        }
        let count = 1 + lfn::slot_count(units) as u32;
        let old_count = Self::record_count(&self.slots[&short].long_name);
        if count > old_count {
            let requested = self.used_entries - old_count + count;
            self.storage.ensure_capacity(requested)?;
        }
        let slot = self.detach_for_move(short);
        self.adopt(slot, new_name.to_string(), count);
        Ok(())
    }

    pub fn storage_cluster(&self) -> u32 {
        self.storage.storage_cluster()
    }

    /// Move an entry into `target` under `new_name`.
    pub fn move_to(
        &mut self,
        name: &str,
        target: &mut DirNode<D>,
        new_name: &str,
    ) -> Result<(), Error<E>> {
        let short = self.find(name).ok_or(OperationError::NotFound)?;
        if short.is_dot() {
            return Err(InputError::DotEntry.into());
        }
        {
            let entry = acquire!(self.slots[&short].entry);
            if entry.is_directory() && entry.start_cluster() == target.storage_cluster() {
                return Err(InputError::InvalidArgument("cannot move a directory into itself")
                    .into());
            }
        }
        let (new_name, count) = target.validate_add(new_name)?;
        target.reserve(count)?;
        let slot = self.detach_for_move(short);
        let adopted = target.adopt(slot, new_name, count);
        target.update_dot_dot(adopted)
    }

    pub fn label(&self) -> Option<[u8; 11]> {
        self.storage.label.as_ref().map(|entry| *entry.short_name().raw())
    }

    pub fn set_label(&mut self, label: [u8; 11]) -> Result<(), Error<E>> {
        match &mut self.storage.label {
            Some(entry) => entry.set_short_name(ShortName::from_raw(label)),
            None => {
                self.reserve(1)?;
                self.storage.label = Some(DirEntry::new_volume_label(label));
                self.used_entries += 1;
            }
        }
        Ok(())
    }

    /// Flush cached children, rebuild the on-disk record list from the
    /// short-name index, write it out.
    pub fn flush(&mut self) -> Result<(), Error<E>> {
        for slot in self.slots.values() {
            if let Some(dir) = &slot.dir {
                acquire!(dir).flush()?;
            }
        }
        self.rebuild();
        self.storage.flush()
    }

    fn rebuild(&mut self) {
        let mut records = Vec::new();
        for short in [ShortName::DOT, ShortName::DOT_DOT] {
            if let Some(slot) = self.slots.get(&short) {
                records.push(acquire!(slot.entry).clone());
            }
        }
        for (short, slot) in self.slots.iter() {
            if short.is_dot() {
                continue;
            }
            if let Some(name) = &slot.long_name {
                if let Ok(run) = lfn::encode(name, short) {
                    records.extend(run);
                }
            }
            records.push(acquire!(slot.entry).clone());
        }
        self.storage.entries = records;
    }

    pub fn invalidate_tree(&mut self) {
        self.valid = false;
        for slot in self.slots.values() {
            if let Some(file) = &slot.file {
                acquire!(file).invalidate();
            }
            if let Some(dir) = &slot.dir {
                acquire!(dir).invalidate_tree();
            }
        }
    }
}

/// Handle to a directory. Cheap to clone; all handles of one filesystem
/// share its closed state.
pub struct Directory<D: BlockDevice> {
    pub(crate) node: Shared<DirNode<D>>,
    pub(crate) ctx: Shared<FsContext>,
}

impl<D: BlockDevice> Clone for Directory<D> {
    fn clone(&self) -> Self {
        Self { node: self.node.clone(), ctx: self.ctx.clone() }
    }
}

pub enum FileOrDirectory<D: BlockDevice> {
    File(File<D>),
    Directory(Directory<D>),
}

impl<E: Debug, D: BlockDevice<Error = E>> Directory<D> {
    fn check(&self) -> Result<(), Error<E>> {
        if acquire!(self.ctx).closed {
            return Err(OperationError::AlreadyClosed.into());
        }
        if !acquire!(self.node).valid {
            return Err(OperationError::AlreadyInvalid.into());
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), Error<E>> {
        self.check()?;
        if acquire!(self.ctx).read_only {
            return Err(OperationError::ReadOnly.into());
        }
        Ok(())
    }

    pub fn create_file(&self, name: &str) -> Result<File<D>, Error<E>> {
        self.check_writable()?;
        let mut node = acquire!(self.node);
        let short = node.add_file(name)?;
        let file = node.file_node(short)?;
        Ok(File { node: file, ctx: self.ctx.clone() })
    }

    pub fn create_directory(&self, name: &str) -> Result<Directory<D>, Error<E>> {
        self.check_writable()?;
        let mut node = acquire!(self.node);
        let short = node.add_directory(name)?;
        let dir = node.dir_node(short)?;
        Ok(Directory { node: dir, ctx: self.ctx.clone() })
    }

    /// Open an existing entry by name.
    pub fn open(&self, name: &str) -> Result<FileOrDirectory<D>, Error<E>> {
        self.check()?;
        let mut node = acquire!(self.node);
        let short = node.find(name).ok_or(OperationError::NotFound)?;
        if short.is_dot() {
            return Err(InputError::DotEntry.into());
        }
        match node.is_directory_entry(short) {
            true => Ok(FileOrDirectory::Directory(Directory {
                node: node.dir_node(short)?,
                ctx: self.ctx.clone(),
            })),
            false => Ok(FileOrDirectory::File(File {
                node: node.file_node(short)?,
                ctx: self.ctx.clone(),
            })),
        }
    }

    pub fn open_file(&self, name: &str) -> Result<File<D>, Error<E>> {
        match self.open(name)? {
            FileOrDirectory::File(file) => Ok(file),
            FileOrDirectory::Directory(_) => Err(OperationError::NotAFile.into()),
        }
    }

    pub fn open_directory(&self, name: &str) -> Result<Directory<D>, Error<E>> {
        match self.open(name)? {
            FileOrDirectory::Directory(dir) => Ok(dir),
            FileOrDirectory::File(_) => Err(OperationError::NotADirectory.into()),
        }
    }

    /// Listing metadata for `name`, if present.
    pub fn entry(&self, name: &str) -> Result<Option<EntryInfo>, Error<E>> {
        self.check()?;
        let node = acquire!(self.node);
        match node.find(name) {
            Some(short) if !short.is_dot() => Ok(Some(node.info_of(short))),
            _ => Ok(None),
        }
    }

    /// Snapshot of the directory contents, dot entries excluded.
    pub fn entries(&self) -> Result<Vec<EntryInfo>, Error<E>> {
        self.check()?;
        Ok(acquire!(self.node).entries())
    }

    pub fn remove(&self, name: &str) -> Result<(), Error<E>> {
        self.check_writable()?;
        acquire!(self.node).remove(name)
    }

    /// Move (or rename) an entry into `target` under `new_name`.
    pub fn rename(&self, name: &str, target: &Directory<D>, new_name: &str) -> Result<(), Error<E>> {
        self.check_writable()?;
        target.check()?;
        if same(&self.node, &target.node) {
            return acquire!(self.node).rename_within(name, new_name);
        }
        let mut source = acquire!(self.node);
        let mut target = acquire!(target.node);
        source.move_to(name, &mut target, new_name)
    }

    pub fn flush(&self) -> Result<(), Error<E>> {
        self.check()?;
        if acquire!(self.ctx).read_only {
            return Ok(());
        }
        acquire!(self.node).flush()
    }
}
