//! The 32-byte directory record and its attribute / DOS date-time fields.

use bitfield::bitfield;

use crate::dir::short_name::ShortName;
use crate::endian;

pub(crate) const ENTRY_SIZE: usize = 32;
pub(crate) const DELETED_MARKER: u8 = 0xE5;

const NAME: usize = 0x00;
const ATTRIBUTES: usize = 0x0B;
const CREATED_TENTHS: usize = 0x0D;
const CREATED_TIME: usize = 0x0E;
const CREATED_DATE: usize = 0x10;
const ACCESSED_DATE: usize = 0x12;
const START_CLUSTER_HIGH: usize = 0x14;
const MODIFIED_TIME: usize = 0x16;
const MODIFIED_DATE: usize = 0x18;
const START_CLUSTER_LOW: usize = 0x1A;
const FILE_SIZE: usize = 0x1C;

bitfield! {
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct Attributes(u8);
    impl Debug;
    pub read_only, set_read_only: 0, 0;
    pub hidden, set_hidden: 1, 1;
    pub system, set_system: 2, 2;
    pub volume_id, set_volume_id: 3, 3;
    pub directory, set_directory: 4, 4;
    pub archive, set_archive: 5, 5;
}

impl Attributes {
    /// READONLY | HIDDEN | SYSTEM | VOLUME_ID marks a long-name slot.
    pub(crate) const LFN: u8 = 0x0F;

    pub(crate) fn from_raw(raw: u8) -> Self {
        Attributes(raw)
    }

    pub(crate) fn raw(self) -> u8 {
        self.0
    }

    pub fn is_lfn(self) -> bool {
        self.0 & 0x3F == Self::LFN
    }
}

bitfield! {
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct DosDate(u16);
    impl Debug;
    pub year_offset, set_year_offset: 15, 9;
    pub month, set_month: 8, 5;
    pub day, set_day: 4, 0;
}

impl DosDate {
    pub fn year(&self) -> u16 {
        self.year_offset() + 1980
    }

    pub fn set_year(&mut self, year: u16) {
        self.set_year_offset(year.saturating_sub(1980));
    }

    /// 1980-01-01, the calendar origin of the format.
    pub fn epoch() -> Self {
        let mut date = Self::default();
        date.set_month(1);
        date.set_day(1);
        date
    }
}

bitfield! {
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct DosTime(u16);
    impl Debug;
    pub hour, set_hour: 15, 11;
    pub minute, set_minute: 10, 5;
    pub double_second, set_double_second: 4, 0;
}

impl DosTime {
    pub fn second(&self) -> u16 {
        self.double_second() * 2
    }

    pub fn set_second(&mut self, second: u16) {
        self.set_double_second(second / 2);
    }
}

/// A timestamp as stored in a directory entry: two-second resolution, dates
/// from 1980.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DosDateTime {
    pub date: DosDate,
    pub time: DosTime,
}

impl DosDateTime {
    pub fn epoch() -> Self {
        Self { date: DosDate::epoch(), time: DosTime::default() }
    }

    pub fn now() -> Self {
        match () {
            #[cfg(feature = "chrono")]
            () => chrono::Local::now().naive_local().into(),
            #[cfg(not(feature = "chrono"))]
            () => Self::epoch(),
        }
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::NaiveDateTime> for DosDateTime {
    fn from(value: chrono::NaiveDateTime) -> Self {
        use chrono::{Datelike, Timelike};
        let mut date = DosDate::default();
        date.set_year(value.year() as u16);
        date.set_month(value.month() as u16);
        date.set_day(value.day() as u16);
        let mut time = DosTime::default();
        time.set_hour(value.hour() as u16);
        time.set_minute(value.minute() as u16);
        time.set_second(value.second() as u16);
        Self { date, time }
    }
}

#[cfg(feature = "chrono")]
impl From<DosDateTime> for chrono::NaiveDateTime {
    fn from(value: DosDateTime) -> Self {
        let date = chrono::NaiveDate::from_ymd_opt(
            value.date.year() as i32,
            value.date.month() as u32,
            value.date.day() as u32,
        );
        let time = chrono::NaiveTime::from_hms_opt(
            value.time.hour() as u32,
            value.time.minute() as u32,
            value.time.second() as u32,
        );
        Self::new(date.unwrap_or_default(), time.unwrap_or_default())
    }
}

/// One raw 32-byte directory record. Long-name slots are carried in the
/// same representation; the accessors below only make sense on real
/// entries.
#[derive(Clone)]
pub(crate) struct DirEntry {
    data: [u8; ENTRY_SIZE],
}

impl DirEntry {
    pub fn from_bytes(data: [u8; ENTRY_SIZE]) -> Self {
        Self { data }
    }

    fn blank(short_name: ShortName, attributes: Attributes, now: DosDateTime) -> Self {
        let mut entry = Self { data: [0u8; ENTRY_SIZE] };
        entry.data[NAME..NAME + 11].copy_from_slice(short_name.raw());
        entry.data[ATTRIBUTES] = attributes.raw();
        entry.set_created(now);
        entry.set_modified(now);
        entry.set_accessed(now.date);
        entry
    }

    pub fn new_file(short_name: ShortName, now: DosDateTime) -> Self {
        let mut attributes = Attributes::default();
        attributes.set_archive(1);
        Self::blank(short_name, attributes, now)
    }

    pub fn new_directory(short_name: ShortName, now: DosDateTime) -> Self {
        let mut attributes = Attributes::default();
        attributes.set_directory(1);
        Self::blank(short_name, attributes, now)
    }

    pub fn new_volume_label(label: [u8; 11]) -> Self {
        let mut attributes = Attributes::default();
        attributes.set_volume_id(1);
        Self::blank(ShortName::from_raw(label), attributes, DosDateTime::epoch())
    }

    pub fn bytes(&self) -> &[u8; ENTRY_SIZE] {
        &self.data
    }

    pub fn is_free(&self) -> bool {
        self.data[0] == 0
    }

    pub fn is_deleted(&self) -> bool {
        self.data[0] == DELETED_MARKER
    }

    pub fn attributes(&self) -> Attributes {
        Attributes::from_raw(self.data[ATTRIBUTES])
    }

    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.data[ATTRIBUTES] = attributes.raw();
    }

    pub fn is_lfn(&self) -> bool {
        self.attributes().is_lfn()
    }

    pub fn is_volume_label(&self) -> bool {
        !self.is_lfn() && self.attributes().volume_id() > 0 && self.attributes().directory() == 0
    }

    pub fn is_directory(&self) -> bool {
        !self.is_lfn() && self.attributes().directory() > 0
    }

    pub fn short_name(&self) -> ShortName {
        let mut raw = [0u8; 11];
        raw.copy_from_slice(&self.data[NAME..NAME + 11]);
        ShortName::from_raw(raw)
    }

    pub fn set_short_name(&mut self, short_name: ShortName) {
        self.data[NAME..NAME + 11].copy_from_slice(short_name.raw());
    }

    pub fn start_cluster(&self) -> u32 {
        let high = endian::get_u16(&self.data, START_CLUSTER_HIGH) as u32;
        let low = endian::get_u16(&self.data, START_CLUSTER_LOW) as u32;
        high << 16 | low
    }

    pub fn set_start_cluster(&mut self, cluster: u32) {
        endian::set_u16(&mut self.data, START_CLUSTER_HIGH, (cluster >> 16) as u16);
        endian::set_u16(&mut self.data, START_CLUSTER_LOW, cluster as u16);
    }

    pub fn file_size(&self) -> u32 {
        endian::get_u32(&self.data, FILE_SIZE)
    }

    pub fn set_file_size(&mut self, size: u32) {
        endian::set_u32(&mut self.data, FILE_SIZE, size);
    }

    pub fn created(&self) -> DosDateTime {
        DosDateTime {
            date: DosDate(endian::get_u16(&self.data, CREATED_DATE)),
            time: DosTime(endian::get_u16(&self.data, CREATED_TIME)),
        }
    }

    pub fn set_created(&mut self, value: DosDateTime) {
        endian::set_u8(&mut self.data, CREATED_TENTHS, 0);
        endian::set_u16(&mut self.data, CREATED_TIME, value.time.0);
        endian::set_u16(&mut self.data, CREATED_DATE, value.date.0);
    }

    pub fn modified(&self) -> DosDateTime {
        DosDateTime {
            date: DosDate(endian::get_u16(&self.data, MODIFIED_DATE)),
            time: DosTime(endian::get_u16(&self.data, MODIFIED_TIME)),
        }
    }

    pub fn set_modified(&mut self, value: DosDateTime) {
        endian::set_u16(&mut self.data, MODIFIED_TIME, value.time.0);
        endian::set_u16(&mut self.data, MODIFIED_DATE, value.date.0);
    }

    /// Only the date is recorded for last access.
    pub fn accessed(&self) -> DosDate {
        DosDate(endian::get_u16(&self.data, ACCESSED_DATE))
    }

    pub fn set_accessed(&mut self, value: DosDate) {
        endian::set_u16(&mut self.data, ACCESSED_DATE, value.0);
    }
}
