//! Records and the Data page record API
//!
//! A Data page stores an entry counter (`EntryIndex`) and one line per live
//! record (`Entry-<n>: field1|field2|...`). Entry indexes are handed out from
//! the counter and never reused within a page, so a (PageId, entry index)
//! pair stays a stable record identity.

use std::collections::BTreeMap;

use crate::error::{FlatError, Result};

use super::page::{parse_number, push_line, Page, PageContent, PageType, Payload};

/// Separator between packed record fields
pub const FIELD_SEPARATOR: char = '|';

const ENTRY_COUNTER_KEY: &str = "EntryIndex";
const ENTRY_KEY_PREFIX: &str = "Entry-";

// =============================================================================
// Record
// =============================================================================

/// One record read from a Data page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Position of the record within its page (starts at 1)
    pub entry_index: u32,

    /// Ordered fields
    pub fields: Vec<String>,
}

impl Record {
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Join fields into the on-disk form
    pub fn pack<S: AsRef<str>>(fields: &[S]) -> String {
        let mut packed = String::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                packed.push(FIELD_SEPARATOR);
            }
            packed.push_str(field.as_ref());
        }
        packed
    }

    /// Split the on-disk form back into fields
    pub fn unpack(packed: &str) -> Vec<String> {
        packed.split(FIELD_SEPARATOR).map(str::to_string).collect()
    }
}

// =============================================================================
// Data Page
// =============================================================================

/// Decoded payload of a Data page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataPage {
    /// Highest entry index ever assigned on this page
    entry_counter: u32,

    /// entry index → packed fields
    entries: BTreeMap<u32, String>,
}

impl DataPage {
    pub fn entry_counter(&self) -> u32 {
        self.entry_counter
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn from_payload(payload: Payload) -> Result<Self> {
        let mut page = DataPage::default();

        for (key, value) in payload {
            if key == ENTRY_COUNTER_KEY {
                page.entry_counter = parse_number(ENTRY_COUNTER_KEY, &value)?;
            } else if let Some(index) = key.strip_prefix(ENTRY_KEY_PREFIX) {
                let index: u32 = parse_number(&key, index)?;
                page.entries.insert(index, value);
            } else {
                return Err(FlatError::Format(format!(
                    "unexpected key {:?} in data page",
                    key
                )));
            }
        }

        let counter = page.entry_counter;
        if let Some(index) = page.entries.keys().copied().find(|&i| i == 0 || i > counter) {
            return Err(FlatError::Format(format!(
                "entry {} outside counter range 1..={}",
                index, page.entry_counter
            )));
        }

        Ok(page)
    }

    pub(crate) fn encode_into(&self, out: &mut String) -> Result<()> {
        push_line(out, ENTRY_COUNTER_KEY, &self.entry_counter.to_string())?;
        for (index, packed) in &self.entries {
            push_line(out, &format!("{}{}", ENTRY_KEY_PREFIX, index), packed)?;
        }
        Ok(())
    }
}

// =============================================================================
// Page Record API
// =============================================================================

impl Page {
    pub fn data(&self) -> Result<&DataPage> {
        match &self.content {
            PageContent::Data(data) => Ok(data),
            _ => Err(self.type_mismatch(PageType::Data)),
        }
    }

    fn data_mut(&mut self) -> Result<&mut DataPage> {
        let err = self.type_mismatch(PageType::Data);
        match &mut self.content {
            PageContent::Data(data) => Ok(data),
            _ => Err(err),
        }
    }

    /// Append a record and return its entry index
    pub fn add_record<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<u32> {
        validate_fields(fields)?;
        let data = self.data_mut()?;
        data.entry_counter += 1;
        let index = data.entry_counter;
        data.entries.insert(index, Record::pack(fields));
        Ok(index)
    }

    pub fn get_record(&self, entry_index: u32) -> Result<Record> {
        let packed = self
            .data()?
            .entries
            .get(&entry_index)
            .ok_or(FlatError::RecordNotFound {
                page_id: self.id,
                entry_index,
            })?;
        Ok(Record {
            entry_index,
            fields: Record::unpack(packed),
        })
    }

    /// Replace the fields of an existing record in place
    pub fn update_record<S: AsRef<str>>(&mut self, entry_index: u32, fields: &[S]) -> Result<()> {
        validate_fields(fields)?;
        let page_id = self.id;
        let slot = self
            .data_mut()?
            .entries
            .get_mut(&entry_index)
            .ok_or(FlatError::RecordNotFound {
                page_id,
                entry_index,
            })?;
        *slot = Record::pack(fields);
        Ok(())
    }

    pub fn delete_record(&mut self, entry_index: u32) -> Result<Record> {
        let page_id = self.id;
        let packed = self
            .data_mut()?
            .entries
            .remove(&entry_index)
            .ok_or(FlatError::RecordNotFound {
                page_id,
                entry_index,
            })?;
        Ok(Record {
            entry_index,
            fields: Record::unpack(&packed),
        })
    }

    /// All live records in entry order
    pub fn records(&self) -> Result<Vec<Record>> {
        Ok(self
            .data()?
            .entries
            .iter()
            .map(|(&entry_index, packed)| Record {
                entry_index,
                fields: Record::unpack(packed),
            })
            .collect())
    }

    /// Whether appending `fields` keeps the page within `page_size` once it is
    /// written (and its LSN bumped)
    pub fn record_fits<S: AsRef<str>>(&self, fields: &[S], page_size: usize) -> Result<bool> {
        let mut probe = self.clone();
        probe.add_record(fields)?;
        Ok(probe.encode_with_lsn(self.lsn + 1)?.len() <= page_size)
    }
}

fn validate_fields<S: AsRef<str>>(fields: &[S]) -> Result<()> {
    match fields
        .iter()
        .map(|f| f.as_ref())
        .find(|f: &&str| f.contains([FIELD_SEPARATOR, '\n', '\r']))
    {
        Some(bad) => Err(FlatError::InvalidValue(bad.to_string())),
        None => Ok(()),
    }
}
