use std::io;

use serde::Serialize;

use crate::identity::{LOCAL_ID_MASK, RecordIdentity, same_plugin};
use crate::reader::zstring;

use super::{Subrecord, emit_subrecord, invalid};

/// Marks the output as a lightweight override plugin.
pub const LIGHT_FLAG: u32 = 0x0000_0200;
/// First object id a plugin may allocate for new records.
pub const DEFAULT_NEXT_OBJECT_ID: u32 = 0x0000_0800;
/// Master index byte can address at most this many masters.
pub const MAX_MASTERS: usize = 0xFF;

const HEDR_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginHeader {
    pub version: f32,
    pub next_object_id: u32,
    pub author: Option<String>,
    pub masters: Vec<String>,
    pub flags: u32,
}

impl PluginHeader {
    pub fn new(version: f32) -> Self {
        Self {
            version,
            next_object_id: DEFAULT_NEXT_OBJECT_ID,
            author: None,
            masters: Vec::new(),
            flags: LIGHT_FLAG,
        }
    }

    pub fn is_light(&self) -> bool {
        self.flags & LIGHT_FLAG != 0
    }

    /// Adds `plugin` unless a case-insensitive match is already listed.
    pub fn add_master(&mut self, plugin: &str) -> bool {
        if self.master_index(plugin).is_some() {
            return false;
        }
        self.masters.push(plugin.to_string());
        true
    }

    pub fn master_index(&self, plugin: &str) -> Option<usize> {
        self.masters
            .iter()
            .position(|master| same_plugin(master, plugin))
    }

    /// Reorders masters to follow `load_order`. Masters it does not list
    /// keep their relative order after the listed ones.
    pub fn sort_masters_by(&mut self, load_order: &[String]) {
        self.masters.sort_by_key(|master| {
            load_order
                .iter()
                .position(|name| same_plugin(name, master))
                .unwrap_or(usize::MAX)
        });
    }

    /// Form id of `identity` as seen from this file: master index in the high
    /// byte, local id below it.
    pub fn encode_form_id(&self, identity: &RecordIdentity) -> io::Result<u32> {
        let index = self.master_index(identity.plugin()).ok_or_else(|| {
            invalid(format!("{} is not listed as a master", identity.plugin()))
        })?;
        if index >= MAX_MASTERS {
            return Err(invalid(format!("master index {index} does not fit in a form id")));
        }
        Ok(((index as u32) << 24) | (identity.local_id() & LOCAL_ID_MASK))
    }

    /// Inverse of [`encode_form_id`](Self::encode_form_id). An index one past
    /// the masters refers to the file itself.
    pub fn decode_form_id(&self, own_name: &str, form_id: u32) -> io::Result<RecordIdentity> {
        let index = (form_id >> 24) as usize;
        let plugin = match self.masters.get(index) {
            Some(master) => master.as_str(),
            None if index == self.masters.len() => own_name,
            None => {
                return Err(invalid(format!(
                    "form id {form_id:08X} names master {index}, file has {}",
                    self.masters.len()
                )));
            }
        };
        RecordIdentity::new(plugin, form_id & LOCAL_ID_MASK).map_err(|e| invalid(e.to_string()))
    }

    pub(crate) fn emit_payload(&self, record_count: u32) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();

        let mut hedr = Vec::with_capacity(HEDR_LEN);
        hedr.extend_from_slice(&self.version.to_le_bytes());
        hedr.extend_from_slice(&record_count.to_le_bytes());
        hedr.extend_from_slice(&self.next_object_id.to_le_bytes());
        emit_subrecord(&mut out, b"HEDR", &hedr)?;

        if let Some(author) = &self.author {
            emit_subrecord(&mut out, b"CNAM", &zstring_bytes(author))?;
        }
        for master in &self.masters {
            emit_subrecord(&mut out, b"MAST", &zstring_bytes(master))?;
            emit_subrecord(&mut out, b"DATA", &0u64.to_le_bytes())?;
        }
        Ok(out)
    }

    /// Rebuilds the header from its subrecords. Returns the header and the
    /// record count HEDR claimed.
    pub(crate) fn from_subrecords(flags: u32, subrecords: &[Subrecord]) -> io::Result<(Self, u32)> {
        let hedr = subrecords
            .iter()
            .find(|s| &s.signature == b"HEDR")
            .ok_or_else(|| invalid("header has no HEDR subrecord"))?;
        if hedr.data.len() < HEDR_LEN {
            return Err(invalid(format!("HEDR is {} bytes, expected {HEDR_LEN}", hedr.data.len())));
        }
        let word = |at: usize| [hedr.data[at], hedr.data[at + 1], hedr.data[at + 2], hedr.data[at + 3]];

        let mut header = Self {
            version: f32::from_le_bytes(word(0)),
            next_object_id: u32::from_le_bytes(word(8)),
            author: None,
            masters: Vec::new(),
            flags,
        };
        let record_count = u32::from_le_bytes(word(4));

        for subrecord in subrecords {
            match &subrecord.signature {
                b"CNAM" => header.author = Some(zstring(&subrecord.data)?),
                b"MAST" => header.masters.push(zstring(&subrecord.data)?),
                _ => {}
            }
        }
        Ok((header, record_count))
    }
}

fn zstring_bytes(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);
    bytes
}
