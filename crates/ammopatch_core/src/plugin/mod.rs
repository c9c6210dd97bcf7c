//! The override plugin the patch builder writes: a `TES4` header record
//! followed by one `GRUP` of `WEAP` overrides, all little-endian.

pub mod header;
pub mod records;

use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use serde::Serialize;

use crate::layout::{ByteRange, FileLayout, SectionId, SectionLayout};
use crate::reader::LittleEndianReader;
pub use header::{LIGHT_FLAG, PluginHeader};
pub use records::{COMPRESSED_FLAG, WeaponOverride};
use records::{compress_payload, decompress_payload};

pub const RECORD_HEADER_LEN: usize = 24;
const SUBRECORD_HEADER_LEN: usize = 6;
const FORM_VERSION: u16 = 131;
const WEAPON_SIGNATURE: [u8; 4] = *b"WEAP";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideFile {
    /// File name; form ids one past the masters resolve to it.
    pub name: String,
    pub header: PluginHeader,
    pub overrides: Vec<WeaponOverride>,
    /// Zlib-compress override payloads on write.
    #[serde(skip)]
    pub compress: bool,
}

impl OverrideFile {
    pub fn new(name: impl Into<String>, header: PluginHeader) -> Self {
        Self {
            name: name.into(),
            header,
            overrides: Vec::new(),
            compress: false,
        }
    }

    /// Records plus groups after the header, the count HEDR carries.
    pub fn record_count(&self) -> u32 {
        if self.overrides.is_empty() {
            0
        } else {
            self.overrides.len() as u32 + 1
        }
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let header_payload = self.header.emit_payload(self.record_count())?;
        emit_record_header(&mut out, b"TES4", header_payload.len(), self.header.flags, 0)?;
        out.extend_from_slice(&header_payload);

        if self.overrides.is_empty() {
            return Ok(out);
        }

        let mut group = Vec::new();
        for entry in &self.overrides {
            let form_id = self.header.encode_form_id(&entry.weapon)?;
            let mut payload = entry.emit_payload(&self.header)?;
            let mut flags = 0;
            if self.compress {
                payload = compress_payload(&payload)?;
                flags |= COMPRESSED_FLAG;
            }
            emit_record_header(&mut group, &WEAPON_SIGNATURE, payload.len(), flags, form_id)?;
            group.extend_from_slice(&payload);
        }

        let group_size = u32::try_from(group.len() + RECORD_HEADER_LEN)
            .map_err(|_| invalid("override group exceeds 4 GiB"))?;
        out.extend_from_slice(b"GRUP");
        out.extend_from_slice(&group_size.to_le_bytes());
        out.extend_from_slice(&WEAPON_SIGNATURE);
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&group);
        Ok(out)
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_bytes()?)
    }

    pub fn parse(name: &str, bytes: &[u8]) -> io::Result<Self> {
        Self::parse_with_layout(name, bytes).map(|(file, _)| file)
    }

    pub fn parse_with_layout(name: &str, bytes: &[u8]) -> io::Result<(Self, FileLayout)> {
        let mut r = LittleEndianReader::new(Cursor::new(bytes));
        let mut sections = Vec::new();

        let head = RecordHead::read(&mut r)?;
        if &head.signature != b"TES4" {
            return Err(invalid(format!(
                "expected TES4 header, found {}",
                String::from_utf8_lossy(&head.signature)
            )));
        }
        let payload = r.read_bytes(head.data_size as usize)?;
        let (header, claimed_count) =
            PluginHeader::from_subrecords(head.flags, &parse_subrecords(&payload)?)?;
        sections.push(section(SectionId::Header, 0, r.position()?));

        let mut file = Self::new(name, header);
        while !r.at_end()? {
            let start = r.position()?;
            let group = GroupHead::read(&mut r)?;
            let end = start + u64::from(group.size);
            if group.size < RECORD_HEADER_LEN as u32 || end > bytes.len() as u64 {
                return Err(invalid(format!("group at {start} has bad size {}", group.size)));
            }
            if group.label == WEAPON_SIGNATURE {
                file.read_weapon_group(&mut r, end)?;
            } else {
                tracing::debug!(
                    domain = "codec",
                    label = %String::from_utf8_lossy(&group.label),
                    "skipping group",
                );
                let here = r.position()?;
                r.skip(end - here)?;
            }
            sections.push(section(SectionId::Group(group.label), start, end));
        }

        if claimed_count != file.record_count() {
            tracing::warn!(
                domain = "codec",
                claimed = claimed_count,
                actual = file.record_count(),
                "HEDR record count does not match file contents",
            );
        }

        let layout = FileLayout {
            file_len: bytes.len(),
            sections,
        };
        layout.validate()?;
        Ok((file, layout))
    }

    fn read_weapon_group(
        &mut self,
        r: &mut LittleEndianReader<Cursor<&[u8]>>,
        end: u64,
    ) -> io::Result<()> {
        while r.position()? < end {
            let head = RecordHead::read(r)?;
            let mut payload = r.read_bytes(head.data_size as usize)?;
            if head.signature != WEAPON_SIGNATURE {
                continue;
            }
            if head.flags & COMPRESSED_FLAG != 0 {
                payload = decompress_payload(&payload)?;
                self.compress = true;
            }
            let entry = WeaponOverride::from_payload(&self.header, &self.name, head.form_id, &payload)?;
            self.overrides.push(entry);
        }
        if r.position()? != end {
            return Err(invalid("record overruns its group"));
        }
        Ok(())
    }
}

/// One typed chunk of a record payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subrecord {
    pub signature: [u8; 4],
    pub data: Vec<u8>,
}

pub(crate) fn parse_subrecords(payload: &[u8]) -> io::Result<Vec<Subrecord>> {
    let mut r = LittleEndianReader::new(Cursor::new(payload));
    let mut out = Vec::new();
    while !r.at_end()? {
        let signature = r.read_signature()?;
        let size = r.read_u16()?;
        let data = r.read_bytes(size as usize)?;
        out.push(Subrecord { signature, data });
    }
    Ok(out)
}

pub(crate) fn emit_subrecord(out: &mut Vec<u8>, signature: &[u8; 4], data: &[u8]) -> io::Result<()> {
    let size = u16::try_from(data.len()).map_err(|_| {
        invalid(format!(
            "{} subrecord too large: {} bytes",
            String::from_utf8_lossy(signature),
            data.len()
        ))
    })?;
    out.reserve(SUBRECORD_HEADER_LEN + data.len());
    out.extend_from_slice(signature);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(data);
    Ok(())
}

fn emit_record_header(
    out: &mut Vec<u8>,
    signature: &[u8; 4],
    data_size: usize,
    flags: u32,
    form_id: u32,
) -> io::Result<()> {
    let data_size = u32::try_from(data_size).map_err(|_| invalid("record exceeds 4 GiB"))?;
    out.extend_from_slice(signature);
    out.extend_from_slice(&data_size.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&form_id.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&FORM_VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    Ok(())
}

struct RecordHead {
    signature: [u8; 4],
    data_size: u32,
    flags: u32,
    form_id: u32,
}

impl RecordHead {
    fn read(r: &mut LittleEndianReader<Cursor<&[u8]>>) -> io::Result<Self> {
        let signature = r.read_signature()?;
        let data_size = r.read_u32()?;
        let flags = r.read_u32()?;
        let form_id = r.read_u32()?;
        // version control info, form version, unknown
        r.skip(8)?;
        Ok(Self {
            signature,
            data_size,
            flags,
            form_id,
        })
    }
}

struct GroupHead {
    size: u32,
    label: [u8; 4],
}

impl GroupHead {
    fn read(r: &mut LittleEndianReader<Cursor<&[u8]>>) -> io::Result<Self> {
        let signature = r.read_signature()?;
        if &signature != b"GRUP" {
            return Err(invalid(format!(
                "expected GRUP, found {}",
                String::from_utf8_lossy(&signature)
            )));
        }
        let size = r.read_u32()?;
        let label = r.read_signature()?;
        let _group_type = r.read_i32()?;
        r.skip(8)?;
        Ok(Self { size, label })
    }
}

fn section(id: SectionId, start: u64, end: u64) -> SectionLayout {
    SectionLayout {
        id,
        range: ByteRange {
            start: start as usize,
            end: end as usize,
        },
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}
