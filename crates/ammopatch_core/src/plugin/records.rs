use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::Serialize;

use crate::identity::RecordIdentity;
use crate::reader::zstring;

use super::header::PluginHeader;
use super::{Subrecord, emit_subrecord, invalid, parse_subrecords};

pub const COMPRESSED_FLAG: u32 = 0x0004_0000;

/// A winning-weapon override whose only change is its ammunition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeaponOverride {
    pub weapon: RecordIdentity,
    pub editor_id: Option<String>,
    pub ammo: RecordIdentity,
}

impl WeaponOverride {
    pub(crate) fn emit_payload(&self, header: &PluginHeader) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        if let Some(editor_id) = &self.editor_id {
            let mut bytes = editor_id.as_bytes().to_vec();
            bytes.push(0);
            emit_subrecord(&mut out, b"EDID", &bytes)?;
        }
        let ammo = header.encode_form_id(&self.ammo)?;
        emit_subrecord(&mut out, b"AMMO", &ammo.to_le_bytes())?;
        Ok(out)
    }

    pub(crate) fn from_payload(
        header: &PluginHeader,
        own_name: &str,
        form_id: u32,
        payload: &[u8],
    ) -> io::Result<Self> {
        let subrecords = parse_subrecords(payload)?;
        let weapon = header.decode_form_id(own_name, form_id)?;

        let mut editor_id = None;
        let mut ammo = None;
        for Subrecord { signature, data } in &subrecords {
            match signature {
                b"EDID" => editor_id = Some(zstring(data)?),
                b"AMMO" => {
                    let bytes: [u8; 4] = data
                        .get(..4)
                        .and_then(|b| b.try_into().ok())
                        .ok_or_else(|| invalid("AMMO subrecord shorter than a form id"))?;
                    ammo = Some(header.decode_form_id(own_name, u32::from_le_bytes(bytes))?);
                }
                _ => {}
            }
        }

        let ammo = ammo.ok_or_else(|| invalid(format!("override of {weapon} has no AMMO")))?;
        Ok(Self {
            weapon,
            editor_id,
            ammo,
        })
    }
}

/// Compressed record payloads: decompressed length, then a zlib stream.
pub(crate) fn compress_payload(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len() / 2 + 8);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    let mut encoder = ZlibEncoder::new(out, Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}

pub(crate) fn decompress_payload(packed: &[u8]) -> io::Result<Vec<u8>> {
    let (len, stream) = packed
        .split_first_chunk::<4>()
        .ok_or_else(|| invalid("compressed record shorter than its length prefix"))?;
    let expected_len = u32::from_le_bytes(*len) as usize;

    let mut decoder = ZlibDecoder::new(stream);
    let mut out = Vec::with_capacity(expected_len);
    decoder.read_to_end(&mut out)?;
    if out.len() != expected_len {
        return Err(invalid(format!(
            "decompressed size mismatch: expected {}, got {}",
            expected_len,
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_payload_restores_original_bytes() {
        let payload = b"EDID\x05\x00Gun1\x00AMMO\x04\x00\x01\x08\x00\x01".repeat(4);
        let packed = compress_payload(&payload).unwrap();
        assert_eq!(decompress_payload(&packed).unwrap(), payload);
    }

    #[test]
    fn truncated_compressed_payload_is_rejected() {
        assert!(decompress_payload(&[1, 0]).is_err());

        let mut packed = compress_payload(b"abcdef").unwrap();
        packed[0] = 99;
        let err = decompress_payload(&packed).unwrap_err();
        assert!(err.to_string().contains("size mismatch"));
    }
}
