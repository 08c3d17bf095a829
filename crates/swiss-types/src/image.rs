//! Cartridge image format.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! 0x00  magic          "SWCT"
//! 0x04  format version u16
//! 0x06  entry offset   u32   code offset of the entry function
//! 0x0a  table offset   u32   byte offset of the resource table
//! 0x0e  resource count u32
//! 0x12  code segment         functions in layout order + string pool
//!       resource table       13 bytes per entry (see [`ResourceEntry`])
//!       resource payloads    concatenated, in table order
//! ```
//!
//! Encoding is a pure function of the content: an unchanged project always
//! produces byte-identical cartridges.

use crate::{Resource, ResourceKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Magic bytes at the start of every cartridge.
pub const MAGIC: [u8; 4] = *b"SWCT";

/// Current cartridge format version.
pub const FORMAT_VERSION: u16 = 1;

/// Header length in bytes.
pub const HEADER_LEN: usize = 18;

/// Bytes per resource table entry: name hash (4) + kind (1) + offset (4) +
/// length (4).
pub const RESOURCE_ENTRY_LEN: usize = 13;

/// Load-time validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image too short: {0} bytes")]
    Truncated(usize),

    #[error("bad magic bytes")]
    BadMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("entry offset {entry:#x} is outside the code segment ({code_len:#x} bytes)")]
    EntryOutOfRange { entry: u32, code_len: u32 },

    #[error("resource table at {offset:#x} does not fit the image ({image_len:#x} bytes)")]
    TableOutOfRange { offset: u32, image_len: u32 },

    #[error("resource {index}: unknown kind tag {tag}")]
    UnknownKind { index: u32, tag: u8 },

    #[error("resource {index}: payload {offset:#x}+{length:#x} exceeds the payload section")]
    PayloadOutOfRange { index: u32, offset: u32, length: u32 },

    #[error("resources need {needed} bytes, exceeding the {window}-byte mapping window")]
    ResourceWindowOverflow { needed: u32, window: u32 },
}

/// One decoded resource table entry. Offsets are relative to the start of
/// the payload section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name_hash: u32,
    pub kind: ResourceKind,
    pub offset: u32,
    pub length: u32,
}

/// Stable hash for a resource name: the first four bytes of its SHA-256,
/// big-endian.
pub fn name_hash(name: &str) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// A compiled cartridge: the downloadable artifact and the emulator's
/// input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeImage {
    pub entry_offset: u32,
    pub code: Vec<u8>,
    pub resource_table: Vec<ResourceEntry>,
    pub payloads: Vec<u8>,
}

impl CartridgeImage {
    /// Assemble an image from generated code and the embedded resources,
    /// in embedding order.
    pub fn assemble(entry_offset: u32, code: Vec<u8>, resources: &[&Resource]) -> Self {
        let mut table = Vec::with_capacity(resources.len());
        let mut payloads = Vec::new();
        for res in resources {
            table.push(ResourceEntry {
                name_hash: name_hash(&res.name),
                kind: res.kind,
                offset: payloads.len() as u32,
                length: res.payload.len() as u32,
            });
            payloads.extend_from_slice(&res.payload);
        }
        Self {
            entry_offset,
            code,
            resource_table: table,
            payloads,
        }
    }

    /// Serialize to the wire layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let table_offset = (HEADER_LEN + self.code.len()) as u32;
        let mut out = Vec::with_capacity(
            HEADER_LEN
                + self.code.len()
                + self.resource_table.len() * RESOURCE_ENTRY_LEN
                + self.payloads.len(),
        );
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&self.entry_offset.to_le_bytes());
        out.extend_from_slice(&table_offset.to_le_bytes());
        out.extend_from_slice(&(self.resource_table.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.code);
        for entry in &self.resource_table {
            out.extend_from_slice(&entry.name_hash.to_le_bytes());
            out.push(entry.kind.tag());
            out.extend_from_slice(&entry.offset.to_le_bytes());
            out.extend_from_slice(&entry.length.to_le_bytes());
        }
        out.extend_from_slice(&self.payloads);
        out
    }

    /// Parse and validate the wire layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < HEADER_LEN {
            return Err(ImageError::Truncated(bytes.len()));
        }
        if bytes[0..4] != MAGIC {
            return Err(ImageError::BadMagic);
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }
        let entry_offset = read_u32(bytes, 6);
        let table_offset = read_u32(bytes, 10);
        let count = read_u32(bytes, 14);

        let image_len = bytes.len() as u32;
        let table_len = count.checked_mul(RESOURCE_ENTRY_LEN as u32);
        if table_offset < HEADER_LEN as u32
            || table_len
                .and_then(|len| table_offset.checked_add(len))
                .is_none_or(|end| end > image_len)
        {
            return Err(ImageError::TableOutOfRange {
                offset: table_offset,
                image_len,
            });
        }

        let code_len = table_offset - HEADER_LEN as u32;
        // An empty code segment still needs a valid entry; offset 0 of an
        // empty segment is rejected like any other out-of-range entry.
        if entry_offset >= code_len {
            return Err(ImageError::EntryOutOfRange {
                entry: entry_offset,
                code_len,
            });
        }
        let code = bytes[HEADER_LEN..table_offset as usize].to_vec();

        let payload_base = table_offset as usize + count as usize * RESOURCE_ENTRY_LEN;
        let payload_len = (bytes.len() - payload_base) as u32;
        let mut table = Vec::with_capacity(count as usize);
        for index in 0..count {
            let at = table_offset as usize + index as usize * RESOURCE_ENTRY_LEN;
            let tag = bytes[at + 4];
            let kind = ResourceKind::from_tag(tag).ok_or(ImageError::UnknownKind { index, tag })?;
            let offset = read_u32(bytes, at + 5);
            let length = read_u32(bytes, at + 9);
            if offset.checked_add(length).is_none_or(|end| end > payload_len) {
                return Err(ImageError::PayloadOutOfRange {
                    index,
                    offset,
                    length,
                });
            }
            table.push(ResourceEntry {
                name_hash: read_u32(bytes, at),
                kind,
                offset,
                length,
            });
        }

        Ok(Self {
            entry_offset,
            code,
            resource_table: table,
            payloads: bytes[payload_base..].to_vec(),
        })
    }

    /// Payload bytes for one table entry. Bounds were validated at decode.
    pub fn payload(&self, entry: &ResourceEntry) -> &[u8] {
        &self.payloads[entry.offset as usize..(entry.offset + entry.length) as usize]
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> CartridgeImage {
        let pal = Resource::new("bg_palette", ResourceKind::Palette, vec![0x0f, 0x21, 0x11, 0x01])
            .unwrap();
        let map = Resource::new("level_one", ResourceKind::MetatileMap, vec![7; 96]).unwrap();
        CartridgeImage::assemble(0, vec![0x00], &[&pal, &map])
    }

    #[test]
    fn test_round_trip() {
        let image = sample_image();
        let bytes = image.to_bytes();
        let back = CartridgeImage::from_bytes(&bytes).unwrap();
        assert_eq!(back, image);
        assert_eq!(back.resource_table.len(), 2);
        assert_eq!(back.payload(&back.resource_table[0]).len(), 4);
        assert_eq!(back.payload(&back.resource_table[1]).len(), 96);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let first = sample_image().to_bytes();
        for _ in 0..50 {
            assert_eq!(sample_image().to_bytes(), first);
        }
    }

    #[test]
    fn test_name_hash_stable_and_distinct() {
        assert_eq!(name_hash("bg_palette"), name_hash("bg_palette"));
        assert_ne!(name_hash("bg_palette"), name_hash("level_one"));
    }

    #[test]
    fn test_truncated_rejected() {
        assert_eq!(
            CartridgeImage::from_bytes(&[0; 4]),
            Err(ImageError::Truncated(4))
        );
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = sample_image().to_bytes();
        bytes[0] = b'X';
        assert_eq!(CartridgeImage::from_bytes(&bytes), Err(ImageError::BadMagic));
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut bytes = sample_image().to_bytes();
        bytes[4] = 0xff;
        assert!(matches!(
            CartridgeImage::from_bytes(&bytes),
            Err(ImageError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_entry_out_of_range_rejected() {
        let mut bytes = sample_image().to_bytes();
        // Code segment is one byte; entry offset 1 is past it.
        bytes[6..10].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            CartridgeImage::from_bytes(&bytes),
            Err(ImageError::EntryOutOfRange { .. })
        ));
    }

    #[test]
    fn test_table_out_of_range_rejected() {
        let mut bytes = sample_image().to_bytes();
        let huge = (bytes.len() as u32 + 1).to_le_bytes();
        bytes[10..14].copy_from_slice(&huge);
        assert!(matches!(
            CartridgeImage::from_bytes(&bytes),
            Err(ImageError::TableOutOfRange { .. })
        ));
    }

    #[test]
    fn test_payload_overrun_rejected() {
        let image = sample_image();
        let mut bytes = image.to_bytes();
        // Corrupt the second entry's length field.
        let entry_at = HEADER_LEN + image.code.len() + RESOURCE_ENTRY_LEN;
        bytes[entry_at + 9..entry_at + 13].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            CartridgeImage::from_bytes(&bytes),
            Err(ImageError::PayloadOutOfRange { index: 1, .. })
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let image = sample_image();
        let mut bytes = image.to_bytes();
        let entry_at = HEADER_LEN + image.code.len();
        bytes[entry_at + 4] = 0x7f;
        assert!(matches!(
            CartridgeImage::from_bytes(&bytes),
            Err(ImageError::UnknownKind { index: 0, tag: 0x7f })
        ));
    }
}
