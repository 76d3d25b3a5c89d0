/// Persistent map from program fingerprint to compiled microcode.
///
/// On-disk layout (little endian):
///
/// ```text
/// "OGPC"  u16 version (2)  u32 body length
/// body:   u32 count  { u32 id  u32 length  bytes[length] } * count
/// ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::engine_bail;
use crate::error::{Error, Result};

const SOURCE: &str = "ogre::MicrocodeCache";

pub const MICROCODE_CACHE_MAGIC: &[u8; 4] = b"OGPC";
pub const MICROCODE_CACHE_VERSION: u16 = 2;

#[derive(Debug, Clone, Default)]
pub struct MicrocodeCache {
    entries: BTreeMap<u32, Vec<u8>>,
    dirty: bool,
}

impl MicrocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: u32) -> Option<&[u8]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    /// Insert or replace; marks the cache dirty
    pub fn add(&mut self, id: u32, microcode: Vec<u8>) {
        self.entries.insert(id, microcode);
        self.dirty = true;
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let removed = self.entries.remove(&id).is_some();
        self.dirty |= removed;
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear(&mut self) {
        self.dirty |= !self.entries.is_empty();
        self.entries.clear();
    }

    // ===== SERIALIZATION =====

    /// Write every entry; clears the dirty flag
    pub fn save(&mut self, writer: &mut dyn Write) -> Result<()> {
        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for (id, microcode) in &self.entries {
            body.write_u32::<LittleEndian>(*id)?;
            body.write_u32::<LittleEndian>(microcode.len() as u32)?;
            body.extend_from_slice(microcode);
        }

        writer.write_all(MICROCODE_CACHE_MAGIC)?;
        writer.write_u16::<LittleEndian>(MICROCODE_CACHE_VERSION)?;
        writer.write_u32::<LittleEndian>(body.len() as u32)?;
        writer.write_all(&body)?;
        writer.flush()?;
        self.dirty = false;
        Ok(())
    }

    /// Merge the entries of a saved cache. Entries added before the load keep
    /// the cache dirty.
    pub fn load(&mut self, reader: &mut dyn Read) -> Result<usize> {
        let mut magic = [0u8; 4];
        read_exact(reader, &mut magic)?;
        if &magic != MICROCODE_CACHE_MAGIC {
            engine_bail!(SOURCE, InvalidAsset, "Not a microcode cache (magic {:?})", magic);
        }
        let version = reader.read_u16::<LittleEndian>().map_err(truncated)?;
        if version != MICROCODE_CACHE_VERSION {
            engine_bail!(SOURCE, InvalidAsset,
                "Microcode cache version {} is not supported (expected {})",
                version, MICROCODE_CACHE_VERSION);
        }
        let body_len = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let mut body = Vec::new();
        (&mut *reader).take(body_len as u64).read_to_end(&mut body).map_err(truncated)?;
        if body.len() != body_len {
            engine_bail!(SOURCE, InvalidAsset,
                "Microcode cache is truncated ({} of {} body bytes)", body.len(), body_len);
        }

        let mut cursor = body.as_slice();
        let count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let mut loaded = BTreeMap::new();
        for _ in 0..count {
            let id = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
            let len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            if cursor.len() < len {
                engine_bail!(SOURCE, InvalidAsset,
                    "Microcode entry {:#x} claims {} bytes, {} left", id, len, cursor.len());
            }
            let (bytes, rest) = cursor.split_at(len);
            loaded.insert(id, bytes.to_vec());
            cursor = rest;
        }

        let count = loaded.len();
        self.entries.extend(loaded);
        Ok(count)
    }

    pub fn save_to_file(&mut self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save(&mut writer)
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<usize> {
        let mut reader = BufReader::new(File::open(path)?);
        self.load(&mut reader)
    }
}

fn read_exact(reader: &mut dyn Read, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(truncated)
}

fn truncated(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        crate::engine_err!(SOURCE, InvalidAsset, "Microcode cache is truncated")
    } else {
        Error::from(err)
    }
}

#[cfg(test)]
#[path = "microcode_cache_tests.rs"]
mod tests;
