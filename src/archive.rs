//! MCPK archive pack/unpack: a hash-indexed directory/index table format with
//! a flat data region, optionally wrapping each entry in zlib (non-script
//! archives) or leaving it raw (script archives, signalled per-entry by the
//! `0x7FFF_FFFF` uncompressed-size sentinel).
//!
//! [`Archive`] is the in-memory representation used by both directions: it
//! borrows straight into the source buffer on [`Archive::read`], and is built
//! from owned entries by [`pack_dir`]. The directory-tree-to-bytes and
//! bytes-to-directory-tree convenience functions ([`pack_dir`],
//! [`unpack_dir`]) layer the reference tool's filesystem conventions —
//! `contents.json` synthesis, `redirect.mcs` script detection, hash-named
//! fallback paths — on top of that core representation.

use crate::{
    cc,
    containers::CompressableByteContainer,
    envelope,
    error::{Error, Report, Result},
    hashing::{self, Hash},
    marshal::MarshalDecoder,
};
use flate2::{write::ZlibEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io::Write as _, path::Path};
use walkdir::WalkDir;

const MAGIC: u32 = cc::make_four(b"MCPK");
const HEADER_SIZE: u32 = 57;
const DIR_ENTRY_SIZE: u32 = 12;
const INDEX_ENTRY_SIZE: u32 = 16;
const TRAILER_SIZE: usize = 129;
const HEADER_CONST: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x96, 0x53, 0xDA, 0x41];
const NAME_TAG: &[u8; 10] = b"minecraft\0";
const SCRIPT_SENTINEL: u32 = 0x7FFF_FFFF;
const CONTENTS_JSON: &str = "contents.json";
const REDIRECT_MCS: &str = "redirect.mcs";

/// A single archived file: its bytes as stored on disk, plus the inflated
/// length when those bytes are zlib-compressed (`None` for script archives,
/// which store entries raw).
pub type File<'bytes> = CompressableByteContainer<'bytes>;

/// The files grouped under one directory hash.
#[derive(Default)]
pub struct Directory<'bytes> {
    files: BTreeMap<Hash, File<'bytes>>,
}

impl<'bytes> Directory<'bytes> {
    #[must_use]
    pub fn get(&self, file_hash: Hash) -> Option<&File<'bytes>> {
        self.files.get(&file_hash)
    }

    pub fn insert(&mut self, file_hash: Hash, file: File<'bytes>) -> Option<File<'bytes>> {
        self.files.insert(file_hash, file)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &File<'bytes>)> {
        self.files.iter()
    }
}

/// The parsed or in-progress contents of an MCPK archive.
#[derive(Default)]
pub struct Archive<'bytes> {
    directories: BTreeMap<Hash, Directory<'bytes>>,
}

impl<'bytes> Archive<'bytes> {
    #[must_use]
    pub fn directory(&self, dir_hash: Hash) -> Option<&Directory<'bytes>> {
        self.directories.get(&dir_hash)
    }

    #[must_use]
    pub fn get(&self, dir_hash: Hash, file_hash: Hash) -> Option<&File<'bytes>> {
        self.directory(dir_hash)?.get(file_hash)
    }

    pub fn insert(&mut self, dir_hash: Hash, file_hash: Hash, file: File<'bytes>) {
        self.directories
            .entry(dir_hash)
            .or_default()
            .insert(file_hash, file);
    }

    pub fn directories(&self) -> impl Iterator<Item = (&Hash, &Directory<'bytes>)> {
        self.directories.iter()
    }

    /// `true` if this archive's entries are stored raw rather than
    /// zlib-wrapped, i.e. it is a script archive.
    #[must_use]
    pub fn is_script(&self) -> bool {
        self.directories
            .values()
            .flat_map(Directory::iter)
            .next()
            .is_some_and(|(_, file)| file.decompressed_len().is_none())
    }

    /// Parses a complete MCPK archive image.
    pub fn read(data: &'bytes [u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE as usize || read_u32(data, 0) != MAGIC {
            return Err(Error::InvalidMagic);
        }

        let dir_table_offset = read_u32(data, 12);
        let index_base_offset = read_u32(data, 16);
        let dir_count = index_base_offset.saturating_sub(dir_table_offset) / DIR_ENTRY_SIZE;

        let mut dir_entries = Vec::with_capacity(dir_count as usize);
        let mut max_index_rel_offset = 0u32;
        let mut last_dir_files = 0u32;
        for i in 0..dir_count {
            let pos = (dir_table_offset + i * DIR_ENTRY_SIZE) as usize;
            let dir_hash = Hash::new(read_u32(data, pos));
            let first_index_offset = read_u32(data, pos + 4);
            let entry_count = read_u32(data, pos + 8);
            if first_index_offset >= max_index_rel_offset {
                max_index_rel_offset = first_index_offset;
                last_dir_files = entry_count;
            }
            dir_entries.push((dir_hash, first_index_offset, entry_count));
        }

        let data_base_offset = index_base_offset + max_index_rel_offset + last_dir_files * INDEX_ENTRY_SIZE;

        let mut archive = Self::default();
        for (dir_hash, first_index_offset, entry_count) in dir_entries {
            let mut dir = Directory::default();
            for j in 0..entry_count {
                let pos = (index_base_offset + first_index_offset + j * INDEX_ENTRY_SIZE) as usize;
                let file_hash = Hash::new(read_u32(data, pos));
                let offset = read_u32(data, pos + 4);
                let c_size = read_u32(data, pos + 8);
                let u_size = read_u32(data, pos + 12);

                let start = (data_base_offset + offset) as usize;
                let end = (start + c_size as usize).min(data.len());
                let bytes = data.get(start..end).unwrap_or_default();
                let decompressed_len = (u_size != SCRIPT_SENTINEL).then_some(u_size as usize);
                dir.insert(file_hash, File::from_borrowed(bytes, decompressed_len));
            }
            archive.directories.insert(dir_hash, dir);
        }

        Ok(archive)
    }

    /// Serializes this archive to a complete MCPK image, sorted ascending by
    /// signed hash at both the directory and index level.
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let dir_count = self.directories.len() as u32;
        let dir_table_size = dir_count * DIR_ENTRY_SIZE;
        let index_base_offset = HEADER_SIZE + dir_table_size;

        let mut out = vec![0u8; HEADER_SIZE as usize];
        out[0..4].copy_from_slice(b"MCPK");
        out[4..12].copy_from_slice(&HEADER_CONST);
        out[12..16].copy_from_slice(&HEADER_SIZE.to_le_bytes());
        out[24..34].copy_from_slice(NAME_TAG);
        out[48..52].copy_from_slice(&dir_table_size.to_le_bytes());

        let mut index_rel_offset = 0u32;
        for (dir_hash, dir) in &self.directories {
            out.extend_from_slice(&dir_hash.get().to_le_bytes());
            out.extend_from_slice(&index_rel_offset.to_le_bytes());
            out.extend_from_slice(&(dir.len() as u32).to_le_bytes());
            index_rel_offset += dir.len() as u32 * INDEX_ENTRY_SIZE;
        }

        let index_placeholder_start = out.len();
        for (_, dir) in &self.directories {
            for _ in dir.iter() {
                out.extend_from_slice(&[0u8; INDEX_ENTRY_SIZE as usize]);
            }
        }

        let data_base_offset = out.len() as u32;
        let mut patches = Vec::new();
        let mut patch_pos = index_placeholder_start;
        for (_, dir) in &self.directories {
            for (file_hash, file) in dir.iter() {
                let file_offset = out.len() as u32 - data_base_offset;
                let bytes = file.as_bytes();
                out.extend_from_slice(bytes);

                let u_size = file.decompressed_len().map_or(SCRIPT_SENTINEL, |n| n as u32);
                patches.push((patch_pos, *file_hash, file_offset, bytes.len() as u32, u_size));
                patch_pos += INDEX_ENTRY_SIZE as usize;
            }
        }

        for (pos, file_hash, file_offset, c_size, u_size) in patches {
            out[pos..pos + 4].copy_from_slice(&file_hash.get().to_le_bytes());
            out[pos + 4..pos + 8].copy_from_slice(&file_offset.to_le_bytes());
            out[pos + 8..pos + 12].copy_from_slice(&c_size.to_le_bytes());
            out[pos + 12..pos + 16].copy_from_slice(&u_size.to_le_bytes());
        }

        out[16..20].copy_from_slice(&index_base_offset.to_le_bytes());
        out[20..24].copy_from_slice(&data_base_offset.to_le_bytes());

        out.extend_from_slice(&[0u8; TRAILER_SIZE]);
        out
    }
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    data.get(pos..pos + 4)
        .and_then(|s| s.try_into().ok())
        .map_or(0, u32::from_le_bytes)
}

fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory zlib write");
    encoder.finish().expect("in-memory zlib finish")
}

#[derive(Serialize, Deserialize)]
struct ContentsEntry {
    path: String,
}

#[derive(Serialize, Deserialize)]
struct ContentsJson {
    content: Vec<ContentsEntry>,
}

fn file_name_component(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Packs a directory tree into a complete MCPK image, mirroring the
/// reference tool's auto-`contents.json` synthesis and script-archive
/// detection.
pub fn pack_dir(input_dir: &Path) -> Result<Vec<u8>> {
    if !input_dir.is_dir() {
        return Err(Error::InvalidInputDirectory);
    }

    let contents_json_hash = hashing::hash_file(CONTENTS_JSON.as_bytes());
    let redirect_hash = hashing::hash_file(REDIRECT_MCS.as_bytes());

    let mut raw: Vec<(Hash, Hash, Vec<u8>)> = Vec::new();
    let mut rel_paths = Vec::new();
    let mut has_contents_json = false;
    let mut is_script = false;

    for entry in WalkDir::new(input_dir).into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(input_dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let file_name = file_name_component(&rel).to_owned();

        let dir_hash = hashing::hash_directory(rel.as_bytes());
        let file_hash = hashing::hash_file(file_name.as_bytes());
        if dir_hash == Hash::new(0) && file_hash == contents_json_hash {
            has_contents_json = true;
        }
        if dir_hash == Hash::new(0) && file_hash == redirect_hash {
            is_script = true;
        }

        let bytes = std::fs::read(entry.path())?;
        rel_paths.push(rel);
        raw.push((dir_hash, file_hash, bytes));
    }

    let mut archive = Archive::default();
    for (dir_hash, file_hash, bytes) in raw {
        let file = if is_script {
            File::from_owned(bytes, None)
        } else {
            let u_len = bytes.len();
            File::from_owned(compress(&bytes), Some(u_len))
        };
        archive.insert(dir_hash, file_hash, file);
    }

    if !is_script && !has_contents_json {
        let contents = ContentsJson {
            content: rel_paths.into_iter().map(|path| ContentsEntry { path }).collect(),
        };
        let json = serde_json::to_vec_pretty(&contents)?;
        let u_len = json.len();
        archive.insert(
            Hash::new(0),
            contents_json_hash,
            File::from_owned(compress(&json), Some(u_len)),
        );
    }

    Ok(archive.write())
}

fn payload_bytes(file: &File<'_>) -> Report<Vec<u8>> {
    match file.decompressed_len() {
        None => Report::ok(file.as_bytes().to_vec()),
        Some(_) => match envelope::inflate(file.as_bytes()) {
            Ok(bytes) => Report::ok(bytes),
            Err(_) => Report::new(file.as_bytes().to_vec(), vec![Error::Zlib]),
        },
    }
}

fn write_file(output_dir: &Path, rel_path: &str, bytes: &[u8]) -> Result<()> {
    let target = output_dir.join(rel_path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, bytes)?;
    Ok(())
}

/// Unpacks a parsed archive to `output_dir`, recovering logical paths from
/// `contents.json` when present, falling back to `{dir_hash:08X}/{file_hash:08X}`
/// names otherwise. Individual entry failures are recorded as warnings rather
/// than aborting the whole unpack.
pub fn unpack_dir(archive: &Archive<'_>, output_dir: &Path) -> Result<Report<()>> {
    std::fs::create_dir_all(output_dir)?;
    let mut warnings = Vec::new();

    let contents_json_hash = hashing::hash_file(CONTENTS_JSON.as_bytes());
    let redirect_hash = hashing::hash_file(REDIRECT_MCS.as_bytes());
    let root = archive.directory(Hash::new(0));

    let redirect_file = root.and_then(|dir| dir.get(redirect_hash));
    if let Some(file) = redirect_file {
        let report = payload_bytes(file);
        warnings.extend(report.warnings);
        match envelope::decrypt(&report.value) {
            decrypted if decrypted.is_clean() => {
                write_file(output_dir, REDIRECT_MCS, &decrypted.value)?;
            }
            decrypted => {
                warnings.extend(decrypted.warnings);
                write_file(output_dir, REDIRECT_MCS, &report.value)?;
            }
        }
    }

    let contents_file = root.and_then(|dir| dir.get(contents_json_hash));
    if let Some(file) = contents_file {
        let report = payload_bytes(file);
        warnings.extend(report.warnings);
        write_file(output_dir, CONTENTS_JSON, &report.value)?;

        let parsed: std::result::Result<ContentsJson, _> = serde_json::from_slice(&report.value);
        if let Ok(contents) = parsed {
            for entry in contents.content {
                let norm = entry.path.replace('\\', "/");
                let dir_hash = hashing::hash_directory(norm.as_bytes());
                let file_hash = hashing::hash_file(file_name_component(&norm).as_bytes());
                let Some(file) = archive.get(dir_hash, file_hash) else {
                    warnings.push(Error::MissingEntry(norm));
                    continue;
                };
                let payload = payload_bytes(file);
                warnings.extend(payload.warnings);
                write_file(output_dir, &norm, &payload.value)?;
            }
        }
        return Ok(Report::new((), warnings));
    }

    let is_script = archive.is_script();
    for (dir_hash, dir) in archive.directories() {
        for (file_hash, file) in dir.iter() {
            let fallback_name = format!("{:08X}/{:08X}", dir_hash.get(), file_hash.get());
            if !is_script {
                match envelope::inflate(file.as_bytes()) {
                    Ok(bytes) => write_file(output_dir, &fallback_name, &bytes)?,
                    Err(_) => {
                        warnings.push(Error::DecodeFailure(fallback_name.clone()));
                        write_file(output_dir, &fallback_name, file.as_bytes())?;
                    }
                }
                continue;
            }

            let decrypted = envelope::decrypt(file.as_bytes());
            let named_path = MarshalDecoder::decode(&decrypted.value)
                .ok()
                .and_then(|report| match report.value {
                    crate::marshal::MarshalObject::Code(code) => {
                        let name = code.filename.as_bstr().to_string();
                        (!name.is_empty()).then(|| name.replace(".py", ".mcs"))
                    }
                    _ => None,
                });

            match named_path {
                Some(name) => write_file(output_dir, &name, file.as_bytes())?,
                None => {
                    warnings.push(Error::DecodeFailure(fallback_name.clone()));
                    write_file(output_dir, &fallback_name, file.as_bytes())?;
                }
            }
        }
    }

    Ok(Report::new((), warnings))
}

#[cfg(test)]
mod tests {
    use super::{pack_dir, unpack_dir, Archive};
    use std::fs;

    #[test]
    fn single_file_tree_round_trips() {
        let input = std::env::temp_dir().join("mcpk_archive_test_input");
        let output = std::env::temp_dir().join("mcpk_archive_test_output");
        let _ = fs::remove_dir_all(&input);
        let _ = fs::remove_dir_all(&output);
        fs::create_dir_all(input.join("a")).unwrap();
        fs::write(input.join("a/b.txt"), b"hello").unwrap();

        let packed = pack_dir(&input).unwrap();
        let archive = Archive::read(&packed).unwrap();
        let report = unpack_dir(&archive, &output).unwrap();
        assert!(report.is_clean());

        assert_eq!(fs::read(output.join("a/b.txt")).unwrap(), b"hello");
        assert!(output.join(super::CONTENTS_JSON).exists());

        fs::remove_dir_all(&input).unwrap();
        fs::remove_dir_all(&output).unwrap();
    }

    #[test]
    fn directory_and_index_tables_are_signed_hash_sorted() {
        let input = std::env::temp_dir().join("mcpk_archive_test_sort_input");
        let _ = fs::remove_dir_all(&input);
        fs::create_dir_all(input.join("x")).unwrap();
        fs::create_dir_all(input.join("y")).unwrap();
        fs::write(input.join("x/one.txt"), b"one").unwrap();
        fs::write(input.join("y/two.txt"), b"two").unwrap();

        let packed = pack_dir(&input).unwrap();
        let archive = Archive::read(&packed).unwrap();
        let hashes: Vec<i32> = archive
            .directories()
            .map(|(h, _)| h.get() as i32)
            .collect();
        let mut sorted = hashes.clone();
        sorted.sort_unstable();
        assert_eq!(hashes, sorted);

        fs::remove_dir_all(&input).unwrap();
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(Archive::read(b"NOPE").is_err());
    }
}
