//! Stream & container layer (spec.md §4.1): stream opening with
//! transparent gzip interposition and peek-without-consuming, plus the
//! `Container` abstraction multi-file formats (BMFont, Mac dfont bundles,
//! CPI) need to enumerate member files.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Peek at the first `n` bytes of a reader without losing them for
/// subsequent reads. Falls back to read-then-buffer (spec.md §4.1) by
/// reading into a small prefix buffer and splicing it back in front of the
/// stream via [`PeekedReader`].
pub fn peek<R: Read>(mut reader: R, n: usize) -> io::Result<(Vec<u8>, PeekedReader<R>)> {
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        let read = reader.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    buf.truncate(filled);
    let peeked = buf.clone();
    Ok((peeked, PeekedReader { prefix: buf, pos: 0, rest: reader }))
}

/// A reader that replays a previously-peeked prefix before continuing to
/// read from the wrapped reader.
pub struct PeekedReader<R> {
    prefix: Vec<u8>,
    pos: usize,
    rest: R,
}

impl<R: Read> Read for PeekedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.prefix.len() {
            let remaining = &self.prefix[self.pos..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        } else {
            self.rest.read(buf)
        }
    }
}

/// Open a stream for reading, transparently unwrapping a gzip layer when
/// the input's magic is `1F 8B` (spec.md §4.1, §6).
pub fn open_read(reader: Box<dyn Read>) -> Result<Box<dyn Read>> {
    let (prefix, peeked) = peek(reader, 2)?;
    if prefix == [0x1F, 0x8B] {
        Ok(Box::new(flate2::read::GzDecoder::new(peeked)))
    } else {
        Ok(Box::new(peeked))
    }
}

/// Read a whole stream to the end, unwrapping a gzip layer first if
/// present, and tolerating (stripping) a leading UTF-8 BOM when `text` is
/// set (spec.md §4.1).
pub fn read_all(reader: Box<dyn Read>, text: bool) -> Result<Vec<u8>> {
    let mut unwrapped = open_read(reader)?;
    let mut data = Vec::new();
    unwrapped.read_to_end(&mut data)?;
    if text && data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        data.drain(0..3);
    }
    Ok(data)
}

/// A named collection of members, each openable as a byte stream
/// (spec.md §3 "Containers").
pub trait Container {
    /// List member names in a stable, deterministic order.
    fn names(&self) -> Vec<String>;
    /// Open a member for reading.
    fn open(&self, name: &str) -> Result<Vec<u8>>;
}

/// A filesystem directory container: each regular file under the root is
/// a member, named by its path relative to the root.
pub struct DirContainer {
    root: PathBuf,
}

impl DirContainer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Container for DirContainer {
    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        names.sort();
        names
    }

    fn open(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.root.join(name))?)
    }
}

/// A single file treated as its own one-member container, named by its
/// file name.
pub struct SingleFileContainer {
    path: PathBuf,
}

impl SingleFileContainer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Container for SingleFileContainer {
    fn names(&self) -> Vec<String> {
        vec![self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()]
    }

    fn open(&self, _name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }
}

/// A zip archive container.
pub struct ZipContainer {
    entries: Vec<(String, Vec<u8>)>,
}

impl ZipContainer {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let cursor = io::Cursor::new(data);
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| Error::BadStructure(format!("not a zip archive: {e}")))?;
        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| Error::BadStructure(format!("bad zip entry: {e}")))?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            entries.push((name, buf));
        }
        Ok(Self { entries })
    }
}

impl Container for ZipContainer {
    fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    fn open(&self, name: &str) -> Result<Vec<u8>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| Error::BadStructure(format!("no such member: {name}")))
    }
}

/// Open a path as the container implied by its shape: a directory becomes
/// a [`DirContainer`], a `.zip` suffix becomes a [`ZipContainer`], anything
/// else becomes a [`SingleFileContainer`] holding just that file.
pub fn open_container(path: &Path) -> Result<Box<dyn Container>> {
    if path.is_dir() {
        return Ok(Box::new(DirContainer::new(path)));
    }
    if path.extension().map(|e| e.eq_ignore_ascii_case("zip")).unwrap_or(false) {
        let data = fs::read(path)?;
        return Ok(Box::new(ZipContainer::from_bytes(data)?));
    }
    Ok(Box::new(SingleFileContainer::new(path)))
}

/// Write `data` to `path`, creating parent directories as needed — the
/// symmetric counterpart callers use when an encoder writes a sibling
/// spritesheet file (BMFont) alongside the descriptor.
pub fn write_sibling(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = fs::File::create(path)?;
    f.write_all(data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_does_not_consume_bytes() {
        let data = vec![1u8, 2, 3, 4, 5];
        let (peeked, mut reader) = peek(io::Cursor::new(data.clone()), 2).unwrap();
        assert_eq!(peeked, vec![1, 2]);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, data);
    }

    #[test]
    fn read_all_strips_bom_for_text() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(b"hello");
        let out = read_all(Box::new(io::Cursor::new(data)), true).unwrap();
        assert_eq!(out, b"hello");
    }
}
