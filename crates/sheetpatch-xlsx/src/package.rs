use std::collections::HashMap;
use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::zip_util::{
    part_name_key, read_zip_entry_with_budget, ZipInflateBudget, DEFAULT_MAX_ZIP_PART_BYTES,
    DEFAULT_MAX_ZIP_TOTAL_BYTES,
};
use crate::XlsxError;

/// Limits applied while inflating a package into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XlsxPackageLimits {
    pub max_part_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for XlsxPackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: DEFAULT_MAX_ZIP_PART_BYTES,
            max_total_bytes: DEFAULT_MAX_ZIP_TOTAL_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
struct PackageEntry {
    name: String,
    bytes: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
    /// Index in the source archive while the entry is untouched. Untouched entries are
    /// copied raw (compressed stream and headers) when the package is written.
    source_index: Option<usize>,
}

/// In-memory OPC package that preserves entry order, compression and the raw bytes of
/// every part it was not asked to change.
#[derive(Debug, Clone, Default)]
pub struct XlsxPackage {
    source: Option<Vec<u8>>,
    entries: Vec<PackageEntry>,
    index: HashMap<String, usize>,
    modified: bool,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_bytes_limited(bytes, XlsxPackageLimits::default())
    }

    /// Load a package. Anything the ZIP reader rejects is reported as
    /// [`XlsxError::CorruptArchive`].
    pub fn from_bytes_limited(bytes: &[u8], limits: XlsxPackageLimits) -> Result<Self, XlsxError> {
        let corrupt = |err: zip::result::ZipError| XlsxError::CorruptArchive(err.to_string());
        let mut zip = ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;

        let mut entries = Vec::with_capacity(zip.len());
        let mut index = HashMap::with_capacity(zip.len());
        let mut budget = ZipInflateBudget::new(limits.max_total_bytes);
        for i in 0..zip.len() {
            let file = zip.by_index(i).map_err(corrupt)?;
            let name = file.name().to_string();
            let is_dir = file.is_dir();
            let compression = file.compression();
            let declared = file.size();

            if index.insert(part_name_key(&name), i).is_some() {
                return Err(XlsxError::DuplicatePart(name));
            }

            let bytes = if is_dir {
                Vec::new()
            } else {
                read_zip_entry_with_budget(
                    file,
                    declared,
                    &name,
                    limits.max_part_bytes,
                    &mut budget,
                )
                .map_err(|err| match err {
                    XlsxError::Io(io) => XlsxError::CorruptArchive(format!("{name}: {io}")),
                    other => other,
                })?
            };

            entries.push(PackageEntry {
                name,
                bytes,
                compression,
                is_dir,
                source_index: Some(i),
            });
        }

        Ok(Self {
            source: Some(bytes.to_vec()),
            entries,
            index,
            modified: false,
        })
    }

    /// Build a package from scratch; every part is written with DEFLATE.
    pub fn from_parts<I, N>(parts: I) -> Result<Self, XlsxError>
    where
        I: IntoIterator<Item = (N, Vec<u8>)>,
        N: Into<String>,
    {
        let mut pkg = Self::default();
        for (name, bytes) in parts {
            let name = name.into();
            if pkg.index.contains_key(&part_name_key(&name)) {
                return Err(XlsxError::DuplicatePart(name));
            }
            pkg.set_part(name, bytes);
        }
        Ok(pkg)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&part_name_key(name)).copied()
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.position(name)
            .map(|i| &self.entries[i])
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.bytes.as_slice())
    }

    /// The name the archive actually stores for `name` (case and separators as written).
    pub fn stored_name(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].name.as_str())
    }

    /// Replace (or append) a part. Writing identical bytes leaves the part untouched.
    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => {
                let entry = &mut self.entries[i];
                if entry.bytes == bytes && !entry.is_dir {
                    return;
                }
                entry.bytes = bytes;
                entry.is_dir = false;
                entry.source_index = None;
            }
            None => {
                self.index.insert(part_name_key(&name), self.entries.len());
                self.entries.push(PackageEntry {
                    name,
                    bytes,
                    compression: CompressionMethod::Deflated,
                    is_dir: false,
                    source_index: None,
                });
            }
        }
        self.modified = true;
    }

    /// File parts in archive order (directory entries are skipped).
    pub fn parts(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| (entry.name.as_str(), entry.bytes.as_slice()))
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts().map(|(name, _)| name)
    }

    pub fn part_count(&self) -> usize {
        self.parts().count()
    }

    /// Whether any part differs from the archive this package was loaded from.
    pub fn is_modified(&self) -> bool {
        self.modified || self.source.is_none()
    }

    /// Serialize the package.
    ///
    /// An unmodified package returns its source bytes verbatim. Otherwise untouched
    /// entries are raw-copied from the source archive and rewritten parts keep their
    /// original compression method; timestamps on rewritten parts are the ZIP epoch, so
    /// the same input always produces the same output.
    pub fn write_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        if let (false, Some(source)) = (self.modified, &self.source) {
            return Ok(source.clone());
        }

        let mut source = match &self.source {
            Some(bytes) => Some(ZipArchive::new(Cursor::new(bytes.as_slice()))?),
            None => None,
        };
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &self.entries {
            if let (Some(i), Some(archive)) = (entry.source_index, source.as_mut()) {
                zip.raw_copy_file(archive.by_index(i)?)?;
                continue;
            }

            let compression = match entry.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let options = FileOptions::<()>::default().compression_method(compression);
            if entry.is_dir {
                zip.add_directory(entry.name.clone(), options)?;
            } else {
                zip.start_file(entry.name.clone(), options)?;
                zip.write_all(&entry.bytes)?;
            }
        }
        Ok(zip.finish()?.into_inner())
    }
}
