// SPDX-License-Identifier: BSD-3-Clause

//! The `"Binary"` [`Archive`] backend: one flat file per written field
//! occurrence, indexed by a small JSON sidecar (`ArchiveMetaData-<prefix>.json`)
//! that records each occurrence's `TypeId`, dims and byte length.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use serialbox_core::{
    self as core, Archive, ArchiveFactory, Error, FieldId, OpenMode, Run, StorageView, TypeId,
};

const NAME: &str = "Binary";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FieldRecord {
    type_id: TypeId,
    dims: Vec<usize>,
    byte_len: usize,
}

#[derive(Default, Serialize, Deserialize)]
struct ArchiveMetaData {
    #[serde(default)]
    records: IndexMap<String, FieldRecord>,
}

fn archive_meta_path(directory: &Path, prefix: &str) -> PathBuf {
    directory.join(format!("ArchiveMetaData-{prefix}.json"))
}

fn data_file_name(prefix: &str, field_id: &FieldId) -> String {
    format!("{prefix}-{}-{}.bin", field_id.field_name, field_id.occurrence)
}

pub struct BinaryArchive {
    directory: PathBuf,
    prefix: String,
    records: IndexMap<String, FieldRecord>,
}

impl BinaryArchive {
    fn open_impl(mode: OpenMode, directory: &Path, prefix: &str) -> Result<Self, Error> {
        let meta_path = archive_meta_path(directory, prefix);
        let records = match mode {
            OpenMode::Write => {
                if meta_path.is_file() {
                    debug!("resetting binary archive at {}", directory.display());
                    remove_managed_files(directory, prefix)?;
                }
                IndexMap::new()
            }
            OpenMode::Read => load_records(&meta_path)?,
            OpenMode::Append => {
                if meta_path.is_file() {
                    load_records(&meta_path)?
                } else {
                    IndexMap::new()
                }
            }
        };
        Ok(Self { directory: directory.to_path_buf(), prefix: prefix.to_owned(), records })
    }

    fn record_key(field_id: &FieldId) -> String { format!("{field_id}") }

    fn data_path(&self, field_id: &FieldId) -> PathBuf {
        self.directory.join(data_file_name(&self.prefix, field_id))
    }
}

fn load_records(meta_path: &Path) -> Result<IndexMap<String, FieldRecord>, Error> {
    let bytes = fs::read(meta_path).map_err(Error::from)?;
    let data: ArchiveMetaData = serde_json::from_slice(&bytes)
        .map_err(|e| Error::MetaDataCorrupt(format!("{}: {e}", meta_path.display())))?;
    Ok(data.records)
}

fn remove_managed_files(directory: &Path, prefix: &str) -> Result<(), Error> {
    let meta_path = archive_meta_path(directory, prefix);
    if meta_path.is_file() {
        fs::remove_file(&meta_path).map_err(Error::from)?;
    }
    let data_prefix = format!("{prefix}-");
    for entry in fs::read_dir(directory).map_err(Error::from)? {
        let entry = entry.map_err(Error::from)?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(&data_prefix) && name.ends_with(".bin") {
            let _ = fs::remove_file(entry.path());
        }
    }
    Ok(())
}

impl Archive for BinaryArchive {
    fn name(&self) -> &'static str { NAME }

    fn write(&mut self, view: &StorageView<'_>, field_id: FieldId) -> Result<FieldId, Error> {
        let bytes = collect_bytes(view)?;
        let path = self.data_path(&field_id);
        fs::write(&path, &bytes).map_err(Error::from)?;

        let record =
            FieldRecord { type_id: view.type_id(), dims: view.dims().to_vec(), byte_len: bytes.len() };
        self.records.insert(Self::record_key(&field_id), record);
        Ok(field_id)
    }

    fn read(&self, view: &mut StorageView<'_>, field_id: &FieldId) -> Result<(), Error> {
        let record = self
            .records
            .get(&Self::record_key(field_id))
            .ok_or_else(|| Error::ArchiveFieldNotFound(field_id.clone()))?;
        if record.type_id != view.type_id() {
            return Err(Error::TypeMismatch {
                field: field_id.field_name.clone(),
                expected: record.type_id,
                found: view.type_id(),
            });
        }
        if record.dims != view.dims() {
            return Err(Error::DimensionMismatch {
                field: field_id.field_name.clone(),
                expected: record.dims.clone(),
                found: view.dims().to_vec(),
            });
        }

        let path = self.data_path(field_id);
        let bytes = fs::read(&path).map_err(Error::from)?;
        scatter_bytes(view, &bytes)
    }

    fn update_metadata(&mut self) -> Result<(), Error> {
        let meta_path = archive_meta_path(&self.directory, &self.prefix);
        let tmp_path = self.directory.join(format!("ArchiveMetaData-{}.json.tmp", self.prefix));
        let data = ArchiveMetaData { records: self.records.clone() };
        let bytes = serde_json::to_vec_pretty(&data)
            .map_err(|e| Error::MetaDataWriteFailed(e.to_string()))?;
        fs::write(&tmp_path, &bytes).map_err(|e| Error::MetaDataWriteFailed(e.to_string()))?;
        fs::rename(&tmp_path, &meta_path).map_err(|e| Error::MetaDataWriteFailed(e.to_string()))?;
        Ok(())
    }

    fn supports_slicing(&self) -> bool { false }
}

/// Copies `view`'s logical contents, in canonical run order, into one
/// contiguous byte buffer. String views are serialized as a JSON array so
/// strings of differing length can still be stored in a fixed-size record.
fn collect_bytes(view: &StorageView<'_>) -> Result<Vec<u8>, Error> {
    if view.type_id() == TypeId::String {
        let strings: Vec<&str> =
            view.logical_indices().map(|idx| view.str_at(view.offset_of(&idx))).collect();
        return serde_json::to_vec(&strings).map_err(|e| Error::MetaDataWriteFailed(e.to_string()));
    }

    let mut bytes = Vec::with_capacity(view.element_count() * view.type_id().pod_size().unwrap_or(0));
    for Run { start, len } in view.runs() {
        // Safety: `start`/`len` come from `view.runs()`, which only ever
        // yields spans within `view`'s own dims.
        let slice = unsafe { view.pod_bytes_at(start, len) };
        bytes.extend_from_slice(slice);
    }
    Ok(bytes)
}

fn scatter_bytes(view: &mut StorageView<'_>, bytes: &[u8]) -> Result<(), Error> {
    if view.type_id() == TypeId::String {
        let strings: Vec<String> = serde_json::from_slice(bytes)
            .map_err(|e| Error::MetaDataCorrupt(e.to_string()))?;
        let indices: Vec<Vec<usize>> = view.logical_indices().collect();
        for (idx, value) in indices.into_iter().zip(strings.into_iter()) {
            let offset = view.offset_of(&idx);
            view.set_str_at(offset, &value);
        }
        return Ok(());
    }

    let elem_size = view.type_id().pod_size().expect("non-POD, non-String view");
    let mut cursor = 0usize;
    let runs: Vec<Run> = view.runs().collect();
    for Run { start, len } in runs {
        let byte_len = len * elem_size;
        // Safety: matches the layout `collect_bytes` wrote these bytes in,
        // over the same `view.runs()` sequence.
        let dest = unsafe { view.pod_bytes_at_mut(start, len) };
        dest.copy_from_slice(&bytes[cursor..cursor + byte_len]);
        cursor += byte_len;
    }
    Ok(())
}

struct BinaryArchiveFactory;

impl ArchiveFactory for BinaryArchiveFactory {
    fn open(&self, mode: OpenMode, directory: &Path, prefix: &str) -> Result<Box<dyn Archive>, Error> {
        Ok(Box::new(BinaryArchive::open_impl(mode, directory, prefix)?))
    }
}

/// Registers the `"Binary"` backend with [`serialbox_core::archive`]. Must be
/// called once before a [`serialbox_core::Serializer`] resolves it by name.
pub fn install() {
    if !core::archive::is_registered(NAME) {
        core::archive::register(NAME, Box::new(BinaryArchiveFactory));
    }
}
