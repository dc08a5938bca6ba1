// SPDX-License-Identifier: BSD-3-Clause

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::field::FieldMap;
use crate::meta::MetaInfoMap;
use crate::savepoint_vector::SavepointVector;

/// Catalog format version written by this crate. Bumped whenever the JSON
/// shape below changes incompatibly; `load` rejects any other value.
pub const FORMAT_VERSION: u32 = 1;

/// On-disk shape of `MetaData-<prefix>.json` — the catalog the core owns
/// directly. A second file, `ArchiveMetaData-<prefix>.json`, is owned and
/// interpreted only by the resolved archive backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogData {
    pub format_version: u32,
    pub archive_name: String,
    #[serde(default)]
    pub global_meta_info: MetaInfoMap,
    #[serde(default)]
    pub field_map: FieldMap,
    #[serde(default)]
    pub savepoint_vector: SavepointVector,
}

impl CatalogData {
    pub fn new(archive_name: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            archive_name: archive_name.into(),
            global_meta_info: MetaInfoMap::new(),
            field_map: FieldMap::new(),
            savepoint_vector: SavepointVector::new(),
        }
    }
}

pub fn catalog_path(directory: &Path, prefix: &str) -> PathBuf {
    directory.join(format!("MetaData-{prefix}.json"))
}

/// Loads and validates the catalog for `prefix` in `directory`. Fails with
/// [`Error::MetaDataNotFound`] if the file is absent, or
/// [`Error::MetaDataCorrupt`] if it fails to parse or carries an
/// unrecognized `format_version`.
pub fn load(directory: &Path, prefix: &str) -> Result<CatalogData, Error> {
    let path = catalog_path(directory, prefix);
    let bytes = fs::read(&path).map_err(|_| Error::MetaDataNotFound(prefix.to_owned()))?;
    let data: CatalogData = serde_json::from_slice(&bytes)
        .map_err(|e| Error::MetaDataCorrupt(format!("{path}: {e}", path = path.display())))?;
    if data.format_version != FORMAT_VERSION {
        return Err(Error::MetaDataCorrupt(format!(
            "unsupported catalog format_version {} (expected {FORMAT_VERSION})",
            data.format_version
        )));
    }
    Ok(data)
}

/// Atomically durably writes the catalog: serialize to a sibling temp file,
/// then rename over the final path, so a crash mid-write can never leave a
/// half-written `MetaData-<prefix>.json` behind.
pub fn save(directory: &Path, prefix: &str, data: &CatalogData) -> Result<(), Error> {
    let path = catalog_path(directory, prefix);
    let tmp_path = directory.join(format!("MetaData-{prefix}.json.tmp"));
    let bytes = serde_json::to_vec_pretty(data)
        .map_err(|e| Error::MetaDataWriteFailed(e.to_string()))?;
    fs::write(&tmp_path, &bytes).map_err(|e| Error::MetaDataWriteFailed(e.to_string()))?;
    fs::rename(&tmp_path, &path).map_err(|e| Error::MetaDataWriteFailed(e.to_string()))?;
    Ok(())
}

pub fn exists(directory: &Path, prefix: &str) -> bool { catalog_path(directory, prefix).is_file() }
