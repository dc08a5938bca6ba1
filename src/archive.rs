// SPDX-License-Identifier: BSD-3-Clause

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use crate::error::Error;
use crate::savepoint_vector::FieldId;
use crate::view::{BoundingBox, StorageView};

/// The three modes a [`crate::Serializer`] (and the [`Archive`] it opens)
/// can be constructed in.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[display(lowercase)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

/// Append-only typed blob store keyed by [`FieldId`].
///
/// The core never inspects archive bytes; it only ever hands back the
/// `FieldId` an archive gives it. An archive implementation owns every file
/// under `directory` except the two catalog JSON files the core itself
/// manages.
pub trait Archive: Send {
    /// Short name this archive is registered under (e.g. `"Binary"`),
    /// resolved from the catalog's `archive_name` field.
    fn name(&self) -> &'static str;

    /// Persists the bytes described by `view` under `field_id`. Returns the
    /// `FieldId` the archive actually stored under — the archive is
    /// authoritative for the occurrence counter.
    fn write(&mut self, view: &StorageView<'_>, field_id: FieldId) -> Result<FieldId, Error>;

    /// Fills `view` with the bytes previously written under `field_id`.
    /// Fails with [`Error::DimensionMismatch`], [`Error::TypeMismatch`], or
    /// [`Error::ArchiveFieldNotFound`].
    fn read(&self, view: &mut StorageView<'_>, field_id: &FieldId) -> Result<(), Error>;

    /// Forces a durable flush of the archive-local catalog.
    fn update_metadata(&mut self) -> Result<(), Error>;

    /// Whether this archive can service sliced (sub-bounding-box) read/write.
    /// Default `false`.
    fn supports_slicing(&self) -> bool { false }

    /// Persists only the sub-box `bbox` of the field described by `view`.
    /// The default implementation rejects every call; an archive that
    /// overrides [`Archive::supports_slicing`] to return `true` must also
    /// override this.
    fn write_sliced(
        &mut self,
        _view: &StorageView<'_>,
        _field_id: FieldId,
        _bbox: &BoundingBox,
    ) -> Result<FieldId, Error> {
        Err(Error::ArchiveSliceNotSupported)
    }

    /// Fills `view` with the sub-box `bbox` of the field previously written
    /// under `field_id`. See [`Archive::write_sliced`].
    fn read_sliced(
        &self,
        _view: &mut StorageView<'_>,
        _field_id: &FieldId,
        _bbox: &BoundingBox,
    ) -> Result<(), Error> {
        Err(Error::ArchiveSliceNotSupported)
    }
}

/// Constructs an [`Archive`] for a given directory/prefix/mode. Implemented
/// by each pluggable backend crate (e.g. `serialbox-binary`) and registered
/// under a short name via [`register`].
pub trait ArchiveFactory: Send + Sync {
    fn open(&self, mode: OpenMode, directory: &Path, prefix: &str)
        -> Result<Box<dyn Archive>, Error>;
}

type Registry = Mutex<HashMap<&'static str, Box<dyn ArchiveFactory>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers an archive backend under `name`. Backends register themselves
/// this way at process init. Re-registering the same name replaces the
/// previous factory.
pub fn register(name: &'static str, factory: Box<dyn ArchiveFactory>) {
    registry().lock().expect("archive registry poisoned").insert(name, factory);
}

/// Resolves `name` to its registered factory and opens an archive with it.
/// Fails with [`Error::UnknownArchive`] if no backend was registered under
/// that name.
pub fn open(
    name: &str,
    mode: OpenMode,
    directory: &Path,
    prefix: &str,
) -> Result<Box<dyn Archive>, Error> {
    let registry = registry().lock().expect("archive registry poisoned");
    let factory = registry.get(name).ok_or_else(|| Error::UnknownArchive(name.to_owned()))?;
    factory.open(mode, directory, prefix)
}

pub fn is_registered(name: &str) -> bool {
    registry().lock().expect("archive registry poisoned").contains_key(name)
}
