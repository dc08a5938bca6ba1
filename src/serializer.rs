// SPDX-License-Identifier: BSD-3-Clause

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::archive::{self, Archive, OpenMode};
use crate::catalog::{self, CatalogData};
use crate::error::Error;
use crate::field::FieldMetaInfo;
use crate::meta::MetaInfoMap;
use crate::savepoint::Savepoint;
use crate::view::{BoundingBox, StorageView};

static SERIALIZATION_ENABLED: AtomicBool = AtomicBool::new(true);

/// Seam for a host process to observe unrecoverable errors, e.g. to log to a
/// dedicated channel or terminate the process. The core never calls this
/// itself — it always returns `Result` — but keeps the hook available for an
/// FFI-style embedding that wants C-like fatal-error semantics at its own
/// boundary.
pub trait FatalErrorHandler {
    fn on_fatal_error(&self, _err: &Error) {}
}

/// No-op handler used when an embedder doesn't install one of its own.
pub struct NoopFatalErrorHandler;

impl FatalErrorHandler for NoopFatalErrorHandler {}

/// Process-wide diagnostic kill switch (default enabled). When disabled,
/// [`Serializer::write`] becomes a no-op; [`Serializer::read`] is
/// unaffected. Not safe to flip concurrently with in-flight writes.
pub fn enable_serialization() { SERIALIZATION_ENABLED.store(true, Ordering::Relaxed); }

pub fn disable_serialization() { SERIALIZATION_ENABLED.store(false, Ordering::Relaxed); }

pub fn is_serialization_enabled() -> bool { SERIALIZATION_ENABLED.load(Ordering::Relaxed) }

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum State {
    Open,
    Closed,
}

/// Top-level aggregate coordinating the field schema, savepoint catalog and
/// pluggable archive, plus metadata persistence and the
/// registration/write/read protocol.
///
/// A `Serializer` is never copied or shared across threads; its directory is
/// an exclusive resource for the process lifetime of the instance.
pub struct Serializer {
    mode: OpenMode,
    directory: PathBuf,
    prefix: String,
    catalog: CatalogData,
    archive: Box<dyn Archive>,
    state: State,
}

impl Serializer {
    /// Opens (or creates) a serializer at `directory` with catalog file
    /// prefix `prefix`, resolving the archive backend named `archive_name`.
    ///
    /// - `Read`: the directory and catalog must already exist and be
    ///   internally consistent.
    /// - `Write`: the directory is created if absent; if a catalog already
    ///   exists it is discarded first, so construction always starts from a
    ///   fresh slate.
    /// - `Append`: loads an existing catalog if present, otherwise behaves
    ///   like `Write`.
    pub fn new(
        mode: OpenMode,
        directory: impl AsRef<Path>,
        prefix: impl Into<String>,
        archive_name: impl Into<String>,
    ) -> Result<Self, Error> {
        let directory = directory.as_ref().to_path_buf();
        let prefix = prefix.into();
        let archive_name = archive_name.into();

        let catalog = match mode {
            OpenMode::Read => catalog::load(&directory, &prefix)?,
            OpenMode::Write => {
                fs::create_dir_all(&directory).map_err(Error::from)?;
                if catalog::exists(&directory, &prefix) {
                    debug!("removing existing catalog at {}", directory.display());
                    fs::remove_file(catalog::catalog_path(&directory, &prefix)).map_err(Error::from)?;
                }
                CatalogData::new(archive_name.clone())
            }
            OpenMode::Append => {
                if catalog::exists(&directory, &prefix) {
                    catalog::load(&directory, &prefix)?
                } else {
                    fs::create_dir_all(&directory).map_err(Error::from)?;
                    CatalogData::new(archive_name.clone())
                }
            }
        };

        let archive = archive::open(&catalog.archive_name, mode, &directory, &prefix)?;

        Ok(Self { mode, directory, prefix, catalog, archive, state: State::Open })
    }

    pub fn mode(&self) -> OpenMode { self.mode }

    pub fn directory(&self) -> &Path { &self.directory }

    pub fn prefix(&self) -> &str { &self.prefix }

    /// The mutable catalog-level meta-info map. Changes take effect on disk
    /// only after the next [`Serializer::update_metadata`].
    pub fn global_meta_info(&mut self) -> &mut MetaInfoMap { &mut self.catalog.global_meta_info }

    pub fn field_names(&self) -> impl Iterator<Item = &str> { self.catalog.field_map.names() }

    pub fn field_metainfo(&self, name: &str) -> Option<&FieldMetaInfo> {
        self.catalog.field_map.find_field(name)
    }

    pub fn savepoints(&self) -> impl Iterator<Item = &Savepoint> { self.catalog.savepoint_vector.savepoints() }

    pub fn num_savepoints(&self) -> usize { self.catalog.savepoint_vector.len() }

    /// Field names recorded at the savepoint equal to `sp`, in the order
    /// each was first written.
    pub fn field_names_at_savepoint(&self, sp: &Savepoint) -> Result<Vec<&str>, Error> {
        let index = self.savepoint_index(sp)?;
        Ok(self.catalog.savepoint_vector.fields_of(index).map(|(name, _)| name).collect())
    }

    /// Registers `name` with schema `info`. Returns `true` if this created a
    /// new entry, `false` if an identical entry already existed. Fails with
    /// [`Error::FieldAlreadyRegisteredButDifferent`] on a conflicting
    /// re-registration.
    pub fn register_field(&mut self, name: &str, info: FieldMetaInfo) -> Result<bool, Error> {
        self.require_open()?;
        self.catalog.field_map.register_field(name, info)
    }

    /// Registers `sp`. Returns `true` if newly inserted, `false` if an
    /// equal savepoint was already present.
    pub fn register_savepoint(&mut self, sp: Savepoint) -> Result<bool, Error> {
        self.require_open()?;
        match self.catalog.savepoint_vector.find_index(&sp) {
            Some(_) => Ok(false),
            None => {
                self.catalog.savepoint_vector.insert(sp)?;
                Ok(true)
            }
        }
    }

    /// Writes `view` under `field_name` at savepoint `sp`. A no-op when
    /// [`is_serialization_enabled`] is `false`.
    ///
    /// On any failure after the savepoint-vector cell has been allocated,
    /// that allocation is rolled back; if `sp` itself was newly inserted by
    /// this call, the insertion is rolled back too. A failed write never
    /// leaves a partially-recorded savepoint or cell.
    pub fn write(&mut self, field_name: &str, sp: &Savepoint, view: &StorageView<'_>) -> Result<(), Error> {
        self.require_open()?;
        if !is_serialization_enabled() {
            return Ok(());
        }

        let field = self
            .catalog
            .field_map
            .find_field(field_name)
            .ok_or_else(|| Error::FieldNotRegistered(field_name.to_owned()))?;
        self.validate_view(field_name, field, view)?;

        let (sp_index, savepoint_is_new) = match self.catalog.savepoint_vector.find_index(sp) {
            Some(i) => (i, false),
            None => (self.catalog.savepoint_vector.insert(sp.clone())?, true),
        };

        let field_id = match self.catalog.savepoint_vector.add_field(sp_index, field_name) {
            Ok(id) => id,
            Err(err) => {
                if savepoint_is_new {
                    self.catalog.savepoint_vector.remove_last_savepoint(sp_index);
                }
                return Err(err);
            }
        };

        let result = self.archive.write(view, field_id.clone()).and_then(|returned| {
            self.catalog.savepoint_vector.set_field_id(sp_index, returned);
            self.update_metadata()
        });

        if let Err(err) = result {
            self.catalog.savepoint_vector.remove_field(sp_index, field_name);
            if savepoint_is_new {
                self.catalog.savepoint_vector.remove_last_savepoint(sp_index);
            }
            if matches!(err, Error::MetaDataWriteFailed(_)) {
                self.state = State::Closed;
            }
            return Err(err);
        }

        Ok(())
    }

    /// Reads the bytes recorded under `field_name` at savepoint `sp` into
    /// `view`. Unaffected by [`is_serialization_enabled`].
    pub fn read(&self, field_name: &str, sp: &Savepoint, view: &mut StorageView<'_>) -> Result<(), Error> {
        self.require_open()?;

        let field = self
            .catalog
            .field_map
            .find_field(field_name)
            .ok_or_else(|| Error::FieldNotRegistered(field_name.to_owned()))?;
        self.validate_view(field_name, field, view)?;

        let sp_index = self.savepoint_index(sp)?;
        let field_id = self.catalog.savepoint_vector.lookup(sp_index, field_name)?;
        self.archive.read(view, &field_id)
    }

    /// Advanced form of [`Serializer::write`]: `view` describes only the
    /// sub-box `bbox` of the registered field, rather than the whole field.
    /// Delegates to [`Archive::write_sliced`]; archives that do not
    /// advertise [`Archive::supports_slicing`] reject this up front with
    /// [`Error::ArchiveSliceNotSupported`] without touching the catalog.
    pub fn write_sliced(
        &mut self,
        field_name: &str,
        sp: &Savepoint,
        view: &StorageView<'_>,
        bbox: &BoundingBox,
    ) -> Result<(), Error> {
        self.require_open()?;
        if !is_serialization_enabled() {
            return Ok(());
        }

        let field = self
            .catalog
            .field_map
            .find_field(field_name)
            .ok_or_else(|| Error::FieldNotRegistered(field_name.to_owned()))?;
        self.validate_sliced_view(field_name, field, view, bbox)?;

        if !self.archive.supports_slicing() {
            return Err(Error::ArchiveSliceNotSupported);
        }

        let (sp_index, savepoint_is_new) = match self.catalog.savepoint_vector.find_index(sp) {
            Some(i) => (i, false),
            None => (self.catalog.savepoint_vector.insert(sp.clone())?, true),
        };

        let field_id = match self.catalog.savepoint_vector.add_field(sp_index, field_name) {
            Ok(id) => id,
            Err(err) => {
                if savepoint_is_new {
                    self.catalog.savepoint_vector.remove_last_savepoint(sp_index);
                }
                return Err(err);
            }
        };

        let result = self.archive.write_sliced(view, field_id.clone(), bbox).and_then(|returned| {
            self.catalog.savepoint_vector.set_field_id(sp_index, returned);
            self.update_metadata()
        });

        if let Err(err) = result {
            self.catalog.savepoint_vector.remove_field(sp_index, field_name);
            if savepoint_is_new {
                self.catalog.savepoint_vector.remove_last_savepoint(sp_index);
            }
            if matches!(err, Error::MetaDataWriteFailed(_)) {
                self.state = State::Closed;
            }
            return Err(err);
        }

        Ok(())
    }

    /// Advanced form of [`Serializer::read`]: fills `view` with only the
    /// sub-box `bbox` of the field recorded under `field_name` at `sp`.
    pub fn read_sliced(
        &self,
        field_name: &str,
        sp: &Savepoint,
        view: &mut StorageView<'_>,
        bbox: &BoundingBox,
    ) -> Result<(), Error> {
        self.require_open()?;

        let field = self
            .catalog
            .field_map
            .find_field(field_name)
            .ok_or_else(|| Error::FieldNotRegistered(field_name.to_owned()))?;
        self.validate_sliced_view(field_name, field, view, bbox)?;

        if !self.archive.supports_slicing() {
            return Err(Error::ArchiveSliceNotSupported);
        }

        let sp_index = self.savepoint_index(sp)?;
        let field_id = self.catalog.savepoint_vector.lookup(sp_index, field_name)?;
        self.archive.read_sliced(view, &field_id, bbox)
    }

    /// Forces an immediate durable flush of both the core catalog and the
    /// archive-local catalog. An unrecoverable failure here transitions the
    /// serializer to `Closed`; subsequent operations fail with
    /// [`Error::SerializerClosed`].
    pub fn update_metadata(&mut self) -> Result<(), Error> {
        self.require_open()?;
        match self.flush() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.state = State::Closed;
                Err(err)
            }
        }
    }

    fn flush(&mut self) -> Result<(), Error> {
        catalog::save(&self.directory, &self.prefix, &self.catalog)?;
        self.archive.update_metadata()
    }

    fn savepoint_index(&self, sp: &Savepoint) -> Result<usize, Error> {
        self.catalog
            .savepoint_vector
            .find_index(sp)
            .ok_or_else(|| Error::FieldNotExistsAtSavepoint {
                savepoint: sp.name.clone(),
                field: String::new(),
            })
    }

    fn validate_view(&self, field_name: &str, field: &FieldMetaInfo, view: &StorageView<'_>) -> Result<(), Error> {
        if view.type_id() != field.type_id {
            return Err(Error::TypeMismatch {
                field: field_name.to_owned(),
                expected: field.type_id,
                found: view.type_id(),
            });
        }
        if view.dims() != field.dims.as_slice() {
            return Err(Error::DimensionMismatch {
                field: field_name.to_owned(),
                expected: field.dims.clone(),
                found: view.dims().to_vec(),
            });
        }
        Ok(())
    }

    /// Validates a sliced write/read: `bbox` must have the field's rank and
    /// fit within its `dims`, and `view` must describe exactly `bbox.extent`
    /// elements of the field's `type_id`.
    fn validate_sliced_view(
        &self,
        field_name: &str,
        field: &FieldMetaInfo,
        view: &StorageView<'_>,
        bbox: &BoundingBox,
    ) -> Result<(), Error> {
        if view.type_id() != field.type_id {
            return Err(Error::TypeMismatch {
                field: field_name.to_owned(),
                expected: field.type_id,
                found: view.type_id(),
            });
        }
        if !bbox.fits_within(&field.dims) {
            return Err(Error::DimensionMismatch {
                field: field_name.to_owned(),
                expected: field.dims.clone(),
                found: bbox.extent.clone(),
            });
        }
        if view.dims() != bbox.extent.as_slice() {
            return Err(Error::DimensionMismatch {
                field: field_name.to_owned(),
                expected: bbox.extent.clone(),
                found: view.dims().to_vec(),
            });
        }
        Ok(())
    }

    fn require_open(&self) -> Result<(), Error> {
        match self.state {
            State::Open => Ok(()),
            State::Closed => Err(Error::SerializerClosed),
        }
    }
}

impl Drop for Serializer {
    /// Best-effort final flush for `Write`/`Append` serializers. Errors are
    /// logged, not propagated — there is no caller left to hand them to.
    fn drop(&mut self) {
        if self.state != State::Open || self.mode == OpenMode::Read {
            return;
        }
        if let Err(err) = self.flush() {
            warn!("final updateMetaData on drop failed for {}: {err}", self.directory.display());
        }
    }
}

