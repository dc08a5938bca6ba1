// SPDX-License-Identifier: BSD-3-Clause

use amplify::IoError;

use crate::type_id::TypeId;
use crate::FieldId;

/// The single closed error taxonomy for the Serializer core.
///
/// Validation and schema variants are always recoverable: raising one never
/// mutates the catalog. Persistence and archive variants may leave the
/// archive holding orphan bytes; the catalog itself is always rolled back to
/// its last-known-good state before the error is returned.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    // --- Validation ---
    /// field `{0}` is not registered with this serializer
    FieldNotRegistered(String),

    /// field `{0}` is already registered with a different type or dimensions
    FieldAlreadyRegisteredButDifferent(String),

    /// type mismatch for field `{field}`: expected {expected}, found {found}
    TypeMismatch { field: String, expected: TypeId, found: TypeId },

    /// dimension mismatch for field `{field}`: expected {expected:?}, found {found:?}
    DimensionMismatch { field: String, expected: Vec<usize>, found: Vec<usize> },

    /// savepoint `{0}` already exists
    SavepointAlreadyExists(String),

    /// field `{field}` already exists at savepoint `{savepoint}`
    FieldAlreadyExistsAtSavepoint { savepoint: String, field: String },

    /// field `{field}` does not exist at savepoint `{savepoint}`
    FieldNotExistsAtSavepoint { savepoint: String, field: String },

    // --- Schema ---
    /// invalid type id tag `{0}`
    TypeIdInvalid(String),

    /// meta-info key `{0}` holds a value incompatible with the requested type
    MetaInfoTypeMismatch(String),

    /// meta-info key `{0}` not found
    MetaInfoKeyNotFound(String),

    /// meta-info key `{0}` is already bound
    MetaInfoKeyAlreadyExists(String),

    // --- Persistence ---
    /// metadata for prefix `{0}` not found in the given directory
    MetaDataNotFound(String),

    /// metadata is corrupt: {0}
    MetaDataCorrupt(String),

    /// failed to write metadata to disk: {0}
    MetaDataWriteFailed(String),

    /// unknown archive backend `{0}`
    UnknownArchive(String),

    // --- Archive ---
    #[from(std::io::Error)]
    #[display(inner)]
    ArchiveIoError(IoError),

    /// archive has no data for field id `{0}`
    ArchiveFieldNotFound(FieldId),

    /// archive backend does not support sliced access
    ArchiveSliceNotSupported,

    // --- Lifecycle ---
    /// serializer is closed after an unrecoverable metadata error
    SerializerClosed,
}

pub type Result<T> = core::result::Result<T, Error>;
