// SPDX-License-Identifier: BSD-3-Clause

//! Content-addressed checkpoint archive for multi-dimensional scientific
//! data fields.
//!
//! A [`Serializer`] captures named, typed, strided fields at named
//! [`Savepoint`]s and persists them through a pluggable [`Archive`] backend,
//! alongside a JSON catalog describing the schema well enough that a later
//! process can reopen the same directory and read back bit-identical data.
//!
//! Concrete archive backends live in separate crates (e.g.
//! `serialbox-binary`) and register themselves with [`archive::register`]
//! before a [`Serializer`] resolves them by name.

#[macro_use]
extern crate amplify;

pub mod archive;
pub mod catalog;
mod error;
mod field;
mod meta;
mod savepoint;
mod savepoint_vector;
mod serializer;
mod type_id;
mod view;

pub use archive::{Archive, ArchiveFactory, OpenMode};
pub use error::{Error, Result};
pub use field::{FieldMap, FieldMetaInfo};
pub use meta::MetaInfoMap;
pub use savepoint::Savepoint;
pub use savepoint_vector::{FieldId, SavepointVector};
pub use serializer::{
    disable_serialization, enable_serialization, is_serialization_enabled, FatalErrorHandler,
    NoopFatalErrorHandler, Serializer,
};
pub use type_id::{FromMetaInfoValue, MetaInfoValue, TypeId, ValueTag};
pub use view::{BoundingBox, LogicalIndices, Run, RunIter, StorageView};
