// SPDX-License-Identifier: BSD-3-Clause

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Closed enumeration of element scalar types.
///
/// Every field and every meta-info value carries a `TypeId`. The wire tag
/// used in the JSON catalog is the lowercase variant name.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Serialize, Deserialize)]
#[display(lowercase)]
#[serde(rename_all = "lowercase")]
pub enum TypeId {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
}

impl TypeId {
    /// Byte width of one element, for scalar types only (`String` elements
    /// are variable-length and are not addressed by this method).
    pub fn pod_size(self) -> Option<usize> {
        match self {
            TypeId::Boolean => Some(1),
            TypeId::Int32 | TypeId::Float32 => Some(4),
            TypeId::Int64 | TypeId::Float64 => Some(8),
            TypeId::String => None,
        }
    }
}

/// Discriminator for a [`MetaInfoValue`]: a `TypeId` plus whether the value
/// is a homogeneous array of that scalar type.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ValueTag {
    pub type_id: TypeId,
    pub is_array: bool,
}

impl std::fmt::Display for ValueTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_id)?;
        if self.is_array {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

/// A tagged value: scalar or homogeneous array, tagged with a [`TypeId`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type_id", content = "value", rename_all = "lowercase")]
pub enum MetaInfoValue {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    #[serde(rename = "boolean[]")]
    BooleanArray(Vec<bool>),
    #[serde(rename = "int32[]")]
    Int32Array(Vec<i32>),
    #[serde(rename = "int64[]")]
    Int64Array(Vec<i64>),
    #[serde(rename = "float32[]")]
    Float32Array(Vec<f32>),
    #[serde(rename = "float64[]")]
    Float64Array(Vec<f64>),
    #[serde(rename = "string[]")]
    StringArray(Vec<String>),
}

impl MetaInfoValue {
    pub fn tag(&self) -> ValueTag {
        use MetaInfoValue::*;
        let (type_id, is_array) = match self {
            Boolean(_) => (TypeId::Boolean, false),
            Int32(_) => (TypeId::Int32, false),
            Int64(_) => (TypeId::Int64, false),
            Float32(_) => (TypeId::Float32, false),
            Float64(_) => (TypeId::Float64, false),
            String(_) => (TypeId::String, false),
            BooleanArray(_) => (TypeId::Boolean, true),
            Int32Array(_) => (TypeId::Int32, true),
            Int64Array(_) => (TypeId::Int64, true),
            Float32Array(_) => (TypeId::Float32, true),
            Float64Array(_) => (TypeId::Float64, true),
            StringArray(_) => (TypeId::String, true),
        };
        ValueTag { type_id, is_array }
    }
}

impl PartialEq for MetaInfoValue {
    fn eq(&self, other: &Self) -> bool {
        use MetaInfoValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Float32(a), Float32(b)) => a == b,
            (Float64(a), Float64(b)) => a == b,
            (String(a), String(b)) => a == b,
            (BooleanArray(a), BooleanArray(b)) => a == b,
            (Int32Array(a), Int32Array(b)) => a == b,
            (Int64Array(a), Int64Array(b)) => a == b,
            (Float32Array(a), Float32Array(b)) => a == b,
            (Float64Array(a), Float64Array(b)) => a == b,
            (StringArray(a), StringArray(b)) => a == b,
            _ => false,
        }
    }
}

impl std::hash::Hash for MetaInfoValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use MetaInfoValue::*;
        self.tag().hash(state);
        match self {
            Boolean(v) => v.hash(state),
            Int32(v) => v.hash(state),
            Int64(v) => v.hash(state),
            Float32(v) => v.to_bits().hash(state),
            Float64(v) => v.to_bits().hash(state),
            String(v) => v.hash(state),
            BooleanArray(v) => v.hash(state),
            Int32Array(v) => v.hash(state),
            Int64Array(v) => v.hash(state),
            Float32Array(v) => v.iter().for_each(|f| f.to_bits().hash(state)),
            Float64Array(v) => v.iter().for_each(|f| f.to_bits().hash(state)),
            StringArray(v) => v.hash(state),
        }
    }
}

/// Typed extraction out of a [`MetaInfoValue`]. Widening between
/// `Int32`/`Int64` and between `Float32`/`Float64` always succeeds;
/// narrowing succeeds only when no information is lost. Booleans, strings
/// and arrays never convert across `TypeId` families.
pub trait FromMetaInfoValue: Sized {
    fn from_meta_value(value: &MetaInfoValue, key: &str) -> Result<Self, Error>;
}

macro_rules! direct_impl {
    ($ty:ty, $variant:ident) => {
        impl FromMetaInfoValue for $ty {
            fn from_meta_value(value: &MetaInfoValue, key: &str) -> Result<Self, Error> {
                match value {
                    MetaInfoValue::$variant(v) => Ok(v.clone()),
                    _ => Err(Error::MetaInfoTypeMismatch(key.to_owned())),
                }
            }
        }
    };
}

direct_impl!(bool, Boolean);
direct_impl!(String, String);
direct_impl!(Vec<bool>, BooleanArray);
direct_impl!(Vec<String>, StringArray);

impl FromMetaInfoValue for i32 {
    fn from_meta_value(value: &MetaInfoValue, key: &str) -> Result<Self, Error> {
        match value {
            MetaInfoValue::Int32(v) => Ok(*v),
            MetaInfoValue::Int64(v) => {
                i32::try_from(*v).map_err(|_| Error::MetaInfoTypeMismatch(key.to_owned()))
            }
            _ => Err(Error::MetaInfoTypeMismatch(key.to_owned())),
        }
    }
}

impl FromMetaInfoValue for i64 {
    fn from_meta_value(value: &MetaInfoValue, key: &str) -> Result<Self, Error> {
        match value {
            MetaInfoValue::Int64(v) => Ok(*v),
            MetaInfoValue::Int32(v) => Ok(i64::from(*v)),
            _ => Err(Error::MetaInfoTypeMismatch(key.to_owned())),
        }
    }
}

impl FromMetaInfoValue for f32 {
    fn from_meta_value(value: &MetaInfoValue, key: &str) -> Result<Self, Error> {
        match value {
            MetaInfoValue::Float32(v) => Ok(*v),
            MetaInfoValue::Float64(v) => {
                let narrowed = *v as f32;
                if f64::from(narrowed) == *v {
                    Ok(narrowed)
                } else {
                    Err(Error::MetaInfoTypeMismatch(key.to_owned()))
                }
            }
            _ => Err(Error::MetaInfoTypeMismatch(key.to_owned())),
        }
    }
}

impl FromMetaInfoValue for f64 {
    fn from_meta_value(value: &MetaInfoValue, key: &str) -> Result<Self, Error> {
        match value {
            MetaInfoValue::Float64(v) => Ok(*v),
            MetaInfoValue::Float32(v) => Ok(f64::from(*v)),
            _ => Err(Error::MetaInfoTypeMismatch(key.to_owned())),
        }
    }
}

impl FromMetaInfoValue for Vec<i32> {
    fn from_meta_value(value: &MetaInfoValue, key: &str) -> Result<Self, Error> {
        match value {
            MetaInfoValue::Int32Array(v) => Ok(v.clone()),
            MetaInfoValue::Int64Array(v) => v
                .iter()
                .map(|&x| i32::try_from(x).map_err(|_| Error::MetaInfoTypeMismatch(key.to_owned())))
                .collect(),
            _ => Err(Error::MetaInfoTypeMismatch(key.to_owned())),
        }
    }
}

impl FromMetaInfoValue for Vec<i64> {
    fn from_meta_value(value: &MetaInfoValue, key: &str) -> Result<Self, Error> {
        match value {
            MetaInfoValue::Int64Array(v) => Ok(v.clone()),
            MetaInfoValue::Int32Array(v) => Ok(v.iter().map(|&x| i64::from(x)).collect()),
            _ => Err(Error::MetaInfoTypeMismatch(key.to_owned())),
        }
    }
}

impl FromMetaInfoValue for Vec<f32> {
    fn from_meta_value(value: &MetaInfoValue, key: &str) -> Result<Self, Error> {
        match value {
            MetaInfoValue::Float32Array(v) => Ok(v.clone()),
            MetaInfoValue::Float64Array(v) => v
                .iter()
                .map(|&x| {
                    let narrowed = x as f32;
                    if f64::from(narrowed) == x {
                        Ok(narrowed)
                    } else {
                        Err(Error::MetaInfoTypeMismatch(key.to_owned()))
                    }
                })
                .collect(),
            _ => Err(Error::MetaInfoTypeMismatch(key.to_owned())),
        }
    }
}

impl FromMetaInfoValue for Vec<f64> {
    fn from_meta_value(value: &MetaInfoValue, key: &str) -> Result<Self, Error> {
        match value {
            MetaInfoValue::Float64Array(v) => Ok(v.clone()),
            MetaInfoValue::Float32Array(v) => Ok(v.iter().map(|&x| f64::from(x)).collect()),
            _ => Err(Error::MetaInfoTypeMismatch(key.to_owned())),
        }
    }
}
