// SPDX-License-Identifier: BSD-3-Clause

use std::marker::PhantomData;

use crate::type_id::TypeId;

/// Non-owning description of a strided numerical (or string) array in
/// caller memory.
///
/// Strides are measured in elements, may be negative, and may be zero
/// (broadcast — the iterator below still visits every logical index exactly
/// once). `StorageView` never owns the underlying buffer: it borrows it for
/// the duration of one `write`/`read` call; ownership of the underlying
/// buffer remains with the caller.
///
/// Constructors take an explicit `origin`: the element of the backing slice
/// that logical index zero maps to. Every reachable offset from `origin` is
/// checked against the slice bounds at construction time, so a negative
/// stride addresses elements before `origin` without requiring the caller to
/// hand-carve a sub-slice (which cannot express "read backwards from here"
/// without itself going out of bounds).
pub struct StorageView<'a> {
    data: ViewData,
    dims: Vec<usize>,
    strides: Vec<isize>,
    _marker: PhantomData<&'a mut ()>,
}

enum ViewData {
    Boolean(*mut bool),
    Int32(*mut i32),
    Int64(*mut i64),
    Float32(*mut f32),
    Float64(*mut f64),
    String(*mut String),
}

/// One contiguous run of logical indices, in element units, suitable for a
/// single I/O call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Run {
    pub start: isize,
    pub len: usize,
}

/// A sub-bounding box of a field, for the advanced sliced read/write surface
/// (§4.8): `start` is the per-dimension offset into the full field, `extent`
/// the per-dimension size of the slice. An `Archive` that does not implement
/// slicing rejects it with `Error::ArchiveSliceNotSupported`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub start: Vec<usize>,
    pub extent: Vec<usize>,
}

impl BoundingBox {
    pub fn new(start: Vec<usize>, extent: Vec<usize>) -> Option<Self> {
        if start.len() != extent.len() {
            return None;
        }
        Some(Self { start, extent })
    }

    /// `true` iff this box fits within `field_dims`: same rank, and every
    /// `start[i] + extent[i] <= field_dims[i]`.
    pub fn fits_within(&self, field_dims: &[usize]) -> bool {
        self.start.len() == field_dims.len()
            && self
                .start
                .iter()
                .zip(self.extent.iter())
                .zip(field_dims.iter())
                .all(|((&s, &e), &d)| s.checked_add(e).is_some_and(|end| end <= d))
    }
}

/// Minimum and maximum element offsets (relative to `origin`) reachable by
/// some choice of logical index under `dims`/`strides`, or `None` on
/// overflow. Zero-sized dimensions touch no memory and are skipped.
fn offset_extent(dims: &[usize], strides: &[isize]) -> Option<(isize, isize)> {
    let mut min = 0isize;
    let mut max = 0isize;
    for (&dim, &stride) in dims.iter().zip(strides.iter()) {
        if dim == 0 {
            continue;
        }
        let reach = (dim as isize - 1).checked_mul(stride)?;
        let (lo, hi) = if reach < 0 { (reach, 0) } else { (0, reach) };
        min = min.checked_add(lo)?;
        max = max.checked_add(hi)?;
    }
    Some((min, max))
}

macro_rules! ctor {
    ($fn_name:ident, $variant:ident, $ty:ty, $type_id:expr) => {
        /// Builds a view over `buf`, with logical index zero located at
        /// element `origin` of `buf`. Returns `None` if `dims`/`strides`
        /// disagree in rank, `dims` is empty, or any logical index would
        /// address an element outside `buf` — so a negative stride can walk
        /// backwards from `origin` without ever reaching past the start or
        /// end of the caller's allocation.
        pub fn $fn_name(
            buf: &'a mut [$ty],
            origin: usize,
            dims: Vec<usize>,
            strides: Vec<isize>,
        ) -> Option<Self> {
            if dims.len() != strides.len() || dims.is_empty() || origin > buf.len() {
                return None;
            }
            let element_count: usize = dims.iter().product();
            if element_count > 0 {
                let (min_offset, max_offset) = offset_extent(&dims, &strides)?;
                let origin = isize::try_from(origin).ok()?;
                let lowest = origin.checked_add(min_offset)?;
                let highest = origin.checked_add(max_offset)?;
                if lowest < 0 || highest >= buf.len() as isize {
                    return None;
                }
            }
            // Safety: `origin <= buf.len()` is checked above, and when
            // `element_count > 0` every reachable offset from `origin` was
            // just verified to land within `0..buf.len()`.
            let ptr = unsafe { buf.as_mut_ptr().add(origin) };
            Some(Self {
                data: ViewData::$variant(ptr),
                dims,
                strides,
                _marker: PhantomData,
            })
        }
    };
}

impl<'a> StorageView<'a> {
    ctor!(from_bool_slice, Boolean, bool, TypeId::Boolean);
    ctor!(from_i32_slice, Int32, i32, TypeId::Int32);
    ctor!(from_i64_slice, Int64, i64, TypeId::Int64);
    ctor!(from_f32_slice, Float32, f32, TypeId::Float32);
    ctor!(from_f64_slice, Float64, f64, TypeId::Float64);
    ctor!(from_string_slice, String, String, TypeId::String);

    pub fn type_id(&self) -> TypeId {
        match self.data {
            ViewData::Boolean(_) => TypeId::Boolean,
            ViewData::Int32(_) => TypeId::Int32,
            ViewData::Int64(_) => TypeId::Int64,
            ViewData::Float32(_) => TypeId::Float32,
            ViewData::Float64(_) => TypeId::Float64,
            ViewData::String(_) => TypeId::String,
        }
    }

    pub fn dims(&self) -> &[usize] { &self.dims }

    pub fn strides(&self) -> &[isize] { &self.strides }

    /// Total number of logical elements described by `dims`.
    pub fn element_count(&self) -> usize { self.dims.iter().product() }

    /// Element offset (in elements, from `origin`) of logical index `idx`.
    fn offset(&self, idx: &[usize]) -> isize {
        idx.iter()
            .zip(self.strides.iter())
            .map(|(&i, &s)| (i as isize).checked_mul(s).expect("storage view offset overflow"))
            .fold(0isize, |acc, x| acc.checked_add(x).expect("storage view offset overflow"))
    }

    /// `true` when this view's strides match the canonical row-major layout
    /// for `dims` (outermost dimension slowest) — the fast path for
    /// [`StorageView::runs`] and the exact condition
    /// [`StorageView::is_mem_copyable`] checks between two views of
    /// identical `dims`.
    pub fn is_row_major_contiguous(&self) -> bool {
        let mut expected = 1isize;
        for (&dim, &stride) in self.dims.iter().zip(self.strides.iter()).rev() {
            if stride != expected {
                return false;
            }
            expected *= dim as isize;
        }
        true
    }

    /// Two views may be bulk-copied with a single memcpy when they share
    /// `TypeId` and `dims` and are both contiguous in the same (row-major)
    /// layout.
    pub fn is_mem_copyable(&self, other: &StorageView<'_>) -> bool {
        self.type_id() == other.type_id()
            && self.dims == other.dims
            && self.is_row_major_contiguous()
            && other.is_row_major_contiguous()
    }

    /// Logical indices in lexicographic order (outermost varies slowest).
    pub fn logical_indices(&self) -> LogicalIndices<'_> {
        LogicalIndices { dims: &self.dims, next: Some(vec![0; self.dims.len()]) }
    }

    /// Contiguous byte-run visitor, coalescing
    /// trailing unit-stride dimensions where possible. Falls back to
    /// per-last-dimension runs when only the innermost dimension is unit
    /// stride, and to one-element runs otherwise — always in the same
    /// lexicographic logical order as [`StorageView::logical_indices`].
    pub fn runs(&self) -> RunIter<'_> {
        if self.is_row_major_contiguous() {
            return RunIter::Single(Some(Run { start: 0, len: self.element_count() }));
        }
        let last = self.dims.len() - 1;
        if self.strides[last] == 1 {
            RunIter::PerOuterIndex {
                view: self,
                outer: LogicalIndices {
                    dims: &self.dims[..last],
                    next: Some(vec![0; last]),
                },
                run_len: self.dims[last],
            }
        } else {
            RunIter::PerElement { inner: self.logical_indices(), view: self }
        }
    }

    /// # Safety
    /// Only valid for POD (`Boolean`/`Int32`/`Int64`/`Float32`/`Float64`)
    /// views; callers must ensure `start..start+len` lies within the
    /// caller-owned buffer (guaranteed by construction from `dims`).
    pub unsafe fn pod_bytes_at(&self, start: isize, len: usize) -> &[u8] {
        let elem_size = self.type_id().pod_size().expect("pod_bytes_at on non-POD view");
        let base = self.pod_base_ptr();
        let ptr = base.offset(start * elem_size as isize);
        std::slice::from_raw_parts(ptr, len * elem_size)
    }

    /// # Safety
    /// Same contract as [`StorageView::pod_bytes_at`], for the destination
    /// side of a read.
    pub unsafe fn pod_bytes_at_mut(&mut self, start: isize, len: usize) -> &mut [u8] {
        let elem_size = self.type_id().pod_size().expect("pod_bytes_at_mut on non-POD view");
        let base = self.pod_base_ptr();
        let ptr = base.offset(start * elem_size as isize);
        std::slice::from_raw_parts_mut(ptr, len * elem_size)
    }

    fn pod_base_ptr(&self) -> *mut u8 {
        match self.data {
            ViewData::Boolean(p) => p as *mut u8,
            ViewData::Int32(p) => p as *mut u8,
            ViewData::Int64(p) => p as *mut u8,
            ViewData::Float32(p) => p as *mut u8,
            ViewData::Float64(p) => p as *mut u8,
            ViewData::String(_) => panic!("pod_base_ptr on a String view"),
        }
    }

    /// Reads the string at logical offset `elem_offset` (elements, as
    /// returned by [`StorageView::offset`] via [`StorageView::logical_indices`]).
    pub fn str_at(&self, elem_offset: isize) -> &str {
        match self.data {
            ViewData::String(p) => unsafe { &*p.offset(elem_offset) },
            _ => panic!("str_at on a non-String view"),
        }
    }

    pub fn set_str_at(&mut self, elem_offset: isize, value: &str) {
        match self.data {
            ViewData::String(p) => unsafe { *p.offset(elem_offset) = value.to_owned() },
            _ => panic!("set_str_at on a non-String view"),
        }
    }

    pub fn offset_of(&self, idx: &[usize]) -> isize { self.offset(idx) }
}

pub struct LogicalIndices<'a> {
    dims: &'a [usize],
    next: Option<Vec<usize>>,
}

impl<'a> Iterator for LogicalIndices<'a> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        if self.dims.iter().any(|&d| d == 0) {
            self.next = None;
            return Some(current);
        }
        let mut candidate = current.clone();
        let mut i = candidate.len();
        loop {
            if i == 0 {
                self.next = None;
                break;
            }
            i -= 1;
            candidate[i] += 1;
            if candidate[i] < self.dims[i] {
                self.next = Some(candidate);
                break;
            }
            candidate[i] = 0;
        }
        Some(current)
    }
}

pub enum RunIter<'a> {
    Single(Option<Run>),
    PerOuterIndex { view: &'a StorageView<'a>, outer: LogicalIndices<'a>, run_len: usize },
    PerElement { inner: LogicalIndices<'a>, view: &'a StorageView<'a> },
}

impl<'a> Iterator for RunIter<'a> {
    type Item = Run;

    fn next(&mut self) -> Option<Run> {
        match self {
            RunIter::Single(run) => run.take(),
            RunIter::PerOuterIndex { view, outer, run_len } => {
                let mut idx = outer.next()?;
                idx.push(0);
                Some(Run { start: view.offset(&idx), len: *run_len })
            }
            RunIter::PerElement { inner, view } => {
                let idx = inner.next()?;
                Some(Run { start: view.offset(&idx), len: 1 })
            }
        }
    }
}
