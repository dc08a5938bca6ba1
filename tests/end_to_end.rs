// SPDX-License-Identifier: BSD-3-Clause

use serialbox_core::{
    enable_serialization, disable_serialization, BoundingBox, Error, FieldMetaInfo, MetaInfoMap,
    MetaInfoValue, OpenMode, Savepoint, Serializer, StorageView, TypeId,
};

fn open(mode: OpenMode, dir: &std::path::Path) -> Serializer {
    serialbox_binary::install();
    Serializer::new(mode, dir, "test", "Binary").unwrap()
}

fn savepoint(name: &str, step: i32) -> Savepoint {
    let mut meta = MetaInfoMap::new();
    meta.insert("step", MetaInfoValue::Int32(step)).unwrap();
    Savepoint::new(name, meta).unwrap()
}

// S1 - simple scalar round-trip.
#[test]
fn s1_simple_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = open(OpenMode::Write, dir.path());
    ser.register_field("T", FieldMetaInfo::new(TypeId::Float64, vec![3, 2]).unwrap()).unwrap();
    let sp = savepoint("s1", 0);

    let mut buf = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
    let view = StorageView::from_f64_slice(&mut buf, 0, vec![3, 2], vec![2, 1]).unwrap();
    ser.write("T", &sp, &view).unwrap();

    let mut out = [0.0f64; 6];
    let mut out_view = StorageView::from_f64_slice(&mut out, 0, vec![3, 2], vec![2, 1]).unwrap();
    ser.read("T", &sp, &mut out_view).unwrap();
    assert_eq!(out, buf);
}

// S2 - stride permutation: writing via column-major strides must be
// readable back, byte-for-byte, as the row-major canonical layout.
#[test]
fn s2_stride_permutation_matches_row_major() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = open(OpenMode::Write, dir.path());
    ser.register_field("T", FieldMetaInfo::new(TypeId::Float64, vec![3, 2]).unwrap()).unwrap();
    let sp = savepoint("s1", 0);

    // logical [[1,2],[3,4],[5,6]] laid out column-major: col0=[1,3,5], col1=[2,4,6]
    let mut col_major = [1.0f64, 3.0, 5.0, 2.0, 4.0, 6.0];
    let view = StorageView::from_f64_slice(&mut col_major, 0, vec![3, 2], vec![1, 3]).unwrap();
    ser.write("T", &sp, &view).unwrap();

    let mut out = [0.0f64; 6];
    let mut out_view = StorageView::from_f64_slice(&mut out, 0, vec![3, 2], vec![2, 1]).unwrap();
    ser.read("T", &sp, &mut out_view).unwrap();
    assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

// S3 - savepoint disambiguation.
#[test]
fn s3_savepoint_disambiguation() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = open(OpenMode::Write, dir.path());
    ser.register_field("U", FieldMetaInfo::new(TypeId::Int32, vec![4]).unwrap()).unwrap();
    let it0 = savepoint("it", 0);
    let it1 = savepoint("it", 1);

    let mut a = [10i32, 20, 30, 40];
    let view_a = StorageView::from_i32_slice(&mut a, 0, vec![4], vec![1]).unwrap();
    ser.write("U", &it0, &view_a).unwrap();

    let mut b = [11i32, 21, 31, 41];
    let view_b = StorageView::from_i32_slice(&mut b, 0, vec![4], vec![1]).unwrap();
    ser.write("U", &it1, &view_b).unwrap();

    let mut out0 = [0i32; 4];
    let mut out0_view = StorageView::from_i32_slice(&mut out0, 0, vec![4], vec![1]).unwrap();
    ser.read("U", &it0, &mut out0_view).unwrap();
    assert_eq!(out0, [10, 20, 30, 40]);

    let mut out1 = [0i32; 4];
    let mut out1_view = StorageView::from_i32_slice(&mut out1, 0, vec![4], vec![1]).unwrap();
    ser.read("U", &it1, &mut out1_view).unwrap();
    assert_eq!(out1, [11, 21, 31, 41]);
}

// S4 - reopen fidelity.
#[test]
fn s4_reopen_preserves_savepoints_and_data() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut ser = open(OpenMode::Write, dir.path());
        ser.register_field("U", FieldMetaInfo::new(TypeId::Int32, vec![4]).unwrap()).unwrap();
        let it0 = savepoint("it", 0);
        let it1 = savepoint("it", 1);
        let mut a = [10i32, 20, 30, 40];
        let view_a = StorageView::from_i32_slice(&mut a, 0, vec![4], vec![1]).unwrap();
        ser.write("U", &it0, &view_a).unwrap();
        let mut b = [11i32, 21, 31, 41];
        let view_b = StorageView::from_i32_slice(&mut b, 0, vec![4], vec![1]).unwrap();
        ser.write("U", &it1, &view_b).unwrap();
    }

    let reopened = open(OpenMode::Read, dir.path());
    let names: Vec<&str> = reopened.savepoints().map(|sp| sp.name.as_str()).collect();
    assert_eq!(names, vec!["it", "it"]);
    assert_eq!(reopened.num_savepoints(), 2);

    let it0 = savepoint("it", 0);
    let mut out = [0i32; 4];
    let mut out_view = StorageView::from_i32_slice(&mut out, 0, vec![4], vec![1]).unwrap();
    reopened.read("U", &it0, &mut out_view).unwrap();
    assert_eq!(out, [10, 20, 30, 40]);
}

// S5 - duplicate cell rejected, prior value still readable.
#[test]
fn s5_duplicate_cell_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = open(OpenMode::Write, dir.path());
    ser.register_field("T", FieldMetaInfo::new(TypeId::Float64, vec![3, 2]).unwrap()).unwrap();
    let sp = savepoint("s1", 0);

    let mut buf = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
    let view = StorageView::from_f64_slice(&mut buf, 0, vec![3, 2], vec![2, 1]).unwrap();
    ser.write("T", &sp, &view).unwrap();

    let mut again = [9.0f64; 6];
    let view_again = StorageView::from_f64_slice(&mut again, 0, vec![3, 2], vec![2, 1]).unwrap();
    assert!(matches!(
        ser.write("T", &sp, &view_again),
        Err(Error::FieldAlreadyExistsAtSavepoint { .. })
    ));

    let mut out = [0.0f64; 6];
    let mut out_view = StorageView::from_f64_slice(&mut out, 0, vec![3, 2], vec![2, 1]).unwrap();
    ser.read("T", &sp, &mut out_view).unwrap();
    assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

// S6 - mismatched dims leaves catalog state untouched.
#[test]
fn s6_mismatched_dims_rejected_without_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = open(OpenMode::Write, dir.path());
    ser.register_field("T", FieldMetaInfo::new(TypeId::Float64, vec![3, 2]).unwrap()).unwrap();
    let sp = savepoint("s1", 0);

    let mut buf = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
    let view = StorageView::from_f64_slice(&mut buf, 0, vec![3, 2], vec![2, 1]).unwrap();
    ser.write("T", &sp, &view).unwrap();

    let mut wrong = [0.0f64; 6];
    let wrong_view = StorageView::from_f64_slice(&mut wrong, 0, vec![2, 3], vec![3, 1]).unwrap();
    assert!(matches!(
        ser.write("T", &sp, &wrong_view),
        Err(Error::DimensionMismatch { .. })
    ));
    assert_eq!(ser.num_savepoints(), 1);
}

#[test]
fn serialization_disabled_write_is_noop_but_read_unaffected() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = open(OpenMode::Write, dir.path());
    ser.register_field("T", FieldMetaInfo::new(TypeId::Float64, vec![2]).unwrap()).unwrap();
    let sp = savepoint("s1", 0);

    let mut buf = [1.0f64, 2.0];
    let view = StorageView::from_f64_slice(&mut buf, 0, vec![2], vec![1]).unwrap();
    ser.write("T", &sp, &view).unwrap();

    disable_serialization();
    let mut other = [9.0f64, 9.0];
    let other_sp = savepoint("s2", 0);
    let other_view = StorageView::from_f64_slice(&mut other, 0, vec![2], vec![1]).unwrap();
    ser.write("T", &other_sp, &other_view).unwrap();
    assert_eq!(ser.num_savepoints(), 1, "disabled write must not touch the catalog");
    enable_serialization();

    let mut out = [0.0f64; 2];
    let mut out_view = StorageView::from_f64_slice(&mut out, 0, vec![2], vec![1]).unwrap();
    ser.read("T", &sp, &mut out_view).unwrap();
    assert_eq!(out, [1.0, 2.0]);
}

#[test]
fn sliced_write_rejected_by_archive_without_slicing_support() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = open(OpenMode::Write, dir.path());
    ser.register_field("T", FieldMetaInfo::new(TypeId::Float64, vec![3, 2]).unwrap()).unwrap();
    let sp = savepoint("s1", 0);

    let mut buf = [1.0f64, 2.0];
    let view = StorageView::from_f64_slice(&mut buf, 0, vec![1, 2], vec![2, 1]).unwrap();
    let bbox = BoundingBox::new(vec![0, 0], vec![1, 2]).unwrap();
    assert!(matches!(
        ser.write_sliced("T", &sp, &view, &bbox),
        Err(Error::ArchiveSliceNotSupported)
    ));
    // A rejected sliced write must not leave behind an orphan savepoint.
    assert_eq!(ser.num_savepoints(), 0);
}

#[test]
fn sliced_write_validates_bbox_before_touching_archive() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = open(OpenMode::Write, dir.path());
    ser.register_field("T", FieldMetaInfo::new(TypeId::Float64, vec![3, 2]).unwrap()).unwrap();
    let sp = savepoint("s1", 0);

    let mut buf = [1.0f64, 2.0];
    let view = StorageView::from_f64_slice(&mut buf, 0, vec![1, 2], vec![2, 1]).unwrap();
    // Out-of-bounds bbox: row 3 doesn't exist in a dims=[3,2] field.
    let bbox = BoundingBox::new(vec![3, 0], vec![1, 2]).unwrap();
    assert!(matches!(
        ser.write_sliced("T", &sp, &view, &bbox),
        Err(Error::DimensionMismatch { .. })
    ));
    assert_eq!(ser.num_savepoints(), 0);
}

#[test]
fn high_rank_field_round_trips() {
    // Boundary behavior: N-D fields with N >= 7 must round-trip like any
    // other rank.
    let dir = tempfile::tempdir().unwrap();
    let mut ser = open(OpenMode::Write, dir.path());
    let dims = vec![2, 1, 2, 1, 2, 1, 2];
    ser.register_field("V", FieldMetaInfo::new(TypeId::Int32, dims.clone()).unwrap()).unwrap();
    let sp = savepoint("s1", 0);

    let count: usize = dims.iter().product();
    let mut strides = vec![0isize; dims.len()];
    let mut acc = 1isize;
    for i in (0..dims.len()).rev() {
        strides[i] = acc;
        acc *= dims[i] as isize;
    }
    let mut buf: Vec<i32> = (0..count as i32).collect();
    let view = StorageView::from_i32_slice(&mut buf, 0, dims.clone(), strides.clone()).unwrap();
    ser.write("V", &sp, &view).unwrap();

    let mut out = vec![0i32; count];
    let mut out_view = StorageView::from_i32_slice(&mut out, 0, dims, strides).unwrap();
    ser.read("V", &sp, &mut out_view).unwrap();
    assert_eq!(out, buf);
}

#[test]
fn reopen_fidelity_preserves_field_map_and_global_meta() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut ser = open(OpenMode::Write, dir.path());
        ser.global_meta_info().insert("run_id", MetaInfoValue::String("abc".into())).unwrap();
        ser.register_field("T", FieldMetaInfo::new(TypeId::Float64, vec![3, 2]).unwrap()).unwrap();
        ser.register_field("U", FieldMetaInfo::new(TypeId::Int32, vec![4]).unwrap()).unwrap();
        ser.update_metadata().unwrap();
    }

    let mut reopened = open(OpenMode::Read, dir.path());
    assert_eq!(reopened.global_meta_info().at::<String>("run_id").unwrap(), "abc");
    assert_eq!(reopened.field_metainfo("T").unwrap().type_id, TypeId::Float64);
    assert_eq!(reopened.field_metainfo("T").unwrap().dims, vec![3, 2]);
    assert_eq!(reopened.field_metainfo("U").unwrap().dims, vec![4]);
    assert_eq!(reopened.field_names().count(), 2);
}

#[test]
fn negative_strides_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut ser = open(OpenMode::Write, dir.path());
    ser.register_field("T", FieldMetaInfo::new(TypeId::Int32, vec![4]).unwrap()).unwrap();
    let sp = savepoint("s1", 0);

    // Reversed buffer addressed with origin at the tail element and a
    // negative stride, so logical order is still [10, 20, 30, 40].
    let mut buf = [40i32, 30, 20, 10];
    let view = StorageView::from_i32_slice(&mut buf, 3, vec![4], vec![-1]).unwrap();
    ser.write("T", &sp, &view).unwrap();

    let mut out = [0i32; 4];
    let mut out_view = StorageView::from_i32_slice(&mut out, 0, vec![4], vec![1]).unwrap();
    ser.read("T", &sp, &mut out_view).unwrap();
    assert_eq!(out, [10, 20, 30, 40]);
}
