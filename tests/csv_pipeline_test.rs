//! File-based pipeline: metrology CSV + transform JSON + spot CSV in, labelled
//! spot CSV out, plus rkyv snapshots of the prepared context.


use std::fmt::Write as _;
use std::path::PathBuf;

use fidmatch::{
    load_transform, read_spots_csv, write_spots_csv, FindFiducialsConfig, MetrologyContext,
    PlateTransform,
};
use test_data::{synthetic_focal_plane, FocalPlaneConfig};

/// Fresh scratch directory for one test.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("fidmatch-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("Failed to create scratch directory");
    dir
}

/// Write the synthetic plate's metrology, transform and spots to `dir`.
fn write_inputs(dir: &std::path::Path) -> Vec<(u32, u32)> {
    let plane = synthetic_focal_plane(&FocalPlaneConfig::default());

    let mut metrology = String::from("PETAL_LOC,LOCATION,PINHOLE_ID,X_FP,Y_FP,Z_FP\n");
    for p in &plane.pinholes {
        writeln!(metrology, "0,{},{},{},{},-1.5", p.location, p.pinhole_id, p.x_fp, p.y_fp).unwrap();
    }
    std::fs::write(dir.join("fp-metrology.csv"), metrology).unwrap();

    let transform = PlateTransform::Affine(plane.transform.clone());
    std::fs::write(dir.join("plate2camera.json"), transform.to_json().unwrap()).unwrap();

    let mut spots = String::from("FLUX,XPIX,YPIX\n");
    for (i, s) in plane.spots.spots.iter().enumerate() {
        writeln!(spots, "{},{},{}", 1000 + i, s.x, s.y).unwrap();
    }
    std::fs::write(dir.join("spots.csv"), spots).unwrap();

    plane.truth
}

#[test]
fn test_csv_roundtrip_pipeline() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let dir = scratch_dir("pipeline");
    let truth = write_inputs(&dir);

    let transform = load_transform(dir.join("plate2camera.json")).unwrap();
    let ctx = MetrologyContext::from_csv(dir.join("fp-metrology.csv"), &transform).unwrap();
    let mut spots = read_spots_csv(dir.join("spots.csv")).unwrap();
    assert_eq!(spots.extra_columns, vec!["FLUX".to_string()]);

    let result = ctx.find_fiducials(&mut spots, &FindFiducialsConfig::default());
    assert!(result.num_identified > 0);

    let out = dir.join("spots-labelled.csv");
    write_spots_csv(&out, &spots).unwrap();
    let labelled = read_spots_csv(&out).unwrap();

    assert_eq!(labelled.len(), truth.len());
    for (i, (spot, want)) in labelled.spots.iter().zip(&truth).enumerate() {
        assert_eq!((spot.location, spot.pinhole_id), *want, "spot {i}");
        assert_eq!(spot.extra, vec![(1000 + i).to_string()], "FLUX passthrough for spot {i}");
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_context_snapshot() {
    let dir = scratch_dir("snapshot");
    write_inputs(&dir);

    let transform = load_transform(dir.join("plate2camera.json")).unwrap();
    let ctx = MetrologyContext::from_csv(dir.join("fp-metrology.csv"), &transform).unwrap();
    let snapshot = dir.join("metrology.rkyv");
    ctx.save_to_file(&snapshot).unwrap();
    let loaded = MetrologyContext::load_from_file(&snapshot).unwrap();

    assert_eq!(loaded.pinholes, ctx.pinholes);
    assert_eq!(loaded.centers, ctx.centers);

    let config = FindFiducialsConfig::default();
    let mut a = read_spots_csv(dir.join("spots.csv")).unwrap();
    let mut b = a.clone();
    ctx.find_fiducials(&mut a, &config);
    loaded.find_fiducials(&mut b, &config);
    assert_eq!(a.spots, b.spots);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_inputs_are_reported() {
    let dir = scratch_dir("missing");

    let err = MetrologyContext::from_csv(dir.join("fp-metrology.csv"), &PlateTransform::Identity)
        .unwrap_err();
    assert!(err.to_string().contains("cannot find metrology file"), "got: {err:#}");

    std::fs::write(dir.join("spots.csv"), "XPIX,FLUX\n1.0,2.0\n").unwrap();
    let err = read_spots_csv(dir.join("spots.csv")).unwrap_err();
    assert!(format!("{err:#}").contains("YPIX"), "got: {err:#}");

    assert!(load_transform(dir.join("nope.json")).is_err());

    let _ = std::fs::remove_dir_all(&dir);
}
