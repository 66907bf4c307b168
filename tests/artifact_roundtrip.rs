//! Artifact persistence tests.
//!
//! These verify that:
//! - a saved workspace loads back structurally identical
//! - damaged or truncated files are reported as corrupt
//! - a failed save leaves the previous artifact in place

use std::fs;

use kyromodel::{ModelError, ObjectRef, Workspace};
use tempfile::tempdir;

fn punzi_workspace() -> Workspace {
    let mut ws = Workspace::new("w");
    ws.declare("Gaussian::_g1(x[-5,5],_m1[-1,-3,3],res[1,0.1,2])").unwrap();
    ws.declare("Gaussian::_g2(x,_m2[1,-3,3],expr::_resm('1.5*res',{res}))").unwrap();
    ws.declare("Uniform::_p_res(res)").unwrap();
    ws.declare("SUM::_punzi_model(_f[0.3,0,1]*PROD::_cat1(_g1|res,_p_res),PROD::_cat2(_g2|res,_p_res))")
        .unwrap();
    ws.define_set("observables", ["x", "res"]).unwrap();
    ws.save_snapshot("param_point", &["_f", "_m1", "_m2"]).unwrap();
    let data = ws
        .generate_seeded("_punzi_model", ws.set("observables").unwrap(), 500, 99)
        .unwrap()
        .renamed("punzi_example");
    ws.import_dataset(data).unwrap();
    ws
}

#[test]
fn test_roundtrip_is_identical() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("punzi.kmdl");
    let ws = punzi_workspace();
    ws.save(&path).unwrap();

    let loaded = Workspace::load(&path).unwrap();
    assert_eq!(loaded, ws);
    assert_eq!(
        loaded.dataset("punzi_example").unwrap().column("res"),
        ws.dataset("punzi_example").unwrap().column("res")
    );
    assert!(matches!(loaded.object("_cat2"), Some(ObjectRef::Pdf(_))));
    assert_eq!(loaded.snapshot("param_point").unwrap().get("_f"), Some(0.3));
}

#[test]
fn test_loaded_model_keeps_working() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("punzi.kmdl");
    punzi_workspace().save(&path).unwrap();

    let mut loaded = Workspace::load(&path).unwrap();
    loaded.set_value("_m1", 2.0).unwrap();
    loaded.restore_snapshot("param_point").unwrap();
    assert_eq!(loaded.value("_m1").unwrap(), -1.0);

    let fresh = punzi_workspace();
    let a = loaded
        .generate_seeded("_punzi_model", loaded.set("observables").unwrap(), 100, 3)
        .unwrap();
    let b = fresh
        .generate_seeded("_punzi_model", fresh.set("observables").unwrap(), 100, 3)
        .unwrap();
    assert_eq!(a, b);

    loaded.declare("Uniform::extra(y[0,1])").unwrap();
}

#[test]
fn test_saves_are_deterministic_in_content() {
    let dir = tempdir().unwrap();
    let ws = punzi_workspace();
    ws.save(dir.path().join("a.kmdl")).unwrap();
    ws.save(dir.path().join("b.kmdl")).unwrap();
    assert_eq!(
        fs::read(dir.path().join("a.kmdl")).unwrap(),
        fs::read(dir.path().join("b.kmdl")).unwrap()
    );
}

#[test]
fn test_flipped_byte_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("punzi.kmdl");
    punzi_workspace().save(&path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x5A;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        Workspace::load(&path),
        Err(ModelError::CorruptArtifact { .. })
    ));
}

#[test]
fn test_truncated_file_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("punzi.kmdl");
    punzi_workspace().save(&path).unwrap();

    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    let size = file.metadata().unwrap().len();
    file.set_len(size * 4 / 5).unwrap();
    drop(file);

    assert!(matches!(
        Workspace::load(&path),
        Err(ModelError::CorruptArtifact { .. })
    ));
}

#[test]
fn test_foreign_file_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "KMDL is not just four letters").unwrap();
    let err = Workspace::load(&path).unwrap_err();
    assert!(matches!(err, ModelError::CorruptArtifact { .. }));
    assert!(err.is_persistence());
}

#[test]
fn test_missing_file_is_io() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        Workspace::load(dir.path().join("missing.kmdl")),
        Err(ModelError::Io { .. })
    ));
}

#[test]
fn test_unwritable_destination_keeps_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("no_such_dir").join("punzi.kmdl");
    let err = punzi_workspace().save(&path).unwrap_err();
    assert!(matches!(err, ModelError::Io { .. }));
    assert!(!path.exists());
}

#[test]
fn test_overwrite_replaces_previous_artifact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("punzi.kmdl");
    punzi_workspace().save(&path).unwrap();

    let mut ws = Workspace::load(&path).unwrap();
    ws.declare("Uniform::extra(y[0,1])").unwrap();
    ws.save(&path).unwrap();

    let reloaded = Workspace::load(&path).unwrap();
    assert!(reloaded.object("extra").is_some());
    let leftovers = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1, "temp files must not survive a save");
}
