#[path = "../src/backup.rs"]
mod backup;
mod test_support;

use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use test_support::{spawn_sidecar, str_field, temp_dir};
use zip::write::FileOptions;
use zip::ZipWriter;

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("marksd-backup-src");
    let workspace2 = temp_dir("marksd-backup-dst");
    let out_dir = temp_dir("marksd-backup-out");

    let bytes = b"sqlite-test-payload";
    std::fs::write(workspace.join("marks.sqlite3"), bytes).expect("write source db");

    let bundle_path = out_dir.join("nested").join("workspace.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.db_sha256, backup::sha256_hex(bytes));

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    assert_eq!(manifest["format"], json!(backup::BUNDLE_FORMAT_V1));
    assert_eq!(manifest["dbSha256"], json!(export.db_sha256));
    assert!(manifest["exportedAt"].as_str().is_some());
    archive
        .by_name("db/marks.sqlite3")
        .expect("database entry in bundle");
    archive
        .by_name("meta/workspace.json")
        .expect("workspace metadata entry");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);

    let restored = std::fs::read(workspace2.join("marks.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn legacy_sqlite_import_is_supported() {
    let out_dir = temp_dir("marksd-backup-legacy");
    let workspace = temp_dir("marksd-backup-legacy-dst");

    let legacy_file = out_dir.join("old.sqlite3");
    let bytes = b"legacy-sqlite-copy";
    std::fs::write(&legacy_file, bytes).expect("write legacy sqlite file");

    let import =
        backup::import_workspace_bundle(&legacy_file, &workspace).expect("import legacy sqlite");
    assert_eq!(import.bundle_format_detected, backup::LEGACY_SQLITE_FORMAT);

    let restored = std::fs::read(workspace.join("marks.sqlite3")).expect("read restored sqlite");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

fn write_bundle(path: &std::path::Path, manifest: serde_json::Value, db: &[u8]) {
    let f = File::create(path).expect("create bundle");
    let mut zip = ZipWriter::new(f);
    let opts = FileOptions::default();
    zip.start_file("manifest.json", opts).expect("start manifest");
    zip.write_all(manifest.to_string().as_bytes())
        .expect("write manifest");
    zip.start_file("db/marks.sqlite3", opts).expect("start db");
    zip.write_all(db).expect("write db");
    zip.finish().expect("finish zip");
}

#[test]
fn tampered_or_foreign_bundles_leave_workspace_untouched() {
    let out_dir = temp_dir("marksd-backup-tamper");
    let workspace = temp_dir("marksd-backup-tamper-dst");
    std::fs::write(workspace.join("marks.sqlite3"), b"original").expect("write existing db");

    let tampered = out_dir.join("tampered.zip");
    write_bundle(
        &tampered,
        json!({ "format": backup::BUNDLE_FORMAT_V1, "dbSha256": backup::sha256_hex(b"other") }),
        b"payload",
    );
    let e = backup::import_workspace_bundle(&tampered, &workspace).expect_err("checksum mismatch");
    assert!(e.to_string().contains("checksum"));

    let foreign = out_dir.join("foreign.zip");
    write_bundle(&foreign, json!({ "format": "something-else" }), b"payload");
    let e = backup::import_workspace_bundle(&foreign, &workspace).expect_err("unsupported format");
    assert!(e.to_string().contains("unsupported bundle format"));

    let current = std::fs::read(workspace.join("marks.sqlite3")).expect("read db");
    assert_eq!(current, b"original");

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn sidecar_restores_bundle_into_new_workspace() {
    let src = temp_dir("marksd-backup-ipc-src");
    let dst = temp_dir("marksd-backup-ipc-dst");
    let bundle = src.join("export.zip");

    let mut sidecar = spawn_sidecar();
    sidecar.request_ok("workspace.select", json!({ "path": src.to_string_lossy() }));
    sidecar.request_ok("semesters.create", json!({ "name": "Autumn", "year": "2024" }));
    let exported = sidecar.request_ok(
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(exported["bundleFormat"], json!(backup::BUNDLE_FORMAT_V1));

    let imported = sidecar.request_ok(
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy(), "workspacePath": dst.to_string_lossy() }),
    );
    assert_eq!(imported["bundleFormatDetected"], json!(backup::BUNDLE_FORMAT_V1));
    assert_eq!(str_field(&imported, "workspacePath"), dst.to_string_lossy());

    let semesters = sidecar.request_ok("semesters.list", json!({}));
    assert_eq!(semesters["semesters"][0]["name"], json!("Autumn"));

    assert_eq!(
        sidecar.request_err(
            "backup.importWorkspaceBundle",
            json!({ "inPath": src.join("missing.zip").to_string_lossy() }),
        ),
        "not_found"
    );

    sidecar.shutdown();
    let _ = std::fs::remove_dir_all(src);
    let _ = std::fs::remove_dir_all(dst);
}

#[test]
fn failed_import_keeps_current_workspace_open() {
    let workspace = temp_dir("marksd-backup-broken");
    let out_dir = temp_dir("marksd-backup-broken-src");
    let broken = out_dir.join("broken.zip");
    let mut bytes = b"PK\x03\x04".to_vec();
    bytes.extend_from_slice(b"not really a zip archive");
    std::fs::write(&broken, &bytes).expect("write broken bundle");

    let mut sidecar = spawn_sidecar();
    sidecar.request_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    sidecar.request_ok("semesters.create", json!({ "name": "Autumn", "year": "2024" }));

    assert_eq!(
        sidecar.request_err(
            "backup.importWorkspaceBundle",
            json!({ "inPath": broken.to_string_lossy() }),
        ),
        "import_failed"
    );

    let semesters = sidecar.request_ok("semesters.list", json!({}));
    assert_eq!(semesters["semesters"][0]["name"], json!("Autumn"));
    sidecar.request_ok("semesters.create", json!({ "name": "Spring", "year": "2024" }));
    let semesters = sidecar.request_ok("semesters.list", json!({}));
    assert_eq!(semesters["semesters"].as_array().map(|s| s.len()), Some(2));

    sidecar.shutdown();
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}
