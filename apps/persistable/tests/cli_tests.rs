//! # CLI Command Tests
//!
//! Drives the command implementations against files in a temporary
//! directory, the way the binary would.

use persistable::cli::{
    self, Cli, Commands, cmd_decode, cmd_digest, cmd_encode, cmd_export_mat, cmd_generate, decode_to_json,
    load_schema, load_value, render_dictionary, select_root,
};
use persistable_core::{Dictionary, PersistError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCHEMA: &str = r#"
root = "Path"

[[types]]
name = "Point"
fields = [
    { name = "x", type = "double" },
    { name = "y", type = "double" },
]

[[types]]
name = "Path"
fields = [
    { name = "name", type = "string" },
    { name = "points", type = "Point", dims = 1 },
]
"#;

const VALUE: &str = r#"{
    "name": "triangle",
    "points": [
        { "x": 0.0, "y": 0.0 },
        { "x": 1.0, "y": 0.0 },
        { "x": 0.0, "y": 1.0 }
    ]
}"#;

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = dir.path().join("path.toml");
    let value = dir.path().join("path.json");
    std::fs::write(&schema, SCHEMA).expect("write schema");
    std::fs::write(&value, VALUE).expect("write value");
    (dir, schema, value)
}

fn out(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

// =============================================================================
// SCHEMA LOADING
// =============================================================================

#[test]
fn schema_file_loads_with_default_root() {
    let (_dir, schema_path, _) = setup();
    let schema = load_schema(&schema_path).expect("load");
    assert_eq!(schema.len(), 2);
    assert_eq!(select_root(&schema, None).expect("root").name, "Path");
    assert_eq!(select_root(&schema, Some("Point")).expect("point").name, "Point");
    assert!(select_root(&schema, Some("Polygon")).is_err());
}

#[test]
fn missing_schema_file_is_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_schema(&dir.path().join("absent.toml")).expect_err("must fail");
    assert!(matches!(err, PersistError::Io(_)));
}

#[test]
fn dictionary_listing_names_every_field() {
    let (_dir, schema_path, _) = setup();
    let schema = load_schema(&schema_path).expect("load");
    let dictionary = Dictionary::from_schema(&schema, schema.root_def().expect("root")).expect("dict");

    let text = render_dictionary(&dictionary, "Path");
    assert!(text.contains("  12  Point (2 fields)"));
    assert!(text.contains("  13  Path (2 fields)"));
    assert!(text.contains("Point[] (tag 12)"));
    assert!(text.contains("string (tag 8)"));
}

// =============================================================================
// ENCODE / DECODE
// =============================================================================

#[test]
fn encode_then_decode_reproduces_value() {
    let (dir, schema_path, value_path) = setup();
    let bin = out(&dir, "path.bin");

    cmd_encode(&schema_path, &value_path, &bin, None).expect("encode");
    let bytes = std::fs::read(&bin).expect("read bin");
    let json = decode_to_json(&bytes).expect("decode");

    let expected: serde_json::Value = serde_json::from_str(VALUE).expect("value json");
    assert_eq!(json["root"], expected);
    assert_eq!(json["dictionary"]["types"][0]["name"], "Point");

    cmd_decode(&bin).expect("decode command");
}

#[test]
fn failed_encode_creates_no_file() {
    let (dir, schema_path, _) = setup();
    let bad = out(&dir, "bad.json");
    // a point without coordinates is fine, a missing point is not
    std::fs::write(&bad, r#"{ "name": "x", "points": [null] }"#).expect("write");
    let bin = out(&dir, "bad.bin");

    let err = cmd_encode(&schema_path, &bad, &bin, None).expect_err("must fail");
    assert!(matches!(err, PersistError::EmptyComposite { .. }));
    assert!(!bin.exists());
}

#[test]
fn root_type_key_must_match_selected_root() {
    let (dir, schema_path, _) = setup();
    let schema = load_schema(&schema_path).expect("load");
    let root = select_root(&schema, None).expect("root");

    let doc = out(&dir, "typed.json");
    std::fs::write(&doc, r#"{ "$type": "Point", "x": 1.0, "y": 2.0 }"#).expect("write");
    let err = load_value(&schema, root, &doc).expect_err("must fail");
    assert!(matches!(err, PersistError::PolymorphicValue { ref declared, ref actual, .. }
        if declared == "Path" && actual == "Point"));

    std::fs::write(&doc, r#"{ "$type": "Path", "name": "p", "points": [] }"#).expect("write");
    assert_eq!(load_value(&schema, root, &doc).expect("matching type").type_name, "Path");

    let bin = out(&dir, "typed.bin");
    std::fs::write(&doc, r#"{ "$type": "Point", "x": 1.0, "y": 2.0 }"#).expect("write");
    assert!(cmd_encode(&schema_path, &doc, &bin, None).is_err());
    assert!(!bin.exists());
}

#[test]
fn encode_into_missing_directory_fails() {
    let (dir, schema_path, value_path) = setup();
    let bin = dir.path().join("nowhere").join("path.bin");
    assert!(cmd_encode(&schema_path, &value_path, &bin, None).is_err());
}

#[test]
fn decode_rejects_non_persistable_file() {
    let (_dir, schema_path, _) = setup();
    assert!(matches!(cmd_decode(&schema_path), Err(PersistError::Serialization(_))));
}

// =============================================================================
// EXPORT / GENERATE / DIGEST
// =============================================================================

#[test]
fn export_mat_writes_aligned_file() {
    let (dir, schema_path, value_path) = setup();
    let mat = out(&dir, "path.mat");

    cmd_export_mat(&schema_path, &value_path, &mat, None, "s").expect("export");
    let bytes = std::fs::read(&mat).expect("read mat");
    assert!(bytes.len() > 128);
    assert_eq!(bytes.len() % 8, 0);
    assert!(bytes.starts_with(b"MATLAB 5.0 MAT-file"));
}

#[test]
fn generate_writes_one_file_per_function() {
    let (dir, schema_path, _) = setup();
    let target = out(&dir, "matlab");

    cmd_generate(&schema_path, &target, None, false).expect("generate");
    for name in [
        "read_Point.m",
        "write_Point.m",
        "read_Path.m",
        "write_Path.m",
        "load_Path.m",
        "save_Path.m",
    ] {
        assert!(target.join(name).is_file(), "{} missing", name);
    }
}

#[test]
fn digest_checks_expected_value() {
    let (dir, schema_path, value_path) = setup();
    let bin = out(&dir, "path.bin");
    cmd_encode(&schema_path, &value_path, &bin, None).expect("encode");

    let digest = persistable_core::digest_hex(&std::fs::read(&bin).expect("read"));
    cmd_digest(&bin, Some(&digest), false).expect("matching digest");
    assert!(cmd_digest(&bin, Some(&"0".repeat(64)), true).is_err());
}

// =============================================================================
// DISPATCH
// =============================================================================

#[test]
fn execute_dispatches_subcommands() {
    let (dir, schema_path, value_path) = setup();
    let bin = out(&dir, "dispatch.bin");

    let cli = Cli {
        verbose: false,
        json_mode: true,
        command: Commands::Encode {
            schema: schema_path.clone(),
            input: value_path,
            output: bin.clone(),
            root: None,
        },
    };
    cli::execute(cli).expect("encode");
    assert!(Path::new(&bin).is_file());

    let cli = Cli {
        verbose: false,
        json_mode: true,
        command: Commands::Dictionary {
            schema: schema_path,
            root: Some("Point".to_string()),
        },
    };
    cli::execute(cli).expect("dictionary");
}

#[test]
fn cli_parses_arguments() {
    use clap::Parser;
    let cli = Cli::try_parse_from(["persistable", "generate", "-s", "a.toml", "-o", "out", "-r", "Path"])
        .expect("parse");
    match cli.command {
        Commands::Generate { schema, output, root } => {
            assert_eq!(schema, PathBuf::from("a.toml"));
            assert_eq!(output, PathBuf::from("out"));
            assert_eq!(root.as_deref(), Some("Path"));
        }
        other => unreachable!("unexpected command {:?}", other),
    }
}
