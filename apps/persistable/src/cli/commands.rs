//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Every command that writes a file runs the backend to completion first
//! and only then creates the output, so a failed encode leaves no file
//! behind.

use persistable_core::formats::mat;
use persistable_core::value::JSON_TYPE_KEY;
use persistable_core::stream::{self, BinaryReader};
use persistable_core::{
    CompositeDef, Dictionary, PersistError, Record, Schema, container, digest_hex, generate, verify_digest,
};
use serde::Serialize;
use serde_json::Value as Json;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum schema file size (1 MB).
const MAX_SCHEMA_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum value file size (100 MB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
const MAX_VALUE_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum binary file size for `decode` and `digest` (500 MB).
const MAX_BINARY_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), PersistError> {
    let metadata = std::fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(PersistError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate an input path: it must exist and be a regular file.
///
/// The path is canonicalized so that log lines show where data actually
/// came from.
fn validate_file_path(path: &Path) -> Result<PathBuf, PersistError> {
    let canonical = path.canonicalize().map_err(|e| {
        PersistError::Io(std::io::Error::new(
            e.kind(),
            format!("Invalid file path '{}': {}", path.display(), e),
        ))
    })?;

    if !canonical.is_file() {
        return Err(PersistError::Serialization(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output path: its parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, PersistError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        PersistError::Io(std::io::Error::new(
            e.kind(),
            format!("Invalid output directory '{}': {}", parent.display(), e),
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(PersistError::Serialization(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| PersistError::Serialization("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a whole file after path and size validation.
fn read_bounded(path: &Path, max_size: u64) -> Result<Vec<u8>, PersistError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, max_size)?;
    Ok(std::fs::read(&path)?)
}

// =============================================================================
// INPUT LOADING
// =============================================================================

/// Load and validate a TOML schema file.
pub fn load_schema(path: &Path) -> Result<Schema, PersistError> {
    let bytes = read_bounded(path, MAX_SCHEMA_FILE_SIZE)?;
    let text = String::from_utf8(bytes)
        .map_err(|e| PersistError::InvalidSchema(format!("schema is not UTF-8: {}", e)))?;
    let schema = Schema::from_toml_str(&text)?;
    tracing::debug!(path = %path.display(), types = schema.len(), "loaded schema");
    Ok(schema)
}

/// The top-level type: an explicit `--root`, else the schema's default.
pub fn select_root<'s>(schema: &'s Schema, root: Option<&str>) -> Result<&'s CompositeDef, PersistError> {
    match root {
        Some(name) => schema.require(name),
        None => schema.root_def(),
    }
}

/// Load a JSON value file as a record of type `def`.
///
/// A `$type` key on the top-level object must name `def` itself; the root
/// type is chosen by the schema or `--root`, never by the document.
pub fn load_value(schema: &Schema, def: &CompositeDef, path: &Path) -> Result<Record, PersistError> {
    let bytes = read_bounded(path, MAX_VALUE_FILE_SIZE)?;
    let json: Json = serde_json::from_slice(&bytes)
        .map_err(|e| PersistError::Serialization(format!("Invalid JSON in '{}': {}", path.display(), e)))?;
    let record = Record::from_json(schema, def, &json)?;
    if record.type_name != def.name {
        tracing::warn!(declared = %def.name, actual = %record.type_name, "root $type disagrees with root type");
        return Err(PersistError::PolymorphicValue {
            field: JSON_TYPE_KEY.to_string(),
            declared: def.name.clone(),
            actual: record.type_name,
        });
    }
    Ok(record)
}

/// Write a finished output buffer.
fn write_output(path: &Path, bytes: &[u8]) -> Result<PathBuf, PersistError> {
    let out = validate_output_path(path)?;
    std::fs::write(&out, bytes)?;
    Ok(out)
}

// =============================================================================
// DICTIONARY COMMAND
// =============================================================================

/// Print the dictionary a file of this schema would carry.
pub fn cmd_dictionary(schema_path: &Path, root: Option<&str>, json_mode: bool) -> Result<(), PersistError> {
    let schema = load_schema(schema_path)?;
    let root_def = select_root(&schema, root)?;
    let dictionary = Dictionary::from_schema(&schema, root_def)?;

    if json_mode {
        let output = serde_json::json!({
            "root": root_def.name,
            "root_tag": dictionary.tag_for(&root_def.name),
            "header_bytes": dictionary.header_bytes()?.len(),
            "types": dictionary.types().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    print!("{}", render_dictionary(&dictionary, &root_def.name));
    Ok(())
}

/// Human-readable dictionary listing.
pub fn render_dictionary(dictionary: &Dictionary, root: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("Type Dictionary (root: {})\n", root));
    out.push_str("========================\n");
    for t in dictionary.types() {
        out.push_str(&format!("{:>4}  {} ({} fields)\n", t.type_tag.value(), t.name, t.fields.len()));
        for f in &t.fields {
            let brackets = "[]".repeat(usize::try_from(f.array_dimensions).unwrap_or(0));
            out.push_str(&format!(
                "        {:<20} {}{} (tag {})\n",
                f.name,
                dictionary.type_name(f.type_tag),
                brackets,
                f.type_tag.value()
            ));
        }
    }
    out
}

// =============================================================================
// ENCODE COMMAND
// =============================================================================

/// Encode a JSON value into a binary file.
pub fn cmd_encode(
    schema_path: &Path,
    input: &Path,
    output: &Path,
    root: Option<&str>,
) -> Result<(), PersistError> {
    let schema = load_schema(schema_path)?;
    let root_def = select_root(&schema, root)?;
    let value = load_value(&schema, root_def, input)?;

    let bytes = stream::save(&schema, &value)?;
    let out = write_output(output, &bytes)?;

    tracing::info!(output = %out.display(), bytes = bytes.len(), root = %root_def.name, "encoded");
    println!("Encoded {} ({} bytes) -> {}", root_def.name, bytes.len(), out.display());
    Ok(())
}

// =============================================================================
// DECODE COMMAND
// =============================================================================

#[derive(Serialize)]
struct DecodedReport<'a> {
    dictionary: &'a Dictionary,
    root: Json,
}

/// Decode a file image into its JSON dump: the dictionary plus the root.
pub fn decode_to_json(bytes: &[u8]) -> Result<Json, PersistError> {
    let decoded = BinaryReader::read(bytes)?;
    let report = DecodedReport {
        dictionary: &decoded.dictionary,
        root: decoded.root.to_json(),
    };
    serde_json::to_value(&report).map_err(|e| PersistError::Serialization(e.to_string()))
}

/// Decode a binary file and print it as JSON.
pub fn cmd_decode(input: &Path) -> Result<(), PersistError> {
    let bytes = read_bounded(input, MAX_BINARY_FILE_SIZE)?;
    let json = decode_to_json(&bytes)?;
    tracing::info!(input = %input.display(), bytes = bytes.len(), "decoded");
    println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
    Ok(())
}

// =============================================================================
// EXPORT-MAT COMMAND
// =============================================================================

/// Export a JSON value through the container backend as a MAT-file.
pub fn cmd_export_mat(
    schema_path: &Path,
    input: &Path,
    output: &Path,
    root: Option<&str>,
    var: &str,
) -> Result<(), PersistError> {
    let schema = load_schema(schema_path)?;
    let root_def = select_root(&schema, root)?;
    let value = load_value(&schema, root_def, input)?;

    let tree = container::save(&schema, &value)?;
    let bytes = mat::to_bytes(var, &tree)?;
    let out = write_output(output, &bytes)?;

    tracing::info!(output = %out.display(), bytes = bytes.len(), var, "exported MAT-file");
    println!("Exported {} as '{}' ({} bytes) -> {}", root_def.name, var, bytes.len(), out.display());
    Ok(())
}

// =============================================================================
// GENERATE COMMAND
// =============================================================================

/// Generate MATLAB functions into `output_dir`.
pub fn cmd_generate(
    schema_path: &Path,
    output_dir: &Path,
    root: Option<&str>,
    json_mode: bool,
) -> Result<(), PersistError> {
    let schema = load_schema(schema_path)?;
    let root_def = select_root(&schema, root)?;
    let sources = generate(&schema, root_def)?;

    std::fs::create_dir_all(output_dir)?;
    let written = sources.write_to_dir(output_dir)?;
    tracing::info!(dir = %output_dir.display(), files = written.len(), "generated MATLAB sources");

    if json_mode {
        let files: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
        let output = serde_json::json!({ "root": root_def.name, "files": files });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    println!("Generated {} files for {}:", written.len(), root_def.name);
    for path in &written {
        println!("  {}", path.display());
    }
    Ok(())
}

// =============================================================================
// DIGEST COMMAND
// =============================================================================

/// Compute (and optionally check) the BLAKE3 digest of a file.
pub fn cmd_digest(input: &Path, expect: Option<&str>, json_mode: bool) -> Result<(), PersistError> {
    let bytes = read_bounded(input, MAX_BINARY_FILE_SIZE)?;
    let digest = digest_hex(&bytes);

    if let Some(expected) = expect
        && !verify_digest(&bytes, expected)
    {
        return Err(PersistError::Serialization(format!(
            "digest mismatch for '{}': expected {}, got {}",
            input.display(),
            expected.trim(),
            digest
        )));
    }

    if json_mode {
        let output = serde_json::json!({
            "file": input.to_string_lossy(),
            "bytes": bytes.len(),
            "blake3": digest,
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    println!("{}  {}", digest, input.display());
    Ok(())
}
