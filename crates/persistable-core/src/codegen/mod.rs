//! # MATLAB Code Generator
//!
//! Emits MATLAB reader/writer functions that speak the binary stream
//! layout, so files written by [`crate::stream`] can be loaded in MATLAB
//! (and MATLAB structs saved back) without sharing any schema at runtime.
//!
//! ## Output
//!
//! Per composite type `T` (simple name):
//! - `read_T.m`: `s = read_T(fid)`
//! - `write_T.m`: `write_T(fid, s)`
//!
//! Plus, for the root type `R`:
//! - `load_R.m`: opens a file, checks the magic number, skips the
//!   dictionary and the top-level tag, then calls `read_R`.
//! - `save_R.m`: writes magic, the dictionary as literal `fwrite`
//!   statements, the top-level tag, then calls `write_R`.
//!
//! Functions for nested types are called by name, never inlined, so the
//! order in which MATLAB loads them does not matter.
//!
//! ## Determinism
//!
//! Generation is a pure function of the schema: no timestamps, files in
//! type-completion order followed by the two wrappers.

mod matlab;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dictionary::Dictionary;
use crate::primitives::MAGIC;
use crate::schema::{CompositeDef, Schema};
use crate::walker::{SchemaListener, Walker};
use crate::{PersistError, PrimitiveKind};

use matlab::{Code, Element};

// =============================================================================
// OUTPUT
// =============================================================================

/// One generated source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub file_name: String,
    pub contents: String,
}

/// All files generated for one root type, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedSources {
    files: Vec<GeneratedFile>,
}

impl GeneratedSources {
    /// Files in emission order.
    #[must_use]
    pub fn files(&self) -> &[GeneratedFile] {
        &self.files
    }

    /// Find a file by name.
    #[must_use]
    pub fn get(&self, file_name: &str) -> Option<&GeneratedFile> {
        self.files.iter().find(|f| f.file_name == file_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write every file into `dir` (created if missing).
    ///
    /// Returns the written paths.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, PersistError> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let path = dir.join(&file.file_name);
            fs::write(&path, &file.contents)?;
            written.push(path);
        }
        tracing::info!(dir = %dir.display(), files = written.len(), "wrote generated sources");
        Ok(written)
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

/// Per-type state while its fields are being visited.
struct TypeCode {
    type_name: String,
    ident: String,
    read: Code,
    write: Code,
}

/// Schema listener producing `read_*`/`write_*` functions.
#[derive(Default)]
pub struct MatlabGenerator {
    pending: Vec<TypeCode>,
    files: Vec<GeneratedFile>,
    /// Function identifier -> fully-qualified type name.
    idents: BTreeMap<String, String>,
}

impl MatlabGenerator {
    /// Create an empty generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Files produced so far.
    #[must_use]
    pub fn into_sources(self) -> GeneratedSources {
        GeneratedSources { files: self.files }
    }

    /// Identifier used in function names for `def`, unique per schema.
    fn ident_for(&mut self, def: &CompositeDef) -> Result<String, PersistError> {
        let ident = def.simple_name().to_string();
        if !matlab::is_identifier(&format!("write_{}", ident)) {
            return Err(PersistError::InvalidSchema(format!(
                "type name '{}' does not give a valid MATLAB function name",
                def.name
            )));
        }
        match self.idents.get(&ident) {
            Some(owner) if *owner != def.name => Err(PersistError::InvalidSchema(format!(
                "types '{}' and '{}' both generate '{}' functions",
                owner, def.name, ident
            ))),
            Some(_) => Ok(ident),
            None => {
                self.idents.insert(ident.clone(), def.name.clone());
                Ok(ident)
            }
        }
    }

    fn current(&mut self, field: &str) -> Result<&mut TypeCode, PersistError> {
        if !matlab::is_identifier(field) {
            return Err(PersistError::InvalidSchema(format!(
                "field name '{}' is not a valid MATLAB identifier",
                field
            )));
        }
        self.pending.last_mut().ok_or(PersistError::UnbalancedStack {
            expected: 1,
            found: 0,
        })
    }
}

impl SchemaListener for MatlabGenerator {
    fn begin_composite(&mut self, _field: Option<&str>, def: &CompositeDef) -> Result<(), PersistError> {
        let ident = self.ident_for(def)?;

        let mut read = Code::new();
        read.open(format!("function s = read_{}(fid)", ident));
        read.line(format!("%READ_{} Read one {} from an open persistable file.", ident.to_uppercase(), ident));
        read.line(format!("%   Generated from type {}; do not edit.", def.name));
        read.blank();
        read.line("s = struct();");

        let mut write = Code::new();
        write.open(format!("function write_{}(fid, s)", ident));
        write.line(format!("%WRITE_{} Write one {} to an open persistable file.", ident.to_uppercase(), ident));
        write.line(format!("%   Generated from type {}; do not edit.", def.name));

        self.pending.push(TypeCode {
            type_name: def.name.clone(),
            ident,
            read,
            write,
        });
        Ok(())
    }

    fn end_composite(&mut self, _field: Option<&str>) -> Result<(), PersistError> {
        let TypeCode {
            type_name,
            ident,
            mut read,
            mut write,
        } = self.pending.pop().ok_or(PersistError::UnbalancedStack {
            expected: 1,
            found: 0,
        })?;
        read.close("end");
        write.close("end");
        tracing::debug!(type_name = %type_name, ident = %ident, "generated read/write functions");

        self.files.push(GeneratedFile {
            file_name: format!("read_{}.m", ident),
            contents: read.into_string(),
        });
        self.files.push(GeneratedFile {
            file_name: format!("write_{}.m", ident),
            contents: write.into_string(),
        });
        Ok(())
    }

    fn primitive_field(&mut self, name: &str, kind: PrimitiveKind, preserve: bool) -> Result<(), PersistError> {
        let t = self.current(name)?;
        for c in [&mut t.read, &mut t.write] {
            c.blank();
            c.line(format!("% {} {}", kind, name));
        }
        matlab::read_scalar(&mut t.read, name, kind, preserve);
        matlab::write_scalar(&mut t.write, name, kind);
        Ok(())
    }

    fn primitive_array_field(&mut self, name: &str, kind: PrimitiveKind, dims: u32, preserve: bool) -> Result<(), PersistError> {
        if kind == PrimitiveKind::Char && dims > 1 {
            return Err(PersistError::AmbiguousEmptyString(name.to_string()));
        }
        let t = self.current(name)?;
        let element = if kind.is_textual() {
            Element::Text
        } else {
            Element::Numeric { kind, preserve }
        };
        let brackets = "[]".repeat(dims as usize);
        for c in [&mut t.read, &mut t.write] {
            c.blank();
            c.line(format!("% {}{} {}", kind, brackets, name));
        }
        matlab::read_array(&mut t.read, name, dims, element);
        matlab::write_array(&mut t.write, name, dims, element);
        Ok(())
    }

    fn composite_field(&mut self, name: &str, def: &CompositeDef) -> Result<(), PersistError> {
        let ident = self.ident_for(def)?;
        let t = self.current(name)?;
        let owner = t.ident.clone();
        for c in [&mut t.read, &mut t.write] {
            c.blank();
            c.line(format!("% {} {}", ident, name));
        }
        t.read.line(format!("s.{} = read_{}(fid);", name, ident));

        t.write.open(format!("if isempty(s.{})", name));
        t.write.line(format!(
            "error('persistable:emptyComposite', '{}.{} must not be empty');",
            owner, name
        ));
        t.write.close("end");
        t.write.line(format!("write_{}(fid, s.{});", ident, name));
        Ok(())
    }

    fn composite_array_field(&mut self, name: &str, def: &CompositeDef, dims: u32) -> Result<(), PersistError> {
        let ident = self.ident_for(def)?;
        let t = self.current(name)?;
        let brackets = "[]".repeat(dims as usize);
        for c in [&mut t.read, &mut t.write] {
            c.blank();
            c.line(format!("% {}{} {}", ident, brackets, name));
        }
        matlab::read_array(&mut t.read, name, dims, Element::Composite(&ident));
        matlab::write_array(&mut t.write, name, dims, Element::Composite(&ident));
        Ok(())
    }
}

// =============================================================================
// FILE WRAPPERS
// =============================================================================

fn open_file(c: &mut Code, mode: &str) {
    c.line(format!("fid = fopen(filename, '{}', 'n');", mode));
    c.open("if fid < 0");
    c.line("error('persistable:open', 'Cannot open %s', filename);");
    c.close("end");
    c.line("cleanup = onCleanup(@() fclose(fid));");
}

fn load_wrapper(ident: &str, root_tag: i32) -> GeneratedFile {
    let mut c = Code::new();
    c.open(format!("function s = load_{}(filename)", ident));
    c.line(format!("%LOAD_{} Load a {} from a persistable binary file.", ident.to_uppercase(), ident));
    c.blank();
    open_file(&mut c, "r");
    c.blank();
    c.line("magic = fread(fid, 1, 'int32=>double');");
    c.open(format!("if ~isequal(magic, {})", MAGIC));
    c.line("error('persistable:magic', 'Not a persistable file: %s', filename);");
    c.close("end");
    c.blank();
    c.line("% dictionary (not needed: the layout is compiled in)");
    c.line("nTypes = fread(fid, 1, 'int32=>double');");
    c.open("for t = 1:nTypes");
    c.line("fread(fid, 1, 'int32');");
    c.line("fseek(fid, fread(fid, 1, 'int32=>double'), 'cof');");
    c.line("nFields = fread(fid, 1, 'int32=>double');");
    c.open("for f = 1:nFields");
    c.line("fseek(fid, fread(fid, 1, 'int32=>double'), 'cof');");
    c.line("fread(fid, 2, 'int32');");
    c.close("end");
    c.close("end");
    c.blank();
    c.line("tag = fread(fid, 1, 'int32=>double');");
    c.open(format!("if ~isequal(tag, {})", root_tag));
    c.line(format!(
        "error('persistable:type', 'Top-level type tag %d is not a {}', tag);",
        ident
    ));
    c.close("end");
    c.line(format!("s = read_{}(fid);", ident));
    c.close("end");
    GeneratedFile {
        file_name: format!("load_{}.m", ident),
        contents: c.into_string(),
    }
}

fn write_string_literal(c: &mut Code, s: &str) {
    c.line(format!("fwrite(fid, {}, 'int32');", s.len()));
    if !s.is_empty() {
        c.line(format!("fwrite(fid, {}, 'uint8');", matlab::byte_literal(s)));
    }
}

fn save_wrapper(ident: &str, root_tag: i32, dictionary: &Dictionary) -> GeneratedFile {
    let mut c = Code::new();
    c.open(format!("function save_{}(filename, s)", ident));
    c.line(format!("%SAVE_{} Save a {} to a persistable binary file.", ident.to_uppercase(), ident));
    c.blank();
    open_file(&mut c, "w");
    c.blank();
    c.line(format!("fwrite(fid, {}, 'int32');", MAGIC));
    c.blank();
    c.line(format!("% dictionary: {} types", dictionary.len()));
    c.line(format!("fwrite(fid, {}, 'int32');", dictionary.len()));
    for t in dictionary.types() {
        c.blank();
        c.line(format!("% {} ({})", t.name, t.type_tag));
        c.line(format!("fwrite(fid, {}, 'int32');", t.type_tag));
        write_string_literal(&mut c, &t.name);
        c.line(format!("fwrite(fid, {}, 'int32');", t.fields.len()));
        for f in &t.fields {
            write_string_literal(&mut c, &f.name);
            c.line(format!("fwrite(fid, [{} {}], 'int32');", f.type_tag, f.array_dimensions));
        }
    }
    c.blank();
    c.line(format!("fwrite(fid, {}, 'int32');", root_tag));
    c.line(format!("write_{}(fid, s);", ident));
    c.close("end");
    GeneratedFile {
        file_name: format!("save_{}.m", ident),
        contents: c.into_string(),
    }
}

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Generate all MATLAB sources for `root` and the types it reaches.
///
/// Every schema problem is reported before any text is returned.
pub fn generate(schema: &Schema, root: &CompositeDef) -> Result<GeneratedSources, PersistError> {
    let mut generator = MatlabGenerator::new();
    Walker::new(schema).walk_schema(root, &mut generator)?;
    if !generator.pending.is_empty() {
        return Err(PersistError::UnbalancedStack {
            expected: 0,
            found: generator.pending.len(),
        });
    }

    let dictionary = Dictionary::from_schema(schema, root)?;
    let root_tag = dictionary
        .tag_for(&root.name)
        .ok_or_else(|| PersistError::UnregisteredType(root.name.clone()))?;
    let ident = generator.ident_for(root)?;

    let mut sources = generator.into_sources();
    sources.files.push(load_wrapper(&ident, root_tag.value()));
    sources.files.push(save_wrapper(&ident, root_tag.value(), &dictionary));
    tracing::debug!(root = %root.name, files = sources.len(), "generated MATLAB sources");
    Ok(sources)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn path_schema() -> Schema {
        Schema::new()
            .with_type(CompositeDef::new("geo.Point").field("x", "double").field("y", "double"))
            .with_type(
                CompositeDef::new("geo.Path")
                    .array_field("points", "geo.Point", 1)
                    .field("origin", "geo.Point")
                    .array_field("labels", "string", 1),
            )
            .with_root("geo.Path")
    }

    #[test]
    fn nested_types_emitted_first_then_wrappers() {
        let schema = path_schema();
        let sources = generate(&schema, schema.root_def().expect("root")).expect("generate");
        let names: Vec<&str> = sources.files().iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec![
            "read_Point.m",
            "write_Point.m",
            "read_Path.m",
            "write_Path.m",
            "load_Path.m",
            "save_Path.m",
        ]);
    }

    #[test]
    fn composite_arrays_preallocate_on_first_iteration() {
        let schema = path_schema();
        let sources = generate(&schema, schema.root_def().expect("root")).expect("generate");
        let read = &sources.get("read_Path.m").expect("read_Path").contents;
        assert!(read.contains("e_points = read_Point(fid);"));
        assert!(read.contains("if i1_points == 1"));
        assert!(read.contains("v1_points = repmat(e_points, 1, n1_points);"));
        assert!(read.contains("s.origin = read_Point(fid);"));
        assert!(read.contains("v1_labels = {};"));
    }

    #[test]
    fn scalar_composite_write_is_guarded() {
        let schema = path_schema();
        let sources = generate(&schema, schema.root_def().expect("root")).expect("generate");
        let write = &sources.get("write_Path.m").expect("write_Path").contents;
        assert!(write.contains("if isempty(s.origin)"));
        assert!(write.contains("error('persistable:emptyComposite', 'Path.origin must not be empty');"));
        assert!(write.contains("write_Point(fid, v1_points(i1_points));"));
    }

    #[test]
    fn save_wrapper_spells_out_the_dictionary() {
        let schema = path_schema();
        let sources = generate(&schema, schema.root_def().expect("root")).expect("generate");
        let save = &sources.get("save_Path.m").expect("save_Path").contents;
        assert!(save.contains(&format!("fwrite(fid, {}, 'int32');", MAGIC)));
        assert!(save.contains("fwrite(fid, 'geo.Point', 'uint8');"));
        assert!(save.contains("fwrite(fid, [7 0], 'int32');"));
        assert!(save.contains("fwrite(fid, [12 1], 'int32');"));
        assert!(save.contains("write_Path(fid, s);"));
        let load = &sources.get("load_Path.m").expect("load_Path").contents;
        assert!(load.contains("cleanup = onCleanup(@() fclose(fid));"));
        assert!(load.contains("if ~isequal(tag, 13)"));
    }

    #[test]
    fn multi_dimensional_char_rejected() {
        let schema = Schema::new().with_type(CompositeDef::new("T").array_field("rows", "char", 2));
        let result = generate(&schema, schema.get("T").expect("t"));
        assert!(matches!(result, Err(PersistError::AmbiguousEmptyString(ref f)) if f == "rows"));
    }

    #[test]
    fn unknown_type_rejected_before_output() {
        let schema = Schema::new().with_type(CompositeDef::new("T").field("x", "int").field("when", "Instant"));
        assert!(matches!(
            generate(&schema, schema.get("T").expect("t")),
            Err(PersistError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn clashing_simple_names_rejected() {
        let schema = Schema::new()
            .with_type(CompositeDef::new("a.Point").field("x", "int"))
            .with_type(CompositeDef::new("b.Point").field("x", "int"))
            .with_type(CompositeDef::new("Pair").field("p", "a.Point").field("q", "b.Point"));
        assert!(matches!(
            generate(&schema, schema.get("Pair").expect("pair")),
            Err(PersistError::InvalidSchema(_))
        ));
    }

    #[test]
    fn generation_is_deterministic() {
        let schema = path_schema();
        let root = schema.root_def().expect("root");
        assert_eq!(generate(&schema, root).expect("a"), generate(&schema, root).expect("b"));
    }

    #[test]
    fn write_to_dir_creates_files() {
        let schema = path_schema();
        let sources = generate(&schema, schema.root_def().expect("root")).expect("generate");
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("matlab");
        let written = sources.write_to_dir(&out).expect("write");
        assert_eq!(written.len(), 6);
        let text = std::fs::read_to_string(out.join("read_Point.m")).expect("read back");
        assert!(text.starts_with("function s = read_Point(fid)"));
    }
}
