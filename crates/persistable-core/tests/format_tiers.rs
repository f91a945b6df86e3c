//! # Format Tier Tests (F0-F4)
//!
//! If ANY tier fails, files on disk can no longer be trusted.
//!
//! ## Tiers
//! - F0: Exact Layout
//! - F1: Round Trip
//! - F2: Rejection
//! - F3: Generated Code Parity
//! - F4: Container Output

use persistable_core::stream::{self, BinaryReader, BinaryWriter};
use persistable_core::value::parse_date;
use persistable_core::{CompositeDef, Dictionary, FieldDef, PersistError, Record, Schema, Value, Walker};

// =============================================================================
// HELPERS
// =============================================================================

/// Hand-assembled expected bytes, native order.
#[derive(Default)]
struct Bytes(Vec<u8>);

impl Bytes {
    fn i32(mut self, v: i32) -> Self {
        self.0.extend_from_slice(&v.to_ne_bytes());
        self
    }
    fn f64(mut self, v: f64) -> Self {
        self.0.extend_from_slice(&v.to_ne_bytes());
        self
    }
    fn str(self, s: &str) -> Self {
        let mut me = self.i32(s.len() as i32);
        me.0.extend_from_slice(s.as_bytes());
        me
    }
}

fn point(x: f64, y: f64) -> Value {
    Record::new("Point").with("x", Value::Double(x)).with("y", Value::Double(y)).into()
}

fn path_schema() -> Schema {
    Schema::new()
        .with_type(CompositeDef::new("Point").field("x", "double").field("y", "double"))
        .with_type(CompositeDef::new("Path").array_field("points", "Point", 1))
        .with_root("Path")
}

fn sample_schema() -> Schema {
    Schema::new()
        .with_type(
            CompositeDef::new("Sample")
                .field("id", "int")
                .field("label", "string")
                .array_field("samples", "double", 1),
        )
        .with_root("Sample")
}

fn sample() -> Record {
    Record::new("Sample")
        .with("id", Value::Int(42))
        .with("label", Value::String("kepler".into()))
        .with(
            "samples",
            Value::Array(vec![Value::Double(0.5), Value::Double(-1.25), Value::Double(3.0)]),
        )
}

// =============================================================================
// TIER F0: EXACT LAYOUT
// =============================================================================

mod f0_exact_layout {
    use super::*;

    /// F0.1: Point nested in Path encodes exactly as documented.
    #[test]
    fn point_path_bytes() {
        let root = Record::new("Path").with("points", Value::Array(vec![point(1.0, 2.0), point(3.0, 4.0)]));
        let bytes = stream::save(&path_schema(), &root).expect("save");

        let expected = Bytes::default()
            .i32(persistable_core::primitives::MAGIC)
            .i32(2)
            .i32(12)
            .str("Point")
            .i32(2)
            .str("x")
            .i32(7)
            .i32(0)
            .str("y")
            .i32(7)
            .i32(0)
            .i32(13)
            .str("Path")
            .i32(1)
            .str("points")
            .i32(12)
            .i32(1)
            .i32(13)
            .i32(2)
            .f64(1.0)
            .f64(2.0)
            .f64(3.0)
            .f64(4.0);
        assert_eq!(bytes, expected.0);
    }

    /// F0.2: Zero-length arrays write only their count.
    #[test]
    fn empty_array_is_just_a_count() {
        let root = Record::new("Path").with("points", Value::Array(vec![]));
        let bytes = stream::save(&path_schema(), &root).expect("save");
        assert!(bytes.ends_with(&Bytes::default().i32(13).i32(0).0));
    }

    /// F0.3: Golden fixture for the sample type (little-endian hosts).
    #[cfg(target_endian = "little")]
    #[test]
    fn sample_golden_fixture() {
        let golden: &[u8] = include_bytes!("fixtures/sample_le.bin");
        let bytes = stream::save(&sample_schema(), &sample()).expect("save");
        assert_eq!(bytes, golden);

        let decoded = BinaryReader::read(golden).expect("read golden");
        assert_eq!(decoded.root, Value::Record(sample()));
    }

    /// F0.4: A fresh dictionary for the same schema is byte-identical.
    #[test]
    fn dictionary_header_deterministic() {
        let schema = path_schema();
        let root = schema.root_def().expect("root");
        let a = Dictionary::from_schema(&schema, root).expect("a").header_bytes().expect("a bytes");
        let b = Dictionary::from_schema(&schema, root).expect("b").header_bytes().expect("b bytes");
        assert_eq!(a, b);
    }
}

// =============================================================================
// TIER F1: ROUND TRIP
// =============================================================================

mod f1_round_trip {
    use super::*;

    fn everything_schema() -> Schema {
        Schema::new()
            .with_type(CompositeDef::new("Point").field("x", "double").field("y", "double"))
            .with_type(
                CompositeDef::new("Everything")
                    .field("b", "boolean")
                    .field("y", "byte")
                    .field("s", "short")
                    .field("i", "int")
                    .field("l", "long")
                    .field("f", "float")
                    .field("d", "double")
                    .field("t", "string")
                    .field("c", "char")
                    .field("when", "date")
                    .field("e", "enum")
                    .field("origin", "Point")
                    .array_field("ints", "int", 1)
                    .array_field("grid", "double", 2)
                    .array_field("cube", "long", 3)
                    .array_field("words", "string", 1)
                    .array_field("chars", "char", 1)
                    .array_field("flags", "boolean", 2)
                    .array_field("raw", "byte", 1)
                    .array_field("dates", "date", 1)
                    .array_field("tiles", "Point", 2)
                    .with(FieldDef::array("kinds", "enum", 2).preserving()),
            )
            .with_root("Everything")
    }

    fn arr(items: Vec<Value>) -> Value {
        Value::Array(items)
    }

    fn everything() -> Record {
        let when = parse_date("2009-03-07T03:49:57.123Z").expect("date");
        Record::new("Everything")
            .with("b", Value::Bool(true))
            .with("y", Value::Byte(-7))
            .with("s", Value::Short(-300))
            .with("i", Value::Int(-123_456))
            .with("l", Value::Long(1 << 40))
            .with("f", Value::Float(1.5))
            .with("d", Value::Double(-2.75e-3))
            .with("t", Value::String(String::new()))
            .with("c", Value::Char(b'k'))
            .with("when", Value::Date(when))
            .with("e", Value::Enum("SCIENCE".into()))
            .with("origin", point(0.0, -0.0))
            .with("ints", arr(vec![Value::Int(1), Value::Int(-1), Value::Int(0)]))
            .with(
                "grid",
                arr(vec![arr(vec![Value::Double(1.0)]), arr(vec![]), arr(vec![Value::Double(2.0), Value::Double(3.0)])]),
            )
            .with(
                "cube",
                arr(vec![arr(vec![arr(vec![Value::Long(5)]), arr(vec![])]), arr(vec![])]),
            )
            .with("words", arr(vec![Value::String("a".into()), Value::String(String::new()), Value::String("ünï".into())]))
            .with("chars", arr(vec![Value::Char(b'h'), Value::Char(b'i')]))
            .with("flags", arr(vec![arr(vec![Value::Bool(false), Value::Bool(true)])]))
            .with("raw", arr(vec![Value::Byte(0), Value::Byte(127), Value::Byte(-128)]))
            .with("dates", arr(vec![Value::Date(when)]))
            .with("tiles", arr(vec![arr(vec![point(1.0, 2.0)]), arr(vec![])]))
            .with("kinds", arr(vec![arr(vec![Value::Enum("A".into()), Value::Enum("B".into())])]))
    }

    /// F1.1: Every kind and arrays of 1-3 dimensions survive bit-for-bit.
    #[test]
    fn all_kinds_and_dimensions() {
        let root = everything();
        let bytes = stream::save(&everything_schema(), &root).expect("save");
        let decoded = BinaryReader::read(&bytes).expect("read");
        assert_eq!(decoded.root, Value::Record(root));
    }

    /// F1.2: Re-encoding the decoded graph reproduces the same bytes.
    #[test]
    fn reencode_is_identical() {
        let schema = everything_schema();
        let bytes = stream::save(&schema, &everything()).expect("save");
        let decoded = BinaryReader::read(&bytes).expect("read");
        let again = stream::save(&schema, decoded.root_record().expect("record")).expect("save again");
        assert_eq!(bytes, again);
    }

    /// F1.3: A wrapper equal to its sentinel reads back as empty.
    /// Known limitation of the sentinel encoding, asserted on purpose.
    #[test]
    fn sentinel_value_reads_back_empty() {
        let schema = Schema::new().with_type(
            CompositeDef::new("W")
                .field("i", "int")
                .field("d", "double")
                .field("s", "short")
                .field("b", "byte"),
        );
        let root = Record::new("W")
            .with("i", Value::Int(i32::MAX))
            .with("d", Value::Double(f64::MAX))
            .with("s", Value::Short(-1))
            .with("b", Value::Byte(-1));
        let bytes = stream::save(&schema, &root).expect("save");
        let decoded = BinaryReader::read(&bytes).expect("read");
        let record = decoded.root_record().expect("record");
        for name in ["i", "d", "s", "b"] {
            assert_eq!(record.get(name), Some(&Value::Null), "{} should read back empty", name);
        }
    }

    /// F1.4: Independent encodes on separate threads agree with sequential ones.
    #[test]
    fn parallel_encodes_are_independent() {
        let schema = path_schema();
        let roots: Vec<Record> = (0..4)
            .map(|n| {
                let pts = (0..n).map(|k| point(f64::from(k), f64::from(n))).collect();
                Record::new("Path").with("points", Value::Array(pts))
            })
            .collect();
        let sequential: Vec<Vec<u8>> = roots.iter().map(|r| stream::save(&schema, r).expect("save")).collect();

        let parallel: Vec<Vec<u8>> = std::thread::scope(|scope| {
            let handles: Vec<_> = roots
                .iter()
                .map(|r| scope.spawn(|| stream::save(&schema, r).expect("save")))
                .collect();
            handles.into_iter().map(|h| h.join().expect("join")).collect()
        });
        assert_eq!(sequential, parallel);
    }
}

// =============================================================================
// TIER F2: REJECTION
// =============================================================================

mod f2_rejection {
    use super::*;

    /// F2.1: A runtime type outside the dictionary fails and writes nothing.
    #[test]
    fn unregistered_runtime_type_leaves_sink_untouched() {
        let schema = path_schema().with_type(CompositeDef::new("Point3").field("x", "double"));
        let root = Record::new("Path").with("points", Value::Array(vec![Record::new("Point3").into()]));

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.bin");
        let mut file = std::fs::File::create(&path).expect("create");
        let result = stream::save_to(&schema, &root, &mut file);
        drop(file);

        assert!(matches!(result, Err(PersistError::UnregisteredType(ref t)) if t == "Point3"));
        assert_eq!(std::fs::metadata(&path).expect("metadata").len(), 0);
    }

    /// F2.2: An empty scalar composite fails before any of its bytes.
    #[test]
    fn empty_scalar_composite_fails_before_emitting() {
        let schema = Schema::new()
            .with_type(CompositeDef::new("Point").field("x", "double"))
            .with_type(CompositeDef::new("Holder").field("label", "string").field("at", "Point"));
        let root = Record::new("Holder")
            .with("label", Value::String("ab".into()))
            .with("at", Value::Array(vec![]));

        let dictionary = Dictionary::from_schema(&schema, schema.get("Holder").expect("holder")).expect("dict");
        let mut writer = BinaryWriter::new(&dictionary);
        let result = Walker::new(&schema).walk_value(&root, &mut writer);

        assert!(matches!(result, Err(PersistError::EmptyComposite { ref field }) if field == "at"));
        // only the label: length prefix + 2 bytes
        assert_eq!(writer.bytes().len(), 6);
    }

    /// F2.3: Values of the wrong kind are schema errors.
    #[test]
    fn wrong_kind_rejected() {
        let root = Record::new("Path").with("points", Value::Int(3));
        let err = stream::save(&path_schema(), &root).expect_err("must fail");
        assert!(err.is_schema_error());
    }

    /// F2.4: Numeric arrays may not hold absent elements.
    #[test]
    fn null_inside_numeric_array_rejected() {
        let schema = Schema::new().with_type(CompositeDef::new("A").array_field("v", "int", 1));
        let root = Record::new("A").with("v", Value::Array(vec![Value::Int(1), Value::Null]));
        assert!(matches!(stream::save(&schema, &root), Err(PersistError::TypeMismatch { .. })));
    }
}

// =============================================================================
// TIER F3: GENERATED CODE PARITY
// =============================================================================

mod f3_codegen_parity {
    use super::*;
    use persistable_core::generate;

    /// Replays the literal `fwrite` statements of a save wrapper up to the
    /// call of the per-type writer.
    fn replay_save_prologue(text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for line in text.lines().map(str::trim) {
            if line.starts_with("write_") {
                break;
            }
            let Some(args) = line.strip_prefix("fwrite(fid, ").and_then(|l| l.strip_suffix(");")) else {
                continue;
            };
            let (value, precision) = args.rsplit_once(", ").expect("precision");
            match precision {
                "'int32'" => {
                    for n in value.trim_matches(|c| c == '[' || c == ']').split_whitespace() {
                        out.extend_from_slice(&n.parse::<i32>().expect("int literal").to_ne_bytes());
                    }
                }
                "'uint8'" => {
                    let quoted = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')).expect("char literal");
                    out.extend_from_slice(quoted.replace("''", "'").as_bytes());
                }
                other => unreachable!("unexpected precision {}", other),
            }
        }
        out
    }

    /// F3.1: The save wrapper writes the same prologue as the Rust writer.
    #[test]
    fn save_wrapper_prologue_matches_writer() {
        let schema = sample_schema();
        let sources = generate(&schema, schema.root_def().expect("root")).expect("generate");
        let prologue = replay_save_prologue(&sources.get("save_Sample.m").expect("save").contents);

        let bytes = stream::save(&schema, &sample()).expect("save");
        assert!(prologue.len() > 8);
        assert_eq!(&bytes[..prologue.len()], prologue.as_slice());

        // body starts right after: int32 id
        assert_eq!(&bytes[prologue.len()..prologue.len() + 4], &42i32.to_ne_bytes());
    }

    fn position(text: &str, needle: &str) -> usize {
        text.find(needle).unwrap_or_else(|| unreachable!("missing statement: {}", needle))
    }

    /// F3.2: Field statements follow the dictionary field order.
    #[test]
    fn sample_statements_in_layout_order() {
        let schema = sample_schema();
        let sources = generate(&schema, schema.root_def().expect("root")).expect("generate");

        let write = &sources.get("write_Sample.m").expect("write").contents;
        let order = [
            "fwrite(fid, v_id, 'int32');",
            "fwrite(fid, numel(b_label), 'int32');",
            "fwrite(fid, b_label, 'uint8');",
            "fwrite(fid, numel(v1_samples), 'int32');",
            "fwrite(fid, v1_samples, 'float64');",
        ];
        let positions: Vec<usize> = order.iter().map(|s| position(write, s)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        let read = &sources.get("read_Sample.m").expect("read").contents;
        let order = [
            "v_id = fread(fid, 1, 'int32=>double');",
            "if isequal(v_id, double(intmax('int32'))), v_id = []; end",
            "len_label = fread(fid, 1, 'int32=>double');",
            "n1_samples = fread(fid, 1, 'int32=>double');",
            "v1_samples = fread(fid, n1_samples, 'float64=>double');",
        ];
        let positions: Vec<usize> = order.iter().map(|s| position(read, s)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    /// F3.3: Preserved fields switch encoding tokens.
    #[test]
    fn preserve_precision_switches_tokens() {
        let schema = Schema::new().with_type(
            CompositeDef::new("Counts")
                .with(FieldDef::scalar("n", "int").preserving())
                .with(FieldDef::array("flags", "boolean", 1).preserving())
                .field("m", "long"),
        );
        let sources = generate(&schema, schema.get("Counts").expect("counts")).expect("generate");
        let read = &sources.get("read_Counts.m").expect("read").contents;
        assert!(read.contains("v_n = fread(fid, 1, 'int32=>int32');"));
        assert!(read.contains("'uint8=>logical'"));
        assert!(read.contains("v_m = fread(fid, 1, 'int64=>double');"));
    }
}

// =============================================================================
// TIER F4: CONTAINER OUTPUT
// =============================================================================

mod f4_container_output {
    use super::*;
    use persistable_core::container;
    use persistable_core::formats::mat::{self, HEADER_SIZE, MatHeader};

    /// F4.1: The container tree exports as an aligned MAT file.
    #[test]
    fn container_exports_as_mat() {
        let tree = container::save(&sample_schema(), &sample()).expect("container");
        let s = tree.as_struct().expect("root struct");
        assert_eq!(s.field_names(), ["id", "label", "samples"]);

        let header = MatHeader::new(chrono::DateTime::UNIX_EPOCH);
        let bytes = mat::to_bytes_with_header(&header, "s", &tree).expect("mat");
        assert_eq!(bytes.len() % 8, 0);
        MatHeader::from_bytes(&bytes[..HEADER_SIZE]).expect("header").validate().expect("valid");
    }

    /// F4.2: Subtype values are rejected by the container writer too.
    #[test]
    fn container_rejects_subtypes() {
        let schema = path_schema().with_type(CompositeDef::new("Point3").field("x", "double"));
        let root = Record::new("Path").with("points", Value::Array(vec![Record::new("Point3").into()]));
        assert!(matches!(
            container::save(&schema, &root),
            Err(PersistError::PolymorphicValue { .. })
        ));
    }
}
