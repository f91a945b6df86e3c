//! MATLAB token tables and statement emitters.
//!
//! Every emitter mirrors one rule of the binary layout; the generator only
//! decides which emitter to call for which field.

use crate::PrimitiveKind;

// =============================================================================
// CODE BUFFER
// =============================================================================

/// Indented MATLAB source under construction.
#[derive(Debug, Default)]
pub struct Code {
    text: String,
    depth: usize,
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if !line.is_empty() {
            for _ in 0..self.depth {
                self.text.push_str("    ");
            }
            self.text.push_str(line);
        }
        self.text.push('\n');
    }

    pub fn blank(&mut self) {
        self.text.push('\n');
    }

    /// Emit `line` and indent what follows.
    pub fn open(&mut self, line: impl AsRef<str>) {
        self.line(line);
        self.depth += 1;
    }

    /// Emit `line` at the enclosing level and keep the body indented
    /// (`else`, `elseif`).
    pub fn branch(&mut self, line: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(line);
        self.depth += 1;
    }

    /// Dedent and emit `line`.
    pub fn close(&mut self, line: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(line);
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

// =============================================================================
// TOKENS
// =============================================================================

/// `fread`/`fwrite` precision of a kind's stored form.
pub fn precision(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::Boolean | PrimitiveKind::Char => "uint8",
        PrimitiveKind::Byte => "int8",
        PrimitiveKind::Short => "int16",
        PrimitiveKind::Int => "int32",
        PrimitiveKind::Long => "int64",
        PrimitiveKind::Float => "float32",
        PrimitiveKind::Double => "float64",
        // text payloads are raw bytes
        PrimitiveKind::String | PrimitiveKind::Date | PrimitiveKind::Enum => "uint8",
    }
}

/// MATLAB class holding a kind at native width.
fn native_class(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::Boolean => "logical",
        PrimitiveKind::Byte => "int8",
        PrimitiveKind::Short => "int16",
        PrimitiveKind::Int => "int32",
        PrimitiveKind::Long => "int64",
        PrimitiveKind::Float => "single",
        PrimitiveKind::Double => "double",
        PrimitiveKind::Char | PrimitiveKind::String | PrimitiveKind::Date | PrimitiveKind::Enum => "char",
    }
}

/// `fread` token for array payloads: `'int32=>double'` when promoting,
/// `'int32=>int32'` when preserving. Chars always read as `char`.
pub fn array_read_token(kind: PrimitiveKind, preserve: bool) -> String {
    let target = if preserve || kind == PrimitiveKind::Char {
        native_class(kind)
    } else {
        "double"
    };
    format!("{}=>{}", precision(kind), target)
}

/// `fread` token for scalars. Preserved booleans are read as `uint8` so
/// the sentinel survives until it has been checked.
pub fn scalar_read_token(kind: PrimitiveKind, preserve: bool) -> String {
    if preserve && kind == PrimitiveKind::Boolean {
        return "uint8=>uint8".to_string();
    }
    array_read_token(kind, preserve)
}

/// Sentinel as compared against a freshly read scalar.
pub fn sentinel_read_literal(kind: PrimitiveKind, preserve: bool) -> &'static str {
    match (kind, preserve) {
        (PrimitiveKind::Boolean, _) => "2",
        (PrimitiveKind::Byte | PrimitiveKind::Short, _) => "-1",
        (PrimitiveKind::Char, _) => "255",
        (PrimitiveKind::Int, true) => "intmax('int32')",
        (PrimitiveKind::Int, false) => "double(intmax('int32'))",
        (PrimitiveKind::Long, true) => "intmax('int64')",
        (PrimitiveKind::Long, false) => "double(intmax('int64'))",
        (PrimitiveKind::Float, true) => "realmax('single')",
        (PrimitiveKind::Float, false) => "double(realmax('single'))",
        (PrimitiveKind::Double, _) => "realmax",
        (PrimitiveKind::String | PrimitiveKind::Date | PrimitiveKind::Enum, _) => "''",
    }
}

/// Sentinel substituted for an empty scalar before writing.
pub fn sentinel_write_literal(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::Boolean => "2",
        PrimitiveKind::Byte | PrimitiveKind::Short => "-1",
        PrimitiveKind::Char => "char(255)",
        PrimitiveKind::Int => "intmax('int32')",
        PrimitiveKind::Long => "intmax('int64')",
        PrimitiveKind::Float => "realmax('single')",
        PrimitiveKind::Double => "realmax",
        PrimitiveKind::String | PrimitiveKind::Date | PrimitiveKind::Enum => "''",
    }
}

// =============================================================================
// LITERALS & IDENTIFIERS
// =============================================================================

/// True if `name` is a valid MATLAB identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 63
}

/// Literal whose `fwrite(..., 'uint8')` emits exactly the UTF-8 bytes of `s`.
pub fn byte_literal(s: &str) -> String {
    if s.bytes().all(|b| (0x20..0x7F).contains(&b)) {
        format!("'{}'", s.replace('\'', "''"))
    } else {
        let bytes: Vec<String> = s.bytes().map(|b| b.to_string()).collect();
        format!("uint8([{}])", bytes.join(" "))
    }
}

// =============================================================================
// TEXT
// =============================================================================

/// Read a length-prefixed UTF-8 string into `target`.
pub fn read_text(c: &mut Code, target: &str, suffix: &str) {
    c.line(format!("len_{suffix} = fread(fid, 1, 'int32=>double');"));
    c.line(format!(
        "{target} = native2unicode(fread(fid, [1 len_{suffix}], 'uint8=>uint8'), 'UTF-8');"
    ));
}

/// Write `source` as a length-prefixed UTF-8 string. Empty values give
/// length 0.
pub fn write_text(c: &mut Code, source: &str, suffix: &str) {
    c.line(format!("b_{suffix} = unicode2native(char({source}), 'UTF-8');"));
    c.line(format!("fwrite(fid, numel(b_{suffix}), 'int32');"));
    c.line(format!("fwrite(fid, b_{suffix}, 'uint8');"));
}

// =============================================================================
// SCALARS
// =============================================================================

pub fn read_scalar(c: &mut Code, field: &str, kind: PrimitiveKind, preserve: bool) {
    if kind.is_textual() {
        read_text(c, &format!("s.{field}"), field);
        return;
    }
    let v = format!("v_{field}");
    let sentinel = sentinel_read_literal(kind, preserve);
    c.line(format!("{v} = fread(fid, 1, '{}');", scalar_read_token(kind, preserve)));
    match kind {
        PrimitiveKind::Char => c.line(format!("if isequal(double({v}), {sentinel}), {v} = []; end")),
        PrimitiveKind::Boolean if preserve => {
            c.line(format!("if isequal({v}, {sentinel}), {v} = []; else {v} = logical({v}); end"));
        }
        _ => c.line(format!("if isequal({v}, {sentinel}), {v} = []; end")),
    }
    c.line(format!("s.{field} = {v};"));
}

pub fn write_scalar(c: &mut Code, field: &str, kind: PrimitiveKind) {
    if kind.is_textual() {
        write_text(c, &format!("s.{field}"), field);
        return;
    }
    let v = format!("v_{field}");
    c.line(format!("{v} = s.{field};"));
    c.line(format!("if isempty({v}), {v} = {}; end", sentinel_write_literal(kind)));
    c.line(format!("fwrite(fid, {v}, '{}');", precision(kind)));
}

// =============================================================================
// ARRAYS
// =============================================================================

/// Innermost element of an array field.
#[derive(Debug, Clone, Copy)]
pub enum Element<'a> {
    /// Numeric, boolean or char payload.
    Numeric { kind: PrimitiveKind, preserve: bool },
    /// Strings, dates and enums: cells of char rows.
    Text,
    /// Composite elements, handled by `read_<ident>`/`write_<ident>`.
    Composite(&'a str),
}

impl Element<'_> {
    fn empty(&self) -> &'static str {
        match self {
            Element::Text => "{}",
            _ => "[]",
        }
    }
}

/// Read an array of `dims` dimensions into `s.<field>`.
pub fn read_array(c: &mut Code, field: &str, dims: u32, element: Element<'_>) {
    read_level(c, field, 1, dims, element);
    c.line(format!("s.{field} = v1_{field};"));
}

fn read_level(c: &mut Code, f: &str, k: u32, dims: u32, element: Element<'_>) {
    let n = format!("n{k}_{f}");
    let v = format!("v{k}_{f}");
    let i = format!("i{k}_{f}");

    c.line(format!("{n} = fread(fid, 1, 'int32=>double');"));
    c.open(format!("if {n} == 0"));
    c.line(format!("{v} = {};", element.empty()));
    c.branch("else");

    if k == dims {
        match element {
            Element::Numeric {
                kind: PrimitiveKind::Char,
                ..
            } => c.line(format!("{v} = fread(fid, [1 {n}], 'uint8=>char');")),
            Element::Numeric { kind, preserve } => {
                c.line(format!("{v} = fread(fid, {n}, '{}');", array_read_token(kind, preserve)));
            }
            Element::Text => {
                c.line(format!("{v} = cell(1, {n});"));
                c.open(format!("for {i} = 1:{n}"));
                read_text(c, &format!("{v}{{{i}}}"), f);
                c.close("end");
            }
            Element::Composite(ident) => {
                c.open(format!("for {i} = 1:{n}"));
                c.line(format!("e_{f} = read_{ident}(fid);"));
                c.open(format!("if {i} == 1"));
                c.line(format!("{v} = repmat(e_{f}, 1, {n});"));
                c.branch("else");
                c.line(format!("{v}({i}) = e_{f};"));
                c.close("end");
                c.close("end");
            }
        }
    } else {
        let inner = format!("v{}_{f}", k + 1);
        let text = matches!(element, Element::Text);
        if text {
            c.line(format!("{v} = cell(1, {n});"));
        } else {
            c.line(format!("{v} = repmat(struct('array', []), 1, {n});"));
        }
        c.open(format!("for {i} = 1:{n}"));
        read_level(c, f, k + 1, dims, element);
        if text {
            c.line(format!("{v}{{{i}}} = {inner};"));
        } else {
            c.line(format!("{v}({i}).array = {inner};"));
        }
        c.close("end");
    }
    c.close("end");
}

/// Write `s.<field>` as an array of `dims` dimensions.
pub fn write_array(c: &mut Code, field: &str, dims: u32, element: Element<'_>) {
    c.line(format!("v1_{field} = s.{field};"));
    write_level(c, field, 1, dims, element);
}

fn write_level(c: &mut Code, f: &str, k: u32, dims: u32, element: Element<'_>) {
    let v = format!("v{k}_{f}");
    let i = format!("i{k}_{f}");

    c.line(format!("fwrite(fid, numel({v}), 'int32');"));
    if k == dims {
        match element {
            Element::Numeric { kind, .. } => {
                c.open(format!("if ~isempty({v})"));
                c.line(format!("fwrite(fid, {v}, '{}');", precision(kind)));
                c.close("end");
            }
            Element::Text => {
                c.open(format!("for {i} = 1:numel({v})"));
                write_text(c, &format!("{v}{{{i}}}"), f);
                c.close("end");
            }
            Element::Composite(ident) => {
                c.open(format!("for {i} = 1:numel({v})"));
                c.line(format!("write_{ident}(fid, {v}({i}));"));
                c.close("end");
            }
        }
    } else {
        let inner = format!("v{}_{f}", k + 1);
        c.open(format!("for {i} = 1:numel({v})"));
        if matches!(element, Element::Text) {
            c.line(format!("{inner} = {v}{{{i}}};"));
        } else {
            c.line(format!("{inner} = {v}({i}).array;"));
        }
        write_level(c, f, k + 1, dims, element);
        c.close("end");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_switch_with_precision_mode() {
        assert_eq!(array_read_token(PrimitiveKind::Int, false), "int32=>double");
        assert_eq!(array_read_token(PrimitiveKind::Int, true), "int32=>int32");
        assert_eq!(array_read_token(PrimitiveKind::Boolean, true), "uint8=>logical");
        assert_eq!(array_read_token(PrimitiveKind::Char, false), "uint8=>char");
        assert_eq!(array_read_token(PrimitiveKind::Float, true), "float32=>single");
        assert_eq!(scalar_read_token(PrimitiveKind::Boolean, true), "uint8=>uint8");
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("Point3d"));
        assert!(is_identifier("a_b"));
        assert!(!is_identifier("_a"));
        assert!(!is_identifier("3d"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(&"x".repeat(64)));
    }

    #[test]
    fn byte_literals() {
        assert_eq!(byte_literal("Point"), "'Point'");
        assert_eq!(byte_literal("it's"), "'it''s'");
        assert_eq!(byte_literal("é"), "uint8([195 169])");
    }

    #[test]
    fn nested_array_read_uses_array_field_and_guards() {
        let mut c = Code::new();
        read_array(&mut c, "grid", 2, Element::Numeric {
            kind: PrimitiveKind::Double,
            preserve: false,
        });
        let text = c.into_string();
        assert!(text.contains("n1_grid = fread(fid, 1, 'int32=>double');"));
        assert!(text.contains("v1_grid = repmat(struct('array', []), 1, n1_grid);"));
        assert!(text.contains("v2_grid = fread(fid, n2_grid, 'float64=>double');"));
        assert!(text.contains("v1_grid(i1_grid).array = v2_grid;"));
        assert_eq!(text.matches("if n").count(), 2);
        assert_eq!(text.matches("end\n").count(), 3);
    }
}
