// # Canonical Key-Path Encoder
//
// Rewrites a JSON path literal plus its function context into the byte
// string that keys the bucket store. The key encodes structural shape:
// each non-terminal step carries `_obj` or `_arr` according to how the
// *next* step descends, and the terminal step carries a type tag when the
// surrounding function guarantees the leaf type. Wildcards, recursive
// descent, and filter expressions have no canonical shape and are
// rejected.

use crate::error::{Result, StatsError};

use super::primitive::ValueType;

/// Separator between encoded steps.
pub const KEY_SEPARATOR: u8 = b'.';

/// Separator before a structure or type tag within a step.
pub const TYPE_SEPARATOR: u8 = b'_';

const OBJ_TAG: &[u8] = b"obj";
const ARR_TAG: &[u8] = b"arr";

/// Terminal type tag of a canonical key path. Int and Float share `num`:
/// a numeric leaf's precise width is not part of the structural shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Num,
    Bool,
    Str,
}

impl TypeTag {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            TypeTag::Num => b"num",
            TypeTag::Bool => b"bool",
            TypeTag::Str => b"str",
        }
    }

    /// Tag for a comparand type, if it has one.
    pub fn for_value_type(value_type: ValueType) -> Option<TypeTag> {
        match value_type {
            ValueType::Int | ValueType::Float => Some(TypeTag::Num),
            ValueType::Bool => Some(TypeTag::Bool),
            ValueType::String => Some(TypeTag::Str),
            ValueType::Unknown => None,
        }
    }
}

/// Encode a path expression into a canonical lookup key.
///
/// `comparand_type` and `type_certain` together decide the terminal type
/// tag: the tag is appended only when the function context strips JSON
/// quoting (so the leaf type is guaranteed) and the comparand is typed.
pub fn encode_key_path(
    path_expr: &[u8],
    comparand_type: Option<ValueType>,
    type_certain: bool,
) -> Result<Vec<u8>> {
    PathEncoder::new(path_expr).encode(comparand_type, type_certain)
}

/// Single-pass encoder over a raw `$.a.b[0]` expression.
pub struct PathEncoder<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> PathEncoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, position: 0 }
    }

    pub fn encode(
        mut self,
        comparand_type: Option<ValueType>,
        type_certain: bool,
    ) -> Result<Vec<u8>> {
        if self.input.len() < 2 {
            return Err(self.unsupported("path too short"));
        }
        if self.input[0] != b'$' {
            return Err(self.unsupported("path must start with $"));
        }
        self.position = 1;

        let mut out = Vec::with_capacity(self.input.len() + 8);
        loop {
            let step = match self.current() {
                Some(b'.') => {
                    self.position += 1;
                    self.parse_member()?
                }
                Some(b'[') => self.parse_index()?,
                _ => return Err(self.unsupported("expected '.' or '[' step")),
            };

            match self.current() {
                Some(b'.') => {
                    out.extend_from_slice(step);
                    out.push(TYPE_SEPARATOR);
                    out.extend_from_slice(OBJ_TAG);
                    out.push(KEY_SEPARATOR);
                }
                Some(b'[') => {
                    out.extend_from_slice(step);
                    out.push(TYPE_SEPARATOR);
                    out.extend_from_slice(ARR_TAG);
                    out.push(KEY_SEPARATOR);
                }
                Some(_) => return Err(self.unsupported("unexpected character after step")),
                None => {
                    out.extend_from_slice(step);
                    if type_certain {
                        if let Some(tag) = comparand_type.and_then(TypeTag::for_value_type) {
                            out.push(TYPE_SEPARATOR);
                            out.extend_from_slice(tag.as_bytes());
                        }
                    }
                    return Ok(out);
                }
            }
        }
    }

    fn current(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn parse_member(&mut self) -> Result<&'a [u8]> {
        let start = self.position;
        while let Some(c) = self.current() {
            match c {
                b'.' | b'[' => break,
                b'*' | b'"' | b']' | b'?' => {
                    return Err(self.unsupported("unsupported path syntax"));
                }
                _ => self.position += 1,
            }
        }
        if self.position == start {
            return Err(self.unsupported("empty member step"));
        }
        Ok(&self.input[start..self.position])
    }

    fn parse_index(&mut self) -> Result<&'a [u8]> {
        // positioned at '['
        self.position += 1;
        let start = self.position;
        while let Some(c) = self.current() {
            if c == b']' {
                break;
            }
            if !c.is_ascii_digit() {
                return Err(self.unsupported("array index must be a non-negative integer"));
            }
            self.position += 1;
        }
        if self.current() != Some(b']') {
            return Err(self.unsupported("unclosed bracket"));
        }
        if self.position == start {
            return Err(self.unsupported("empty array index"));
        }
        let token = &self.input[start..self.position];
        self.position += 1;
        Ok(token)
    }

    fn unsupported(&self, reason: &str) -> StatsError {
        StatsError::UnsupportedPath(format!(
            "{} at offset {} in '{}'",
            reason,
            self.position,
            String::from_utf8_lossy(self.input)
        ))
    }
}

/// Split a canonical key path into its bare path and terminal type tag.
pub fn strip_type_tag(key_path: &[u8]) -> (&[u8], Option<TypeTag>) {
    let last_step_start = key_path
        .iter()
        .rposition(|&c| c == KEY_SEPARATOR)
        .map(|i| i + 1)
        .unwrap_or(0);
    let last_step = &key_path[last_step_start..];
    if let Some(sep) = last_step.iter().rposition(|&c| c == TYPE_SEPARATOR) {
        let tag = match &last_step[sep + 1..] {
            b"num" => Some(TypeTag::Num),
            b"bool" => Some(TypeTag::Bool),
            b"str" => Some(TypeTag::Str),
            _ => None,
        };
        if tag.is_some() {
            return (&key_path[..last_step_start + sep], tag);
        }
    }
    (key_path, None)
}

/// Append a type tag to a bare canonical path.
pub fn with_type_tag(bare: &[u8], tag: TypeTag) -> Vec<u8> {
    let mut out = Vec::with_capacity(bare.len() + 5);
    out.extend_from_slice(bare);
    out.push(TYPE_SEPARATOR);
    out.extend_from_slice(tag.as_bytes());
    out
}
