// # Selectivity Engine
//
// Top-level predicate dispatch. The optimizer hands us the extraction
// function, the comparison operator, and the constant comparands; we
// encode the canonical key path, probe the bucket store, and combine the
// typed `(eq, lt, gt)` estimates under the operator's algebra.

use crate::error::{Result, StatsError};
use log::debug;
use std::cmp::Ordering;

use super::bucket::LookupResult;
use super::path::{encode_key_path, with_type_tag, TypeTag};
use super::primitive::Primitive;
use super::JsonHistogram;

/// Fallback scale for equality-class operators on unknown paths.
pub const FALLBACK_EQUALITY: f64 = 0.1;

/// Fallback scale for range-class operators on unknown paths.
pub const FALLBACK_RANGE: f64 = 0.3;

/// Fallback scale for `IS NULL` on unknown paths.
pub const FALLBACK_IS_NULL: f64 = 0.2;

/// Fallback scale for `IS NOT NULL` on unknown paths.
pub const FALLBACK_IS_NOT_NULL: f64 = 0.8;

/// Extraction function shape recognized by the engine.
///
/// `Unquote` covers both `col->>'$.path'` and the expanded
/// `JSON_UNQUOTE(JSON_EXTRACT(col, '$.path'))` the parser produces for
/// it; either way the quoting is stripped and the leaf type is certain.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonFunction {
    /// `JSON_EXTRACT(col, path)` / `col->path`: returns a JSON fragment,
    /// leaf type uncertain
    Extract(Vec<u8>),
    /// `JSON_UNQUOTE(JSON_EXTRACT(col, path))` / `col->>path`
    Unquote(Vec<u8>),
    /// `JSON_VALUE(col, path)`: unquoted scalar with SQL NULL on a
    /// missing path
    Value(Vec<u8>),
    /// Any other function: no statistics apply
    Other(String),
}

/// Optimizer-side expression node, the shape the host's predicate tree
/// hands to the statistics layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Reference to the JSON column the histogram describes
    Column(String),
    /// JSON path literal, e.g. `$.docs[0].name`
    PathLiteral(Vec<u8>),
    /// Named SQL function applied to sub-expressions
    Call(String, Vec<ExpressionNode>),
}

impl JsonFunction {
    pub fn extract(path: &str) -> Self {
        JsonFunction::Extract(path.as_bytes().to_vec())
    }

    pub fn unquote(path: &str) -> Self {
        JsonFunction::Unquote(path.as_bytes().to_vec())
    }

    pub fn value(path: &str) -> Self {
        JsonFunction::Value(path.as_bytes().to_vec())
    }

    /// Recognize the extraction shape of a predicate's function tree.
    ///
    /// `JSON_UNQUOTE(JSON_EXTRACT(col, path))` collapses to the
    /// type-certain unquoted form; a bare `JSON_EXTRACT` stays
    /// type-uncertain; `JSON_VALUE` keeps its own IS NULL semantics.
    /// Every other shape has no statistics.
    pub fn from_expression(node: &ExpressionNode) -> Result<JsonFunction> {
        let ExpressionNode::Call(name, args) = node else {
            return Err(StatsError::UnsupportedFunction(
                "predicate is not a function call".to_string(),
            ));
        };
        if name.eq_ignore_ascii_case("json_unquote") {
            return match args.first() {
                Some(ExpressionNode::Call(inner, inner_args))
                    if inner.eq_ignore_ascii_case("json_extract") =>
                {
                    Ok(JsonFunction::Unquote(extraction_path(inner_args)?))
                }
                _ => Err(StatsError::UnsupportedFunction(
                    "JSON_UNQUOTE without a nested JSON_EXTRACT".to_string(),
                )),
            };
        }
        if name.eq_ignore_ascii_case("json_extract") {
            return Ok(JsonFunction::Extract(extraction_path(args)?));
        }
        if name.eq_ignore_ascii_case("json_value") {
            return Ok(JsonFunction::Value(extraction_path(args)?));
        }
        Err(StatsError::UnsupportedFunction(name.clone()))
    }

    /// Whether the function strips JSON quoting, guaranteeing the leaf
    /// type matches the comparand.
    pub fn type_certain(&self) -> bool {
        matches!(self, JsonFunction::Unquote(_) | JsonFunction::Value(_))
    }

    fn path_expr(&self) -> Result<&[u8]> {
        match self {
            JsonFunction::Extract(p) | JsonFunction::Unquote(p) | JsonFunction::Value(p) => Ok(p),
            JsonFunction::Other(name) => Err(StatsError::UnsupportedFunction(name.clone())),
        }
    }
}

/// A single-path extraction takes the column and one path literal; the
/// histogram is keyed on the literal alone.
fn extraction_path(args: &[ExpressionNode]) -> Result<Vec<u8>> {
    match args {
        [ExpressionNode::Column(_), ExpressionNode::PathLiteral(path)] => Ok(path.clone()),
        _ => Err(StatsError::UnsupportedPath(
            "extraction must take a column and one path literal".to_string(),
        )),
    }
}

/// Comparison operators the engine estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Between,
    NotBetween,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Scale applied to `min_frequency` when the path has no bucket.
    pub fn fallback_scale(&self) -> f64 {
        match self {
            Operator::Eq | Operator::Neq | Operator::In | Operator::NotIn => FALLBACK_EQUALITY,
            Operator::Lt
            | Operator::Le
            | Operator::Gt
            | Operator::Ge
            | Operator::Between
            | Operator::NotBetween => FALLBACK_RANGE,
            Operator::IsNull => FALLBACK_IS_NULL,
            Operator::IsNotNull => FALLBACK_IS_NOT_NULL,
        }
    }
}

/// One resolved probe: the bucket's estimate plus its base frequency.
struct Probe {
    result: LookupResult,
    base: f64,
}

impl JsonHistogram {
    /// Estimate the fraction of rows satisfying `func(col) op comparands`.
    ///
    /// Returns an error when the function shape or path is unsupported or
    /// the comparands cannot be compared against the stored statistics;
    /// the optimizer treats an error as "no statistics" and applies its
    /// own static default without failing the query.
    pub fn selectivity(
        &self,
        func: &JsonFunction,
        op: Operator,
        comparands: &[Primitive],
    ) -> Result<f64> {
        let selectivity = match op {
            Operator::IsNull | Operator::IsNotNull => self.null_selectivity(func, op)?,
            Operator::Eq | Operator::Neq => {
                match self.probe(func, comparands.first())? {
                    Some(p) if op == Operator::Eq => p.result.eq,
                    Some(p) => p.base - p.result.eq,
                    None => self.path_fallback(func, op)?,
                }
            }
            Operator::Lt | Operator::Le => match self.probe(func, comparands.first())? {
                Some(p) => p.result.lt,
                None => self.path_fallback(func, op)?,
            },
            Operator::Gt | Operator::Ge => match self.probe(func, comparands.first())? {
                Some(p) => p.result.gt,
                None => self.path_fallback(func, op)?,
            },
            Operator::Between | Operator::NotBetween => {
                self.between_selectivity(func, op, comparands)?
            }
            Operator::In | Operator::NotIn => self.in_selectivity(func, op, comparands)?,
        };
        Ok(selectivity.clamp(0.0, 1.0))
    }

    /// Sum the distinct-value counts of the three type-tagged siblings of
    /// the function's path. `None` when no sibling carries statistics.
    pub fn ndv(&self, func: &JsonFunction) -> Option<i64> {
        let path_expr = func.path_expr().ok()?;
        let bare = encode_key_path(path_expr, None, false).ok()?;
        let mut total: Option<i64> = None;
        for tag in [TypeTag::Num, TypeTag::Bool, TypeTag::Str] {
            if let Some(bucket) = self.find(&with_type_tag(&bare, tag)) {
                if let Some(n) = bucket.ndv {
                    total = Some(total.unwrap_or(0) + n);
                }
            }
        }
        total
    }

    /// Encode, find, and consult the bucket for one comparand. A typed
    /// lookup needs both a constant comparand and a type-certain function
    /// context; everything else degrades to the untyped estimate on the
    /// untagged path.
    fn probe(&self, func: &JsonFunction, comparand: Option<&Primitive>) -> Result<Option<Probe>> {
        let path_expr = func.path_expr()?;
        match comparand {
            Some(value) if func.type_certain() => {
                let key = encode_key_path(path_expr, Some(value.value_type()), true)?;
                match self.find(&key) {
                    Some(bucket) => Ok(Some(Probe {
                        result: bucket.lookup(value)?,
                        base: bucket.base_frequency(),
                    })),
                    None => Ok(None),
                }
            }
            _ => {
                let key = encode_key_path(path_expr, None, false)?;
                match self.find(&key) {
                    Some(bucket) => Ok(Some(Probe {
                        result: bucket.heuristic_lookup(),
                        base: bucket.base_frequency(),
                    })),
                    None => Ok(None),
                }
            }
        }
    }

    fn path_fallback(&self, func: &JsonFunction, op: Operator) -> Result<f64> {
        let path_expr = func.path_expr()?;
        debug!(
            "no statistics for path '{}', falling back to {} * {}",
            String::from_utf8_lossy(path_expr),
            self.min_frequency,
            op.fallback_scale()
        );
        Ok(self.min_frequency * op.fallback_scale())
    }

    fn between_selectivity(
        &self,
        func: &JsonFunction,
        op: Operator,
        comparands: &[Primitive],
    ) -> Result<f64> {
        let [low, high] = comparands else {
            return Err(StatsError::TypeMismatch(format!(
                "BETWEEN requires two comparands, got {}",
                comparands.len()
            )));
        };
        match low.compare(high) {
            None => {
                return Err(StatsError::TypeMismatch(format!(
                    "BETWEEN bounds {} and {} are not comparable",
                    low.type_name(),
                    high.type_name()
                )))
            }
            Some(ordering) => debug_assert_ne!(
                ordering,
                Ordering::Greater,
                "BETWEEN bounds must satisfy low <= high"
            ),
        }

        let (Some(low_probe), Some(high_probe)) =
            (self.probe(func, Some(low))?, self.probe(func, Some(high))?)
        else {
            return self.path_fallback(func, op);
        };
        let base = low_probe.base.max(high_probe.base);
        let raw = 1.0 - low_probe.result.lt - high_probe.result.gt;
        match op {
            Operator::Between => Ok(raw.clamp(0.0, base)),
            _ => Ok((base - raw).clamp(0.0, base)),
        }
    }

    fn in_selectivity(
        &self,
        func: &JsonFunction,
        op: Operator,
        comparands: &[Primitive],
    ) -> Result<f64> {
        let mut sum = 0.0;
        let mut base: Option<f64> = None;
        for value in comparands {
            match self.probe(func, Some(value))? {
                Some(probe) => {
                    sum += probe.result.eq;
                    base = Some(base.map_or(probe.base, |b: f64| b.max(probe.base)));
                }
                None => sum += self.min_frequency * FALLBACK_EQUALITY,
            }
        }
        let in_selectivity = match base {
            Some(base) => sum.min(base),
            None => sum,
        };
        match op {
            Operator::In => Ok(in_selectivity),
            _ => match base {
                Some(base) => Ok((base - in_selectivity).max(0.0)),
                None => Ok(self.min_frequency * FALLBACK_EQUALITY),
            },
        }
    }

    /// `IS NULL` / `IS NOT NULL` on the untagged path.
    ///
    /// `JSON_VALUE` yields SQL NULL for a missing path *or* a JSON null
    /// leaf, so its null fraction is everything outside the bucket's base
    /// frequency. The extraction operators yield SQL NULL only when the
    /// path does not resolve at all.
    fn null_selectivity(&self, func: &JsonFunction, op: Operator) -> Result<f64> {
        let path_expr = func.path_expr()?;
        let key = encode_key_path(path_expr, None, false)?;
        let Some(bucket) = self.find(&key) else {
            return self.path_fallback(func, op);
        };
        let not_null = match func {
            JsonFunction::Value(_) => bucket.base_frequency(),
            _ => bucket.frequency,
        };
        match op {
            Operator::IsNull => Ok(1.0 - not_null),
            _ => Ok(not_null),
        }
    }
}
