// # Key-Path Buckets
//
// Per-path statistics: how often a canonical key path resolves, how often
// it resolves to JSON null, the value range at the leaf, and an optional
// nested sub-histogram over the leaf values.

use crate::error::{Result, StatsError};
use std::cmp::Ordering;

use super::primitive::{Primitive, ValueType};
use super::subhistogram::{SubHistogram, DEFAULT_EQ_FRACTION, DEFAULT_RANGE_FRACTION};

/// Typed lookup estimate. The three fields are independently meaningful
/// row fractions; they are not required to sum to anything.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LookupResult {
    /// Fraction of rows where the extracted value equals the comparand
    pub eq: f64,
    /// Fraction of rows where the extracted value is less than the comparand
    pub lt: f64,
    /// Fraction of rows where the extracted value is greater than the comparand
    pub gt: f64,
}

/// Statistics for one canonical key path.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPathBucket {
    /// Canonical encoded path, e.g. `docs_arr.0_obj.datetime_num`
    pub key_path: Vec<u8>,
    /// Fraction of rows where this path resolves
    pub frequency: f64,
    /// Of those rows, fraction where the path resolves to JSON null
    pub null_values: f64,
    /// Domain of leaf values at this path
    pub value_type: ValueType,
    /// Inclusive lower bound; present iff `max_val` is present
    pub min_val: Option<Primitive>,
    /// Inclusive upper bound; present iff `min_val` is present
    pub max_val: Option<Primitive>,
    /// Number of distinct non-null values along this path
    pub ndv: Option<i64>,
    /// Nested per-value histogram
    pub sub: Option<SubHistogram>,
}

impl KeyPathBucket {
    /// The largest contribution this bucket can make to any predicate:
    /// rows where the path resolves to a non-null value.
    pub fn base_frequency(&self) -> f64 {
        self.frequency * (1.0 - self.null_values)
    }

    /// Key path as lossy UTF-8, for diagnostics.
    pub fn key_path_str(&self) -> String {
        String::from_utf8_lossy(&self.key_path).into_owned()
    }

    /// Typed lookup: estimate `(eq, lt, gt)` for one comparand.
    ///
    /// Integer comparands promote against float buckets; integral float
    /// comparands truncate against integer buckets. Any other domain
    /// mismatch is an error, which the selectivity engine surfaces to the
    /// optimizer as "no usable statistics".
    pub fn lookup(&self, value: &Primitive) -> Result<LookupResult> {
        let base = self.base_frequency();
        match (self.value_type, value) {
            (ValueType::Unknown, _) => Ok(self.heuristic_lookup()),
            (ValueType::Bool, Primitive::Bool(b)) => Ok(self.lookup_bool(*b, base)),
            (ValueType::Int, Primitive::Int(_))
            | (ValueType::Float, Primitive::Float(_))
            | (ValueType::String, Primitive::Str(_)) => self.lookup_ordered(value, base),
            (ValueType::Float, Primitive::Int(i)) => {
                self.lookup_ordered(&Primitive::Float(*i as f64), base)
            }
            (ValueType::Int, Primitive::Float(f)) => self.lookup_int_with_float(*f, base),
            _ => Err(StatsError::TypeMismatch(format!(
                "{} comparand against {:?} bucket '{}'",
                value.type_name(),
                self.value_type,
                self.key_path_str()
            ))),
        }
    }

    /// Untyped estimate, used when the comparand's type (and therefore
    /// the sub-histogram's domain) cannot be trusted.
    pub fn heuristic_lookup(&self) -> LookupResult {
        let base = self.base_frequency();
        let eq = match self.ndv {
            Some(ndv) => base / ndv.max(1) as f64,
            None => base * DEFAULT_EQ_FRACTION,
        };
        if self.value_type == ValueType::Bool {
            return LookupResult { eq, lt: 0.0, gt: 0.0 };
        }
        LookupResult {
            eq,
            lt: base * DEFAULT_RANGE_FRACTION,
            gt: base * DEFAULT_RANGE_FRACTION,
        }
    }

    /// Lookup over an ordered domain (int, float, string), comparand
    /// already coerced into the bucket's domain.
    fn lookup_ordered(&self, value: &Primitive, base: f64) -> Result<LookupResult> {
        // Range pre-filter against the bucket bounds.
        if let (Some(min), Some(max)) = (&self.min_val, &self.max_val) {
            if min.compare(value) == Some(Ordering::Greater) {
                return Ok(LookupResult { eq: 0.0, lt: 0.0, gt: base });
            }
            if max.compare(value) == Some(Ordering::Less) {
                return Ok(LookupResult { eq: 0.0, lt: base, gt: 0.0 });
            }
        }

        if let Some(sub) = &self.sub {
            return self.lookup_sub(sub, value, base);
        }

        // No sub-histogram: distinct-count heuristics, pinned at the
        // bucket bounds so lt(min) and gt(max) vanish.
        let eq = match self.ndv {
            Some(ndv) => base / ndv.max(1) as f64,
            None => base * DEFAULT_EQ_FRACTION,
        };
        let at_min = self
            .min_val
            .as_ref()
            .map(|m| m.compare(value) == Some(Ordering::Equal))
            .unwrap_or(false);
        let at_max = self
            .max_val
            .as_ref()
            .map(|m| m.compare(value) == Some(Ordering::Equal))
            .unwrap_or(false);
        let lt = if at_min {
            0.0
        } else if at_max {
            base - eq
        } else {
            base * DEFAULT_RANGE_FRACTION
        };
        let gt = if at_max {
            0.0
        } else if at_min {
            base - eq
        } else {
            base * DEFAULT_RANGE_FRACTION
        };
        Ok(LookupResult { eq, lt, gt })
    }

    fn lookup_sub(&self, sub: &SubHistogram, value: &Primitive, base: f64) -> Result<LookupResult> {
        match (sub, value) {
            (SubHistogram::Int(h), Primitive::Int(i)) => Ok(h.lookup(i, base)),
            (SubHistogram::Float(h), Primitive::Float(f)) => Ok(h.lookup(f, base)),
            (SubHistogram::Str(h), Primitive::Str(s)) => Ok(h.lookup(s, base)),
            _ => Err(StatsError::TypeMismatch(format!(
                "sub-histogram domain {:?} does not match comparand {} in bucket '{}'",
                sub.value_type(),
                value.type_name(),
                self.key_path_str()
            ))),
        }
    }

    /// Integer bucket probed with a float comparand. Integral floats
    /// truncate and re-dispatch; non-integral floats can never match, and
    /// their `lt`/`gt` come from the truncated value with the half-open
    /// adjustment (`x < 2.5` is `x <= 2`; `x < -2.5` is `x < -2`).
    fn lookup_int_with_float(&self, f: f64, base: f64) -> Result<LookupResult> {
        if f.is_nan() {
            return Err(StatsError::TypeMismatch(format!(
                "NaN comparand against bucket '{}'",
                self.key_path_str()
            )));
        }
        if f > i64::MAX as f64 {
            return Ok(LookupResult { eq: 0.0, lt: base, gt: 0.0 });
        }
        if f < i64::MIN as f64 {
            return Ok(LookupResult { eq: 0.0, lt: 0.0, gt: base });
        }
        let truncated = f.trunc() as i64;
        if f == f.trunc() {
            return self.lookup_ordered(&Primitive::Int(truncated), base);
        }
        let r = self.lookup_ordered(&Primitive::Int(truncated), base)?;
        if f > truncated as f64 {
            Ok(LookupResult { eq: 0.0, lt: r.lt + r.eq, gt: r.gt })
        } else {
            Ok(LookupResult { eq: 0.0, lt: r.lt, gt: r.gt + r.eq })
        }
    }

    /// Boolean buckets never use equi-height statistics and have no
    /// meaningful ordering: `lt` and `gt` are always zero.
    fn lookup_bool(&self, b: bool, base: f64) -> LookupResult {
        let eq = if let Some(SubHistogram::Bool(h)) = &self.sub {
            h.lookup(&b, base).eq
        } else if let (Some(min), Some(max)) = (&self.min_val, &self.max_val) {
            if min == max {
                if min.compare(&Primitive::Bool(b)) == Some(Ordering::Equal) {
                    base
                } else {
                    0.0
                }
            } else {
                base / self.ndv.unwrap_or(2).max(1) as f64
            }
        } else {
            base * DEFAULT_EQ_FRACTION
        };
        LookupResult { eq, lt: 0.0, gt: 0.0 }
    }
}
