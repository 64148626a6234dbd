// # Histogram JSON Codec
//
// Serialization to and from the catalog wire form. Buckets travel as
// positional JSON arrays of arity 3, 5, 6, or 7; key paths and string
// bounds are base64-encoded byte strings. Deserialization is the only
// phase that mutates a histogram: it validates every node and
// short-circuits with the offending node's context on the first error.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use serde_json::{json, Map, Value};

use crate::collation::CollationId;
use crate::error::{Result, StatsError};

use super::bucket::KeyPathBucket;
use super::path::{strip_type_tag, TypeTag};
use super::primitive::{BucketString, Primitive, ValueType};
use super::subhistogram::{EquiHeightBucket, InnerHistogram, SingletonBucket, SubHistogram};
use super::{DataType, JsonHistogram};

/// Discriminator in the serialized form.
pub const HISTOGRAM_TYPE: &str = "json-flex";

/// Upper bound on outer buckets accepted from the catalog.
pub const MAX_KEY_PATH_BUCKETS: usize = 16 * 1024;

/// Upper bound on inner buckets per sub-histogram.
pub const MAX_SUB_HISTOGRAM_BUCKETS: usize = 1024;

/// Slack allowed when frequencies must sum to 1.0.
const TOTAL_FREQUENCY_TOLERANCE: f64 = 1e-6;

/// Threshold above which a singleton histogram counts as saturated.
const SATURATION_TOLERANCE: f64 = 1e-9;

impl JsonHistogram {
    /// Serialize into the catalog wire form.
    pub fn to_json(&self) -> Value {
        json!({
            "histogram-type": HISTOGRAM_TYPE,
            "data-type": self.data_type.as_str(),
            "null-values": self.null_fraction,
            "last-updated": self.last_updated.to_rfc3339_opts(SecondsFormat::Micros, true),
            "number-of-buckets-specified": self.buckets_specified,
            "collation-id": self.collation_id,
            "sampling-rate": self.sampling_rate,
            "buckets": self.buckets.iter().map(bucket_to_json).collect::<Vec<_>>(),
        })
    }

    /// Deserialize from the catalog wire form. The result carries empty
    /// identity fields; chain [`JsonHistogram::with_identity`] to name
    /// the column.
    pub fn from_json(value: &Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| StatsError::WrongJsonType("histogram root".to_string()))?;

        let histogram_type = get_str(root, "histogram-type")?;
        if histogram_type != HISTOGRAM_TYPE {
            return Err(StatsError::WrongJsonType(format!(
                "histogram-type '{}'",
                histogram_type
            )));
        }
        let data_type = DataType::parse(get_str(root, "data-type")?)
            .ok_or_else(|| StatsError::WrongJsonType("data-type".to_string()))?;
        let null_fraction = get_fraction(root, "null-values")?;
        let last_updated = DateTime::parse_from_rfc3339(get_str(root, "last-updated")?)
            .map_err(|_| StatsError::WrongJsonType("last-updated".to_string()))?
            .with_timezone(&Utc);
        let buckets_specified = get_u32(root, "number-of-buckets-specified")?;
        let collation_id = get_u32(root, "collation-id")? as CollationId;
        let sampling_rate = get_fraction(root, "sampling-rate")?;

        let bucket_values = get_attr(root, "buckets")?
            .as_array()
            .ok_or_else(|| StatsError::WrongJsonType("buckets".to_string()))?;
        if bucket_values.len() > MAX_KEY_PATH_BUCKETS {
            return Err(StatsError::OutOfMemory(format!(
                "{} buckets exceed the {} bucket limit",
                bucket_values.len(),
                MAX_KEY_PATH_BUCKETS
            )));
        }

        let mut buckets = Vec::with_capacity(bucket_values.len());
        let mut min_frequency = 1.0f64;
        for (index, bucket_value) in bucket_values.iter().enumerate() {
            let context = format!("buckets[{}]", index);
            let bucket = parse_bucket(bucket_value, &context, collation_id)?;
            min_frequency = min_frequency.min(bucket.frequency);
            buckets.push(bucket);
        }

        debug!(
            "deserialized json histogram: {} buckets, min_frequency {}",
            buckets.len(),
            min_frequency
        );

        Ok(Self {
            database: String::new(),
            table: String::new(),
            column: String::new(),
            data_type,
            null_fraction,
            last_updated,
            buckets_specified,
            collation_id,
            sampling_rate,
            min_frequency,
            buckets,
        })
    }
}

// ============================================================================
// Serialization
// ============================================================================

fn bucket_to_json(bucket: &KeyPathBucket) -> Value {
    let mut parts = vec![
        Value::String(general_purpose::STANDARD.encode(&bucket.key_path)),
        json!(bucket.frequency),
        json!(bucket.null_values),
    ];
    if let (Some(min), Some(max)) = (&bucket.min_val, &bucket.max_val) {
        parts.push(primitive_to_json(min));
        parts.push(primitive_to_json(max));
        if let Some(ndv) = bucket.ndv {
            parts.push(json!(ndv));
            if let Some(sub) = &bucket.sub {
                parts.push(sub_to_json(sub));
            }
        }
    }
    Value::Array(parts)
}

fn primitive_to_json(value: &Primitive) -> Value {
    match value {
        Primitive::Int(i) => json!(i),
        Primitive::Float(f) => json!(f),
        Primitive::Bool(b) => json!(b),
        Primitive::Str(s) => Value::String(general_purpose::STANDARD.encode(s.as_bytes())),
    }
}

fn sub_to_json(sub: &SubHistogram) -> Value {
    match sub {
        SubHistogram::Int(h) => inner_to_json(h, |v| json!(v)),
        SubHistogram::Float(h) => inner_to_json(h, |v| json!(v)),
        SubHistogram::Bool(h) => inner_to_json(h, |v| json!(v)),
        SubHistogram::Str(h) => {
            inner_to_json(h, |v| Value::String(general_purpose::STANDARD.encode(v.as_bytes())))
        }
    }
}

fn inner_to_json<T>(inner: &InnerHistogram<T>, value_to_json: impl Fn(&T) -> Value) -> Value {
    match inner {
        InnerHistogram::Singleton {
            buckets,
            rest_frequency,
        } => {
            let mut object = Map::new();
            object.insert("type".to_string(), json!("singleton"));
            object.insert(
                "buckets".to_string(),
                Value::Array(
                    buckets
                        .iter()
                        .map(|b| json!([value_to_json(&b.value), b.frequency]))
                        .collect(),
                ),
            );
            if let Some(rest) = rest_frequency {
                object.insert("rest_frequency".to_string(), json!(rest));
            }
            Value::Object(object)
        }
        InnerHistogram::EquiHeight { buckets } => json!({
            "type": "equi-height",
            "buckets": buckets
                .iter()
                .map(|b| json!([value_to_json(&b.upper_bound), b.frequency, b.ndv]))
                .collect::<Vec<_>>(),
        }),
    }
}

// ============================================================================
// Deserialization
// ============================================================================

fn get_attr<'a>(object: &'a Map<String, Value>, name: &str) -> Result<&'a Value> {
    object
        .get(name)
        .ok_or_else(|| StatsError::MissingAttribute(name.to_string()))
}

fn get_str<'a>(object: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    get_attr(object, name)?
        .as_str()
        .ok_or_else(|| StatsError::WrongJsonType(name.to_string()))
}

fn get_u32(object: &Map<String, Value>, name: &str) -> Result<u32> {
    get_attr(object, name)?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| StatsError::WrongJsonType(name.to_string()))
}

fn get_fraction(object: &Map<String, Value>, name: &str) -> Result<f64> {
    let value = get_attr(object, name)?
        .as_f64()
        .ok_or_else(|| StatsError::WrongJsonType(name.to_string()))?;
    check_fraction(value, name)
}

fn fraction_at(value: &Value, context: &str) -> Result<f64> {
    let value = value
        .as_f64()
        .ok_or_else(|| StatsError::WrongJsonType(context.to_string()))?;
    check_fraction(value, context)
}

fn check_fraction(value: f64, context: &str) -> Result<f64> {
    if !(0.0..=1.0).contains(&value) {
        return Err(StatsError::InvalidFrequency(context.to_string(), value));
    }
    Ok(value)
}

fn parse_bucket(value: &Value, context: &str, collation: CollationId) -> Result<KeyPathBucket> {
    let parts = value
        .as_array()
        .ok_or_else(|| StatsError::WrongJsonType(context.to_string()))?;
    if !matches!(parts.len(), 3 | 5 | 6 | 7) {
        return Err(StatsError::WrongBucketArity(context.to_string(), parts.len()));
    }

    let key_b64 = parts[0]
        .as_str()
        .ok_or_else(|| StatsError::WrongJsonType(format!("{}.key_path", context)))?;
    let key_path = general_purpose::STANDARD
        .decode(key_b64)
        .map_err(|_| StatsError::WrongJsonType(format!("{}.key_path", context)))?;

    let frequency = fraction_at(&parts[1], &format!("{}.frequency", context))?;
    let null_values = fraction_at(&parts[2], &format!("{}.null_values", context))?;
    if frequency + null_values > 1.0 + TOTAL_FREQUENCY_TOLERANCE {
        return Err(StatsError::InvalidFrequency(
            format!("{}.null_values", context),
            frequency + null_values,
        ));
    }

    let (_, type_tag) = strip_type_tag(&key_path);

    let (min_val, max_val) = if parts.len() >= 5 {
        let min = parse_bound(&parts[3], &format!("{}.min_val", context), collation)?;
        let max = parse_bound(&parts[4], &format!("{}.max_val", context), collation)?;
        let (min, max) = unify_numeric_bounds(min, max);
        if min.value_type() != max.value_type() {
            return Err(StatsError::TypeMismatch(format!(
                "{}: min_val is {} but max_val is {}",
                context,
                min.type_name(),
                max.type_name()
            )));
        }
        (Some(min), Some(max))
    } else {
        (None, None)
    };

    let value_type = derive_value_type(type_tag, min_val.as_ref(), context)?;

    let ndv = if parts.len() >= 6 {
        let ndv = parts[5]
            .as_i64()
            .ok_or_else(|| StatsError::WrongJsonType(format!("{}.ndv", context)))?;
        if ndv < 1 {
            return Err(StatsError::WrongJsonType(format!("{}.ndv", context)));
        }
        Some(ndv)
    } else {
        None
    };

    let sub = if parts.len() == 7 {
        let sub = parse_sub(&parts[6], &format!("{}.sub", context), value_type, collation)?;
        debug_assert!(
            ndv.unwrap_or(0) >= sub.len() as i64,
            "ndv must cover every listed sub-histogram value"
        );
        Some(sub)
    } else {
        None
    };

    debug_assert!(
        ndv != Some(1) || min_val == max_val,
        "a single-valued bucket must have min_val == max_val"
    );

    Ok(KeyPathBucket {
        key_path,
        frequency,
        null_values,
        value_type,
        min_val,
        max_val,
        ndv,
        sub,
    })
}

fn parse_bound(value: &Value, context: &str, collation: CollationId) -> Result<Primitive> {
    match value {
        Value::Number(_) => {
            if let Some(i) = value.as_i64() {
                Ok(Primitive::Int(i))
            } else {
                value
                    .as_f64()
                    .map(Primitive::Float)
                    .ok_or_else(|| StatsError::WrongJsonType(context.to_string()))
            }
        }
        Value::Bool(b) => Ok(Primitive::Bool(*b)),
        Value::String(s) => {
            let bytes = general_purpose::STANDARD
                .decode(s)
                .map_err(|_| StatsError::WrongJsonType(context.to_string()))?;
            Ok(Primitive::Str(BucketString::new(bytes, collation)))
        }
        _ => Err(StatsError::WrongJsonType(context.to_string())),
    }
}

/// Numeric bounds may mix integer and float JSON literals; the wider
/// domain wins so both bounds share one value type.
fn unify_numeric_bounds(min: Primitive, max: Primitive) -> (Primitive, Primitive) {
    match (&min, &max) {
        (Primitive::Int(i), Primitive::Float(_)) => (Primitive::Float(*i as f64), max),
        (Primitive::Float(_), Primitive::Int(i)) => {
            let promoted = Primitive::Float(*i as f64);
            (min, promoted)
        }
        _ => (min, max),
    }
}

/// Recover the bucket's value type from the key path's type tag and the
/// JSON type of the bounds. Bounds win for numeric width (`_num` alone
/// cannot distinguish int from float); a contradiction between tag and
/// bounds is a corrupt histogram.
fn derive_value_type(
    tag: Option<TypeTag>,
    min: Option<&Primitive>,
    context: &str,
) -> Result<ValueType> {
    let bound_type = min.map(|m| m.value_type());
    match (tag, bound_type) {
        (_, None) => Ok(match tag {
            Some(TypeTag::Str) => ValueType::String,
            Some(TypeTag::Bool) => ValueType::Bool,
            // an untagged or numeric path with no bounds has no usable domain
            _ => ValueType::Unknown,
        }),
        (None, Some(bound)) => Ok(bound),
        (Some(TypeTag::Num), Some(bound)) if bound.is_numeric() => Ok(bound),
        (Some(TypeTag::Bool), Some(ValueType::Bool)) => Ok(ValueType::Bool),
        (Some(TypeTag::Str), Some(ValueType::String)) => Ok(ValueType::String),
        (Some(tag), Some(bound)) => Err(StatsError::TypeMismatch(format!(
            "{}: key path tag {:?} disagrees with {:?} bounds",
            context, tag, bound
        ))),
    }
}

fn parse_sub(
    value: &Value,
    context: &str,
    value_type: ValueType,
    collation: CollationId,
) -> Result<SubHistogram> {
    let object = value
        .as_object()
        .ok_or_else(|| StatsError::WrongJsonType(context.to_string()))?;
    let kind = get_str(object, "type")?;
    if kind != "singleton" && kind != "equi-height" {
        return Err(StatsError::WrongJsonType(format!("{}.type '{}'", context, kind)));
    }
    let entries = get_attr(object, "buckets")?
        .as_array()
        .ok_or_else(|| StatsError::WrongJsonType(format!("{}.buckets", context)))?;
    if entries.len() > MAX_SUB_HISTOGRAM_BUCKETS {
        return Err(StatsError::OutOfMemory(format!(
            "{}: {} inner buckets exceed the {} bucket limit",
            context,
            entries.len(),
            MAX_SUB_HISTOGRAM_BUCKETS
        )));
    }
    let rest_frequency = match object.get("rest_frequency") {
        Some(rest) => Some(fraction_at(rest, &format!("{}.rest_frequency", context))?),
        None => None,
    };
    if kind == "equi-height" && rest_frequency.is_some() {
        return Err(StatsError::WrongJsonType(format!(
            "{}.rest_frequency",
            context
        )));
    }

    match value_type {
        ValueType::Int => Ok(SubHistogram::Int(parse_inner(
            kind,
            entries,
            rest_frequency,
            context,
            |v, ctx| {
                v.as_i64()
                    .ok_or_else(|| StatsError::WrongJsonType(ctx.to_string()))
            },
        )?)),
        ValueType::Float => Ok(SubHistogram::Float(parse_inner(
            kind,
            entries,
            rest_frequency,
            context,
            |v, ctx| {
                v.as_f64()
                    .ok_or_else(|| StatsError::WrongJsonType(ctx.to_string()))
            },
        )?)),
        ValueType::Bool => {
            if kind == "equi-height" {
                return Err(StatsError::TypeMismatch(format!(
                    "{}: equi-height histograms are not defined over booleans",
                    context
                )));
            }
            Ok(SubHistogram::Bool(parse_inner(
                kind,
                entries,
                rest_frequency,
                context,
                |v, ctx| {
                    v.as_bool()
                        .ok_or_else(|| StatsError::WrongJsonType(ctx.to_string()))
                },
            )?))
        }
        ValueType::String => Ok(SubHistogram::Str(parse_inner(
            kind,
            entries,
            rest_frequency,
            context,
            |v, ctx| {
                let s = v
                    .as_str()
                    .ok_or_else(|| StatsError::WrongJsonType(ctx.to_string()))?;
                let bytes = general_purpose::STANDARD
                    .decode(s)
                    .map_err(|_| StatsError::WrongJsonType(ctx.to_string()))?;
                Ok(BucketString::new(bytes, collation))
            },
        )?)),
        ValueType::Unknown => Err(StatsError::TypeMismatch(format!(
            "{}: sub-histogram on a bucket with no value domain",
            context
        ))),
    }
}

fn parse_inner<T>(
    kind: &str,
    entries: &[Value],
    rest_frequency: Option<f64>,
    context: &str,
    parse_value: impl Fn(&Value, &str) -> Result<T>,
) -> Result<InnerHistogram<T>> {
    if kind == "singleton" {
        let mut buckets = Vec::with_capacity(entries.len());
        let mut total = 0.0;
        for (index, entry) in entries.iter().enumerate() {
            let entry_context = format!("{}.buckets[{}]", context, index);
            let parts = entry
                .as_array()
                .ok_or_else(|| StatsError::WrongJsonType(entry_context.clone()))?;
            if parts.len() != 2 {
                return Err(StatsError::WrongBucketArity(entry_context, parts.len()));
            }
            let value = parse_value(&parts[0], &entry_context)?;
            let frequency = fraction_at(&parts[1], &entry_context)?;
            total += frequency;
            buckets.push(SingletonBucket { value, frequency });
        }
        if total > 1.0 + TOTAL_FREQUENCY_TOLERANCE {
            return Err(StatsError::InvalidTotalFrequency(context.to_string(), total));
        }
        // A saturated value list leaves no mass for unlisted values.
        if rest_frequency.is_some() && (total - 1.0).abs() <= SATURATION_TOLERANCE {
            return Err(StatsError::InvalidTotalFrequency(context.to_string(), total));
        }
        Ok(InnerHistogram::Singleton {
            buckets,
            rest_frequency,
        })
    } else {
        let mut buckets = Vec::with_capacity(entries.len());
        let mut total = 0.0;
        for (index, entry) in entries.iter().enumerate() {
            let entry_context = format!("{}.buckets[{}]", context, index);
            let parts = entry
                .as_array()
                .ok_or_else(|| StatsError::WrongJsonType(entry_context.clone()))?;
            if parts.len() != 3 {
                return Err(StatsError::WrongBucketArity(entry_context, parts.len()));
            }
            let upper_bound = parse_value(&parts[0], &entry_context)?;
            let frequency = fraction_at(&parts[1], &entry_context)?;
            let ndv = parts[2]
                .as_i64()
                .filter(|n| *n >= 1)
                .ok_or_else(|| StatsError::WrongJsonType(entry_context.clone()))?;
            total += frequency;
            buckets.push(EquiHeightBucket {
                upper_bound,
                frequency,
                ndv,
            });
        }
        if !entries.is_empty() && (total - 1.0).abs() > TOTAL_FREQUENCY_TOLERANCE {
            return Err(StatsError::InvalidTotalFrequency(context.to_string(), total));
        }
        Ok(InnerHistogram::EquiHeight { buckets })
    }
}
