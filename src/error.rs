use thiserror::Error;

/// Errors produced while deserializing histograms or estimating selectivity.
///
/// Deserialization errors carry the context of the offending JSON node
/// (e.g. `buckets[3].sub`) so the host can report a usable diagnostic.
/// Selectivity errors are non-fatal to the query: callers fall back to a
/// static heuristic estimate.
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("missing attribute '{0}'")]
    MissingAttribute(String),

    #[error("wrong JSON type at {0}")]
    WrongJsonType(String),

    #[error("wrong bucket arity at {0}: got {1}")]
    WrongBucketArity(String, usize),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("unsupported path: {0}")]
    UnsupportedPath(String),

    #[error("unsupported function: {0}")]
    UnsupportedFunction(String),

    #[error("invalid frequency at {0}: {1}")]
    InvalidFrequency(String, f64),

    #[error("invalid total frequency at {0}: {1}")]
    InvalidTotalFrequency(String, f64),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

pub type Result<T> = std::result::Result<T, StatsError>;
