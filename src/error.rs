//! # Error — Typed Codec and Stream Error Taxonomy
//!
//! One closed error enum per library boundary: [`CodecError`] for the
//! registry/checksum/encoding/VM/NTT layer, [`StreamError`] for the
//! orchestrator layer, which wraps a `CodecError` with the `{chunk_index,
//! stage}` context the streaming layer is required to attach.
//!
//! Neither enum reaches for `anyhow` — the error taxonomy is closed and
//! spec'd (see spec.md §7), which is exactly the case a `thiserror`-derived
//! enum suits better than a trait-object error bag.

use rug::Integer;
use thiserror::Error;

/// Errors produced by the registry, checksum, encoding, VM, and NTT layers.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// `factor`/`integerSqrt` called on a non-positive value.
    #[error("value must be positive, got {value}")]
    NonPositive { value: Integer },

    /// A prime was expected to already be registered but wasn't (and
    /// insertion wasn't requested or the value isn't prime).
    #[error("prime {prime} is not in the registry")]
    NotInRegistry { prime: Integer },

    /// `extract` found no factor with exponent >= k.
    #[error("value has no checksum factor (k={k})")]
    NoChecksum { k: u32 },

    /// `extract` found a checksum factor but it didn't match the derived one.
    #[error("checksum mismatch: expected {expected}, found {actual}")]
    ChecksumMismatch { expected: Integer, actual: Integer },

    /// A chunk failed to decode or classify.
    #[error("chunk validation failed: {reason}")]
    ChunkValidationError { reason: String },

    /// A codepoint or field value fell outside its encodable range.
    #[error("encoding error: {reason}")]
    EncodingError { reason: String },

    /// A VM instruction failed during execution.
    #[error("VM execution failed at op #{op_index} (opcode {opcode}): {reason}")]
    VMExecutionError {
        opcode: u8,
        op_index: usize,
        reason: String,
    },

    /// An ADD or PRINT was attempted with too few operands on the stack.
    #[error("stack underflow: need {needed}, have {have}")]
    StackUnderflow { needed: usize, have: usize },

    /// NTT operations were invoked while disabled by configuration.
    #[error("NTT is disabled by configuration")]
    NTTDisabled,

    /// NTT input violated a domain precondition (length, entry range).
    #[error("NTT domain error: {reason}")]
    NTTDomainError { reason: String },

    /// A `CodecConfig`/`StreamConfig` value was internally inconsistent.
    #[error("configuration error: {reason}")]
    ConfigurationError { reason: String },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Errors produced by the stream orchestrator, wrapping codec errors with
/// pipeline position context per spec.md §7's propagation policy.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The wrapped chunk failed codec-level processing.
    #[error("stage {stage} failed on chunk #{chunk_index}: {source}")]
    Codec {
        source: CodecError,
        chunk_index: usize,
        stage: String,
    },

    /// A per-operation timeout elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The pipeline observed a cancellation signal before producing more output.
    #[error("operation cancelled")]
    Cancelled,

    /// The token-bucket rate limiter rejected this operation.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// The circuit breaker is open; callers MUST back off rather than retry.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// A transient failure eligible for retry with backoff.
    #[error("transient error (retryable): {reason}")]
    TransientError { reason: String, retryable: bool },

    /// The memory manager refused a buffer growth or registration request.
    #[error("memory pressure: {reason}")]
    MemoryPressure { reason: String },
}

impl StreamError {
    pub fn codec(source: CodecError, chunk_index: usize, stage: impl Into<String>) -> Self {
        StreamError::Codec {
            source,
            chunk_index,
            stage: stage.into(),
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
