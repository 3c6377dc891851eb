//! # Encoding — Chunk ↔ Integer Mapping
//!
//! Maps the four semantic chunk kinds onto positive integers whose prime
//! factorization carries the payload, built on [`crate::registry`] and
//! [`crate::checksum`].
//!
//! ## Resolving the chunk-signature scheme
//!
//! A literal reading of "type prime raised to a fixed high exponent" (e.g.
//! a block-header marker at exponent 10) cannot coexist with the rule that
//! payload exponents stay below the checksum power `k` (default 6) — any
//! marker exponent at or above `k` would be indistinguishable from the
//! checksum factor itself. This module instead uses a **prime-exponent,
//! base-5 digit expansion**: every numeric field is written as a sequence
//! of base-5 digits, each digit stored as `exponent = digit + 1` (so
//! exponents only ever range 1..=5, always below `k`) on its own dedicated,
//! statically assigned registry index. A chunk's kind is identified not by
//! exponent magnitude but by a single dedicated "kind marker" prime whose
//! small exponent (1..4) names the kind directly — structurally unique,
//! and still well clear of `k`.
//!
//! Index table (registry indices, not prime values — fixed at compile time,
//! each block sized with headroom for the field's maximum digit count):
//!
//! | Field | Base index | Max digits |
//! |---|---|---|
//! | kind marker | 100000 | 1 (the exponent itself is the kind tag) |
//! | DATA.position (u32) | 100010 | 14 |
//! | DATA.value (u16) | 100030 | 7 |
//! | OPERATION.opcode (u8) | 100050 | 4 |
//! | OPERATION.operand (u32, omitted when 0) | 100070 | 14 |
//! | BLOCK_HEADER.block_type (u8) | 100100 | 4 |
//! | BLOCK_HEADER.block_length (u32) | 100120 | 14 |
//! | NTT_HEADER.modulus (u64) | 100150 | 28 |
//! | NTT_HEADER.primitive_root (u64) | 100200 | 28 |
//! | NTT_HEADER.block_length (u32) | 100260 | 14 |
//!
//! Every field except `operand` is always present, even when its value is
//! zero (digit 0 still carries exponent 1, so "present with value zero" and
//! "absent" are distinguishable) — `operand` keeps the spec's own
//! omitted-when-zero convention since 0 and "no operand" are defined to
//! coincide there.

use std::collections::HashMap;
use std::sync::Arc;

use rug::Integer;

use crate::checksum;
use crate::error::{CodecError, CodecResult};
use crate::metrics::{ChunkKindLabel, CodecMetrics};
use crate::registry::PrimeRegistry;

const KIND_MARKER_INDEX: usize = 100_000;
const DATA_POSITION_BASE: usize = 100_010;
const DATA_VALUE_BASE: usize = 100_030;
const OPERATION_OPCODE_BASE: usize = 100_050;
const OPERATION_OPERAND_BASE: usize = 100_070;
const BLOCK_TYPE_BASE: usize = 100_100;
const BLOCK_LENGTH_BASE: usize = 100_120;
const NTT_MODULUS_BASE: usize = 100_150;
const NTT_ROOT_BASE: usize = 100_200;
const NTT_LENGTH_BASE: usize = 100_260;

const MAX_BMP_CODEPOINT: u32 = 0xFFFF;

/// A semantic chunk kind, discriminated by the kind-marker exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Data,
    Operation,
    BlockHeader,
    NttHeader,
}

/// A decoded, not-yet-attached chunk payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data { position: u32, value: u16 },
    Operation { opcode: u8, operand: Option<u32> },
    BlockHeader { block_type: u8, block_length: u32 },
    NttHeader {
        modulus: u64,
        primitive_root: u64,
        block_length: u32,
    },
}

impl Chunk {
    pub fn kind(&self) -> Kind {
        match self {
            Chunk::Data { .. } => Kind::Data,
            Chunk::Operation { .. } => Kind::Operation,
            Chunk::BlockHeader { .. } => Kind::BlockHeader,
            Chunk::NttHeader { .. } => Kind::NttHeader,
        }
    }
}

impl Kind {
    fn label(&self) -> &'static str {
        match self {
            Kind::Data => "data",
            Kind::Operation => "operation",
            Kind::BlockHeader => "block_header",
            Kind::NttHeader => "ntt_header",
        }
    }
}

/// The result of decoding an attached integer: the recovered chunk plus
/// whether its checksum factor verified (a chunk with no checksum factor
/// at all is decoded anyway, per §4.3's "if present," with
/// `checksum_valid = false`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedChunk {
    pub chunk: Chunk,
    pub checksum_valid: bool,
}

/// Writes the base-5 digit expansion of `value` into `factors` at
/// `base, base+1, …`, one prime index per digit, exponent = digit + 1.
/// Always emits at least one digit, even for `value == 0`.
fn push_digits(factors: &mut Vec<(usize, u32)>, base: usize, mut value: u64) {
    let mut i = 0;
    loop {
        let digit = (value % 5) as u32;
        factors.push((base + i, digit + 1));
        value /= 5;
        i += 1;
        if value == 0 {
            break;
        }
    }
}

/// Reads back a required field's digit expansion starting at `base`.
/// Fails if no digit is present at `base` at all.
fn read_field(map: &HashMap<usize, u32>, base: usize) -> CodecResult<u64> {
    let mut value: u64 = 0;
    let mut multiplier: u64 = 1;
    let mut i = 0usize;
    loop {
        let Some(&exp) = map.get(&(base + i)) else {
            break;
        };
        if !(1..=5).contains(&exp) {
            return Err(CodecError::ChunkValidationError {
                reason: format!("digit exponent {exp} out of range at field base {base}"),
            });
        }
        value += (exp as u64 - 1) * multiplier;
        multiplier *= 5;
        i += 1;
    }
    if i == 0 {
        return Err(CodecError::ChunkValidationError {
            reason: format!("required field at base {base} is missing"),
        });
    }
    Ok(value)
}

/// Like [`read_field`] but a missing field means "0/absent" rather than
/// an error — used for `OPERATION.operand`.
fn read_optional_field(map: &HashMap<usize, u32>, base: usize) -> u64 {
    read_field(map, base).unwrap_or(0)
}

/// `∏ pᵢ^eᵢ` over a factorization.
pub fn reconstruct_from_factors(factors: &[(Integer, u32)]) -> Integer {
    factors
        .iter()
        .fold(Integer::from(1), |acc, (p, e)| acc * Integer::from(p.pow(*e)))
}

/// Maps semantic chunks to attached integers and back, using the registry
/// and checksum layers underneath.
pub struct Encoder {
    registry: Arc<PrimeRegistry>,
    k: u32,
    metrics: Option<Arc<CodecMetrics>>,
}

impl Encoder {
    /// `k` is the checksum power; it MUST be at least 2 and strictly
    /// greater than [`crate::config::MAX_PAYLOAD_EXPONENT`], the largest
    /// payload digit exponent this module ever emits, or chunk signatures
    /// and checksum factors could collide.
    pub fn new(registry: Arc<PrimeRegistry>, k: u32) -> CodecResult<Self> {
        if k < 2 || k <= crate::config::MAX_PAYLOAD_EXPONENT {
            return Err(CodecError::ConfigurationError {
                reason: format!(
                    "checksum power k={k} must be >= 2 and > max payload exponent {}",
                    crate::config::MAX_PAYLOAD_EXPONENT
                ),
            });
        }
        Ok(Encoder {
            registry,
            k,
            metrics: None,
        })
    }

    /// Attaches a metrics handle this encoder reports `chunks_encoded`,
    /// `chunks_decoded`, and `checksum_mismatches` to.
    pub fn with_metrics(mut self, metrics: Arc<CodecMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn index_exponents(&self, factors: &[(Integer, u32)]) -> CodecResult<HashMap<usize, u32>> {
        let mut map = HashMap::with_capacity(factors.len());
        for (p, e) in factors {
            let idx = self.registry.get_index(p, true)?;
            map.insert(idx, *e);
        }
        Ok(map)
    }

    fn factors_for(&self, digit_factors: Vec<(usize, u32)>) -> Vec<(Integer, u32)> {
        let mut factors: Vec<(Integer, u32)> = digit_factors
            .into_iter()
            .map(|(idx, e)| (self.registry.get_prime(idx), e))
            .collect();
        factors.sort_by(|a, b| a.0.cmp(&b.0));
        factors
    }

    /// Encodes one chunk into an attached integer (raw value times the
    /// checksum prime raised to `k`).
    pub fn encode_chunk(&self, chunk: &Chunk) -> CodecResult<Integer> {
        let mut digits: Vec<(usize, u32)> = Vec::new();

        match chunk {
            Chunk::Data { position, value } => {
                if *value as u32 > MAX_BMP_CODEPOINT {
                    return Err(CodecError::EncodingError {
                        reason: format!("DATA value {value} exceeds 0x{MAX_BMP_CODEPOINT:X}"),
                    });
                }
                digits.push((KIND_MARKER_INDEX, 1));
                push_digits(&mut digits, DATA_POSITION_BASE, *position as u64);
                push_digits(&mut digits, DATA_VALUE_BASE, *value as u64);
            }
            Chunk::Operation { opcode, operand } => {
                digits.push((KIND_MARKER_INDEX, 2));
                push_digits(&mut digits, OPERATION_OPCODE_BASE, *opcode as u64);
                let operand_value = operand.unwrap_or(0);
                if operand_value != 0 {
                    push_digits(&mut digits, OPERATION_OPERAND_BASE, operand_value as u64);
                }
            }
            Chunk::BlockHeader {
                block_type,
                block_length,
            } => {
                digits.push((KIND_MARKER_INDEX, 3));
                push_digits(&mut digits, BLOCK_TYPE_BASE, *block_type as u64);
                push_digits(&mut digits, BLOCK_LENGTH_BASE, *block_length as u64);
            }
            Chunk::NttHeader {
                modulus,
                primitive_root,
                block_length,
            } => {
                digits.push((KIND_MARKER_INDEX, 4));
                push_digits(&mut digits, NTT_MODULUS_BASE, *modulus);
                push_digits(&mut digits, NTT_ROOT_BASE, *primitive_root);
                push_digits(&mut digits, NTT_LENGTH_BASE, *block_length as u64);
            }
        }

        let factors = self.factors_for(digits);
        let raw = reconstruct_from_factors(&factors);
        let attached = checksum::attach(&raw, &factors, &self.registry, self.k, false)?;

        if let Some(metrics) = &self.metrics {
            metrics
                .chunks_encoded
                .get_or_create(&ChunkKindLabel {
                    kind: chunk.kind().label().to_string(),
                })
                .inc();
        }

        Ok(attached)
    }

    /// Looks up the chunk kind implied by a core factorization's kind
    /// marker, without decoding the rest of the payload.
    pub fn determine_chunk_type(&self, factors: &[(Integer, u32)]) -> CodecResult<Kind> {
        let map = self.index_exponents(factors)?;
        match map.get(&KIND_MARKER_INDEX) {
            Some(1) => Ok(Kind::Data),
            Some(2) => Ok(Kind::Operation),
            Some(3) => Ok(Kind::BlockHeader),
            Some(4) => Ok(Kind::NttHeader),
            Some(other) => Err(CodecError::ChunkValidationError {
                reason: format!("unknown kind marker exponent {other}"),
            }),
            None => Err(CodecError::ChunkValidationError {
                reason: "no kind marker factor present".to_string(),
            }),
        }
    }

    /// Factors `v`, verifies its checksum if present, classifies it by
    /// signature, and decodes its payload.
    pub fn decode_chunk(&self, v: &Integer) -> CodecResult<DecodedChunk> {
        let factors = self.registry.factor(v)?;

        let (core, checksum_valid) = match checksum::extract(v, &self.registry, self.k) {
            Ok(extracted) => (extracted.core, true),
            Err(CodecError::NoChecksum { .. }) => (factors, false),
            Err(other @ CodecError::ChecksumMismatch { .. }) => {
                if let Some(metrics) = &self.metrics {
                    metrics.checksum_mismatches.inc();
                }
                return Err(other);
            }
            Err(other) => return Err(other),
        };

        let map = self.index_exponents(&core)?;
        let kind_exp = *map.get(&KIND_MARKER_INDEX).ok_or_else(|| {
            CodecError::ChunkValidationError {
                reason: "no kind marker factor present".to_string(),
            }
        })?;

        let chunk = match kind_exp {
            1 => {
                let position = read_field(&map, DATA_POSITION_BASE)?;
                let value = read_field(&map, DATA_VALUE_BASE)?;
                if value > MAX_BMP_CODEPOINT as u64 {
                    return Err(CodecError::ChunkValidationError {
                        reason: format!("DATA value {value} exceeds 0x{MAX_BMP_CODEPOINT:X}"),
                    });
                }
                Chunk::Data {
                    position: position as u32,
                    value: value as u16,
                }
            }
            2 => {
                let opcode = read_field(&map, OPERATION_OPCODE_BASE)?;
                let operand_value = read_optional_field(&map, OPERATION_OPERAND_BASE);
                Chunk::Operation {
                    opcode: opcode as u8,
                    operand: if operand_value == 0 {
                        None
                    } else {
                        Some(operand_value as u32)
                    },
                }
            }
            3 => {
                let block_type = read_field(&map, BLOCK_TYPE_BASE)?;
                let block_length = read_field(&map, BLOCK_LENGTH_BASE)?;
                Chunk::BlockHeader {
                    block_type: block_type as u8,
                    block_length: block_length as u32,
                }
            }
            4 => {
                let modulus = read_field(&map, NTT_MODULUS_BASE)?;
                let primitive_root = read_field(&map, NTT_ROOT_BASE)?;
                let block_length = read_field(&map, NTT_LENGTH_BASE)?;
                Chunk::NttHeader {
                    modulus,
                    primitive_root,
                    block_length: block_length as u32,
                }
            }
            other => {
                return Err(CodecError::ChunkValidationError {
                    reason: format!("unknown kind marker exponent {other}"),
                })
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics
                .chunks_decoded
                .get_or_create(&ChunkKindLabel {
                    kind: chunk.kind().label().to_string(),
                })
                .inc();
        }

        Ok(DecodedChunk {
            chunk,
            checksum_valid,
        })
    }

    /// One DATA chunk per codepoint; codepoints outside the BMP fail.
    pub fn encode_text(&self, text: &str) -> CodecResult<Vec<Integer>> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| {
                let cp = ch as u32;
                if cp > MAX_BMP_CODEPOINT {
                    return Err(CodecError::EncodingError {
                        reason: format!("codepoint U+{cp:04X} outside the BMP"),
                    });
                }
                self.encode_chunk(&Chunk::Data {
                    position: i as u32,
                    value: cp as u16,
                })
            })
            .collect()
    }

    /// Decodes DATA chunks back into a string, stable-sorted by position;
    /// non-DATA chunks are skipped. Any chunk that fails to decode faults
    /// the whole call.
    pub fn decode_text(&self, chunks: &[Integer]) -> CodecResult<String> {
        let mut positioned: Vec<(u32, u16)> = Vec::new();
        for c in chunks {
            let decoded = self.decode_chunk(c)?;
            if let Chunk::Data { position, value } = decoded.chunk {
                positioned.push((position, value));
            }
        }
        positioned.sort_by_key(|(pos, _)| *pos);

        let mut out = String::with_capacity(positioned.len());
        for (_, value) in positioned {
            let ch = char::from_u32(value as u32).ok_or_else(|| CodecError::ChunkValidationError {
                reason: format!("{value} is not a valid Unicode scalar value"),
            })?;
            out.push(ch);
        }
        Ok(out)
    }

    /// One OPERATION chunk per `(opcode, operand)` pair.
    pub fn encode_program(&self, ops: &[(u8, Option<u32>)]) -> CodecResult<Vec<Integer>> {
        ops.iter()
            .map(|(opcode, operand)| {
                self.encode_chunk(&Chunk::Operation {
                    opcode: *opcode,
                    operand: *operand,
                })
            })
            .collect()
    }

    /// Prepends a BLOCK_HEADER carrying `chunks.len()` to `chunks`.
    pub fn encode_block(&self, chunks: &[Integer]) -> CodecResult<Vec<Integer>> {
        let header = self.encode_chunk(&Chunk::BlockHeader {
            block_type: 0,
            block_length: chunks.len() as u32,
        })?;
        let mut out = Vec::with_capacity(chunks.len() + 1);
        out.push(header);
        out.extend_from_slice(chunks);
        Ok(out)
    }
}
