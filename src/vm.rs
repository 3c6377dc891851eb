//! # VM — Stack Machine for Decoded Operation Chunks
//!
//! A minimal stack machine with a fixed dispatch table (`PUSH`/`ADD`/
//! `PRINT`), executed over a sequence of already-decoded [`Chunk`]s. `DATA`
//! chunks render directly to output as characters — the VM doubles as the
//! text renderer for mixed operation/data streams, so callers don't need a
//! separate decode pass just to print literal text regions.

use crate::encoding::Chunk;
use crate::error::{CodecError, CodecResult};

pub const OPCODE_PUSH: u8 = 1;
pub const OPCODE_ADD: u8 = 2;
pub const OPCODE_PRINT: u8 = 3;

/// Operand stack, output log, and operation counter. `reset` zeroes all
/// three; `execute` always resets before running, so a single `Vm` can be
/// reused across programs.
#[derive(Debug, Default)]
pub struct Vm {
    stack: Vec<i64>,
    output: Vec<String>,
    op_counter: usize,
}

impl Vm {
    pub fn new() -> Self {
        Vm::default()
    }

    pub fn reset(&mut self) {
        self.stack.clear();
        self.output.clear();
        self.op_counter = 0;
    }

    pub fn stack(&self) -> &[i64] {
        &self.stack
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn op_counter(&self) -> usize {
        self.op_counter
    }

    /// Resets state, then walks `chunks` in order: OPERATION chunks
    /// dispatch to the instruction table, DATA chunks append their
    /// character directly, everything else is skipped. Execution is a
    /// pure function of `chunks` — no ambient state, clocks, or RNG.
    pub fn execute(&mut self, chunks: &[Chunk]) -> CodecResult<Vec<String>> {
        self.reset();
        for (i, chunk) in chunks.iter().enumerate() {
            self.op_counter = i;
            match chunk {
                Chunk::Operation { opcode, operand } => {
                    self.dispatch(*opcode, *operand, i).map_err(|e| match e {
                        CodecError::StackUnderflow { .. } => e,
                        other => CodecError::VMExecutionError {
                            opcode: *opcode,
                            op_index: i,
                            reason: other.to_string(),
                        },
                    })?;
                }
                Chunk::Data { value, .. } => {
                    let ch = char::from_u32(*value as u32).ok_or_else(|| {
                        CodecError::VMExecutionError {
                            opcode: 0,
                            op_index: i,
                            reason: format!("{value} is not a valid Unicode scalar value"),
                        }
                    })?;
                    self.output.push(ch.to_string());
                }
                Chunk::BlockHeader { .. } | Chunk::NttHeader { .. } => {}
            }
        }
        Ok(self.output.clone())
    }

    fn dispatch(&mut self, opcode: u8, operand: Option<u32>, op_index: usize) -> CodecResult<()> {
        match opcode {
            OPCODE_PUSH => {
                let n = operand.ok_or_else(|| CodecError::VMExecutionError {
                    opcode,
                    op_index,
                    reason: "PUSH requires an operand".to_string(),
                })?;
                self.stack.push(n as i64);
                Ok(())
            }
            OPCODE_ADD => {
                if self.stack.len() < 2 {
                    return Err(CodecError::StackUnderflow {
                        needed: 2,
                        have: self.stack.len(),
                    });
                }
                let b = self.stack.pop().unwrap();
                let a = self.stack.pop().unwrap();
                self.stack.push(a + b);
                Ok(())
            }
            OPCODE_PRINT => {
                if self.stack.is_empty() {
                    return Err(CodecError::StackUnderflow {
                        needed: 1,
                        have: 0,
                    });
                }
                let v = self.stack.pop().unwrap();
                self.output.push(v.to_string());
                Ok(())
            }
            other => Err(CodecError::VMExecutionError {
                opcode: other,
                op_index,
                reason: format!("unknown opcode {other}"),
            }),
        }
    }
}
