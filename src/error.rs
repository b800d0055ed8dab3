use thiserror::Error;

use crate::bytecode::Word;

/// A failure to assemble source text. `line` is the 0-based source line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}: {} ({})", .line + 1, .message, .instruction)]
pub struct AssemblerError {
  pub line        : usize,
  pub instruction : String,
  pub message     : String,
}

impl AssemblerError {
  pub fn new(line: usize, instruction: impl Into<String>, message: impl Into<String>) -> AssemblerError {
    AssemblerError {
      line,
      instruction: instruction.into(),
      message: message.into(),
    }
  }
}

/// A fault raised while executing guest code. Faults abort the run loop.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RuntimeFault {
  #[error("{instruction}: misaligned address {address:#010x} (pc = {pc:#010x})")]
  MisalignedAddress {
    instruction : &'static str,
    pc          : Word,
    address     : Word,
  },

  #[error("{instruction}: address {address:#010x} is outside of memory (pc = {pc:#010x})")]
  OutOfBounds {
    instruction : &'static str,
    pc          : Word,
    address     : Word,
  },

  #[error("illegal instruction {word:#010x} (pc = {pc:#010x})")]
  IllegalInstruction {
    pc   : Word,
    word : Word,
  },
}

/// Reasons a unit could not be compiled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JitError {
  #[error("no emitter for instruction {instruction} at index {index}")]
  Unsupported {
    index       : usize,
    instruction : String,
  },

  #[error("undecodable word {word:#010x} at index {index}")]
  Undecodable {
    index : usize,
    word  : Word,
  },

  #[error("branch at index {index} targets index {target}, which is outside of the unit")]
  UnresolvedBranch {
    index  : usize,
    target : i64,
  },

  #[error("no `ret` found after entry point {entry:#010x}")]
  MissingReturn {
    entry: Word,
  },

  #[error("call at index {index} targets {address:#010x}, which is neither a function nor a system call")]
  UnknownCallTarget {
    index   : usize,
    address : Word,
  },

  #[error("entry point {entry:#010x} lies inside a function body")]
  EntryInsideFunction {
    entry: Word,
  },
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("assembler error: {0}")]
  Assembler(#[from] AssemblerError),

  #[error("runtime fault: {0}")]
  Fault(#[from] RuntimeFault),

  #[error("JIT compilation failed: {0}")]
  Jit(#[from] JitError),

  #[error("system call `{name}` or address {address:#010x} is already registered")]
  DuplicateSystemCall {
    name    : String,
    address : Word,
  },
}

pub type Result<T> = std::result::Result<T, Error>;
