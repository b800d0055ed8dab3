/*!
  On-demand compilation of single functions. The interpreter asks for a function the first time
  it calls it; later calls run the compiled routine instead. A function that cannot be compiled
  is remembered and never tried again.
*/

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::bytecode::{ExtendedOperation, Instruction, Word};
use crate::cpu::Memory;
use crate::error::JitError;

use super::{emit_range, CallLinkage, ClosureEmitter, EmitContext, Emitter, ReturnStyle, Routine};

#[derive(Debug, Default)]
pub struct PartialJit {
  emitter  : ClosureEmitter,
  compiled : HashMap<Word, Routine>,
  failed   : HashSet<Word>,
}

impl PartialJit {

  pub fn new() -> PartialJit {
    PartialJit::default()
  }

  pub fn compiled(&self, entry: Word) -> Option<&Routine> {
    self.compiled.get(&entry)
  }

  pub fn is_compiled(&self, entry: Word) -> bool {
    self.compiled.contains_key(&entry)
  }

  pub fn has_failed(&self, entry: Word) -> bool {
    self.failed.contains(&entry)
  }

  /// Forgets every compiled and failed entry, e.g. when a new program is loaded.
  pub fn clear(&mut self) {
    self.compiled.clear();
    self.failed.clear();
  }

  /// Compiles the function at `entry` unless it was compiled or has failed before.
  pub fn request(&mut self, entry: Word, memory: &Memory, end: Word) {
    if self.is_compiled(entry) || self.has_failed(entry) {
      return;
    }

    match compile_function(&self.emitter, entry, memory, end) {
      Ok(routine) => {
        debug!(entry, steps = routine.len(), "compiled function");
        self.compiled.insert(entry, routine);
      }
      Err(error) => {
        debug!(entry, %error, "function falls back to interpretation");
        self.failed.insert(entry);
      }
    }
  }

}

/// The words from `entry` up to and including the first `ret`.
pub fn function_body(entry: Word, memory: &Memory, end: Word) -> Result<Vec<Word>, JitError> {
  let mut body = vec![];
  let mut address = entry;

  while address < end {
    let word = memory.read_word(address, "jit", address).map_err(|_| JitError::MissingReturn { entry })? as Word;
    body.push(word);
    if let Some(Instruction::Register(ExtendedOperation::Ret, _)) = Instruction::decode(word) {
      return Ok(body);
    }
    address += 4;
  }

  Err(JitError::MissingReturn { entry })
}

/// Compiles the function at `entry`. Instruction indices in the routine count from the entry.
pub fn compile_function(emitter: &dyn Emitter, entry: Word, memory: &Memory, end: Word) -> Result<Routine, JitError> {
  let body = function_body(entry, memory, end)?;
  let mut context = EmitContext::new(entry, ReturnStyle::SetProgramCounter, CallLinkage::Unsupported);
  emit_range(emitter, &body, 0, &mut context)?;
  context.finish(entry)
}


#[cfg(test)]
mod tests {
  use crate::bytecode::Operation;
  use super::*;

  fn memory_with(instructions: &[Instruction], at: Word) -> Memory {
    let mut memory = Memory::new(256);
    let bytes: Vec<u8> = instructions.iter().flat_map(|instruction| instruction.encode().to_le_bytes()).collect();
    memory.load(at, &bytes).unwrap();
    memory
  }

  fn ret() -> Instruction {
    Instruction::register(ExtendedOperation::Ret, 31, 0, 0)
  }

  #[test]
  fn body_ends_at_ret() {
    let memory = memory_with(&[
      Instruction::immediate(Operation::Addi, 1, 1, 1),
      ret(),
      Instruction::immediate(Operation::Addi, 1, 1, 1),
    ], 16);
    assert_eq!(function_body(16, &memory, 28).unwrap().len(), 2);
    assert_eq!(function_body(16, &memory, 20), Err(JitError::MissingReturn { entry: 16 }));
  }

  #[test]
  fn failures_are_remembered() {
    let memory = memory_with(&[Instruction::jump(Operation::Call, 0), ret()], 0);
    let mut jit = PartialJit::new();
    jit.request(0, &memory, 8);
    assert!(jit.has_failed(0));
    assert!(!jit.is_compiled(0));
  }

  #[test]
  fn successful_units_are_cached() {
    let memory = memory_with(&[Instruction::immediate(Operation::Addi, 1, 1, -1i16 as u16), ret()], 32);
    let mut jit = PartialJit::new();
    jit.request(32, &memory, 40);
    assert!(jit.is_compiled(32));
    assert_eq!(jit.compiled(32).map(Routine::entry), Some(32));
    jit.clear();
    assert!(!jit.is_compiled(32));
  }

  #[test]
  fn branches_leaving_the_function_fail() {
    let memory = memory_with(&[Instruction::immediate(Operation::Br, 0, 0, 16), ret()], 0);
    assert!(matches!(
      compile_function(&ClosureEmitter, 0, &memory, 8),
      Err(JitError::UnresolvedBranch { index: 0, target: 5 })
    ));
  }

  #[test]
  fn branches_past_the_first_ret_fall_back() {
    let memory = memory_with(&[
      Instruction::immediate(Operation::Bne, 2, 0, 4),
      ret(),
      Instruction::immediate(Operation::Addi, 3, 3, 1),
      ret(),
    ], 0);
    assert!(matches!(
      compile_function(&ClosureEmitter, 0, &memory, 16),
      Err(JitError::UnresolvedBranch { index: 0, target: 2 })
    ));

    let mut jit = PartialJit::new();
    jit.request(0, &memory, 16);
    assert!(jit.has_failed(0));
  }
}
