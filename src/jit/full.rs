/*!
  Ahead-of-time compilation of a whole program. Every function in the program's function table
  becomes its own routine; everything outside a function body becomes the main routine. Calls
  between them are resolved at compile time, so a compiled program never touches the
  interpreter.
*/

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::bytecode::{Instruction, Word};
use crate::error::{JitError, RuntimeFault};
use crate::program::Program;
use crate::syscall::SystemCalls;

use super::{
  emit_range,
  CallLinkage,
  ClosureEmitter,
  EmitContext,
  Emitter,
  ExecutionContext,
  ReturnStyle,
  Routine,
  UnitId
};

/// A fully compiled program, ready to run against any machine state.
#[derive(Debug)]
pub struct CompiledProgram {
  main  : Routine,
  units : Vec<Routine>,
  start : usize,
}

impl CompiledProgram {

  pub fn main(&self) -> &Routine {
    &self.main
  }

  pub fn units(&self) -> &[Routine] {
    &self.units
  }

  /// Runs the main routine from the program's entry point.
  pub fn run(&self, context: &mut ExecutionContext<'_>) -> Result<(), RuntimeFault> {
    self.main.invoke_from(self.start, context, &self.units)
  }

}

#[derive(Debug, Default)]
pub struct FullJit {
  emitter: ClosureEmitter,
}

impl FullJit {

  pub fn new() -> FullJit {
    FullJit::default()
  }

  /// Compiles `program`. Calls may target the program's functions or any address bound in
  /// `system_calls`; the actions themselves are looked up when the call executes.
  pub fn compile(&self, program: &Program, system_calls: &SystemCalls) -> Result<CompiledProgram, JitError> {
    let words = program.instructions();
    let base  = program.text_start();

    let system_call_addresses: HashSet<Word> =
      system_calls.symbols().iter().map(|(_, &address)| address).collect();

    // Instruction index ranges of the function bodies, in table order.
    let ranges: Vec<(usize, usize)> = program
      .functions()
      .iter()
      .map(|(&entry, &size)| {
        let first = (entry - base) as usize / 4;
        (first, (first + size as usize).min(words.len()))
      })
      .collect();

    let functions: HashMap<usize, UnitId> =
      ranges.iter().enumerate().map(|(unit, &(first, _))| (first, unit)).collect();

    let linkage = CallLinkage::Units {
      functions    : &functions,
      system_calls : &system_call_addresses,
    };

    let mut units = Vec::with_capacity(ranges.len());
    for &(first, end) in &ranges {
      let entry = base + first as Word * 4;
      let mut context = EmitContext::new(base, ReturnStyle::Plain, linkage);
      emit_range(&self.emitter, &words[first..end], first, &mut context)?;
      units.push(context.finish(entry)?);
    }

    let inside_function = |index: usize| ranges.iter().any(|&(first, end)| first <= index && index < end);

    let mut context = EmitContext::new(base, ReturnStyle::Plain, linkage);
    for (index, &word) in words.iter().enumerate() {
      if inside_function(index) {
        continue;
      }
      context.begin(index);
      let instruction = Instruction::decode(word).ok_or(JitError::Undecodable { index, word })?;
      self.emitter.emit(&instruction, &mut context)?;
    }
    context.end_at(words.len());

    let entry_point = program.entry_point();
    let start = context
      .position_of((entry_point - base) as usize / 4)
      .ok_or(JitError::EntryInsideFunction { entry: entry_point })?;
    let main = context.finish(entry_point)?;

    debug!(
      functions = units.len(),
      main_steps = main.len(),
      start,
      "compiled program"
    );

    Ok(CompiledProgram { main, units, start })
  }

}
