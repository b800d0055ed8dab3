/*!
  The JIT translates guest instructions into routines: chains of host closures that operate
  directly on the machine's `CpuState`. A routine is produced by an `Emitter`, which appends the
  steps for one decoded instruction at a time to an `EmitContext`.

  Each step returns a `Flow` telling the routine what to do next. Branch targets are labels,
  created on demand for an instruction index and resolved to step positions when the unit is
  finished. Instruction indices are absolute: a branch at index `i` with immediate `imm` targets
  index `i + imm / 4 + 1`.

  Two compilers share this machinery:
    * `PartialJit` compiles one function at a time on demand and falls back to the interpreter
      for anything it cannot compile.
    * `FullJit` compiles a whole program ahead of time, one routine per function plus a main
      routine.
*/

mod emitter;
mod full;
mod partial;

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};

use crate::bytecode::{Instruction, Word};
use crate::cpu::CpuState;
use crate::error::{JitError, RuntimeFault};
use crate::syscall::SystemCalls;

pub use emitter::ClosureEmitter;
pub use full::{CompiledProgram, FullJit};
pub use partial::PartialJit;

/// What compiled code operates on. The state is the same one the interpreter uses.
pub struct ExecutionContext<'a> {
  pub state        : &'a mut CpuState,
  pub system_calls : &'a mut SystemCalls,
}

/// A jump target within one routine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Label(usize);

/// Identifies a routine within a compiled program.
pub type UnitId = usize;

/// Control transfer requested by a step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
  Next,
  Jump(Label),
  Call(UnitId),
  Return,
}

pub type Step = Box<dyn Fn(&mut ExecutionContext<'_>) -> Result<Flow, RuntimeFault>>;

/// Boxes a closure as a `Step`.
pub fn step<F>(f: F) -> Step
  where F: Fn(&mut ExecutionContext<'_>) -> Result<Flow, RuntimeFault> + 'static
{
  Box::new(f)
}

/// How `ret` leaves a routine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReturnStyle {
  /// Load the return address into the PC, then return to the interpreter.
  SetProgramCounter,
  /// Just return to the calling routine.
  Plain,
}

/// Where `call` may go.
#[derive(Clone, Copy)]
pub enum CallLinkage<'a> {
  /// Calls cannot be compiled.
  Unsupported,
  /// Calls go to pre-created routines, keyed by entry instruction index, or to system calls.
  Units {
    functions    : &'a HashMap<usize, UnitId>,
    system_calls : &'a HashSet<Word>,
  },
}

/**
  The code generation backend. Appends steps semantically equivalent to `instruction` to
  `context`, or fails if it has no translation for it.
*/
pub trait Emitter {
  fn emit(&self, instruction: &Instruction, context: &mut EmitContext<'_>) -> Result<(), JitError>;
}

/// Accumulates the steps and labels of one routine while it is being emitted.
pub struct EmitContext<'a> {
  base         : Word,
  index        : usize,
  steps        : Vec<Step>,
  labels       : HashMap<usize, (Label, usize)>,
  positions    : HashMap<usize, usize>,
  return_style : ReturnStyle,
  linkage      : CallLinkage<'a>,
}

impl<'a> EmitContext<'a> {

  /// `base` is the address of instruction index 0.
  pub fn new(base: Word, return_style: ReturnStyle, linkage: CallLinkage<'a>) -> EmitContext<'a> {
    EmitContext {
      base,
      index     : 0,
      steps     : vec![],
      labels    : HashMap::new(),
      positions : HashMap::new(),
      return_style,
      linkage,
    }
  }

  pub fn index(&self) -> usize {
    self.index
  }

  /// The PC while the current instruction executes, which is already past it.
  pub fn pc_after(&self) -> Word {
    self.base.wrapping_add((self.index as Word + 1).wrapping_mul(4))
  }

  pub fn base(&self) -> Word {
    self.base
  }

  pub fn return_style(&self) -> ReturnStyle {
    self.return_style
  }

  pub fn linkage(&self) -> CallLinkage<'a> {
    self.linkage
  }

  pub fn push(&mut self, step: Step) {
    self.steps.push(step);
  }

  /// The label for instruction `target`, created on first use.
  pub fn label_at(&mut self, target: i64) -> Result<Label, JitError> {
    if target < 0 {
      return Err(JitError::UnresolvedBranch { index: self.index, target });
    }
    let next  = Label(self.labels.len());
    let index = self.index;
    Ok(self.labels.entry(target as usize).or_insert((next, index)).0)
  }

  /// Makes `index` the current instruction and binds it to the next step position.
  pub fn begin(&mut self, index: usize) {
    self.index = index;
    self.positions.insert(index, self.steps.len());
  }

  /// Binds `index`, typically one past the last instruction, to the end of the routine.
  pub fn end_at(&mut self, index: usize) {
    self.positions.insert(index, self.steps.len());
  }

  pub fn position_of(&self, index: usize) -> Option<usize> {
    self.positions.get(&index).cloned()
  }

  /// Resolves every label and produces the routine.
  pub fn finish(self, entry: Word) -> Result<Routine, JitError> {
    let mut targets = vec![0; self.labels.len()];
    for (&target, &(label, referrer)) in &self.labels {
      match self.positions.get(&target) {
        Some(&position) => targets[label.0] = position,
        None => return Err(JitError::UnresolvedBranch { index: referrer, target: target as i64 })
      }
    }
    Ok(Routine { entry, steps: self.steps, targets })
  }

}

/**
  Emits `words`, the first of which has instruction index `first`, into `context`. The index past
  the last word is left unbound, so a branch out of the range fails to resolve rather than
  falling off the end of the routine.
*/
pub fn emit_range(emitter: &dyn Emitter, words: &[Word], first: usize, context: &mut EmitContext<'_>)
  -> Result<(), JitError>
{
  for (offset, &word) in words.iter().enumerate() {
    let index = first + offset;
    context.begin(index);
    let instruction = Instruction::decode(word).ok_or(JitError::Undecodable { index, word })?;
    emitter.emit(&instruction, context)?;
  }
  Ok(())
}

/// A compiled unit: a chain of steps plus the step position of every label.
pub struct Routine {
  entry   : Word,
  steps   : Vec<Step>,
  targets : Vec<usize>,
}

impl Routine {

  pub fn entry(&self) -> Word {
    self.entry
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  pub fn invoke(&self, context: &mut ExecutionContext<'_>, units: &[Routine]) -> Result<(), RuntimeFault> {
    self.invoke_from(0, context, units)
  }

  /// Runs from step `position` until a step returns or the chain runs out.
  pub fn invoke_from(&self, mut position: usize, context: &mut ExecutionContext<'_>, units: &[Routine])
    -> Result<(), RuntimeFault>
  {
    while let Some(current) = self.steps.get(position) {
      match current(context)? {
        Flow::Next        => position += 1,
        Flow::Jump(label) => position = self.targets[label.0],
        Flow::Call(unit)  => {
          if let Some(routine) = units.get(unit) {
            routine.invoke(context, units)?;
          }
          position += 1;
        }
        Flow::Return      => return Ok(()),
      }
    }
    Ok(())
  }

}

impl Debug for Routine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Routine")
     .field("entry", &self.entry)
     .field("steps", &self.steps.len())
     .field("labels", &self.targets.len())
     .finish()
  }
}
