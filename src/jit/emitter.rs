use crate::alu;
use crate::bytecode::{ExtendedOperation, IFormat, Instruction, JFormat, Operation, RFormat, Word};
use crate::error::{JitError, RuntimeFault};
use crate::cpu::Registers;
use crate::register::Register;

use super::{step, CallLinkage, EmitContext, Emitter, ExecutionContext, Flow, ReturnStyle};

/**
  Translates each instruction into a closure specialized for its operation and operands. Every
  decision that does not depend on register or memory contents (which operation, which
  registers, how the immediate extends, where a branch goes) is made here, once, rather than on
  every execution.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct ClosureEmitter;

impl Emitter for ClosureEmitter {
  fn emit(&self, instruction: &Instruction, context: &mut EmitContext<'_>) -> Result<(), JitError> {
    let index = context.index();

    let emitted = match *instruction {
      Instruction::Immediate(operation, format) => emit_immediate(operation, format, context)?,
      Instruction::Register(operation, format)  => emit_register(operation, format, context),
      Instruction::Jump(operation, format)      => emit_call(operation, format, context)?,
    };

    match emitted {
      true  => Ok(()),
      false => Err(JitError::Unsupported { index, instruction: instruction.to_string() })
    }
  }
}

/// On a fault, leaves the PC just past the faulting instruction, where the interpreter has it.
fn faulting_at<T>(result: Result<T, RuntimeFault>, c: &mut ExecutionContext<'_>, pc: Word) -> Result<T, RuntimeFault> {
  if result.is_err() {
    c.state.pc = pc;
  }
  result
}

// region Immediate format

fn emit_immediate(operation: Operation, format: IFormat, context: &mut EmitContext<'_>) -> Result<bool, JitError> {
  if let Some(condition) = alu::branch_condition(operation) {
    emit_branch(operation, condition, format, context)?;
    return Ok(true);
  }
  if operation.is_memory() {
    return Ok(emit_memory(operation, format, context));
  }

  let function = match alu::immediate_operation(operation) {
    Some(function) => function,
    None           => return Ok(false)
  };
  let operand  = alu::immediate_operand(operation, &format);
  let (a, b)   = (format.a, format.b);

  context.push(step(move |c| {
    let value = function(c.state.registers.get(a), operand);
    c.state.registers.set(b, value);
    Ok(Flow::Next)
  }));
  Ok(true)
}

fn emit_branch(operation: Operation, condition: alu::Condition, format: IFormat, context: &mut EmitContext<'_>)
  -> Result<(), JitError>
{
  let (a, b)   = (format.a, format.b);
  let offset   = format.signed_immediate();
  let pc_after = context.pc_after();

  // A misaligned target faults when taken, exactly as in the interpreter.
  if offset % 4 != 0 {
    let instruction: &'static str = operation.into();
    let address = pc_after.wrapping_add(offset as Word);
    context.push(step(move |c| {
      match condition(c.state.registers.get(a), c.state.registers.get(b)) {
        true  => faulting_at(Err(RuntimeFault::MisalignedAddress { instruction, pc: pc_after, address }), c, pc_after),
        false => Ok(Flow::Next)
      }
    }));
    return Ok(());
  }

  let label = context.label_at(context.index() as i64 + (offset / 4) as i64 + 1)?;
  context.push(step(move |c| {
    match condition(c.state.registers.get(a), c.state.registers.get(b)) {
      true  => Ok(Flow::Jump(label)),
      false => Ok(Flow::Next)
    }
  }));
  Ok(())
}

fn emit_memory(operation: Operation, format: IFormat, context: &mut EmitContext<'_>) -> bool {
  let (a, b)                    = (format.a, format.b);
  let offset                    = format.signed_immediate();
  let pc                        = context.pc_after();
  let instruction: &'static str = operation.into();

  let effective = move |registers: &Registers| registers.get(a).wrapping_add(offset) as Word;

  let emitted = match operation {
    Operation::Ldw => step(move |c| {
      let value = faulting_at(c.state.memory.read_word(effective(&c.state.registers), instruction, pc), c, pc)?;
      c.state.registers.set(b, value);
      Ok(Flow::Next)
    }),
    Operation::Stw => step(move |c| {
      let address = effective(&c.state.registers);
      let written = c.state.memory.write_word(address, c.state.registers.get(b), instruction, pc);
      faulting_at(written, c, pc)?;
      Ok(Flow::Next)
    }),
    Operation::Ldb => step(move |c| {
      let value = faulting_at(c.state.memory.read_byte(effective(&c.state.registers), instruction, pc), c, pc)?;
      c.state.registers.set(b, value as i8 as i32);
      Ok(Flow::Next)
    }),
    Operation::Ldbu => step(move |c| {
      let value = faulting_at(c.state.memory.read_byte(effective(&c.state.registers), instruction, pc), c, pc)?;
      c.state.registers.set(b, value as i32);
      Ok(Flow::Next)
    }),
    Operation::Stb => step(move |c| {
      let address = effective(&c.state.registers);
      let written = c.state.memory.write_byte(address, c.state.registers.get(b) as u8, instruction, pc);
      faulting_at(written, c, pc)?;
      Ok(Flow::Next)
    }),
    _ => return false
  };

  context.push(emitted);
  true
}

// endregion

// region Register format

fn emit_register(operation: ExtendedOperation, format: RFormat, context: &mut EmitContext<'_>) -> bool {
  let (a, b, c_register) = (format.a, format.b, format.c);

  match operation {
    ExtendedOperation::Ret => {
      let pc_after = context.pc_after();
      match context.return_style() {
        ReturnStyle::SetProgramCounter => context.push(step(move |c| {
          let return_address = c.state.registers.read(Register::RETURN_ADDRESS) as Word;
          c.state.pc = pc_after;
          c.state.jump_to(return_address, "ret")?;
          Ok(Flow::Return)
        })),
        ReturnStyle::Plain => context.push(step(|_| Ok(Flow::Return))),
      }
      true
    }

    ExtendedOperation::Slli | ExtendedOperation::Srli => {
      let function = match alu::shift_operation(operation) {
        Some(function) => function,
        None           => return false
      };
      let amount = format.shift_amount() as i32;
      context.push(step(move |c| {
        let value = function(c.state.registers.get(a), amount);
        c.state.registers.set(c_register, value);
        Ok(Flow::Next)
      }));
      true
    }

    _ => match alu::register_operation(operation) {
      Some(function) => {
        context.push(step(move |c| {
          let value = function(c.state.registers.get(a), c.state.registers.get(b));
          c.state.registers.set(c_register, value);
          Ok(Flow::Next)
        }));
        true
      }
      // callr has no compiled form.
      None => false
    }
  }
}

// endregion

// region Jump format

fn emit_call(operation: Operation, format: JFormat, context: &mut EmitContext<'_>) -> Result<bool, JitError> {
  if operation != Operation::Call {
    return Ok(false);
  }
  let (functions, system_calls) = match context.linkage() {
    CallLinkage::Units { functions, system_calls } => (functions, system_calls),
    CallLinkage::Unsupported => return Ok(false)
  };

  let pc_after       = context.pc_after();
  let target         = format.target(pc_after);
  let return_address = pc_after as i32;

  let unit = match target >= context.base() {
    true  => functions.get(&((target - context.base()) as usize / 4)).cloned(),
    false => None
  };

  if let Some(unit) = unit {
    context.push(step(move |c| {
      c.state.registers.write(Register::RETURN_ADDRESS, return_address);
      Ok(Flow::Call(unit))
    }));
    return Ok(true);
  }

  if system_calls.contains(&target) {
    context.push(step(move |c| {
      c.state.registers.write(Register::RETURN_ADDRESS, return_address);
      c.system_calls.invoke(target, &mut *c.state);
      Ok(Flow::Next)
    }));
    return Ok(true);
  }

  Err(JitError::UnknownCallTarget { index: context.index(), address: target })
}

// endregion
