/*!
  Instruction assemblers, grouped by operand family. Each takes a statement from the first pass
  and produces an `Instruction`, resolving symbols and directive expressions on the way.

  Operand order follows the usual assembly convention:

    R-format       op rC, rA, rB        rC ← rA op rB
    shift          op rC, rA, amount
    I-format       op rB, rA, imm       rB ← rA op imm
    branch         op rA, rB, target
    memory         op rB, offset(rA)
    call           call target
    callr          callr rA
    ret            ret
*/

use std::str::FromStr;

use crate::bytecode::{ExtendedOperation, Instruction, Operation, Word};
use crate::error::AssemblerError;
use crate::register::Register;
use crate::symboltable::LabelTable;

use super::parser::{parse_directive, parse_identifier, parse_integer, parse_memory_operand};
use super::Statement;

/// Operand access for one statement. `index` is the statement's instruction index.
pub struct Operands<'a> {
  statement : &'a Statement,
  symbols   : &'a LabelTable,
  index     : usize,
}

impl<'a> Operands<'a> {

  pub fn new(statement: &'a Statement, symbols: &'a LabelTable, index: usize) -> Operands<'a> {
    Operands { statement, symbols, index }
  }

  fn error(&self, message: impl Into<String>) -> AssemblerError {
    AssemblerError::new(self.statement.line, self.statement.text(), message)
  }

  fn expect(&self, count: usize) -> Result<(), AssemblerError> {
    match self.statement.operands.len() == count {
      true  => Ok(()),
      false => Err(self.error(format!(
        "Expected {} operands but found {}.",
        count,
        self.statement.operands.len()
      )))
    }
  }

  fn text(&self, position: usize) -> &str {
    self.statement.operands[position].as_str()
  }

  fn register_named(&self, name: &str) -> Result<u8, AssemblerError> {
    Register::from_str(name)
      .map(|register| register.number())
      .map_err(|_| self.error(format!("Invalid register '{}'.", name)))
  }

  fn register(&self, position: usize) -> Result<u8, AssemblerError> {
    self.register_named(self.text(position))
  }

  fn symbol(&self, name: &str) -> Option<i64> {
    self.symbols.get_address(name).map(|address| address as i64)
  }

  /// Evaluates `%lo`, `%hi` or `%hiadj` of a literal or symbol.
  fn directive(&self, kind: &str, inner: &str) -> Result<i64, AssemblerError> {
    let value = match parse_integer(inner).or_else(|| self.symbol(inner)) {
      Some(value) => value as u32,
      None        => return Err(self.error("Invalid integer value for assembler macro."))
    };

    match kind.to_ascii_lowercase().as_str() {
      "lo"    => Ok((value & 0xFFFF) as i64),
      "hi"    => Ok(((value >> 16) & 0xFFFF) as i64),
      "hiadj" => Ok((((value >> 16) & 0xFFFF) + ((value >> 15) & 1)) as i64 & 0xFFFF),
      _       => Err(self.error(format!("Assembler macro '{}' not found.", kind)))
    }
  }

  /// A literal, a directive expression, a symbol, or a negated symbol.
  fn value_of(&self, text: &str) -> Result<i64, AssemblerError> {
    if let Some(value) = parse_integer(text) {
      return Ok(value);
    }
    if let Some((kind, inner)) = parse_directive(text) {
      return self.directive(kind, inner);
    }

    let (negated, name) = match text.strip_prefix('-') {
      Some(name) => (true, name),
      None       => (false, text)
    };
    match parse_identifier(name).and_then(|name| self.symbol(name)) {
      Some(address) if negated => Ok(-address),
      Some(address)            => Ok(address),
      None => Err(self.error(format!("Unknown symbol or invalid value '{}'.", text)))
    }
  }

  /// A 16 bit immediate. Both the signed and the unsigned reading of the field are accepted.
  fn immediate_of(&self, text: &str) -> Result<u16, AssemblerError> {
    let value = self.value_of(text)?;
    match (i16::MIN as i64..=u16::MAX as i64).contains(&value) {
      true  => Ok(value as u16),
      false => Err(self.error(format!("Immediate value {} does not fit in 16 bits.", value)))
    }
  }

  fn immediate(&self, position: usize) -> Result<u16, AssemblerError> {
    self.immediate_of(self.text(position))
  }

  /// A branch target. Literals are taken as offsets; symbols and directive expressions are
  /// addresses, made relative to the instruction after the branch.
  fn branch_offset(&self, position: usize) -> Result<u16, AssemblerError> {
    let text = self.text(position);
    let offset = match parse_integer(text) {
      Some(offset) => offset,
      None         => self.value_of(text)? - (self.index as i64 + 1) * 4
    };
    match (i16::MIN as i64..=i16::MAX as i64).contains(&offset) {
      true  => Ok(offset as u16),
      false => Err(self.error(format!("Branch offset {} is out of range.", offset)))
    }
  }

  /// `offset(base)`, returned as the offset immediate and the base register.
  fn memory(&self, position: usize) -> Result<(u16, u8), AssemblerError> {
    let text = self.text(position);
    let (offset, base) = parse_memory_operand(text)
      .ok_or_else(|| self.error(format!("Invalid memory operand '{}'.", text)))?;
    let offset = match offset.is_empty() {
      true  => 0,
      false => self.immediate_of(offset)?
    };
    Ok((offset, self.register_named(base)?))
  }

  fn shift_amount(&self, position: usize) -> Result<u8, AssemblerError> {
    let value = self.value_of(self.text(position))?;
    match (0..=31).contains(&value) {
      true  => Ok(value as u8),
      false => Err(self.error(format!("Shift amount {} is not between 0 and 31.", value)))
    }
  }

  fn call_target(&self, position: usize) -> Result<u32, AssemblerError> {
    let address = self.value_of(self.text(position))?;
    match (0..=Word::MAX as i64).contains(&address) {
      true  => Ok((address as u32 / 4) & 0x03FF_FFFF),
      false => Err(self.error(format!("Invalid call target {}.", address)))
    }
  }

}

/// Assembles one statement. `statement.mnemonic` is already lowercase.
pub fn assemble_statement(statement: &Statement, symbols: &LabelTable, index: usize)
  -> Result<Instruction, AssemblerError>
{
  let operands = Operands::new(statement, symbols, index);
  let mnemonic = statement.mnemonic.as_str();

  if let Ok(operation) = ExtendedOperation::from_str(mnemonic) {
    return match operation {
      ExtendedOperation::Slli | ExtendedOperation::Srli => shift_immediate(operation, &operands),
      ExtendedOperation::Callr                           => callr(&operands),
      ExtendedOperation::Ret                             => ret(&operands),
      _                                                  => three_registers(operation, &operands),
    };
  }

  match Operation::from_str(mnemonic) {
    Ok(Operation::Call)                    => call(&operands),
    Ok(Operation::Br)                      => unconditional_branch(&operands),
    Ok(operation) if operation.is_branch() => branch(operation, &operands),
    Ok(operation) if operation.is_memory() => memory(operation, &operands),
    Ok(Operation::RType) | Err(_)          => Err(operands.error(format!("Unknown instruction '{}'.", mnemonic))),
    Ok(operation)                          => immediate_arithmetic(operation, &operands),
  }
}

fn three_registers(operation: ExtendedOperation, operands: &Operands) -> Result<Instruction, AssemblerError> {
  operands.expect(3)?;
  let c = operands.register(0)?;
  let a = operands.register(1)?;
  let b = operands.register(2)?;
  Ok(Instruction::register(operation, a, b, c))
}

fn shift_immediate(operation: ExtendedOperation, operands: &Operands) -> Result<Instruction, AssemblerError> {
  operands.expect(3)?;
  let c      = operands.register(0)?;
  let a      = operands.register(1)?;
  let amount = operands.shift_amount(2)?;
  Ok(Instruction::shift(operation, a, c, amount))
}

fn callr(operands: &Operands) -> Result<Instruction, AssemblerError> {
  operands.expect(1)?;
  let a = operands.register(0)?;
  Ok(Instruction::register(ExtendedOperation::Callr, a, 0, Register::RETURN_ADDRESS.number()))
}

fn ret(operands: &Operands) -> Result<Instruction, AssemblerError> {
  operands.expect(0)?;
  Ok(Instruction::register(ExtendedOperation::Ret, Register::RETURN_ADDRESS.number(), 0, 0))
}

fn immediate_arithmetic(operation: Operation, operands: &Operands) -> Result<Instruction, AssemblerError> {
  operands.expect(3)?;
  let b         = operands.register(0)?;
  let a         = operands.register(1)?;
  let immediate = operands.immediate(2)?;
  Ok(Instruction::immediate(operation, a, b, immediate))
}

fn branch(operation: Operation, operands: &Operands) -> Result<Instruction, AssemblerError> {
  operands.expect(3)?;
  let a      = operands.register(0)?;
  let b      = operands.register(1)?;
  let offset = operands.branch_offset(2)?;
  Ok(Instruction::immediate(operation, a, b, offset))
}

fn unconditional_branch(operands: &Operands) -> Result<Instruction, AssemblerError> {
  operands.expect(1)?;
  let offset = operands.branch_offset(0)?;
  Ok(Instruction::immediate(Operation::Br, 0, 0, offset))
}

fn memory(operation: Operation, operands: &Operands) -> Result<Instruction, AssemblerError> {
  operands.expect(2)?;
  let b              = operands.register(0)?;
  let (offset, a)    = operands.memory(1)?;
  Ok(Instruction::immediate(operation, a, b, offset))
}

fn call(operands: &Operands) -> Result<Instruction, AssemblerError> {
  operands.expect(1)?;
  let target = operands.call_target(0)?;
  Ok(Instruction::jump(Operation::Call, target))
}
