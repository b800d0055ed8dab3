/*!
  Instruction semantics shared by the interpreter and the JIT. Each lookup returns a plain
  function so the JIT can pick it once at compile time and the interpreter can pick it per
  instruction, and both compute exactly the same thing.
*/

use crate::bytecode::{ExtendedOperation, IFormat, Operation};

pub type BinaryOperation = fn(i32, i32) -> i32;
pub type Condition = fn(i32, i32) -> bool;

fn add(a: i32, b: i32) -> i32 { a.wrapping_add(b) }
fn sub(a: i32, b: i32) -> i32 { a.wrapping_sub(b) }
fn and(a: i32, b: i32) -> i32 { a & b }
fn or(a: i32, b: i32) -> i32 { a | b }
fn xor(a: i32, b: i32) -> i32 { a ^ b }
fn nor(a: i32, b: i32) -> i32 { !(a | b) }
fn equal(a: i32, b: i32) -> i32 { (a == b) as i32 }
fn not_equal(a: i32, b: i32) -> i32 { (a != b) as i32 }
fn greater_equal(a: i32, b: i32) -> i32 { (a >= b) as i32 }
fn less_than(a: i32, b: i32) -> i32 { (a < b) as i32 }

// Shifts are logical and use only the low five bits of the amount.
fn shift_left(a: i32, amount: i32) -> i32 {
  ((a as u32) << (amount as u32 & 0x1F)) as i32
}
fn shift_right(a: i32, amount: i32) -> i32 {
  ((a as u32) >> (amount as u32 & 0x1F)) as i32
}

/// rC ← f(rA, rB) for the register-format arithmetic, logic, shift and compare instructions.
pub fn register_operation(operation: ExtendedOperation) -> Option<BinaryOperation> {
  use ExtendedOperation::*;
  match operation {
    Add   => Some(add),
    Sub   => Some(sub),
    And   => Some(and),
    Or    => Some(or),
    Xor   => Some(xor),
    Nor   => Some(nor),
    Sll   => Some(shift_left),
    Srl   => Some(shift_right),
    Cmpeq => Some(equal),
    Cmpne => Some(not_equal),
    Cmpge => Some(greater_equal),
    Cmplt => Some(less_than),
    Slli | Srli | Callr | Ret => None,
  }
}

/// rC ← f(rA, amount) for the shift-immediates.
pub fn shift_operation(operation: ExtendedOperation) -> Option<BinaryOperation> {
  match operation {
    ExtendedOperation::Slli => Some(shift_left),
    ExtendedOperation::Srli => Some(shift_right),
    _ => None
  }
}

/// rB ← f(rA, immediate) for the immediate-format arithmetic, logic and compare instructions.
pub fn immediate_operation(operation: Operation) -> Option<BinaryOperation> {
  use Operation::*;
  match operation {
    Addi                  => Some(add),
    Andi | Andhi          => Some(and),
    Ori  | Orhi           => Some(or),
    Xori | Xorhi          => Some(xor),
    Cmpeqi                => Some(equal),
    Cmpnei                => Some(not_equal),
    Cmpgei                => Some(greater_equal),
    Cmplti                => Some(less_than),
    _                     => None,
  }
}

/// The immediate as the given operation reads it: sign-extended for arithmetic and compares,
/// zero-extended for logic, and moved to the upper half for the `*hi` forms.
pub fn immediate_operand(operation: Operation, format: &IFormat) -> i32 {
  use Operation::*;
  match operation {
    Andi  | Ori  | Xori  => format.unsigned_immediate() as i32,
    Andhi | Orhi | Xorhi => (format.unsigned_immediate() << 16) as i32,
    _                    => format.signed_immediate(),
  }
}

/// Whether a branch with operands (rA, rB) is taken.
pub fn branch_condition(operation: Operation) -> Option<Condition> {
  use Operation::*;
  match operation {
    Br  => Some(|_, _| true),
    Beq => Some(|a, b| a == b),
    Bne => Some(|a, b| a != b),
    Bge => Some(|a, b| a >= b),
    Blt => Some(|a, b| a < b),
    _   => None
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn arithmetic_wraps() {
    let add = register_operation(ExtendedOperation::Add).unwrap();
    assert_eq!(add(i32::MAX, 1), i32::MIN);
    let sub = register_operation(ExtendedOperation::Sub).unwrap();
    assert_eq!(sub(12, 5), 7);
    assert_eq!(sub(i32::MIN, 1), i32::MAX);
  }

  #[test]
  fn shifts_are_logical_and_masked() {
    let srl = register_operation(ExtendedOperation::Srl).unwrap();
    assert_eq!(srl(-1, 28), 0xF);
    assert_eq!(srl(8, 33), 4);
    let slli = shift_operation(ExtendedOperation::Slli).unwrap();
    assert_eq!(slli(1, 31), i32::MIN);
  }

  #[test]
  fn compares_are_signed() {
    let cmplt = register_operation(ExtendedOperation::Cmplt).unwrap();
    assert_eq!(cmplt(-1, 0), 1);
    let cmpge = register_operation(ExtendedOperation::Cmpge).unwrap();
    assert_eq!(cmpge(0, -1), 1);
    assert_eq!(cmpge(-1, 0), 0);
  }

  #[test]
  fn immediate_extension_depends_on_operation() {
    let format = IFormat::new(0, 0, 0, 0xFFFF);
    assert_eq!(immediate_operand(Operation::Addi, &format), -1);
    assert_eq!(immediate_operand(Operation::Cmplti, &format), -1);
    assert_eq!(immediate_operand(Operation::Ori, &format), 0xFFFF);
    assert_eq!(immediate_operand(Operation::Orhi, &format), 0xFFFF_0000u32 as i32);
  }

  #[test]
  fn nor_and_branch_conditions() {
    let nor = register_operation(ExtendedOperation::Nor).unwrap();
    assert_eq!(nor(0, 0), -1);
    let bge = branch_condition(Operation::Bge).unwrap();
    assert!(bge(-1, -1));
    assert!(!bge(-2, -1));
    assert!(branch_condition(Operation::Addi).is_none());
  }
}
