use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};

use super::binary::{
  extended_opcode,
  opcode_of,
  IFormat,
  JFormat,
  RFormat,
  Word,
  SHIFT_AMOUNT_MASK
};

/// The three instruction layouts.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Format {
  I,
  R,
  J
}

/**
  Primary opcodes of the machine, the low six bits of every instruction word.

  Every register-format operation shares the single opcode `RType` and is told apart by its
  `ExtendedOperation`. The remaining opcodes are immediate-format, except `Call`, which is the
  only jump-format instruction.
*/
#[derive(
StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug,            Hash
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Operation {
  Call   = 0x00, // call label
  Ldbu   = 0x03, // ldbu rB, offset(rA)
  Addi   = 0x04, // addi rB, rA, imm
  Stb    = 0x05, // stb rB, offset(rA)
  Br     = 0x06, // br label
  Ldb    = 0x07, // ldb rB, offset(rA)
  Cmpgei = 0x08, // cmpgei rB, rA, imm
  Andi   = 0x0C, // andi rB, rA, imm
  Bge    = 0x0E, // bge rA, rB, label
  Cmplti = 0x10, // cmplti rB, rA, imm
  Ori    = 0x14, // ori rB, rA, imm
  Stw    = 0x15, // stw rB, offset(rA)
  Blt    = 0x16, // blt rA, rB, label
  Ldw    = 0x17, // ldw rB, offset(rA)
  Cmpnei = 0x18, // cmpnei rB, rA, imm
  Xori   = 0x1C, // xori rB, rA, imm
  Bne    = 0x1E, // bne rA, rB, label
  Cmpeqi = 0x20, // cmpeqi rB, rA, imm
  Beq    = 0x26, // beq rA, rB, label
  Andhi  = 0x2C, // andhi rB, rA, imm
  Orhi   = 0x34, // orhi rB, rA, imm
  #[strum(serialize = "<r-type>")]
  RType  = 0x3A, // see `ExtendedOperation`
  Xorhi  = 0x3C, // xorhi rB, rA, imm
}

impl Operation {

  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn format(&self) -> Format {
    match self {
      Operation::Call  => Format::J,
      Operation::RType => Format::R,
      _                => Format::I
    }
  }

  /// Conditional and unconditional branches, whose immediate is a PC-relative byte offset.
  pub fn is_branch(&self) -> bool {
    matches!(
      self,
      Operation::Br | Operation::Beq | Operation::Bne | Operation::Bge | Operation::Blt
    )
  }

  pub fn is_memory(&self) -> bool {
    matches!(
      self,
      Operation::Ldw | Operation::Stw | Operation::Ldb | Operation::Ldbu | Operation::Stb
    )
  }

}

/**
  Extended opcodes of the register-format instructions. The discriminant is the full 11 bit
  opx field with a zero shift amount, packed from the six bit pattern by `extended_opcode`.
*/
#[derive(
StrumDisplay, IntoStaticStr, EnumString, EnumIter,
Clone,        Copy,          Eq, PartialEq,  Debug, Hash
)]
#[strum(serialize_all = "lowercase")]
#[repr(u16)]
pub enum ExtendedOperation {
  Add   = extended_opcode(0b110001),
  Sub   = extended_opcode(0b111001),
  And   = extended_opcode(0b001110),
  Or    = extended_opcode(0b010110),
  Xor   = extended_opcode(0b011110),
  Nor   = extended_opcode(0b000110),
  Sll   = extended_opcode(0b010011),
  Srl   = extended_opcode(0b011011),
  Slli  = extended_opcode(0b010010),
  Srli  = extended_opcode(0b011010),
  Cmpeq = extended_opcode(0b100000),
  Cmpne = extended_opcode(0b011000),
  Cmpge = extended_opcode(0b001000),
  Cmplt = extended_opcode(0b010000),
  Callr = extended_opcode(0b011101),
  Ret   = extended_opcode(0b000101),
}

impl ExtendedOperation {

  pub fn code(&self) -> u16 {
    *self as u16
  }

  /// The bits of the opx field that identify this operation. Shift-immediates keep their
  /// shift amount in the remaining bits.
  pub fn mask(&self) -> u16 {
    match self {
      ExtendedOperation::Slli | ExtendedOperation::Srli => 0x7FF & !SHIFT_AMOUNT_MASK,
      _ => 0x7FF
    }
  }

  pub fn from_opx(opx: u16) -> Option<ExtendedOperation> {
    ExtendedOperation::iter().find(|operation| opx & operation.mask() == operation.code())
  }

}

/// A decoded instruction: the operation it performs together with the format view of its word.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  Immediate(Operation, IFormat),
  Register(ExtendedOperation, RFormat),
  Jump(Operation, JFormat),
}

impl Instruction {

  pub fn immediate(operation: Operation, a: u8, b: u8, immediate: u16) -> Instruction {
    Instruction::Immediate(operation, IFormat::new(operation.code(), a, b, immediate))
  }

  pub fn register(operation: ExtendedOperation, a: u8, b: u8, c: u8) -> Instruction {
    Instruction::Register(
      operation,
      RFormat::new(Operation::RType.code(), operation.code(), a, b, c)
    )
  }

  /// A shift-immediate, with `amount` folded into the opx field.
  pub fn shift(operation: ExtendedOperation, a: u8, c: u8, amount: u8) -> Instruction {
    let opx = operation.code() | (amount as u16 & SHIFT_AMOUNT_MASK);
    Instruction::Register(operation, RFormat::new(Operation::RType.code(), opx, a, 0, c))
  }

  pub fn jump(operation: Operation, immediate: u32) -> Instruction {
    Instruction::Jump(operation, JFormat::new(operation.code(), immediate))
  }

  /// Returns `None` if the opcode, or for register-format words the opx, names no operation.
  pub fn decode(word: Word) -> Option<Instruction> {
    let operation = Operation::try_from(opcode_of(word)).ok()?;
    match operation.format() {
      Format::I => Some(Instruction::Immediate(operation, IFormat::decode(word))),
      Format::J => Some(Instruction::Jump(operation, JFormat::decode(word))),
      Format::R => {
        let format = RFormat::decode(word);
        ExtendedOperation::from_opx(format.opx).map(|operation| Instruction::Register(operation, format))
      }
    }
  }

  pub fn encode(&self) -> Word {
    match self {
      Instruction::Immediate(_, format) => format.encode(),
      Instruction::Register(_, format)  => format.encode(),
      Instruction::Jump(_, format)      => format.encode(),
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Instruction::Immediate(operation, _) => operation.into(),
      Instruction::Register(operation, _)  => operation.into(),
      Instruction::Jump(operation, _)      => operation.into(),
    }
  }

}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Instruction::Immediate(operation, i) => {
        write!(f, "{}(A={}, B={}, imm={})", operation, i.a, i.b, i.signed_immediate())
      }
      Instruction::Register(operation, r) => {
        write!(f, "{}(A={}, B={}, C={}, opx={:#x})", operation, r.a, r.b, r.c, r.opx)
      }
      Instruction::Jump(operation, j) => {
        write!(f, "{}({:#x})", operation, j.immediate << 2)
      }
    }
  }
}


#[cfg(test)]
mod tests {
  use std::str::FromStr;
  use super::*;

  #[test]
  fn operation_codes_round_trip_through_primitive() {
    for operation in Operation::iter() {
      assert_eq!(Operation::try_from(operation.code()).unwrap(), operation);
    }
    assert!(Operation::try_from(0x01).is_err());
  }

  #[test]
  fn mnemonics_parse_lowercase() {
    assert_eq!(Operation::from_str("cmpeqi").unwrap(), Operation::Cmpeqi);
    assert_eq!(ExtendedOperation::from_str("srli").unwrap(), ExtendedOperation::Srli);
    assert!(Operation::from_str("rtype").is_err());
    assert_eq!(Operation::Xorhi.to_string(), "xorhi");
  }

  #[test]
  fn shift_immediate_lookup_masks_the_amount() {
    let slli = ExtendedOperation::Slli.code();
    for amount in 0..32 {
      assert_eq!(ExtendedOperation::from_opx(slli | amount), Some(ExtendedOperation::Slli));
    }
    // Non-shift operations require the low bits to be clear.
    assert_eq!(ExtendedOperation::from_opx(ExtendedOperation::Add.code() | 1), None);
  }

  #[test]
  fn decode_recovers_operation_and_fields() {
    let instruction = Instruction::register(ExtendedOperation::Sub, 1, 2, 3);
    assert_eq!(Instruction::decode(instruction.encode()), Some(instruction));

    let instruction = Instruction::shift(ExtendedOperation::Srli, 4, 5, 31);
    match Instruction::decode(instruction.encode()) {
      Some(Instruction::Register(ExtendedOperation::Srli, r)) => {
        assert_eq!(r.shift_amount(), 31);
        assert_eq!((r.a, r.c), (4, 5));
      }
      other => panic!("unexpected decode: {:?}", other),
    }

    let instruction = Instruction::immediate(Operation::Bne, 0, 1, -12i16 as u16);
    assert_eq!(Instruction::decode(instruction.encode()), Some(instruction));

    let instruction = Instruction::jump(Operation::Call, 1250);
    assert_eq!(Instruction::decode(instruction.encode()), Some(instruction));
  }

  #[test]
  fn unknown_words_do_not_decode() {
    assert_eq!(Instruction::decode(0x01), None);
    // R-type opcode with an opx that names nothing.
    assert_eq!(Instruction::decode(RFormat::new(0x3A, 0x7FF, 0, 0, 0).encode()), None);
  }

}
