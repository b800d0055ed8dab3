/*!
  This module is responsible for the encoding and decoding of binary instructions. Every
  instruction is a single 32 bit word viewed through one of three formats:

    I-format: [A:5][B:5][Immediate high:8][Immediate low:8][OpCode:6]
    R-format: [A:5][B:5][C:5][Opx high:3][Opx low:8][OpCode:6]
    J-format: [Immediate:26][OpCode:6]

  The I-format immediate and the R-format opx field are stored as two chunks, the low chunk at
  bit 6 and the high chunk at bit 14, so that register fields land at the same offsets in every
  format.

  Encoding masks every field to its width and cannot fail. Decoding cannot fail either: a word
  with an unknown opcode still decodes into its fields, it just has no meaning until dispatch.

*/

// If you change this you must also change every `encode` and `decode` below.
pub type Word = u32;

pub const OPCODE_MASK: Word = 0x3F;
const REGISTER_MASK: Word = 0x1F;
const CHUNK_MASK: Word = 0xFF;
const OPX_HIGH_MASK: Word = 0x07;
const J_IMMEDIATE_MASK: Word = 0x03FF_FFFF;

const LOW_CHUNK_SHIFT: u32 = 6;
const HIGH_CHUNK_SHIFT: u32 = 14;
const C_SHIFT: u32 = 17;
const B_SHIFT: u32 = 22;
const A_SHIFT: u32 = 27;

/// Places the six significant bits of an extended opcode pattern at the top of the 11 bit opx
/// field. The low five bits stay free for the shift amount of the shift-immediate instructions.
pub const fn extended_opcode(pattern: u16) -> u16 {
  (pattern & 0x3F) << 5
}

/// Mask selecting the shift amount inside an opx field.
pub const SHIFT_AMOUNT_MASK: u16 = 0x1F;

#[inline(always)]
pub fn opcode_of(word: Word) -> u8 {
  (word & OPCODE_MASK) as u8
}

#[inline(always)]
fn split_chunks(value: Word, high_mask: Word) -> Word {
  ((value & CHUNK_MASK) << LOW_CHUNK_SHIFT) | (((value >> 8) & high_mask) << HIGH_CHUNK_SHIFT)
}

#[inline(always)]
fn join_chunks(word: Word, high_mask: Word) -> Word {
  ((word >> LOW_CHUNK_SHIFT) & CHUNK_MASK) | (((word >> HIGH_CHUNK_SHIFT) & high_mask) << 8)
}

/// Immediate format: two registers and a 16 bit immediate.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct IFormat {
  pub opcode    : u8,
  pub a         : u8,
  pub b         : u8,
  pub immediate : u16,
}

impl IFormat {

  pub fn new(opcode: u8, a: u8, b: u8, immediate: u16) -> IFormat {
    IFormat { opcode, a, b, immediate }
  }

  pub fn encode(&self) -> Word {
    (self.opcode as Word & OPCODE_MASK)
      | split_chunks(self.immediate as Word, CHUNK_MASK)
      | ((self.b as Word & REGISTER_MASK) << B_SHIFT)
      | ((self.a as Word & REGISTER_MASK) << A_SHIFT)
  }

  pub fn decode(word: Word) -> IFormat {
    IFormat {
      opcode    : opcode_of(word),
      a         : ((word >> A_SHIFT) & REGISTER_MASK) as u8,
      b         : ((word >> B_SHIFT) & REGISTER_MASK) as u8,
      immediate : join_chunks(word, CHUNK_MASK) as u16,
    }
  }

  /// The immediate zero-extended to 32 bits.
  pub fn unsigned_immediate(&self) -> u32 {
    self.immediate as u32
  }

  /// The immediate sign-extended from bit 15.
  pub fn signed_immediate(&self) -> i32 {
    self.immediate as i16 as i32
  }

}

/// Register format: three registers and an 11 bit extended opcode.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct RFormat {
  pub opcode : u8,
  pub opx    : u16,
  pub a      : u8,
  pub b      : u8,
  pub c      : u8,
}

impl RFormat {

  pub fn new(opcode: u8, opx: u16, a: u8, b: u8, c: u8) -> RFormat {
    RFormat { opcode, opx, a, b, c }
  }

  pub fn encode(&self) -> Word {
    (self.opcode as Word & OPCODE_MASK)
      | split_chunks(self.opx as Word, OPX_HIGH_MASK)
      | ((self.c as Word & REGISTER_MASK) << C_SHIFT)
      | ((self.b as Word & REGISTER_MASK) << B_SHIFT)
      | ((self.a as Word & REGISTER_MASK) << A_SHIFT)
  }

  pub fn decode(word: Word) -> RFormat {
    RFormat {
      opcode : opcode_of(word),
      opx    : join_chunks(word, OPX_HIGH_MASK) as u16,
      a      : ((word >> A_SHIFT) & REGISTER_MASK) as u8,
      b      : ((word >> B_SHIFT) & REGISTER_MASK) as u8,
      c      : ((word >> C_SHIFT) & REGISTER_MASK) as u8,
    }
  }

  /// The shift amount stored in the low bits of the opx field.
  pub fn shift_amount(&self) -> u32 {
    (self.opx & SHIFT_AMOUNT_MASK) as u32
  }

}

/// Jump format: a 26 bit word address.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct JFormat {
  pub opcode    : u8,
  pub immediate : u32,
}

impl JFormat {

  pub fn new(opcode: u8, immediate: u32) -> JFormat {
    JFormat { opcode, immediate }
  }

  pub fn encode(&self) -> Word {
    (self.opcode as Word & OPCODE_MASK) | ((self.immediate & J_IMMEDIATE_MASK) << LOW_CHUNK_SHIFT)
  }

  pub fn decode(word: Word) -> JFormat {
    JFormat {
      opcode    : opcode_of(word),
      immediate : (word >> LOW_CHUNK_SHIFT) & J_IMMEDIATE_MASK,
    }
  }

  /// Byte address of the target inside the 256 MiB region selected by the top bits of `pc`.
  pub fn target(&self, pc: Word) -> Word {
    (pc & 0xF000_0000) | (self.immediate << 2)
  }

}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn i_format_known_encoding() {
    // addi r2, r1, -1
    let word = IFormat::new(0x04, 1, 2, -1i16 as u16).encode();
    assert_eq!(word, 0x08BF_FFC4);
    let decoded = IFormat::decode(word);
    assert_eq!(decoded.signed_immediate(), -1);
    assert_eq!(decoded.unsigned_immediate(), 0xFFFF);
  }

  #[test]
  fn i_format_round_trip_extremes() {
    for &(a, b, immediate) in &[(0u8, 0u8, 0u16), (31, 31, 0xFFFF), (17, 3, 0x8000), (5, 30, 0x7FFF)] {
      let format = IFormat::new(0x3C, a, b, immediate);
      assert_eq!(IFormat::decode(format.encode()), format);
    }
  }

  #[test]
  fn signed_immediate_sign_extends_from_bit_15() {
    assert_eq!(IFormat::new(0, 0, 0, 0x8000).signed_immediate(), -32768);
    assert_eq!(IFormat::new(0, 0, 0, 0x7FFF).signed_immediate(), 32767);
    assert_eq!(IFormat::new(0, 0, 0, 0xFFF4).signed_immediate(), -12);
  }

  #[test]
  fn r_format_fields_do_not_overlap() {
    let format = RFormat::new(0x3A, 0x7FF, 31, 0, 0);
    let word = format.encode();
    assert_eq!(RFormat::decode(word), format);
    assert_eq!(word >> 27, 31);
    assert_eq!((word >> 17) & 0x1F, 0);

    let format = RFormat::new(0x3A, 0, 0, 0, 31);
    assert_eq!(format.encode(), 0x3A | (31 << 17));
  }

  #[test]
  fn encode_truncates_oversized_fields() {
    let format = RFormat::new(0xFF, 0xFFFF, 0xFF, 0xFF, 0xFF);
    let decoded = RFormat::decode(format.encode());
    assert_eq!(decoded, RFormat::new(0x3F, 0x7FF, 31, 31, 31));

    let jump = JFormat::new(0, 0xFFFF_FFFF);
    assert_eq!(JFormat::decode(jump.encode()).immediate, 0x03FF_FFFF);
  }

  #[test]
  fn extended_opcode_leaves_room_for_shift_amount() {
    assert_eq!(extended_opcode(0b110001), 0x31 << 5);
    assert_eq!(extended_opcode(0b010010) & SHIFT_AMOUNT_MASK, 0);
    let format = RFormat::new(0x3A, extended_opcode(0b010010) | 7, 1, 0, 2);
    assert_eq!(RFormat::decode(format.encode()).shift_amount(), 7);
  }

  #[test]
  fn j_format_target_keeps_top_pc_bits() {
    let jump = JFormat::new(0, 0x0000_0100);
    assert_eq!(JFormat::decode(jump.encode()), jump);
    assert_eq!(jump.target(0x1000_0040), 0x1000_0400);
    assert_eq!(jump.target(0x0000_0040), 0x0000_0400);
  }

}
