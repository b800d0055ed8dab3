/*!

  The machine uses a 32 bit little-endian word size, and every instruction is exactly one word.
  The low six bits of a word are always the opcode. What the remaining 26 bits mean depends on
  which of the three formats the opcode belongs to:

    I-format: two 5 bit registers and a 16 bit immediate
    R-format: three 5 bit registers and an 11 bit extended opcode (opx)
    J-format: a 26 bit word address

  All register-format instructions share one opcode and are distinguished by the opx field. The
  shift-immediate instructions additionally store their shift amount in the low five bits of the
  opx field, so their opx is matched under a mask.

  The format views (`IFormat`, `RFormat`, `JFormat`) are plain bit-packing. `Instruction` pairs a
  view with the operation it encodes and is what the interpreter and the JIT consume.

*/

mod binary;
mod instruction;

pub use binary::{
  extended_opcode,
  opcode_of,
  IFormat,
  JFormat,
  RFormat,
  Word,
  OPCODE_MASK,
  SHIFT_AMOUNT_MASK
};
pub use instruction::{ExtendedOperation, Format, Instruction, Operation};
