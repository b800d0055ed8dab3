/*!
  The mutable state of the machine: register file, memory, program counter and instruction
  register. The interpreter and compiled JIT routines both operate on the same `CpuState`.
*/

use crate::bytecode::Word;
use crate::error::RuntimeFault;
use crate::register::{Register, REGISTER_COUNT};

/// The register file. Register 0 always reads as zero; writes to it are discarded.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Registers {
  values: [i32; REGISTER_COUNT]
}

impl Registers {

  #[inline(always)]
  pub fn get(&self, index: u8) -> i32 {
    match index {
      0 => 0,
      _ => self.values[(index & 0x1F) as usize]
    }
  }

  #[inline(always)]
  pub fn set(&mut self, index: u8, value: i32) {
    if index != 0 {
      self.values[(index & 0x1F) as usize] = value;
    }
  }

  pub fn read(&self, register: Register) -> i32 {
    self.get(register.number())
  }

  pub fn write(&mut self, register: Register, value: i32) {
    self.set(register.number(), value)
  }

  pub fn clear(&mut self) {
    self.values = [0; REGISTER_COUNT];
  }

  pub fn as_slice(&self) -> &[i32] {
    &self.values
  }

}

/// Flat little-endian byte memory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Memory {
  bytes: Vec<u8>
}

impl Memory {

  pub fn new(size: usize) -> Memory {
    Memory { bytes: vec![0; size] }
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  fn range(&self, address: Word, width: usize, instruction: &'static str, pc: Word)
    -> Result<std::ops::Range<usize>, RuntimeFault>
  {
    let start = address as usize;
    match start.checked_add(width) {
      Some(end) if end <= self.bytes.len() => Ok(start..end),
      _ => Err(RuntimeFault::OutOfBounds { instruction, pc, address })
    }
  }

  /// Reads a byte. `instruction` and `pc` identify the access in a fault.
  pub fn read_byte(&self, address: Word, instruction: &'static str, pc: Word) -> Result<u8, RuntimeFault> {
    let range = self.range(address, 1, instruction, pc)?;
    Ok(self.bytes[range.start])
  }

  pub fn write_byte(&mut self, address: Word, value: u8, instruction: &'static str, pc: Word)
    -> Result<(), RuntimeFault>
  {
    let range = self.range(address, 1, instruction, pc)?;
    self.bytes[range.start] = value;
    Ok(())
  }

  /// Reads an aligned word.
  pub fn read_word(&self, address: Word, instruction: &'static str, pc: Word) -> Result<i32, RuntimeFault> {
    require_aligned(address, instruction, pc)?;
    let range = self.range(address, 4, instruction, pc)?;
    let b = &self.bytes[range];
    Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
  }

  /// Writes an aligned word. Nothing is written if the access faults.
  pub fn write_word(&mut self, address: Word, value: i32, instruction: &'static str, pc: Word)
    -> Result<(), RuntimeFault>
  {
    require_aligned(address, instruction, pc)?;
    let range = self.range(address, 4, instruction, pc)?;
    self.bytes[range].copy_from_slice(&value.to_le_bytes());
    Ok(())
  }

  /// Copies `bytes` into memory starting at `address`.
  pub fn load(&mut self, address: Word, bytes: &[u8]) -> Result<(), RuntimeFault> {
    let range = self.range(address, bytes.len(), "load", address)?;
    self.bytes[range].copy_from_slice(bytes);
    Ok(())
  }

  pub fn clear(&mut self) {
    self.bytes.iter_mut().for_each(|byte| *byte = 0);
  }

}

#[inline(always)]
pub fn require_aligned(address: Word, instruction: &'static str, pc: Word) -> Result<(), RuntimeFault> {
  match address % 4 {
    0 => Ok(()),
    _ => Err(RuntimeFault::MisalignedAddress { instruction, pc, address })
  }
}

/// Everything a guest instruction can observe or change.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CpuState {
  pub registers : Registers,
  pub memory    : Memory,
  /// Program counter
  pub pc        : Word,
  /// Instruction register, the last fetched word
  pub ir        : Word,
}

impl CpuState {

  pub fn new(memory_size: usize) -> CpuState {
    CpuState {
      registers : Registers::default(),
      memory    : Memory::new(memory_size),
      pc        : 0,
      ir        : 0,
    }
  }

  /// Moves the program counter to `target`, faulting on a misaligned target.
  pub fn jump_to(&mut self, target: Word, instruction: &'static str) -> Result<(), RuntimeFault> {
    require_aligned(target, instruction, self.pc)?;
    self.pc = target;
    Ok(())
  }

}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn register_zero_discards_writes() {
    let mut registers = Registers::default();
    registers.set(0, 42);
    assert_eq!(registers.get(0), 0);
    registers.write(Register::R0, -7);
    assert_eq!(registers.read(Register::R0), 0);
    registers.set(5, 42);
    assert_eq!(registers.get(5), 42);
  }

  #[test]
  fn words_are_little_endian() {
    let mut memory = Memory::new(16);
    memory.write_word(4, 0x0102_0304, "stw", 0).unwrap();
    assert_eq!(memory.read_byte(4, "ldb", 0).unwrap(), 0x04);
    assert_eq!(memory.read_byte(7, "ldb", 0).unwrap(), 0x01);
    assert_eq!(memory.read_word(4, "ldw", 0).unwrap(), 0x0102_0304);
  }

  #[test]
  fn misaligned_word_access_faults_without_writing() {
    let mut memory = Memory::new(16);
    let fault = memory.write_word(6, -1, "stw", 12).unwrap_err();
    assert_eq!(fault, RuntimeFault::MisalignedAddress { instruction: "stw", pc: 12, address: 6 });
    assert!((0..16).all(|address| memory.read_byte(address, "ldb", 0).unwrap() == 0));
  }

  #[test]
  fn accesses_past_the_end_fault() {
    let memory = Memory::new(8);
    assert_eq!(
      memory.read_word(8, "ldw", 4),
      Err(RuntimeFault::OutOfBounds { instruction: "ldw", pc: 4, address: 8 })
    );
    assert!(memory.read_byte(7, "ldb", 4).is_ok());
  }

  #[test]
  fn misaligned_jump_keeps_pc() {
    let mut state = CpuState::new(16);
    state.pc = 8;
    assert!(state.jump_to(10, "br").is_err());
    assert_eq!(state.pc, 8);
    state.jump_to(12, "br").unwrap();
    assert_eq!(state.pc, 12);
  }
}
