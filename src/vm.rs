/*!
  The interpreter. A `Machine` owns the CPU state, the system call table and the partial JIT
  cache, and runs a loaded program one fetch/execute cycle at a time.

  Instruction semantics come from `crate::alu`, so an interpreted instruction and its compiled
  counterpart always agree. With the JIT enabled, the first `call` to a function compiles it;
  every later call runs the compiled routine instead of interpreting the body.
*/

use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;
use prettytable::{format as TableFormat, row, table, Table};
use tracing::{debug, trace, warn};

use crate::alu;
use crate::bytecode::{ExtendedOperation, IFormat, Instruction, JFormat, Operation, RFormat, Word};
use crate::cpu::{require_aligned, CpuState};
use crate::error::{Error, Result as MachineResult, RuntimeFault};
use crate::jit::{ExecutionContext, FullJit, PartialJit};
use crate::program::Program;
use crate::register::Register;
use crate::syscall::{SystemCallAction, SystemCalls};

/// Default guest memory size, 8 MiB.
pub const DEFAULT_MEMORY_SIZE: usize = 8 * 1024 * 1024;

type FaultResult = Result<(), RuntimeFault>;

/// Settings fixed when the machine is built. `jit_enabled` can also be toggled later.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MachineConfig {
  pub memory_size                  : usize,
  pub jit_enabled                  : bool,
  /// Fault on instructions with no handler instead of skipping them.
  pub strict_decoding              : bool,
  pub install_default_system_calls : bool,
}

impl Default for MachineConfig {
  fn default() -> Self {
    MachineConfig {
      memory_size                  : DEFAULT_MEMORY_SIZE,
      jit_enabled                  : false,
      strict_decoding              : false,
      install_default_system_calls : true,
    }
  }
}

impl MachineConfig {

  pub fn with_memory_size(mut self, memory_size: usize) -> Self {
    self.memory_size = memory_size;
    self
  }

  pub fn with_jit(mut self, enabled: bool) -> Self {
    self.jit_enabled = enabled;
    self
  }

  pub fn with_strict_decoding(mut self, strict: bool) -> Self {
    self.strict_decoding = strict;
    self
  }

  pub fn with_default_system_calls(mut self, install: bool) -> Self {
    self.install_default_system_calls = install;
    self
  }

}

pub struct Machine {
  state        : CpuState,
  system_calls : SystemCalls,
  jit          : PartialJit,
  config       : MachineConfig,

  // Layout of the loaded program
  text_start   : Word,
  entry_point  : Word,
  program_end  : Word,
}

impl Default for Machine {
  fn default() -> Self {
    Machine::new()
  }
}

impl Machine {

  // region Display methods

  fn make_register_table(name: &str, registers: &[i32], start: usize) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for (i, value) in registers.iter().enumerate() {
      table.add_row(
        row![r->format!("{}{} =", name, i + start), format!("{} ({:#010x})", value, *value as u32)]
      );
    }
    table
  }

  // endregion

  // region Construction and program loading

  pub fn new() -> Machine {
    Machine::with_config(MachineConfig::default())
  }

  pub fn with_config(config: MachineConfig) -> Machine {
    let system_calls = match config.install_default_system_calls {
      true  => SystemCalls::with_defaults(),
      false => SystemCalls::new(),
    };

    Machine {
      state        : CpuState::new(config.memory_size),
      system_calls,
      jit          : PartialJit::new(),
      config,
      text_start   : 0,
      entry_point  : 0,
      program_end  : 0,
    }
  }

  /// Copies the program image into memory and records its layout. Compiled functions of any
  /// previous program are discarded.
  pub fn load_program(&mut self, program: &Program) -> MachineResult<()> {
    self.state.memory.load(program.text_start(), program.image())?;
    self.text_start  = program.text_start();
    self.entry_point = program.entry_point();
    self.program_end = program.text_end();
    self.jit.clear();

    debug!(
      bytes       = program.image().len(),
      entry_point = self.entry_point,
      end         = self.program_end,
      "loaded program"
    );
    Ok(())
  }

  /// Loads `program` and runs it from its entry point.
  pub fn run_program(&mut self, program: &Program) -> MachineResult<()> {
    self.load_program(program)?;
    self.run()
  }

  /// Runs the loaded program from its entry point until the PC leaves the text region.
  pub fn run(&mut self) -> MachineResult<()> {
    self.state.pc = self.entry_point;
    self.resume()
  }

  /// Runs from the current PC until the PC leaves the text region.
  pub fn resume(&mut self) -> MachineResult<()> {
    while self.state.pc < self.program_end {
      self.step()?;
    }
    Ok(())
  }

  /// Compiles `program` as a whole and runs the result against this machine's state.
  pub fn run_full_jit(&mut self, program: &Program) -> MachineResult<()> {
    self.load_program(program)?;
    let compiled = FullJit::new().compile(program, &self.system_calls)?;

    self.state.pc = self.entry_point;
    compiled.run(&mut ExecutionContext {
      state        : &mut self.state,
      system_calls : &mut self.system_calls,
    })?;
    self.state.pc = self.program_end;
    Ok(())
  }

  /// Moves the PC back to the entry point of the loaded program.
  pub fn restart_program(&mut self) {
    self.state.pc = self.entry_point;
  }

  /// Moves the PC to the end of the program, so the run loop exits before the next instruction.
  pub fn stop(&mut self) {
    self.state.pc = self.program_end;
  }

  /// Clears registers, memory and the PC.
  pub fn reset(&mut self) {
    self.state.registers.clear();
    self.state.memory.clear();
    self.state.pc = 0;
    self.state.ir = 0;
    self.jit.clear();
  }

  // endregion

  // region Fetch/execute cycle

  pub fn step(&mut self) -> MachineResult<()> {
    self.fetch()?;
    self.execute()
  }

  /// Loads the word at the PC into the instruction register and advances the PC.
  pub fn fetch(&mut self) -> MachineResult<()> {
    let pc = self.state.pc;
    self.state.ir = self.state.memory.read_word(pc, "fetch", pc)? as Word;
    self.state.pc = pc.wrapping_add(4);
    Ok(())
  }

  /// Executes the instruction register.
  pub fn execute(&mut self) -> MachineResult<()> {
    let word = self.state.ir;

    let instruction = match Instruction::decode(word) {
      Some(instruction) => instruction,
      None              => return Ok(self.unhandled(word)?)
    };

    trace!(pc = self.state.pc.wrapping_sub(4), word, %instruction, "execute");

    match instruction {
      Instruction::Immediate(operation, format) => self.execute_immediate(operation, &format)?,
      Instruction::Register(operation, format)  => self.execute_register(operation, &format)?,
      Instruction::Jump(operation, format)      => self.execute_jump(operation, &format)?,
    }

    #[cfg(feature = "trace_computation")]
    println!("{}", self);

    Ok(())
  }

  /// Loads `word` into the instruction register and executes it. The PC is not advanced first,
  /// so branch offsets count from the current PC.
  pub fn execute_word(&mut self, word: Word) -> MachineResult<()> {
    self.state.ir = word;
    self.execute()
  }

  fn unhandled(&self, word: Word) -> FaultResult {
    let pc = self.state.pc.wrapping_sub(4);
    match self.config.strict_decoding {
      true  => Err(RuntimeFault::IllegalInstruction { pc, word }),
      false => {
        warn!(pc, word, "instruction has no handler and was not executed");
        Ok(())
      }
    }
  }

  fn execute_immediate(&mut self, operation: Operation, format: &IFormat) -> FaultResult {
    let (a, b) = (format.a, format.b);

    if let Some(condition) = alu::branch_condition(operation) {
      if condition(self.state.registers.get(a), self.state.registers.get(b)) {
        let target = self.state.pc.wrapping_add(format.signed_immediate() as Word);
        self.state.jump_to(target, operation.into())?;
      }
      return Ok(());
    }

    if operation.is_memory() {
      return self.execute_memory(operation, format);
    }

    match alu::immediate_operation(operation) {
      Some(function) => {
        let registers = &mut self.state.registers;
        let value     = function(registers.get(a), alu::immediate_operand(operation, format));
        registers.set(b, value);
        Ok(())
      }
      None => self.unhandled(self.state.ir)
    }
  }

  fn execute_memory(&mut self, operation: Operation, format: &IFormat) -> FaultResult {
    let state                     = &mut self.state;
    let pc                        = state.pc;
    let instruction: &'static str = operation.into();
    let address = state.registers.get(format.a).wrapping_add(format.signed_immediate()) as Word;
    let b       = format.b;

    match operation {
      Operation::Ldw  => {
        let value = state.memory.read_word(address, instruction, pc)?;
        state.registers.set(b, value);
      }
      Operation::Stw  => state.memory.write_word(address, state.registers.get(b), instruction, pc)?,
      Operation::Ldb  => {
        let value = state.memory.read_byte(address, instruction, pc)?;
        state.registers.set(b, value as i8 as i32);
      }
      Operation::Ldbu => {
        let value = state.memory.read_byte(address, instruction, pc)?;
        state.registers.set(b, value as i32);
      }
      Operation::Stb  => state.memory.write_byte(address, state.registers.get(b) as u8, instruction, pc)?,
      _               => return self.unhandled(self.state.ir)
    }
    Ok(())
  }

  fn execute_register(&mut self, operation: ExtendedOperation, format: &RFormat) -> FaultResult {
    let registers = &mut self.state.registers;

    match operation {
      ExtendedOperation::Ret   => self.ret(),
      ExtendedOperation::Callr => {
        let target = registers.get(format.a) as Word;
        self.call(target, "callr")
      }
      ExtendedOperation::Slli | ExtendedOperation::Srli => {
        match alu::shift_operation(operation) {
          Some(function) => {
            let value = function(registers.get(format.a), format.shift_amount() as i32);
            registers.set(format.c, value);
            Ok(())
          }
          None => self.unhandled(self.state.ir)
        }
      }
      _ => match alu::register_operation(operation) {
        Some(function) => {
          let value = function(registers.get(format.a), registers.get(format.b));
          registers.set(format.c, value);
          Ok(())
        }
        None => self.unhandled(self.state.ir)
      }
    }
  }

  fn execute_jump(&mut self, operation: Operation, format: &JFormat) -> FaultResult {
    match operation {
      Operation::Call => {
        let target = format.target(self.state.pc);
        self.call(target, "call")
      }
      _ => self.unhandled(self.state.ir)
    }
  }

  /**
    Transfers control to `target`, saving the return address first. System calls run in place.
    A function the JIT has compiled runs to completion here, and its `ret` leaves the PC at the
    return address. Anything else becomes a plain jump, and with the JIT enabled the target is
    compiled for the next call.
  */
  fn call(&mut self, target: Word, instruction: &'static str) -> FaultResult {
    let return_address = self.state.pc;

    if self.system_calls.is_system_call(target) {
      self.state.registers.write(Register::RETURN_ADDRESS, return_address as i32);
      self.system_calls.invoke(target, &mut self.state);
      return Ok(());
    }

    if self.config.jit_enabled {
      if let Some(routine) = self.jit.compiled(target) {
        debug!(target, "calling compiled function");
        self.state.registers.write(Register::RETURN_ADDRESS, return_address as i32);
        return routine.invoke(
          &mut ExecutionContext { state: &mut self.state, system_calls: &mut self.system_calls },
          &[]
        );
      }
    }

    require_aligned(target, instruction, return_address)?;
    self.state.registers.write(Register::RETURN_ADDRESS, return_address as i32);
    self.state.pc = target;

    if self.config.jit_enabled {
      self.jit.request(target, &self.state.memory, self.program_end);
    }
    Ok(())
  }

  fn ret(&mut self) -> FaultResult {
    let target = self.state.registers.read(Register::RETURN_ADDRESS) as Word;
    self.state.jump_to(target, "ret")
  }

  // endregion

  // region Register, memory and system call access

  pub fn register(&self, register: Register) -> i32 {
    self.state.registers.read(register)
  }

  pub fn set_register(&mut self, register: Register, value: i32) {
    self.state.registers.write(register, value)
  }

  pub fn read_byte(&self, address: Word) -> MachineResult<u8> {
    Ok(self.state.memory.read_byte(address, "read_byte", self.state.pc)?)
  }

  pub fn write_byte(&mut self, address: Word, value: u8) -> MachineResult<()> {
    let pc = self.state.pc;
    Ok(self.state.memory.write_byte(address, value, "write_byte", pc)?)
  }

  pub fn read_word(&self, address: Word) -> MachineResult<i32> {
    Ok(self.state.memory.read_word(address, "read_word", self.state.pc)?)
  }

  pub fn write_word(&mut self, address: Word, value: i32) -> MachineResult<()> {
    let pc = self.state.pc;
    Ok(self.state.memory.write_word(address, value, "write_word", pc)?)
  }

  pub fn program_counter(&self) -> Word {
    self.state.pc
  }

  pub fn set_program_counter(&mut self, pc: Word) {
    self.state.pc = pc;
  }

  pub fn add_system_call(&mut self, name: &str, address: Word, action: SystemCallAction) -> MachineResult<()> {
    self.system_calls
        .add(name, address, action)
        .map_err(|(name, address)| Error::DuplicateSystemCall { name: name.to_string(), address })
  }

  pub fn system_call_address(&self, name: &str) -> Option<Word> {
    self.system_calls.address_of(name)
  }

  pub fn system_calls(&self) -> &SystemCalls {
    &self.system_calls
  }

  pub fn set_jit_enabled(&mut self, enabled: bool) {
    self.config.jit_enabled = enabled;
  }

  pub fn jit_enabled(&self) -> bool {
    self.config.jit_enabled
  }

  pub fn jit(&self) -> &PartialJit {
    &self.jit
  }

  pub fn config(&self) -> &MachineConfig {
    &self.config
  }

  pub fn state(&self) -> &CpuState {
    &self.state
  }

  pub fn state_mut(&mut self) -> &mut CpuState {
    &mut self.state
  }

  pub fn text_start(&self) -> Word {
    self.text_start
  }

  // endregion

}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Machine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let registers = self.state.registers.as_slice();
    let (low, high) = registers.split_at(registers.len() / 2);

    let low_table  = Machine::make_register_table("r", low, 0);
    let high_table = Machine::make_register_table("r", high, low.len());

    let mut combined_table = table!([low_table, high_table]);

    combined_table.set_titles(row![ub->"Registers", ub->""]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(
      f,
      "PC: {:#010x}\tIR: {:#010x}\tJIT: {}\n{}",
      self.state.pc,
      self.state.ir,
      match self.config.jit_enabled { true => "on", false => "off" },
      combined_table
    )
  }
}
