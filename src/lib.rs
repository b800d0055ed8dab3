/*!
  An assembler, interpreter and JIT for a 32 bit Nios II style RISC machine.

  Source text is assembled into a `Program` image, which a `Machine` loads into its flat memory
  and runs. Execution is either fully interpreted, interpreted with functions compiled on their
  first call (the partial JIT), or compiled ahead of time as a whole (the full JIT). Compiled
  code is a chain of closures over the same `CpuState` the interpreter uses.

  ```ignore
  let program = assemble("movi r6, 10\nmovi r7, 15\nadd r5, r6, r7", None)?;
  let mut machine = Machine::new();
  machine.run_program(&program)?;
  assert_eq!(machine.register(Register::R5), 25);
  ```
*/

pub mod alu;
pub mod assembler;
pub mod bytecode;
pub mod cpu;
pub mod error;
pub mod jit;
pub mod program;
pub mod register;
pub mod symboltable;
pub mod syscall;
pub mod vm;

pub use assembler::{assemble, assemble_lines};
pub use error::{AssemblerError, Error, JitError, Result, RuntimeFault};
pub use program::Program;
pub use register::Register;
pub use symboltable::{LabelTable, SymbolTable};
pub use vm::{Machine, MachineConfig};
