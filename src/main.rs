use std::time::Instant;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use nios::{assemble, Machine, MachineConfig, Program, Register};

const PROGRAM: &str = "\
# Counts r2 down to zero through a function call, printing a dot per round.
        .data
rounds: .word 10
        .text
main:   movia r1, rounds
        ldw   r2, 0(r1)
loop:   call  decr2
        movi  r4, 46
        call  putchar
        bne   r0, r2, loop
        movi  r4, 10
        call  putchar
        br    end
decr2:  subi  r2, r2, 1
        ret
end:    nop
";

fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  fmt().with_env_filter(filter).with_target(false).init();
}

fn run(name: &str, machine: &mut Machine, program: &Program, full: bool) -> nios::Result<()> {
  let start = Instant::now();
  match full {
    true  => machine.run_full_jit(program)?,
    false => machine.run_program(program)?,
  }
  info!(mode = name, elapsed = ?start.elapsed(), r2 = machine.register(Register::R2), "finished");
  Ok(())
}

fn main() {
  init_logging();

  #[cfg(feature = "trace_computation")]
  println!("Computation Tracing ENABLED");

  let mut machine = Machine::new();
  let program = match assemble(PROGRAM, Some(machine.system_calls().symbols())) {
    Ok(program) => program,
    Err(error) => {
      eprintln!("{}", error);
      std::process::exit(1);
    }
  };

  let mut jit_machine = Machine::with_config(MachineConfig::default().with_jit(true));

  let outcome = run("interpreted", &mut machine, &program, false)
    .and_then(|_| run("partial jit", &mut jit_machine, &program, false))
    .and_then(|_| run("full jit", &mut Machine::new(), &program, true));

  if let Err(error) = outcome {
    eprintln!("{}", error);
    std::process::exit(1);
  }

  println!("{}", machine);
}
