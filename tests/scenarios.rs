use std::cell::RefCell;
use std::rc::Rc;

use nios::cpu::CpuState;
use nios::{assemble, Error, JitError, Machine, MachineConfig, Register, RuntimeFault};

const MEMORY_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug)]
enum Mode {
  Interpreted,
  PartialJit,
  FullJit,
}

const ALL_MODES: [Mode; 3] = [Mode::Interpreted, Mode::PartialJit, Mode::FullJit];

fn machine_for(mode: Mode) -> Machine {
  let config = MachineConfig::default()
    .with_memory_size(MEMORY_SIZE)
    .with_jit(matches!(mode, Mode::PartialJit));
  Machine::with_config(config)
}

fn execute(machine: &mut Machine, text: &str, mode: Mode) -> nios::Result<()> {
  let program = assemble(text, Some(machine.system_calls().symbols()))?;
  match mode {
    Mode::FullJit => machine.run_full_jit(&program),
    _             => machine.run_program(&program),
  }
}

fn run(text: &str, mode: Mode) -> Machine {
  let mut machine = machine_for(mode);
  if let Err(error) = execute(&mut machine, text, mode) {
    panic!("{:?}: {}", mode, error);
  }
  machine
}

const CALL_LOOP: &str = "\
main:  movi r2, 10
loop:  call decr2
       bne r0, r2, loop
       br end
decr2: subi r2, r2, 1
       ret
end:   nop
";

#[test]
fn adds_two_registers() {
  for mode in ALL_MODES {
    let machine = run("movi r6, 10\nmovi r7, 15\nadd r5, r6, r7", mode);
    assert_eq!(machine.register(Register::R5), 25, "{:?}", mode);
    assert_eq!(machine.register(Register::R6), 10, "{:?}", mode);
    assert_eq!(machine.register(Register::R7), 15, "{:?}", mode);
  }
}

#[test]
fn decrement_loop() {
  let text = "\
movi r8, 50
loop: addi r8, r8, -1
addi r9, r9, 5
bne r0, r8, loop";
  for mode in ALL_MODES {
    let machine = run(text, mode);
    assert_eq!(machine.register(Register::R9), 250, "{:?}", mode);
    assert_eq!(machine.register(Register::R8), 0, "{:?}", mode);
  }
}

#[test]
fn call_and_return_agree_across_modes() {
  for mode in ALL_MODES {
    let machine = run(CALL_LOOP, mode);
    assert_eq!(machine.register(Register::R2), 0, "{:?}", mode);
    assert_eq!(machine.register(Register::RETURN_ADDRESS), 8, "{:?}", mode);
  }
}

#[test]
fn partial_jit_caches_called_functions() {
  let machine = run(CALL_LOOP, Mode::PartialJit);
  assert!(machine.jit().is_compiled(16));
  assert!(!machine.jit().has_failed(16));
}

#[test]
fn data_segment_word() {
  let text = "\
.data
x: .word 1337
.text
movia r1, x
ldw r2, 0(r1)";
  for mode in ALL_MODES {
    let machine = run(text, mode);
    assert_eq!(machine.register(Register::R2), 1337, "{:?}", mode);
  }
}

#[test]
fn full_jit_countdown() {
  let text = "\
main: movi r1, 1000
loop: subi r1, r1, 1
      addi r2, r2, 1
      bne r1, r0, loop";
  let machine = run(text, Mode::FullJit);
  assert_eq!(machine.register(Register::R1), 0);
  assert_eq!(machine.register(Register::R2), 1000);
}

#[test]
fn forward_branch_lands_on_label() {
  let mut machine = machine_for(Mode::Interpreted);
  let program = assemble("beq r0, r8, target\nmovi r1, 1\ntarget: movi r2, 2", None).unwrap();
  machine.load_program(&program).unwrap();
  machine.restart_program();
  machine.step().unwrap();
  assert_eq!(Some(machine.program_counter()), program.symbols().get_address("target"));
  machine.resume().unwrap();
  assert_eq!(machine.register(Register::R1), 0);
  assert_eq!(machine.register(Register::R2), 2);
}

#[test]
fn misaligned_load_faults_in_every_mode() {
  for mode in ALL_MODES {
    let mut machine = machine_for(mode);
    let error = execute(&mut machine, "main: movi r1, 2\nldw r2, 0(r1)", mode).unwrap_err();
    match error {
      Error::Fault(fault) => assert_eq!(
        fault,
        RuntimeFault::MisalignedAddress { instruction: "ldw", pc: 8, address: 2 },
        "{:?}", mode
      ),
      other => panic!("{:?}: unexpected error {}", mode, other),
    }
    assert_eq!(machine.register(Register::R2), 0, "{:?}", mode);
  }
}

#[test]
fn putchar_output_can_be_captured() {
  let output = Rc::new(RefCell::new(Vec::<u8>::new()));

  for mode in ALL_MODES {
    output.borrow_mut().clear();
    let config = MachineConfig::default()
      .with_memory_size(MEMORY_SIZE)
      .with_default_system_calls(false)
      .with_jit(matches!(mode, Mode::PartialJit));
    let mut machine = Machine::with_config(config);

    let sink = Rc::clone(&output);
    machine.add_system_call("putchar", 5000, Box::new(move |state: &mut CpuState| {
      sink.borrow_mut().push(state.registers.read(Register::R4) as u8);
    })).unwrap();

    let text = "\
main:  movi r4, 72
       call putchar
       call bang
       call bang
       br end
bang:  mov r20, ra
       movi r4, 33
       call putchar
       mov ra, r20
       ret
end:   nop";
    // `bang` calls out, so only the full JIT can link it; the partial JIT interprets it.
    execute(&mut machine, text, mode).unwrap();
    assert_eq!(output.borrow().as_slice(), b"H!!", "{:?}", mode);
  }
}

#[test]
fn functions_with_indirect_calls_fall_back_to_interpretation() {
  let text = "\
main:  call outer
       call outer
       br end
outer: mov r20, ra
       movia r3, inner
       callr r3
       mov ra, r20
       ret
inner: addi r5, r5, 1
       ret
end:   nop";
  for mode in [Mode::Interpreted, Mode::PartialJit] {
    let machine = run(text, mode);
    assert_eq!(machine.register(Register::R5), 2, "{:?}", mode);
  }

  let machine = run(text, Mode::PartialJit);
  assert!(machine.jit().has_failed(12));
  assert!(machine.jit().is_compiled(36));

  let mut machine = machine_for(Mode::FullJit);
  assert!(matches!(execute(&mut machine, text, Mode::FullJit), Err(Error::Jit(_))));
}

#[test]
fn assembler_errors_name_the_line() {
  let error = assemble("movi r1, 1\nbogus r1", None).unwrap_err();
  assert_eq!(error.to_string(), "2: Unknown instruction 'bogus'. (bogus r1)");
}

#[test]
fn early_return_functions_match_the_interpreter() {
  let text = "\
main: movi r2, 1
      call f
      call f
      br end
f:    bne r2, r0, nz
      ret
nz:   addi r3, r3, 1
      ret
end:  nop";
  for mode in [Mode::Interpreted, Mode::PartialJit] {
    let machine = run(text, mode);
    assert_eq!(machine.register(Register::R3), 2, "{:?}", mode);
  }

  // The body past the first `ret` is not part of the function, so neither JIT compiles it.
  let machine = run(text, Mode::PartialJit);
  assert!(machine.jit().has_failed(16));
  assert!(!machine.jit().is_compiled(16));

  let mut machine = machine_for(Mode::FullJit);
  assert!(matches!(
    execute(&mut machine, text, Mode::FullJit),
    Err(Error::Jit(JitError::UnresolvedBranch { .. }))
  ));
}

#[test]
fn faults_in_compiled_functions_leave_the_interpreter_pc() {
  let text = "\
main: movi r1, 1024
      call load
      movi r1, 1026
      call load
      br end
load: ldw r2, 0(r1)
      ret
end:  nop";
  for mode in ALL_MODES {
    let mut machine = machine_for(mode);
    let error = execute(&mut machine, text, mode).unwrap_err();
    match error {
      Error::Fault(fault) => assert_eq!(
        fault,
        RuntimeFault::MisalignedAddress { instruction: "ldw", pc: 24, address: 1026 },
        "{:?}", mode
      ),
      other => panic!("{:?}: unexpected error {}", mode, other),
    }
    assert_eq!(machine.program_counter(), 24, "{:?}", mode);
    assert_eq!(machine.register(Register::RETURN_ADDRESS), 16, "{:?}", mode);
  }
  // By the second call the partial JIT runs `load` compiled.
  let mut machine = machine_for(Mode::PartialJit);
  assert!(execute(&mut machine, text, Mode::PartialJit).is_err());
  assert!(machine.jit().is_compiled(20));
}

#[test]
fn labels_may_share_a_system_call_address() {
  let mut lines = vec!["main: br skip".to_string()];
  lines.extend((1..1250).map(|_| "nop".to_string()));
  lines.push("skip: movi r1, 1".to_string());

  let mut machine = machine_for(Mode::Interpreted);
  let program = nios::assemble_lines(&lines, Some(machine.system_calls().symbols())).unwrap();
  assert_eq!(program.symbols().get_address("skip"), machine.system_call_address("putchar"));
  machine.run_program(&program).unwrap();
  assert_eq!(machine.register(Register::R1), 1);
}
