/*!
  System calls are native actions bound to reserved addresses. A `call` whose target is one of
  these addresses runs the action instead of transferring control to guest code.
*/

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::io::Write;

use string_cache::DefaultAtom;
use tracing::{debug, warn};

use crate::bytecode::Word;
use crate::cpu::CpuState;
use crate::register::Register;
use crate::symboltable::SymbolTable;

pub const PUTCHAR_NAME: &str = "putchar";
pub const PUTCHAR_ADDRESS: Word = 5000;

pub type SystemCallAction = Box<dyn FnMut(&mut CpuState)>;

/// The name/address table together with the action bound at each address.
#[derive(Default)]
pub struct SystemCalls {
  names   : SymbolTable,
  actions : HashMap<Word, SystemCallAction>,
}

impl SystemCalls {

  pub fn new() -> SystemCalls {
    SystemCalls::default()
  }

  /// A table holding `putchar`, which writes the low byte of `r4` to standard output.
  pub fn with_defaults() -> SystemCalls {
    let mut system_calls = SystemCalls::new();
    let added = system_calls.add(PUTCHAR_NAME, PUTCHAR_ADDRESS, Box::new(put_char));
    debug_assert!(added.is_ok());
    system_calls
  }

  /// Fails, handing the pair back, if either the name or the address is already registered.
  pub fn add(&mut self, name: &str, address: Word, action: SystemCallAction)
    -> Result<(), (DefaultAtom, Word)>
  {
    self.names.insert(DefaultAtom::from(name), address)?;
    self.actions.insert(address, action);
    Ok(())
  }

  pub fn address_of(&self, name: &str) -> Option<Word> {
    self.names.get_address(name)
  }

  pub fn is_system_call(&self, address: Word) -> bool {
    self.actions.contains_key(&address)
  }

  /// The name → address table, suitable for seeding the assembler.
  pub fn symbols(&self) -> &SymbolTable {
    &self.names
  }

  /// Runs the action bound at `address`. Returns `false` if there is none.
  pub fn invoke(&mut self, address: Word, state: &mut CpuState) -> bool {
    match self.actions.get_mut(&address) {
      Some(action) => {
        debug!(address, name = ?self.names.get_symbol(address), "system call");
        action(state);
        true
      }
      None => false
    }
  }

}

impl Debug for SystemCalls {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SystemCalls").field("names", &self.names).finish()
  }
}

fn put_char(state: &mut CpuState) {
  let character = state.registers.read(Register::R4) as u8;
  let mut stdout = std::io::stdout();
  if let Err(error) = stdout.write_all(&[character]).and_then(|_| stdout.flush()) {
    warn!(%error, "putchar could not write to standard output");
  }
}


#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;
  use super::*;

  #[test]
  fn defaults_bind_putchar() {
    let system_calls = SystemCalls::with_defaults();
    assert_eq!(system_calls.address_of("putchar"), Some(PUTCHAR_ADDRESS));
    assert!(system_calls.is_system_call(PUTCHAR_ADDRESS));
    assert_eq!(system_calls.symbols().len(), 1);
  }

  #[test]
  fn invoke_runs_bound_action() {
    let seen = Rc::new(RefCell::new(vec![]));
    let sink = seen.clone();
    let mut system_calls = SystemCalls::new();
    system_calls.add("record", 64, Box::new(move |state: &mut CpuState| {
      sink.borrow_mut().push(state.registers.read(Register::R4));
    })).unwrap();

    let mut state = CpuState::new(16);
    state.registers.write(Register::R4, 99);
    assert!(system_calls.invoke(64, &mut state));
    assert!(!system_calls.invoke(68, &mut state));
    assert_eq!(*seen.borrow(), vec![99]);
  }

  #[test]
  fn duplicate_names_are_rejected() {
    let mut system_calls = SystemCalls::with_defaults();
    assert!(system_calls.add("putchar", 6000, Box::new(|_: &mut CpuState| {})).is_err());
    assert!(system_calls.add("other", PUTCHAR_ADDRESS, Box::new(|_: &mut CpuState| {})).is_err());
  }
}
