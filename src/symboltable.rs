use std::collections::HashMap;

use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::bytecode::Word;

/**
  A symbol table maps names to the byte address they stand for, in both directions. The
  machine's system calls are kept in one. A symbol table is really just a convenience wrapper
  around a BiMap, so neither a name nor an address can be bound twice.

*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolTable {
  table: BiMap<DefaultAtom, Word>
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable {
      table: BiMap::new()
    }
  }

  pub fn get_symbol(&self, address: Word) -> Option<DefaultAtom> {
    self.table.get_by_right(&address).cloned()
  }

  pub fn get_address(&self, name: &str) -> Option<Word> {
    self.table.get_by_left(&DefaultAtom::from(name)).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.table.contains_left(&DefaultAtom::from(name))
  }

  /// Fails, handing the pair back, if either the name or the address is already bound.
  pub fn insert(&mut self, name: DefaultAtom, address: Word) -> Result<(), (DefaultAtom, Word)> {
    self.table.insert_no_overwrite(name, address)
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&DefaultAtom, &Word)> {
    self.table.iter()
  }

}

/**
  The assembler's labels. Names are unique, but any number of labels may share an address, and
  a label may land on an address that a seeded system call also uses.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
  table: HashMap<DefaultAtom, Word>
}

impl LabelTable {

  pub fn new() -> LabelTable {
    LabelTable::default()
  }

  pub fn get_address(&self, name: &str) -> Option<Word> {
    self.table.get(&DefaultAtom::from(name)).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.table.contains_key(&DefaultAtom::from(name))
  }

  /// Fails, handing the pair back, if the name is already bound.
  pub fn insert(&mut self, name: DefaultAtom, address: Word) -> Result<(), (DefaultAtom, Word)> {
    if self.table.contains_key(&name) {
      return Err((name, address));
    }
    self.table.insert(name, address);
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&DefaultAtom, &Word)> {
    self.table.iter()
  }

}

impl From<&SymbolTable> for LabelTable {
  fn from(symbols: &SymbolTable) -> LabelTable {
    LabelTable {
      table: symbols.iter().map(|(name, &address)| (name.clone(), address)).collect()
    }
  }
}
