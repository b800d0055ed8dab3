/*!
  An assembled program: a byte image holding the text region followed by the optional data
  region, plus the metadata the machine and the JIT need to run it.
*/

use std::collections::BTreeMap;

use crate::bytecode::Word;
use crate::symboltable::LabelTable;

pub const TEXT_START: Word = 0;
pub const ENTRY_SYMBOL: &str = "main";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DataKind {
  Word,
  Byte,
}

impl DataKind {
  pub fn size(&self) -> Word {
    match self {
      DataKind::Word => 4,
      DataKind::Byte => 1,
    }
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DataVariable {
  pub address : Word,
  pub kind    : DataKind,
  pub value   : i32,
}

/// The static data segment. Variable addresses are absolute.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DataArea {
  pub start     : Word,
  pub variables : Vec<DataVariable>,
}

impl DataArea {

  pub fn new(start: Word) -> DataArea {
    DataArea { start, variables: vec![] }
  }

  /// Number of bytes the area spans, including alignment padding.
  pub fn size(&self) -> Word {
    self.variables
        .iter()
        .map(|variable| variable.address + variable.kind.size())
        .max()
        .map_or(0, |end| end - self.start)
  }

  fn write_into(&self, bytes: &mut [u8]) {
    for variable in &self.variables {
      let offset = (variable.address - self.start) as usize;
      match variable.kind {
        DataKind::Word => bytes[offset..offset + 4].copy_from_slice(&variable.value.to_le_bytes()),
        DataKind::Byte => bytes[offset] = variable.value as u8,
      }
    }
  }

}

/// Function table: entry byte address to size in instructions.
pub type FunctionTable = BTreeMap<Word, u32>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Program {
  image             : Vec<u8>,
  instruction_count : u32,
  text_start        : Word,
  data_start        : Word,
  entry_point       : Word,
  symbols           : LabelTable,
  functions         : FunctionTable,
}

impl Program {

  pub fn new(
    instructions : &[Word],
    data         : Option<DataArea>,
    symbols      : LabelTable,
    functions    : FunctionTable
  ) -> Program
  {
    let text_start = TEXT_START;
    let text_size  = instructions.len() as Word * 4;
    let data       = data.unwrap_or_else(|| DataArea::new(text_start + text_size));
    let data_start = data.start;

    let mut image: Vec<u8> = instructions.iter().flat_map(|word| word.to_le_bytes()).collect();
    let mut data_bytes = vec![0u8; data.size() as usize];
    data.write_into(&mut data_bytes);
    image.extend(data_bytes);

    let entry_point = symbols.get_address(ENTRY_SYMBOL).unwrap_or(text_start);

    Program {
      image,
      instruction_count: instructions.len() as u32,
      text_start,
      data_start,
      entry_point,
      symbols,
      functions,
    }
  }

  pub fn image(&self) -> &[u8] {
    &self.image
  }

  pub fn instruction_count(&self) -> u32 {
    self.instruction_count
  }

  pub fn text_start(&self) -> Word {
    self.text_start
  }

  /// The first address past the last instruction. Running stops here.
  pub fn text_end(&self) -> Word {
    self.text_start + self.instruction_count * 4
  }

  pub fn data_start(&self) -> Word {
    self.data_start
  }

  pub fn entry_point(&self) -> Word {
    self.entry_point
  }

  pub fn symbols(&self) -> &LabelTable {
    &self.symbols
  }

  pub fn functions(&self) -> &FunctionTable {
    &self.functions
  }

  /// The instruction words of the text region.
  pub fn instructions(&self) -> Vec<Word> {
    let text_bytes = (self.instruction_count * 4) as usize;
    self.image[..text_bytes]
        .chunks_exact(4)
        .map(|chunk| Word::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
  }

}


#[cfg(test)]
mod tests {
  use string_cache::DefaultAtom;
  use super::*;

  #[test]
  fn image_is_text_followed_by_data() {
    let mut data = DataArea::new(8);
    data.variables.push(DataVariable { address: 8,  kind: DataKind::Byte, value: -1 });
    data.variables.push(DataVariable { address: 12, kind: DataKind::Word, value: 1337 });

    let program = Program::new(&[0x11223344, 0x55667788], Some(data), LabelTable::new(), FunctionTable::new());

    assert_eq!(program.image().len(), 8 + 8);
    assert_eq!(&program.image()[0..4], &[0x44, 0x33, 0x22, 0x11]);
    assert_eq!(program.image()[8], 0xFF);
    assert_eq!(&program.image()[12..16], &1337i32.to_le_bytes());
    assert_eq!(program.instructions(), vec![0x11223344, 0x55667788]);
    assert_eq!(program.text_end(), 8);
    assert_eq!(program.data_start(), 8);
  }

  #[test]
  fn entry_point_prefers_main() {
    let program = Program::new(&[0, 0], None, LabelTable::new(), FunctionTable::new());
    assert_eq!(program.entry_point(), TEXT_START);

    let mut symbols = LabelTable::new();
    symbols.insert(DefaultAtom::from("main"), 4).unwrap();
    let program = Program::new(&[0, 0], None, symbols, FunctionTable::new());
    assert_eq!(program.entry_point(), 4);
  }
}
