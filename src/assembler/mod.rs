/*!
  The two-pass assembler.

  The first pass tokenizes each line, binds labels to the address of the next instruction,
  expands macros, and lays out the data segment. It also remembers the target of every `call`,
  since only those labels mark functions.

  The second pass resolves symbols and directive expressions, assembles each statement into an
  instruction, and measures every function from its entry label to its `ret` for the function
  table.

  ```text
          .data
  x:      .word 1337
          .text
  main:   movia r1, x
          ldw   r2, 0(r1)
  ```
*/

mod families;
mod macros;
mod parser;

use std::collections::HashSet;

use string_cache::DefaultAtom;
use tracing::debug;

use crate::bytecode::Word;
use crate::error::AssemblerError;
use crate::program::{DataArea, DataKind, DataVariable, FunctionTable, Program, TEXT_START};
use crate::symboltable::{LabelTable, SymbolTable};

use families::assemble_statement;
use parser::{parse_integer, parse_label, tokenize};

pub use parser::COMMENT_CHAR;

/// One real instruction produced by the first pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Statement {
  mnemonic : String,
  operands : Vec<String>,
  /// 0-based source line
  line     : usize,
}

impl Statement {
  fn text(&self) -> String {
    match self.operands.is_empty() {
      true  => self.mnemonic.clone(),
      false => format!("{} {}", self.mnemonic, self.operands.join(", "))
    }
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Segment {
  Text,
  Data
}

/// Data declarations, laid out relative to the start of the data segment. The segment's
/// address is only known once the text has been measured.
#[derive(Default)]
struct DataLayout {
  variables : Vec<(DataKind, i32, Word)>,
  labels    : Vec<(DefaultAtom, Word, usize)>,
  size      : Word,
}

impl DataLayout {

  fn declare(&mut self, label: Option<&str>, tokens: &[&str], line: usize, source: &str)
    -> Result<(), AssemblerError>
  {
    let error = |message: String| AssemblerError::new(line, source.trim(), message);

    let kind = match tokens.first().map(|directive| directive.to_ascii_lowercase()) {
      Some(directive) if directive == ".word" => DataKind::Word,
      Some(directive) if directive == ".byte" => DataKind::Byte,
      Some(directive) => return Err(error(format!("Unknown data directive '{}'.", directive))),
      None            => return Err(error("Expected .word or .byte after label.".to_string()))
    };
    if tokens.len() < 2 {
      return Err(error(format!("{} requires at least one value.", tokens[0])));
    }

    let (low, high) = match kind {
      DataKind::Word => (i32::MIN as i64, u32::MAX as i64),
      DataKind::Byte => (i8::MIN as i64, u8::MAX as i64),
    };
    if kind == DataKind::Word {
      self.size = (self.size + 3) & !3;
    }
    if let Some(label) = label {
      self.labels.push((DefaultAtom::from(label), self.size, line));
    }

    for text in &tokens[1..] {
      let value = parse_integer(text)
        .filter(|value| (low..=high).contains(value))
        .ok_or_else(|| error(format!("Invalid {} value '{}'.", tokens[0], text)))?;
      self.variables.push((kind, value as i32, self.size));
      self.size += kind.size();
    }
    Ok(())
  }

  fn place(self, start: Word, symbols: &mut LabelTable) -> Result<DataArea, AssemblerError> {
    for (name, offset, line) in self.labels {
      bind(symbols, name, start + offset, line)?;
    }
    let mut area = DataArea::new(start);
    area.variables = self.variables
      .into_iter()
      .map(|(kind, value, offset)| DataVariable { address: start + offset, kind, value })
      .collect();
    Ok(area)
  }

}

fn bind(symbols: &mut LabelTable, name: DefaultAtom, address: Word, line: usize) -> Result<(), AssemblerError> {
  symbols.insert(name, address).map_err(|(name, _)| {
    AssemblerError::new(line, format!("{}:", name), format!("Label '{}' is already defined.", name))
  })
}

/// The result of the first pass.
struct FirstPass {
  statements : Vec<Statement>,
  symbols    : LabelTable,
  /// Addresses of text labels that some `call` targets
  functions  : HashSet<Word>,
  data       : Option<DataArea>,
}

fn first_pass<S: AsRef<str>>(lines: &[S], call_table: Option<&SymbolTable>) -> Result<FirstPass, AssemblerError> {
  let mut statements: Vec<Statement> = vec![];
  let mut symbols     = call_table.map(LabelTable::from).unwrap_or_default();
  let mut text_labels = HashSet::new();
  let mut called      = HashSet::new();
  let mut layout    = DataLayout::default();
  let mut has_data  = false;
  let mut segment   = Segment::Text;

  for (line, source) in lines.iter().enumerate() {
    let source = source.as_ref();
    let tokens = tokenize(source)
      .ok_or_else(|| AssemblerError::new(line, source.trim(), "Unhandled instruction."))?;
    if tokens.is_empty() {
      continue;
    }

    let (label, rest) = match tokens[0].ends_with(':') {
      true => {
        let label = parse_label(tokens[0])
          .ok_or_else(|| AssemblerError::new(line, source.trim(), format!("Invalid label '{}'.", tokens[0])))?;
        (Some(label), &tokens[1..])
      }
      false => (None, &tokens[..])
    };

    let head = rest.first().map(|token| token.to_ascii_lowercase());
    match head.as_deref() {
      Some(".text") | Some(".data") => {
        if label.is_some() || rest.len() > 1 {
          return Err(AssemblerError::new(line, source.trim(), "Segment directives stand alone."));
        }
        segment = match head.as_deref() {
          Some(".data") => { has_data = true; Segment::Data }
          _             => Segment::Text
        };
        continue;
      }
      _ => {}
    }

    if segment == Segment::Data {
      layout.declare(label, rest, line, source)?;
      continue;
    }

    if let Some(label) = label {
      let name = DefaultAtom::from(label);
      bind(&mut symbols, name.clone(), TEXT_START + statements.len() as Word * 4, line)?;
      text_labels.insert(name);
    }

    // A label on its own still needs an instruction to label.
    let rest: &[&str] = match rest.is_empty() {
      true  => &["nop"],
      false => rest
    };
    let mnemonic = rest[0].to_ascii_lowercase();
    let operands = &rest[1..];

    if mnemonic == "call" {
      if let Some(target) = operands.first() {
        called.insert(DefaultAtom::from(*target));
      }
    }

    match macros::expand(&mnemonic, operands, line) {
      Some(expansion) => {
        for mut expanded in expansion? {
          let mnemonic = expanded.remove(0);
          statements.push(Statement { mnemonic, operands: expanded, line });
        }
      }
      None => {
        statements.push(Statement {
          mnemonic,
          operands: operands.iter().map(|operand| operand.to_string()).collect(),
          line
        });
      }
    }
  }

  let data_start = TEXT_START + statements.len() as Word * 4;
  let data = match has_data {
    true  => Some(layout.place(data_start, &mut symbols)?),
    false => None
  };

  // Seeded names such as system calls are not guest code, even when called.
  let functions = called
    .intersection(&text_labels)
    .filter_map(|name| symbols.get_address(name))
    .collect();

  Ok(FirstPass { statements, symbols, functions, data })
}

/// Assembles `text`. `call_table` seeds the symbol table, typically with system call addresses.
pub fn assemble(text: &str, call_table: Option<&SymbolTable>) -> Result<Program, AssemblerError> {
  let lines: Vec<&str> = text.lines().collect();
  assemble_lines(&lines, call_table)
}

pub fn assemble_lines<S: AsRef<str>>(lines: &[S], call_table: Option<&SymbolTable>) -> Result<Program, AssemblerError> {
  let FirstPass { statements, symbols, functions, data } = first_pass(lines, call_table)?;

  let mut instructions: Vec<Word> = Vec::with_capacity(statements.len());
  let mut function_table = FunctionTable::new();
  let mut open_function: Option<(Word, u32)> = None;

  for (index, statement) in statements.iter().enumerate() {
    let address = TEXT_START + index as Word * 4;

    if open_function.is_none() && functions.contains(&address) {
      open_function = Some((address, 0));
    }

    let instruction = assemble_statement(statement, &symbols, index)?;
    instructions.push(instruction.encode());

    if let Some((entry, count)) = open_function.as_mut() {
      *count += 1;
      if statement.mnemonic == "ret" {
        function_table.insert(*entry, *count);
        open_function = None;
      }
    }
  }

  debug!(
    instructions = instructions.len(),
    symbols      = symbols.len(),
    functions    = function_table.len(),
    "assembled program"
  );

  Ok(Program::new(&instructions, data, symbols, function_table))
}
