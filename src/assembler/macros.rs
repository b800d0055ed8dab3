/*!
  Pseudo-instructions. Each macro rewrites one source statement into one or more real
  instructions. Expansions never contain another macro.
*/

use crate::error::AssemblerError;

use super::parser::parse_integer;

/// One expanded line: the mnemonic followed by its operands.
pub type ExpandedLine = Vec<String>;

fn line(parts: &[&str]) -> ExpandedLine {
  parts.iter().map(|part| part.to_string()).collect()
}

fn negate(operand: &str) -> String {
  match parse_integer(operand) {
    Some(value) => (-value).to_string(),
    None => match operand.strip_prefix('-') {
      Some(positive) => positive.to_string(),
      None           => format!("-{}", operand)
    }
  }
}

fn require(mnemonic: &str, operands: &[&str], count: usize, line_number: usize) -> Result<(), AssemblerError> {
  match operands.len() == count {
    true  => Ok(()),
    false => Err(AssemblerError::new(
      line_number,
      mnemonic,
      format!("Expected {} operands but found {}.", count, operands.len())
    ))
  }
}

/// Expands `mnemonic` if it names a macro. Returns `None` for real instructions.
pub fn expand(mnemonic: &str, operands: &[&str], line_number: usize)
  -> Option<Result<Vec<ExpandedLine>, AssemblerError>>
{
  let arity = match mnemonic {
    "nop"                                      => 0,
    "movi" | "mov" | "movia"                   => 2,
    "subi" | "cmple" | "cmpgt" | "bgt" | "ble" => 3,
    _                                          => return None
  };
  if let Err(error) = require(mnemonic, operands, arity, line_number) {
    return Some(Err(error));
  }

  let o = operands;
  let expansion = match mnemonic {
    "nop"   => vec![line(&["add", "r0", "r0", "r0"])],
    "movi"  => vec![line(&["addi", o[0], "r0", o[1]])],
    "mov"   => vec![line(&["add", o[0], o[1], "r0"])],
    "movia" => {
      let high = format!("%hiadj({})", o[1]);
      let low  = format!("%lo({})", o[1]);
      vec![line(&["orhi", o[0], "r0", high.as_str()]), line(&["addi", o[0], o[0], low.as_str()])]
    }
    "subi"  => vec![line(&["addi", o[0], o[1], negate(o[2]).as_str()])],
    // Source operands swap; the destination stays put.
    "cmple" => vec![line(&["cmpge", o[0], o[2], o[1]])],
    "cmpgt" => vec![line(&["cmplt", o[0], o[2], o[1]])],
    "bgt"   => vec![line(&["blt", o[1], o[0], o[2]])],
    "ble"   => vec![line(&["bge", o[1], o[0], o[2]])],
    _       => return None
  };

  Some(Ok(expansion))
}
