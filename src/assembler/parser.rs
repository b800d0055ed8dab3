/*!
  Grammars for the pieces of assembly text: the tokens of a line, integer literals, directive
  expressions like `%hiadj(table)`, and memory operands like `-8(sp)`.

  Every public function here parses a whole string and returns `None` if anything is left over.
*/

use nom::{
  branch::alt,
  bytes::complete::{tag_no_case, take_till, take_till1, take_while, take_while1},
  character::complete::{alpha1, char as one_char, digit1, hex_digit1, satisfy},
  combinator::{all_consuming, map_res, opt, recognize},
  multi::separated_list0,
  sequence::{delimited, pair, preceded, terminated},
  IResult
};

pub const COMMENT_CHAR: char = '#';

fn is_separator(c: char) -> bool {
  c.is_whitespace() || c == ','
}

fn is_token_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || "_.:%()-+".contains(c)
}

fn is_identifier_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn token_p(input: &str) -> IResult<&str, &str> {
  take_while1(is_token_char)(input)
}

fn line_p(input: &str) -> IResult<&str, Vec<&str>> {
  delimited(
    take_while(is_separator),
    separated_list0(take_while1(is_separator), token_p),
    take_while(is_separator)
  )(input)
}

/// Splits one line of source into tokens, dropping any trailing comment. Tokens are separated
/// by whitespace and commas. Returns `None` if the line holds characters no token can contain.
pub fn tokenize(line: &str) -> Option<Vec<&str>> {
  let code = match line.find(COMMENT_CHAR) {
    Some(position) => &line[..position],
    None           => line
  };
  all_consuming(line_p)(code).ok().map(|(_, tokens)| tokens)
}

fn integer_p(input: &str) -> IResult<&str, i64> {
  let (input, sign) = opt(alt((one_char('-'), one_char('+'))))(input)?;
  let (input, magnitude) = alt((
    map_res(preceded(tag_no_case("0x"), hex_digit1), |digits| i64::from_str_radix(digits, 16)),
    map_res(digit1, |digits: &str| digits.parse::<i64>())
  ))(input)?;

  match sign {
    Some('-') => Ok((input, -magnitude)),
    _         => Ok((input, magnitude))
  }
}

/// Decimal or `0x` hexadecimal, with an optional sign.
pub fn parse_integer(text: &str) -> Option<i64> {
  all_consuming(integer_p)(text).ok().map(|(_, value)| value)
}

fn identifier_p(input: &str) -> IResult<&str, &str> {
  recognize(pair(
    satisfy(|c| c.is_ascii_alphabetic() || c == '_' || c == '.'),
    take_while(is_identifier_char)
  ))(input)
}

/// Label and symbol names.
pub fn parse_identifier(text: &str) -> Option<&str> {
  all_consuming(identifier_p)(text).ok().map(|(_, name)| name)
}

/// A label definition, `name:`. Returns the name.
pub fn parse_label(token: &str) -> Option<&str> {
  all_consuming(terminated(identifier_p, one_char(':')))(token).ok().map(|(_, name)| name)
}

fn directive_p(input: &str) -> IResult<&str, (&str, &str)> {
  preceded(
    one_char('%'),
    pair(alpha1, delimited(one_char('('), take_till1(|c| c == ')'), one_char(')')))
  )(input)
}

/// A directive expression `%kind(value)`, returned as `(kind, value)`.
pub fn parse_directive(text: &str) -> Option<(&str, &str)> {
  all_consuming(directive_p)(text).ok().map(|(_, directive)| directive)
}

fn memory_p(input: &str) -> IResult<&str, (&str, &str)> {
  pair(
    alt((recognize(directive_p), take_till(|c| c == '('))),
    delimited(one_char('('), take_till1(|c| c == ')'), one_char(')'))
  )(input)
}

/// A memory operand `offset(base)`, returned as `(offset, base)`. The offset may be empty.
pub fn parse_memory_operand(text: &str) -> Option<(&str, &str)> {
  all_consuming(memory_p)(text).ok().map(|(_, operand)| operand)
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tokenize_splits_on_commas_and_whitespace() {
    assert_eq!(tokenize("  add r5, r6,r7  ").unwrap(), vec!["add", "r5", "r6", "r7"]);
    assert_eq!(tokenize("loop: addi r8, r8, -1 # count down").unwrap(), vec!["loop:", "addi", "r8", "r8", "-1"]);
    assert_eq!(tokenize("ldw r2, 0(r1)").unwrap(), vec!["ldw", "r2", "0(r1)"]);
  }

  #[test]
  fn tokenize_blank_and_comment_lines() {
    assert!(tokenize("").unwrap().is_empty());
    assert!(tokenize("   # only a comment").unwrap().is_empty());
  }

  #[test]
  fn tokenize_rejects_stray_characters() {
    assert_eq!(tokenize("add r1, r2; r3"), None);
    assert_eq!(tokenize("mov r1, $4"), None);
  }

  #[test]
  fn integers() {
    assert_eq!(parse_integer("42"), Some(42));
    assert_eq!(parse_integer("-12"), Some(-12));
    assert_eq!(parse_integer("+7"), Some(7));
    assert_eq!(parse_integer("0x1F"), Some(31));
    assert_eq!(parse_integer("-0x10"), Some(-16));
    assert_eq!(parse_integer("12a"), None);
    assert_eq!(parse_integer("--5"), None);
    assert_eq!(parse_integer("loop"), None);
  }

  #[test]
  fn labels_and_identifiers() {
    assert_eq!(parse_label("loop:"), Some("loop"));
    assert_eq!(parse_label("_start:"), Some("_start"));
    assert_eq!(parse_label("1abc:"), None);
    assert_eq!(parse_label("loop"), None);
    assert_eq!(parse_identifier("decr2"), Some("decr2"));
    assert_eq!(parse_identifier("-decr2"), None);
  }

  #[test]
  fn directives() {
    assert_eq!(parse_directive("%hiadj(table)"), Some(("hiadj", "table")));
    assert_eq!(parse_directive("%lo(0x12345678)"), Some(("lo", "0x12345678")));
    assert_eq!(parse_directive("%lo(x)y"), None);
    assert_eq!(parse_directive("lo(x)"), None);
  }

  #[test]
  fn memory_operands() {
    assert_eq!(parse_memory_operand("0(r1)"), Some(("0", "r1")));
    assert_eq!(parse_memory_operand("-8(sp)"), Some(("-8", "sp")));
    assert_eq!(parse_memory_operand("(r3)"), Some(("", "r3")));
    assert_eq!(parse_memory_operand("%lo(x)(r4)"), Some(("%lo(x)", "r4")));
    assert_eq!(parse_memory_operand("r3"), None);
  }
}
