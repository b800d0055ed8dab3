/*!
  The 32 general purpose registers. Several registers have architectural aliases; these are only
  names, and register 0 is the only register with special behavior (it always reads as zero).
*/

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{TryFromPrimitive, IntoPrimitive};

pub const REGISTER_COUNT: usize = 32;

/// Register names parse case-insensitively, e.g. `r31`, `R31`, `ra` and `RA` are the same register.
#[derive(
StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,  Debug, Hash,    PartialOrd,       Ord
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[repr(u8)]
pub enum Register {
  R0,
  #[strum(to_string = "r1", serialize = "at")]
  R1,
  R2,  R3,  R4,  R5,  R6,  R7,  R8,  R9,
  R10, R11, R12, R13, R14, R15, R16, R17,
  R18, R19, R20, R21, R22, R23,
  #[strum(to_string = "r24", serialize = "et")]
  R24,
  #[strum(to_string = "r25", serialize = "bt")]
  R25,
  #[strum(to_string = "r26", serialize = "gp")]
  R26,
  #[strum(to_string = "r27", serialize = "sp")]
  R27,
  #[strum(to_string = "r28", serialize = "fp")]
  R28,
  #[strum(to_string = "r29", serialize = "ea")]
  R29,
  #[strum(to_string = "r30", serialize = "ba")]
  R30,
  #[strum(to_string = "r31", serialize = "ra")]
  R31,
}

impl Register {
  pub const ZERO           : Register = Register::R0;
  pub const ASSEMBLER_TEMP : Register = Register::R1;
  pub const STACK_POINTER  : Register = Register::R27;
  pub const FRAME_POINTER  : Register = Register::R28;
  pub const RETURN_ADDRESS : Register = Register::R31;

  pub fn index(&self) -> usize {
    Into::<u8>::into(*self) as usize
  }

  pub fn number(&self) -> u8 {
    Into::<u8>::into(*self)
  }
}


#[cfg(test)]
mod tests {
  use std::convert::TryFrom;
  use std::str::FromStr;
  use super::*;

  #[test]
  fn names_and_aliases_parse() {
    assert_eq!(Register::from_str("r0").unwrap(), Register::R0);
    assert_eq!(Register::from_str("R17").unwrap(), Register::R17);
    assert_eq!(Register::from_str("ra").unwrap(), Register::RETURN_ADDRESS);
    assert_eq!(Register::from_str("SP").unwrap(), Register::R27);
    assert_eq!(Register::from_str("r31").unwrap(), Register::R31);
    assert!(Register::from_str("r32").is_err());
    assert!(Register::from_str("x1").is_err());
  }

  #[test]
  fn display_uses_numeric_name() {
    assert_eq!(Register::R31.to_string(), "r31");
    assert_eq!(Register::R5.to_string(), "r5");
  }

  #[test]
  fn numbers_round_trip() {
    for n in 0..REGISTER_COUNT as u8 {
      assert_eq!(Register::try_from(n).unwrap().number(), n);
    }
    assert!(Register::try_from(32u8).is_err());
  }
}
