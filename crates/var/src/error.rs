// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use serde::Serialize;
use strum::{Display, FromRepr};

/// The MOO error codes, with their on-disk integer representation. The first
/// sixteen are classic LambdaMOO; E_FILE, E_EXEC and E_INTRPT were added by
/// the Stunt/ToastStunt line (DBV_FileIO, DBV_Exec, DBV_Interrupt).
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Display, FromRepr, Serialize)]
#[allow(non_camel_case_types)]
pub enum MooError {
    E_NONE = 0,
    E_TYPE = 1,
    E_DIV = 2,
    E_PERM = 3,
    E_PROPNF = 4,
    E_VERBNF = 5,
    E_VARNF = 6,
    E_INVIND = 7,
    E_RECMOVE = 8,
    E_MAXREC = 9,
    E_RANGE = 10,
    E_ARGS = 11,
    E_NACC = 12,
    E_INVARG = 13,
    E_QUOTA = 14,
    E_FLOAT = 15,
    E_FILE = 16,
    E_EXEC = 17,
    E_INTRPT = 18,
}

impl MooError {
    /// The server's conventional human-readable message for this code.
    pub fn message(&self) -> &'static str {
        match self {
            MooError::E_NONE => "No error",
            MooError::E_TYPE => "Type mismatch",
            MooError::E_DIV => "Division by zero",
            MooError::E_PERM => "Permission denied",
            MooError::E_PROPNF => "Property not found",
            MooError::E_VERBNF => "Verb not found",
            MooError::E_VARNF => "Variable not found",
            MooError::E_INVIND => "Invalid indirection",
            MooError::E_RECMOVE => "Recursive move",
            MooError::E_MAXREC => "Too many verb calls",
            MooError::E_RANGE => "Range error",
            MooError::E_ARGS => "Incorrect number of arguments",
            MooError::E_NACC => "Move refused by destination",
            MooError::E_INVARG => "Invalid argument",
            MooError::E_QUOTA => "Resource limit exceeded",
            MooError::E_FLOAT => "Floating-point arithmetic error",
            MooError::E_FILE => "File error",
            MooError::E_EXEC => "Exec error",
            MooError::E_INTRPT => "Interrupted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MooError;

    #[test]
    fn repr_round_trip() {
        for code in 0u8..=18 {
            let e = MooError::from_repr(code).unwrap();
            assert_eq!(e as u8, code);
        }
        assert_eq!(MooError::from_repr(19), None);
    }

    #[test]
    fn display_is_keyword() {
        assert_eq!(MooError::E_TYPE.to_string(), "E_TYPE");
        assert_eq!(MooError::E_INTRPT.to_string(), "E_INTRPT");
    }

    #[test]
    fn messages_match_the_server() {
        assert_eq!(MooError::E_PERM.message(), "Permission denied");
        assert_eq!(MooError::E_RANGE.message(), "Range error");
        assert_eq!(MooError::E_INTRPT.message(), "Interrupted");
    }
}
