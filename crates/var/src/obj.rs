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
use std::fmt::{Display, Formatter};

/// An object id as stored in a textdump. Negative values are sentinels, not
/// table slots.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct Objid(pub i64);

/// The "no object" sentinel (`#-1`), used for missing parents, locations, etc.
pub const NOTHING: Objid = Objid(-1);
/// Match-failure sentinel (`#-2`).
pub const AMBIGUOUS: Objid = Objid(-2);
/// Match-failure sentinel (`#-3`).
pub const FAILED_MATCH: Objid = Objid(-3);

impl Objid {
    /// True for ids that can actually name an object table slot.
    pub fn is_positional(&self) -> bool {
        self.0 >= 0
    }

    pub fn is_nothing(&self) -> bool {
        *self == NOTHING
    }
}

impl Display for Objid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i64> for Objid {
    fn from(i: i64) -> Self {
        Objid(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sentinels_never_name_a_slot() {
        assert!(!NOTHING.is_positional());
        assert!(!AMBIGUOUS.is_positional());
        assert!(!FAILED_MATCH.is_positional());
        assert!(Objid(0).is_positional());
        assert!(NOTHING.is_nothing());
        assert!(!AMBIGUOUS.is_nothing());
    }

    #[test]
    fn display_uses_the_hash_notation() {
        assert_eq!(Objid(42).to_string(), "#42");
        assert_eq!(AMBIGUOUS.to_string(), "#-2");
        assert_eq!(FAILED_MATCH.to_string(), "#-3");
    }
}
