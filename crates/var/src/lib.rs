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

//! The primitive MOO value types as they appear in textdump databases:
//! object ids, error codes, and the recursive tagged value union.

mod error;
mod obj;
mod var;

pub use error::MooError;
pub use obj::{AMBIGUOUS, FAILED_MATCH, NOTHING, Objid};
pub use var::{
    Var, VarTag, Waif, v_bool, v_clear, v_err, v_float, v_int, v_list, v_map, v_none, v_obj,
    v_str, v_waif,
};
