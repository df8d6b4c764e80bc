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

use crate::{MooError, Objid};
use serde::Serialize;
use strum::FromRepr;

/// The on-disk type tags, one per line preceding a value's payload. Values
/// match the server's `var_type` enum; 11 was never assigned in any dialect
/// we read.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr, Serialize)]
#[allow(non_camel_case_types)]
pub enum VarTag {
    TYPE_INT = 0,
    TYPE_OBJ = 1,
    TYPE_STR = 2,
    TYPE_ERR = 3,
    TYPE_LIST = 4,
    TYPE_CLEAR = 5,   /* in clear properties' value slot */
    TYPE_NONE = 6,    /* in uninitialized MOO variables */
    TYPE_CATCH = 7,   /* on-stack marker for an exception handler */
    TYPE_FINALLY = 8, /* on-stack marker for a TRY-FINALLY clause */
    TYPE_FLOAT = 9,
    TYPE_MAP = 10,
    TYPE_ANON = 12,
    TYPE_WAIF = 13,
    TYPE_BOOL = 14,
}

/// A MOO value as represented in a textdump. Lists and maps nest to
/// unbounded depth; the codec guards decode depth, not this type.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Var {
    None,
    /// Property-slot sentinel meaning "inherit the parent's value".
    Clear,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Obj(Objid),
    Err(MooError),
    /// On-stack marker for an exception handler in a suspended frame; the
    /// payload is the handler's label.
    Catch(i64),
    /// On-stack marker for a TRY-FINALLY clause in a suspended frame.
    Finally(i64),
    List(Vec<Var>),
    /// Insertion-ordered; duplicate keys are preserved as read.
    Map(Vec<(Var, Var)>),
    /// Reference into the database's waif table, by dump index.
    Waif(i64),
}

impl Var {
    /// The tag this value serializes under.
    pub fn tag(&self) -> VarTag {
        match self {
            Var::None => VarTag::TYPE_NONE,
            Var::Clear => VarTag::TYPE_CLEAR,
            Var::Bool(_) => VarTag::TYPE_BOOL,
            Var::Int(_) => VarTag::TYPE_INT,
            Var::Float(_) => VarTag::TYPE_FLOAT,
            Var::Str(_) => VarTag::TYPE_STR,
            Var::Obj(_) => VarTag::TYPE_OBJ,
            Var::Err(_) => VarTag::TYPE_ERR,
            Var::Catch(_) => VarTag::TYPE_CATCH,
            Var::Finally(_) => VarTag::TYPE_FINALLY,
            Var::List(_) => VarTag::TYPE_LIST,
            Var::Map(_) => VarTag::TYPE_MAP,
            Var::Waif(_) => VarTag::TYPE_WAIF,
        }
    }

    pub fn as_objid(&self) -> Option<Objid> {
        match self {
            Var::Obj(o) => Some(*o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Var]> {
        match self {
            Var::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Var::Clear)
    }
}

/// A waif body: a lightweight instance of a class object with its own
/// property-value overrides. Stored once per dump index; values reference it
/// through `Var::Waif`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Waif {
    pub class: Objid,
    pub owner: Objid,
    /// The class's propdef count at the time the dump was taken. We cannot
    /// recompute this from the object table, so it is carried verbatim.
    pub propdefs_length: i64,
    /// Sparse overrides, as `(slot, value)` pairs in dump order.
    pub props: Vec<(i64, Var)>,
}

pub fn v_none() -> Var {
    Var::None
}

pub fn v_clear() -> Var {
    Var::Clear
}

pub fn v_bool(b: bool) -> Var {
    Var::Bool(b)
}

pub fn v_int(i: i64) -> Var {
    Var::Int(i)
}

pub fn v_float(f: f64) -> Var {
    Var::Float(f)
}

pub fn v_str(s: &str) -> Var {
    Var::Str(s.to_string())
}

pub fn v_obj(o: Objid) -> Var {
    Var::Obj(o)
}

pub fn v_err(e: MooError) -> Var {
    Var::Err(e)
}

pub fn v_list(l: &[Var]) -> Var {
    Var::List(l.to_vec())
}

pub fn v_map(pairs: &[(Var, Var)]) -> Var {
    Var::Map(pairs.to_vec())
}

pub fn v_waif(index: i64) -> Var {
    Var::Waif(index)
}
