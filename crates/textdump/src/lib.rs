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

//! A bidirectional codec for LambdaMOO-family textdump databases.
//!
//! [`parse`] turns the line-oriented dump text into a typed [`MooDatabase`],
//! validating counts and resolving positional property inheritance along the
//! way. [`serialize`] writes a database back out in canonical "flat" form:
//! counts are recomputed from the actual collections, objects are emitted in
//! ascending id order with `recycled` tombstones preserved, and live-server
//! state the model does not retain (clocks, connections) is normalized to
//! empty sections. A parse/serialize round trip is structure-preserving, and
//! serializing twice yields byte-identical output.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io;

pub use mooflat_var::{
    AMBIGUOUS, FAILED_MATCH, MooError, NOTHING, Objid, Var, VarTag, Waif, v_bool, v_clear, v_err,
    v_float, v_int, v_list, v_map, v_none, v_obj, v_str, v_waif,
};

mod assemble;
mod dialect;
mod read;
mod write;

pub use assemble::assemble;
pub use dialect::{DbVersion, Dialect, SectionLayout, parse_version_line, version_line};
pub use read::{
    DEFAULT_MAX_VALUE_DEPTH, LineReader, ObjectRecord, ObjectSlot, Propval, Textdump,
    TextdumpReader, VerbProgram,
};
pub use write::TextdumpWriter;

// Verb permission bits and argument-spec fields, packed into the perms line of
// a verbdef.
pub const VF_READ: u16 = 1;
pub const VF_WRITE: u16 = 2;
pub const VF_EXEC: u16 = 4;
pub const VF_DEBUG: u16 = 10;
pub const VF_DOBJSHIFT: u16 = 4;
pub const VF_IOBJSHIFT: u16 = 6;
pub const VF_OBJMASK: u16 = 0x3;

pub const VF_ASPEC_NONE: u16 = 0;
pub const VF_ASPEC_ANY: u16 = 1;
pub const VF_ASPEC_THIS: u16 = 2;

pub const PREP_ANY: i16 = -2;
pub const PREP_NONE: i16 = -1;

/// Object flag bit positions, as packed into the flags line of an object
/// record.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ObjFlag {
    User = 0,
    Programmer = 1,
    Wizard = 2,
    Read = 4,
    Write = 5,
    Fertile = 7,
}

/// What mode to use for strings that contain non-ASCII characters.
///
/// LambdaMOO-family servers read and write ISO-8859-1; choose that to produce
/// dumps a stock server will accept byte for byte. The default is UTF-8.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize)]
pub enum EncodingMode {
    // windows-1252 / ISO-8859-1
    ISO8859_1,
    #[default]
    UTF8,
}

impl TryFrom<&str> for EncodingMode {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ISO-8859-1" | "iso-8859-1" | "iso8859-1" => Ok(EncodingMode::ISO8859_1),
            "UTF8" | "UTF-8" | "utf8" | "utf-8" => Ok(EncodingMode::UTF8),
            _ => Err(format!("unknown encoding mode: {value}")),
        }
    }
}

impl std::str::FromStr for EncodingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EncodingMode::try_from(s)
    }
}

/// A verb definition, with its compiled program if one was present in the
/// programs section.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verb {
    pub name: String,
    pub owner: Objid,
    pub perms: u16,
    pub prep: i16,
    pub code: Option<Vec<String>>,
}

impl Verb {
    pub fn is_readable(&self) -> bool {
        self.perms & VF_READ != 0
    }

    pub fn is_writable(&self) -> bool {
        self.perms & VF_WRITE != 0
    }

    pub fn is_executable(&self) -> bool {
        self.perms & VF_EXEC != 0
    }

    pub fn is_debug(&self) -> bool {
        self.perms & VF_DEBUG != 0
    }

    /// The direct-object argument spec, one of the `VF_ASPEC_*` values.
    pub fn dobj_spec(&self) -> u16 {
        (self.perms >> VF_DOBJSHIFT) & VF_OBJMASK
    }

    /// The indirect-object argument spec, one of the `VF_ASPEC_*` values.
    pub fn iobj_spec(&self) -> u16 {
        (self.perms >> VF_IOBJSHIFT) & VF_OBJMASK
    }
}

/// A property on an object, with its name resolved from the positional
/// propdef tables of the object and its ancestors.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: Var,
    pub owner: Objid,
    pub perms: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MooObject {
    pub id: Objid,
    pub name: String,
    pub flags: u8,
    pub owner: Objid,
    pub location: Objid,
    /// `last_move` built-in property value; `Var::None` for dialects that
    /// predate it.
    pub last_move: Var,
    pub parents: Vec<Objid>,
    pub children: Vec<Objid>,
    pub contents: Vec<Objid>,
    pub verbs: Vec<Verb>,
    /// Property names declared locally on this object, in slot order.
    pub propdefs: Vec<String>,
    /// All property values on this object: the local slots first, then one
    /// per inherited slot, ancestor by ancestor.
    pub properties: Vec<Property>,
}

impl MooObject {
    /// The primary parent, the one positional property slots resolve
    /// through.
    pub fn parent(&self) -> Objid {
        self.parents.first().copied().unwrap_or(NOTHING)
    }

    pub fn has_flag(&self, flag: ObjFlag) -> bool {
        self.flags & (1 << flag as u8) != 0
    }
}

/// The retained fields of an activation record, in dump order. Most of the
/// header numbers were already meaningless when LambdaMOO 1.8 shipped; they
/// are carried verbatim so a round trip does not invent values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Activation {
    /// The value that leads the record (historically the activation's stack
    /// dump).
    pub prelude: Var,
    /// Varified `this`, present from DbvThis on.
    pub this_val: Option<Var>,
    /// Varified verb location, present from DbvAnon on.
    pub vloc_val: Option<Var>,
    /// Threading mode, present from DbvThreaded on.
    pub threaded: Option<i64>,
    /// this, -, -, player, -, programmer, vloc, -, debug.
    pub header: [i64; 9],
    pub argstr: String,
    pub dobjstr: String,
    pub prepstr: String,
    pub iobjstr: String,
    pub verb: String,
    pub verbname: String,
}

impl Activation {
    pub fn this(&self) -> i64 {
        self.header[0]
    }

    pub fn player(&self) -> i64 {
        self.header[3]
    }

    pub fn programmer(&self) -> i64 {
        self.header[5]
    }

    pub fn vloc(&self) -> i64 {
        self.header[6]
    }

    pub fn debug(&self) -> bool {
        self.header[8] != 0
    }
}

/// A forked task waiting in the queue: one activation, its runtime
/// environment, and the program text to run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueuedTask {
    /// -, first_lineno, start_time, id.
    pub header: [i64; 4],
    pub activation: Activation,
    pub rt_env: Vec<(String, Var)>,
    pub code: Vec<String>,
}

impl QueuedTask {
    pub fn id(&self) -> i64 {
        self.header[3]
    }

    pub fn start_time(&self) -> i64 {
        self.header[2]
    }

    pub fn first_lineno(&self) -> i64 {
        self.header[1]
    }
}

/// One stack frame of a suspended VM.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Frame {
    /// From the "language version N" line, present from DbvFloat on.
    pub lang_version: Option<u16>,
    pub code: Vec<String>,
    pub rt_env: Vec<(String, Var)>,
    pub stack: Vec<Var>,
    pub activation: Activation,
    pub temp: Var,
    /// pc, bi_func, error.
    pub pc: [i64; 3],
    /// Present when bi_func is nonzero.
    pub func_name: Option<String>,
}

/// A suspended VM: its frames plus the header fields we cannot recompute.
/// The frame count is not stored; it is rewritten from `frames` on
/// serialization.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Vm {
    /// Task-local value, present from DbvTaskLocal on.
    pub local: Option<Var>,
    pub vector: i64,
    pub func_id: i64,
    pub max_stack_frames: Option<i64>,
    pub frames: Vec<Frame>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SuspendedTask {
    pub start_time: i64,
    pub id: i64,
    /// The value the task resumes with, if one was dumped. Its type tag lives
    /// on the task's header line, not on a line of its own.
    pub value: Option<Var>,
    pub vm: Vm,
}

/// A fully assembled database.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MooDatabase {
    pub version: DbVersion,
    pub players: Vec<Objid>,
    pub objects: BTreeMap<i64, MooObject>,
    /// Ids whose slots were dumped as `#n recycled`, ascending.
    pub recycled: Vec<i64>,
    /// Waif bodies by dump index; `Var::Waif` values point in here.
    pub waifs: BTreeMap<i64, Waif>,
    pub queued_tasks: Vec<QueuedTask>,
    pub suspended_tasks: Vec<SuspendedTask>,
}

impl MooDatabase {
    /// The object-table slot count a dump of this database declares: live
    /// objects plus tombstones.
    pub fn total_objects(&self) -> usize {
        self.objects.len() + self.recycled.len()
    }

    /// The number of programmed verbs, which the dump's programs section
    /// declares up front.
    pub fn total_programs(&self) -> usize {
        self.objects
            .values()
            .flat_map(|o| &o.verbs)
            .filter(|v| v.code.is_some())
            .count()
    }

    pub fn max_object(&self) -> i64 {
        let live = self.objects.keys().next_back().copied().unwrap_or(-1);
        let dead = self.recycled.last().copied().unwrap_or(-1);
        live.max(dead)
    }
}

/// Fatal parse and serialization failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported database format version {0}")]
    UnsupportedVersion(u16),
    #[error("malformed value at line {line}: {reason}")]
    MalformedValue { line: usize, reason: String },
    #[error("truncated input at line {line}: expected {expected}")]
    TruncatedInput { line: usize, expected: String },
    #[error("count mismatch in {what}: declared {declared}, found {actual}")]
    CountMismatch {
        what: String,
        declared: usize,
        actual: usize,
    },
    #[error("property slot {slot} on #{objid} has no definition in the parent chain")]
    OrphanedProperty { objid: i64, slot: usize },
    #[error("expected an integer at line {line}, got {token:?}")]
    NotAnInteger { line: usize, token: String },
    #[error("cannot serialize {what}")]
    Unrepresentable { what: String },
    #[error("could not read textdump: {0}")]
    Io(#[from] io::Error),
}

/// Non-fatal inconsistencies found while assembling the hierarchy. The
/// assembler repairs what it can and reports everything here rather than
/// aborting the load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyWarning {
    /// An object names a parent whose children do not include it; the child
    /// was added.
    ChildRepaired { parent: Objid, child: Objid },
    /// An object names a location whose contents do not include it; the
    /// object was added.
    ContentRepaired { location: Objid, content: Objid },
    /// A parent lists a child that does not point back at it; the listing is
    /// kept as dumped.
    StrayChild { parent: Objid, child: Objid },
    /// A location lists contents that do not point back at it; the listing is
    /// kept as dumped.
    StrayContent { location: Objid, content: Objid },
    /// A pointer names an object that is not in the table at all.
    DanglingReference {
        referrer: Objid,
        field: &'static str,
        target: Objid,
    },
}

impl std::fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyWarning::ChildRepaired { parent, child } => {
                write!(f, "{child} has parent {parent}, but was missing from its children; added")
            }
            ConsistencyWarning::ContentRepaired { location, content } => {
                write!(f, "{content} is located in {location}, but was missing from its contents; added")
            }
            ConsistencyWarning::StrayChild { parent, child } => {
                write!(f, "{parent} lists child {child}, which does not name it as parent")
            }
            ConsistencyWarning::StrayContent { location, content } => {
                write!(f, "{location} lists content {content}, which is not located there")
            }
            ConsistencyWarning::DanglingReference {
                referrer,
                field,
                target,
            } => {
                write!(f, "{referrer} {field} points at {target}, which is not in the database")
            }
        }
    }
}

/// A successful parse: the database plus whatever consistency repairs it
/// took to get there.
#[derive(Debug)]
pub struct Parsed {
    pub db: MooDatabase,
    pub warnings: Vec<ConsistencyWarning>,
}

/// Parse a complete textdump into a database.
pub fn parse(text: &str) -> Result<Parsed, CodecError> {
    let mut reader = TextdumpReader::new(text)?;
    let raw = reader.read_textdump()?;
    let (db, warnings) = assemble::assemble(raw)?;
    Ok(Parsed { db, warnings })
}

/// Parse raw dump bytes, decoding them as ISO-8859-1 the way the servers
/// write them.
pub fn parse_bytes(bytes: &[u8]) -> Result<Parsed, CodecError> {
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    parse(&text)
}

/// Serialize a database to canonical flat textdump form.
pub fn serialize(db: &MooDatabase) -> Result<String, CodecError> {
    let mut out = Vec::new();
    TextdumpWriter::new(&mut out, db).write_textdump()?;
    String::from_utf8(out).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

/// Serialize a database to bytes in the given string encoding.
pub fn serialize_bytes(db: &MooDatabase, mode: EncodingMode) -> Result<Vec<u8>, CodecError> {
    let text = serialize(db)?;
    match mode {
        EncodingMode::UTF8 => Ok(text.into_bytes()),
        EncodingMode::ISO8859_1 => {
            let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(&text);
            Ok(bytes.into_owned())
        }
    }
}
