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

//! Lexical reading of a textdump: a forward-only line reader plus the
//! section parsers that turn the dump into a raw [`Textdump`] image. No
//! hierarchy or property-name resolution happens here; that is the
//! assembler's job.

use crate::dialect::{Dialect, SectionLayout, parse_version_line};
use crate::{Activation, CodecError, Frame, NOTHING, QueuedTask, SuspendedTask, Verb, Vm};
use mooflat_var::{Objid, Var, VarTag, Waif};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Nesting depth allowed in a single value before the decode is abandoned as
/// malformed. Real cores nest a handful of levels deep.
pub const DEFAULT_MAX_VALUE_DEPTH: usize = 128;

// The server caps waif properties at three 32-slot words; a slot index at or
// past the cap ends the override list the same way a negative one does.
const WAIF_SLOT_CAP: i64 = 3 * 32;

/// A forward-only reader over the dump text. Tracks the current line number
/// for error reporting and allows a single line of lookahead.
pub struct LineReader<'a> {
    lines: std::str::Lines<'a>,
    peeked: Option<&'a str>,
    line_num: usize,
}

impl<'a> LineReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            peeked: None,
            line_num: 0,
        }
    }

    /// The 1-based number of the last line consumed.
    pub fn line_num(&self) -> usize {
        self.line_num
    }

    fn next_raw(&mut self) -> Option<&'a str> {
        self.peeked
            .take()
            .or_else(|| self.lines.next())
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }

    /// Consume the next line, or fail with a truncation error describing what
    /// was expected there.
    pub fn read_line(&mut self, expected: &str) -> Result<&'a str, CodecError> {
        match self.next_raw() {
            Some(line) => {
                self.line_num += 1;
                Ok(line)
            }
            None => Err(CodecError::TruncatedInput {
                line: self.line_num + 1,
                expected: expected.to_string(),
            }),
        }
    }

    /// Look at the next line without consuming it.
    pub fn peek_line(&mut self) -> Option<&'a str> {
        if self.peeked.is_none() {
            self.peeked = self
                .lines
                .next()
                .map(|l| l.strip_suffix('\r').unwrap_or(l));
        }
        self.peeked
    }

    pub fn read_int(&mut self) -> Result<i64, CodecError> {
        let line = self.read_line("an integer")?;
        let line_num = self.line_num;
        line.trim().parse().map_err(|_| CodecError::NotAnInteger {
            line: line_num,
            token: line.to_string(),
        })
    }

    pub fn read_count(&mut self) -> Result<usize, CodecError> {
        let line = self.read_line("a count")?;
        let line_num = self.line_num;
        line.trim().parse().map_err(|_| CodecError::NotAnInteger {
            line: line_num,
            token: line.to_string(),
        })
    }

    pub fn read_objid(&mut self) -> Result<Objid, CodecError> {
        Ok(Objid(self.read_int()?))
    }

    pub fn read_float(&mut self) -> Result<f64, CodecError> {
        let line = self.read_line("a float")?;
        let line_num = self.line_num;
        line.trim().parse().map_err(|_| CodecError::MalformedValue {
            line: line_num,
            reason: format!("not a float: {line:?}"),
        })
    }

    /// Read a line of exactly `n` whitespace-separated integers.
    fn read_number_line(&mut self, n: usize, expected: &str) -> Result<Vec<i64>, CodecError> {
        let line = self.read_line(expected)?;
        let line_num = self.line_num;
        let nums: Vec<i64> = line
            .split_whitespace()
            .map(|tok| tok.parse())
            .collect::<Result<_, _>>()
            .map_err(|_| CodecError::NotAnInteger {
                line: line_num,
                token: line.to_string(),
            })?;
        if nums.len() != n {
            return Err(CodecError::MalformedValue {
                line: line_num,
                reason: format!("expected {n} numbers ({expected}), got {:?}", line),
            });
        }
        Ok(nums)
    }

    /// Read a `"<count> <label>"` section header, e.g. `"17 queued tasks"`.
    fn read_counted(&mut self, label: &str) -> Result<usize, CodecError> {
        let line = self.read_line(label)?;
        let line_num = self.line_num;
        let Some(count) = line.strip_suffix(label) else {
            return Err(CodecError::MalformedValue {
                line: line_num,
                reason: format!("expected a `{}' header, got {line:?}", label.trim()),
            });
        };
        count.trim().parse().map_err(|_| CodecError::NotAnInteger {
            line: line_num,
            token: line.to_string(),
        })
    }
}

/// One object-table slot: a live object record or a `#n recycled` tombstone.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectSlot {
    Object(ObjectRecord),
    Recycled(i64),
}

/// A property-value slot as dumped, before its name is resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Propval {
    pub value: Var,
    pub owner: Objid,
    pub perms: u8,
}

/// An object record as it appears in the dump. The classic layout stores
/// contents and children as intrusive linked lists (head pointer here, chain
/// pointers on the members); the next-gen layout stores them as explicit
/// lists. The assembler reduces both to the same [`crate::MooObject`] shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRecord {
    pub id: i64,
    pub name: String,
    pub flags: u8,
    pub owner: Objid,
    pub location: Objid,
    pub last_move: Var,
    pub parents: Vec<Objid>,
    // Classic linked-list fields; NOTHING in next-gen records.
    pub contents_head: Objid,
    pub neighbor: Objid,
    pub child_head: Objid,
    pub sibling: Objid,
    // Next-gen explicit lists; empty in classic records.
    pub contents: Vec<Objid>,
    pub children: Vec<Objid>,
    pub verbs: Vec<Verb>,
    pub propdefs: Vec<String>,
    pub propvals: Vec<Propval>,
}

/// A verb program from the programs section, keyed by object and verb index.
#[derive(Clone, Debug, PartialEq)]
pub struct VerbProgram {
    pub objid: i64,
    pub verbnum: usize,
    pub code: Vec<String>,
}

/// The raw image of a dump, read but not yet assembled.
pub struct Textdump {
    pub dialect: Dialect,
    pub nobjects: usize,
    pub players: Vec<Objid>,
    pub slots: Vec<ObjectSlot>,
    pub programs: Vec<VerbProgram>,
    pub waifs: BTreeMap<i64, Waif>,
    pub queued_tasks: Vec<QueuedTask>,
    pub suspended_tasks: Vec<SuspendedTask>,
}

pub struct TextdumpReader<'a> {
    r: LineReader<'a>,
    dialect: Dialect,
    max_depth: usize,
    waifs: BTreeMap<i64, Waif>,
}

impl<'a> TextdumpReader<'a> {
    /// Consume the version line and resolve the dialect the rest of the dump
    /// will be read under.
    pub fn new(text: &'a str) -> Result<Self, CodecError> {
        let mut r = LineReader::new(text);
        let first = r.read_line("a version line")?;
        let Some(version) = parse_version_line(first) else {
            return Err(CodecError::MalformedValue {
                line: 1,
                reason: format!("not a textdump version line: {first:?}"),
            });
        };
        let dialect = Dialect::for_version(version)?;
        Ok(Self {
            r,
            dialect,
            max_depth: DEFAULT_MAX_VALUE_DEPTH,
            waifs: BTreeMap::new(),
        })
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn malformed(&self, reason: String) -> CodecError {
        CodecError::MalformedValue {
            line: self.r.line_num(),
            reason,
        }
    }

    fn read_var(&mut self) -> Result<Var, CodecError> {
        self.read_var_at(0)
    }

    fn read_var_at(&mut self, depth: usize) -> Result<Var, CodecError> {
        let tag = self.r.read_int()?;
        self.read_var_payload(tag, depth)
    }

    /// Decode a value whose type tag has already been consumed (normally from
    /// the preceding line, but suspended-task headers carry it inline).
    fn read_var_payload(&mut self, tag: i64, depth: usize) -> Result<Var, CodecError> {
        if depth >= self.max_depth {
            return Err(self.malformed(format!(
                "value nesting exceeds {} levels",
                self.max_depth
            )));
        }
        let known = u8::try_from(tag).ok().and_then(VarTag::from_repr);
        let Some(known) = known else {
            return Err(self.malformed(format!("unknown type tag {tag}")));
        };
        let d = self.dialect;
        let v = match known {
            VarTag::TYPE_INT => Var::Int(self.r.read_int()?),
            VarTag::TYPE_OBJ => Var::Obj(self.r.read_objid()?),
            VarTag::TYPE_STR => Var::Str(self.r.read_line("a string value")?.to_string()),
            VarTag::TYPE_ERR => {
                let code = self.r.read_int()?;
                let err = u8::try_from(code)
                    .ok()
                    .and_then(mooflat_var::MooError::from_repr)
                    .ok_or_else(|| self.malformed(format!("unknown error code {code}")))?;
                Var::Err(err)
            }
            VarTag::TYPE_CATCH => Var::Catch(self.r.read_int()?),
            VarTag::TYPE_FINALLY => Var::Finally(self.r.read_int()?),
            VarTag::TYPE_LIST => {
                let len = self.r.read_count()?;
                let mut items = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    items.push(self.read_var_at(depth + 1)?);
                }
                Var::List(items)
            }
            VarTag::TYPE_CLEAR => Var::Clear,
            VarTag::TYPE_NONE => Var::None,
            VarTag::TYPE_FLOAT => Var::Float(self.r.read_float()?),
            VarTag::TYPE_MAP => {
                if !d.has_map {
                    return Err(self.malformed(format!(
                        "type tag {tag} (map) is not valid in version {}",
                        d.version as u16
                    )));
                }
                let len = self.r.read_count()?;
                let mut pairs = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    let k = self.read_var_at(depth + 1)?;
                    let v = self.read_var_at(depth + 1)?;
                    pairs.push((k, v));
                }
                Var::Map(pairs)
            }
            VarTag::TYPE_ANON => {
                return Err(self.malformed("anonymous objects are not supported".to_string()));
            }
            VarTag::TYPE_WAIF => {
                if !d.has_waif {
                    return Err(self.malformed(format!(
                        "type tag {tag} (waif) is not valid in version {}",
                        d.version as u16
                    )));
                }
                self.read_waif(depth)?
            }
            VarTag::TYPE_BOOL => {
                if !d.has_bool {
                    return Err(self.malformed(format!(
                        "type tag {tag} (bool) is not valid in version {}",
                        d.version as u16
                    )));
                }
                Var::Bool(self.r.read_int()? != 0)
            }
        };
        Ok(v)
    }

    /// A waif value: either a full body (`c <index>`), registered in the waif
    /// table, or a back-reference (`r <index>`) to one already read. Both
    /// forms end with a terminator line.
    fn read_waif(&mut self, depth: usize) -> Result<Var, CodecError> {
        let header = self.r.read_line("a waif header")?;
        let (kind, index) = header
            .split_once(' ')
            .ok_or_else(|| self.malformed(format!("bad waif header {header:?}")))?;
        let index: i64 = index
            .trim()
            .parse()
            .map_err(|_| self.malformed(format!("bad waif index in {header:?}")))?;
        match kind {
            "r" => {
                if !self.waifs.contains_key(&index) {
                    return Err(
                        self.malformed(format!("waif reference r {index} precedes its body"))
                    );
                }
                let _terminator = self.r.read_line("a waif terminator")?;
            }
            "c" => {
                let class = self.r.read_objid()?;
                let owner = self.r.read_objid()?;
                let propdefs_length = self.r.read_int()?;
                let mut props = vec![];
                loop {
                    let slot = self.r.read_int()?;
                    if slot < 0 || slot >= WAIF_SLOT_CAP {
                        break;
                    }
                    props.push((slot, self.read_var_at(depth + 1)?));
                }
                let _terminator = self.r.read_line("a waif terminator")?;
                self.waifs.insert(
                    index,
                    Waif {
                        class,
                        owner,
                        propdefs_length,
                        props,
                    },
                );
            }
            _ => return Err(self.malformed(format!("bad waif header {header:?}"))),
        }
        Ok(Var::Waif(index))
    }

    fn read_verbdefs(&mut self) -> Result<Vec<Verb>, CodecError> {
        let nverbs = self.r.read_count()?;
        let mut verbs = Vec::with_capacity(nverbs);
        for _ in 0..nverbs {
            let name = self.r.read_line("a verb name")?.to_string();
            let owner = self.r.read_objid()?;
            let perms = self.r.read_int()? as u16;
            let prep = self.r.read_int()? as i16;
            verbs.push(Verb {
                name,
                owner,
                perms,
                prep,
                code: None,
            });
        }
        Ok(verbs)
    }

    fn read_propdefs(&mut self) -> Result<Vec<String>, CodecError> {
        let ndefs = self.r.read_count()?;
        let mut names = Vec::with_capacity(ndefs);
        for _ in 0..ndefs {
            names.push(self.r.read_line("a property name")?.to_string());
        }
        Ok(names)
    }

    fn read_propvals(&mut self) -> Result<Vec<Propval>, CodecError> {
        let nvals = self.r.read_count()?;
        let mut vals = Vec::with_capacity(nvals);
        for _ in 0..nvals {
            let value = self.read_var()?;
            let owner = self.r.read_objid()?;
            let perms = self.r.read_int()? as u8;
            vals.push(Propval {
                value,
                owner,
                perms,
            });
        }
        Ok(vals)
    }

    /// The `#<id>` label that opens every object slot, tombstones included.
    fn read_object_slot(&mut self) -> Result<ObjectSlot, CodecError> {
        let label = self.r.read_line("an object label")?;
        let line_num = self.r.line_num();
        let Some(rest) = label.strip_prefix('#') else {
            return Err(CodecError::MalformedValue {
                line: line_num,
                reason: format!("expected an object label `#<id>', got {label:?}"),
            });
        };
        let (id_str, recycled) = match rest.split_once(' ') {
            Some((id_str, "recycled")) => (id_str, true),
            Some(_) => {
                return Err(CodecError::MalformedValue {
                    line: line_num,
                    reason: format!("bad object label {label:?}"),
                });
            }
            None => (rest, false),
        };
        let id: i64 = id_str.parse().map_err(|_| CodecError::NotAnInteger {
            line: line_num,
            token: label.to_string(),
        })?;
        if recycled {
            return Ok(ObjectSlot::Recycled(id));
        }
        let record = match self.dialect.layout {
            SectionLayout::Classic => self.read_object_classic(id)?,
            SectionLayout::NextGen => self.read_object_ng(id)?,
        };
        Ok(ObjectSlot::Object(record))
    }

    fn read_object_classic(&mut self, id: i64) -> Result<ObjectRecord, CodecError> {
        let name = self.r.read_line("an object name")?.to_string();
        // The long-obsolete "handles" line.
        let _handles = self.r.read_line("the object handles line")?;
        let flags = self.r.read_int()? as u8;
        let owner = self.r.read_objid()?;
        let location = self.r.read_objid()?;
        let contents_head = self.r.read_objid()?;
        let neighbor = self.r.read_objid()?;
        let parent = self.r.read_objid()?;
        let child_head = self.r.read_objid()?;
        let sibling = self.r.read_objid()?;
        let verbs = self.read_verbdefs()?;
        let propdefs = self.read_propdefs()?;
        let propvals = self.read_propvals()?;
        Ok(ObjectRecord {
            id,
            name,
            flags,
            owner,
            location,
            last_move: Var::None,
            parents: if parent.is_nothing() { vec![] } else { vec![parent] },
            contents_head,
            neighbor,
            child_head,
            sibling,
            contents: vec![],
            children: vec![],
            verbs,
            propdefs,
            propvals,
        })
    }

    fn read_objid_list(&mut self, what: &str) -> Result<Vec<Objid>, CodecError> {
        let v = self.read_var()?;
        let Some(items) = v.as_list() else {
            return Err(self.malformed(format!("{what} must be a list")));
        };
        items
            .iter()
            .map(|item| {
                item.as_objid()
                    .ok_or_else(|| self.malformed(format!("{what} must contain only object ids")))
            })
            .collect()
    }

    fn read_object_ng(&mut self, id: i64) -> Result<ObjectRecord, CodecError> {
        let name = self.r.read_line("an object name")?.to_string();
        let flags = self.r.read_int()? as u8;
        let owner = self.r.read_objid()?;
        let location = self
            .read_var()?
            .as_objid()
            .ok_or_else(|| self.malformed("object location must be an object id".to_string()))?;
        let last_move = if self.dialect.has_last_move {
            self.read_var()?
        } else {
            Var::None
        };
        let contents = self.read_objid_list("object contents")?;
        let parents = match self.read_var()? {
            Var::Obj(o) if o.is_nothing() => vec![],
            Var::Obj(o) => vec![o],
            Var::List(items) => items
                .iter()
                .map(|item| {
                    item.as_objid().ok_or_else(|| {
                        self.malformed("object parents must contain only object ids".to_string())
                    })
                })
                .collect::<Result<_, _>>()?,
            _ => {
                return Err(
                    self.malformed("object parents must be an object id or a list".to_string())
                );
            }
        };
        let children = self.read_objid_list("object children")?;
        let verbs = self.read_verbdefs()?;
        let propdefs = self.read_propdefs()?;
        let propvals = self.read_propvals()?;
        Ok(ObjectRecord {
            id,
            name,
            flags,
            owner,
            location,
            last_move,
            parents,
            contents_head: NOTHING,
            neighbor: NOTHING,
            child_head: NOTHING,
            sibling: NOTHING,
            contents,
            children,
            verbs,
            propdefs,
            propvals,
        })
    }

    /// Lines up to (and consuming) the `.` terminator.
    fn read_program(&mut self) -> Result<Vec<String>, CodecError> {
        let mut lines = vec![];
        loop {
            let line = self.r.read_line("a program line or `.' terminator")?;
            if line == "." {
                return Ok(lines);
            }
            lines.push(line.to_string());
        }
    }

    fn read_verb_program(&mut self) -> Result<VerbProgram, CodecError> {
        let label = self.r.read_line("a verb program label `#<id>:<num>'")?;
        let line_num = self.r.line_num();
        let parsed = label
            .strip_prefix('#')
            .and_then(|rest| rest.split_once(':'))
            .and_then(|(obj, num)| {
                Some((obj.parse::<i64>().ok()?, num.parse::<usize>().ok()?))
            });
        let Some((objid, verbnum)) = parsed else {
            return Err(CodecError::MalformedValue {
                line: line_num,
                reason: format!("bad verb program label {label:?}"),
            });
        };
        let code = self.read_program()?;
        Ok(VerbProgram {
            objid,
            verbnum,
            code,
        })
    }

    fn read_players(&mut self) -> Result<Vec<Objid>, CodecError> {
        let nplayers = self.r.read_count()?;
        (0..nplayers).map(|_| self.r.read_objid()).collect()
    }

    fn read_rt_env(&mut self) -> Result<Vec<(String, Var)>, CodecError> {
        let nvars = self.r.read_counted(" variables")?;
        let mut env = Vec::with_capacity(nvars);
        for _ in 0..nvars {
            let name = self.r.read_line("a variable name")?.to_string();
            let value = self.read_var()?;
            env.push((name, value));
        }
        Ok(env)
    }

    fn read_activation(&mut self) -> Result<Activation, CodecError> {
        let d = self.dialect;
        let prelude = self.read_var()?;
        let this_val = if d.has_this { Some(self.read_var()?) } else { None };
        let vloc_val = if d.has_anon { Some(self.read_var()?) } else { None };
        let threaded = if d.has_threaded {
            Some(self.r.read_int()?)
        } else {
            None
        };
        let header = self.r.read_number_line(9, "an activation header")?;
        let header: [i64; 9] = header.try_into().expect("length checked");
        let argstr = self.r.read_line("argstr")?.to_string();
        let dobjstr = self.r.read_line("dobjstr")?.to_string();
        let prepstr = self.r.read_line("prepstr")?.to_string();
        let iobjstr = self.r.read_line("iobjstr")?.to_string();
        let verb = self.r.read_line("a verb name")?.to_string();
        let verbname = self.r.read_line("a verbname")?.to_string();
        Ok(Activation {
            prelude,
            this_val,
            vloc_val,
            threaded,
            header,
            argstr,
            dobjstr,
            prepstr,
            iobjstr,
            verb,
            verbname,
        })
    }

    fn read_queued_tasks(&mut self) -> Result<Vec<QueuedTask>, CodecError> {
        let ntasks = self.r.read_counted(" queued tasks")?;
        let mut tasks = Vec::with_capacity(ntasks);
        for _ in 0..ntasks {
            let header = self.r.read_number_line(4, "a queued task header")?;
            let header: [i64; 4] = header.try_into().expect("length checked");
            let activation = self.read_activation()?;
            let rt_env = self.read_rt_env()?;
            let code = self.read_program()?;
            tasks.push(QueuedTask {
                header,
                activation,
                rt_env,
                code,
            });
        }
        Ok(tasks)
    }

    fn read_frame(&mut self) -> Result<Frame, CodecError> {
        let lang_version = if self.dialect.has_frame_lang_versions {
            let line = self.r.read_line("a language version line")?;
            let line_num = self.r.line_num();
            let Some(v) = line.strip_prefix("language version ") else {
                return Err(CodecError::MalformedValue {
                    line: line_num,
                    reason: format!("expected a `language version' line, got {line:?}"),
                });
            };
            Some(v.trim().parse().map_err(|_| CodecError::NotAnInteger {
                line: line_num,
                token: line.to_string(),
            })?)
        } else {
            None
        };
        let code = self.read_program()?;
        let rt_env = self.read_rt_env()?;
        let nstack = self.r.read_counted(" rt_stack slots in use")?;
        let mut stack = Vec::with_capacity(nstack);
        for _ in 0..nstack {
            stack.push(self.read_var()?);
        }
        let activation = self.read_activation()?;
        let temp = self.read_var()?;
        let pc = self.r.read_number_line(3, "a pc line")?;
        let pc: [i64; 3] = pc.try_into().expect("length checked");
        let func_name = if pc[1] != 0 {
            Some(self.r.read_line("a built-in function name")?.to_string())
        } else {
            None
        };
        Ok(Frame {
            lang_version,
            code,
            rt_env,
            stack,
            activation,
            temp,
            pc,
            func_name,
        })
    }

    fn read_vm(&mut self) -> Result<Vm, CodecError> {
        let local = if self.dialect.has_task_local {
            Some(self.read_var()?)
        } else {
            None
        };
        let line = self.r.read_line("a VM header")?;
        let line_num = self.r.line_num();
        let nums: Vec<i64> = line
            .split_whitespace()
            .map(|tok| tok.parse())
            .collect::<Result<_, _>>()
            .map_err(|_| CodecError::NotAnInteger {
                line: line_num,
                token: line.to_string(),
            })?;
        if nums.len() != 3 && nums.len() != 4 {
            return Err(CodecError::MalformedValue {
                line: line_num,
                reason: format!("expected a VM header of 3 or 4 numbers, got {line:?}"),
            });
        }
        let (top, vector, func_id) = (nums[0], nums[1], nums[2]);
        let max_stack_frames = nums.get(3).copied();
        let nframes = (top + 1).max(0) as usize;
        let mut frames = Vec::with_capacity(nframes);
        for _ in 0..nframes {
            frames.push(self.read_frame()?);
        }
        Ok(Vm {
            local,
            vector,
            func_id,
            max_stack_frames,
            frames,
        })
    }

    fn read_suspended_tasks(&mut self) -> Result<Vec<SuspendedTask>, CodecError> {
        let ntasks = self.r.read_counted(" suspended tasks")?;
        let mut tasks = Vec::with_capacity(ntasks);
        for _ in 0..ntasks {
            let line = self.r.read_line("a suspended task header")?;
            let line_num = self.r.line_num();
            let nums: Vec<i64> = line
                .split_whitespace()
                .map(|tok| tok.parse())
                .collect::<Result<_, _>>()
                .map_err(|_| CodecError::NotAnInteger {
                    line: line_num,
                    token: line.to_string(),
                })?;
            if nums.len() != 2 && nums.len() != 3 {
                return Err(CodecError::MalformedValue {
                    line: line_num,
                    reason: format!("expected a suspended task header, got {line:?}"),
                });
            }
            // An optional third number is the type tag of the task's
            // resumption value; the payload follows on the next lines.
            let value = match nums.get(2) {
                Some(&tag) => Some(self.read_var_payload(tag, 0)?),
                None => None,
            };
            let vm = self.read_vm()?;
            tasks.push(SuspendedTask {
                start_time: nums[0],
                id: nums[1],
                value,
                vm,
            });
        }
        Ok(tasks)
    }

    /// Clock state is meaningless outside a running server; read and drop it.
    fn read_clocks(&mut self) -> Result<(), CodecError> {
        let nclocks = self.r.read_counted(" clocks")?;
        for _ in 0..nclocks {
            let _ = self.r.read_line("a clock record")?;
        }
        if nclocks > 0 {
            warn!("discarding {nclocks} obsolete clock records");
        }
        Ok(())
    }

    fn read_interrupted_tasks(&mut self) -> Result<(), CodecError> {
        let ntasks = self.r.read_counted(" interrupted tasks")?;
        for _ in 0..ntasks {
            let _header = self.r.read_line("an interrupted task header")?;
            let _vm = self.read_vm()?;
        }
        if ntasks > 0 {
            warn!("discarding {ntasks} interrupted tasks");
        }
        Ok(())
    }

    fn read_connections(&mut self) -> Result<(), CodecError> {
        let line = self.r.read_line("the active connections header")?;
        let line_num = self.r.line_num();
        let count = line
            .trim_end_matches(" with listeners")
            .strip_suffix(" active connections");
        let Some(count) = count else {
            return Err(CodecError::MalformedValue {
                line: line_num,
                reason: format!("expected an `active connections' header, got {line:?}"),
            });
        };
        let nconns: usize = count.trim().parse().map_err(|_| CodecError::NotAnInteger {
            line: line_num,
            token: line.to_string(),
        })?;
        for _ in 0..nconns {
            let _ = self.r.read_line("a connection record")?;
        }
        if nconns > 0 {
            warn!("discarding {nconns} active connection records");
        }
        Ok(())
    }

    fn read_pending_values(&mut self) -> Result<(), CodecError> {
        let npending = self.r.read_counted(" values pending finalization")?;
        for _ in 0..npending {
            let _ = self.read_var()?;
        }
        if npending > 0 {
            warn!("discarding {npending} values pending finalization");
        }
        Ok(())
    }

    /// Read the whole dump, section by section in the order the dialect's
    /// layout prescribes.
    pub fn read_textdump(&mut self) -> Result<Textdump, CodecError> {
        let d = self.dialect;
        info!(
            "reading format version {} textdump ({:?} layout)",
            d.version as u16, d.layout
        );
        let dump = match d.layout {
            SectionLayout::Classic => self.read_classic(),
            SectionLayout::NextGen => self.read_next_gen(),
        }?;
        if let Some(extra) = self.r.peek_line() {
            if !extra.trim().is_empty() {
                warn!(
                    "ignoring trailing data after line {}",
                    self.r.line_num()
                );
            }
        }
        info!(
            "read {} object slots, {} programs, {} users",
            dump.slots.len(),
            dump.programs.len(),
            dump.players.len()
        );
        Ok(dump)
    }

    fn read_classic(&mut self) -> Result<Textdump, CodecError> {
        let nobjects = self.r.read_count()?;
        let nprograms = self.r.read_count()?;
        let _dummy = self.r.read_line("the spare header line")?;
        let players = self.read_players()?;
        let slots = (0..nobjects)
            .map(|_| self.read_object_slot())
            .collect::<Result<Vec<_>, _>>()?;
        let programs = (0..nprograms)
            .map(|_| self.read_verb_program())
            .collect::<Result<Vec<_>, _>>()?;
        self.read_clocks()?;
        let queued_tasks = self.read_queued_tasks()?;
        let suspended_tasks = self.read_suspended_tasks()?;
        self.read_connections()?;
        Ok(Textdump {
            dialect: self.dialect,
            nobjects,
            players,
            slots,
            programs,
            waifs: std::mem::take(&mut self.waifs),
            queued_tasks,
            suspended_tasks,
        })
    }

    fn read_next_gen(&mut self) -> Result<Textdump, CodecError> {
        let players = self.read_players()?;
        self.read_pending_values()?;
        self.read_clocks()?;
        let queued_tasks = self.read_queued_tasks()?;
        let suspended_tasks = self.read_suspended_tasks()?;
        if self.dialect.has_interrupted_tasks {
            self.read_interrupted_tasks()?;
        }
        self.read_connections()?;
        let nobjects = self.r.read_count()?;
        let slots = (0..nobjects)
            .map(|_| self.read_object_slot())
            .collect::<Result<Vec<_>, _>>()?;
        if self.dialect.has_anon {
            let nanon = self.r.read_count()?;
            if nanon > 0 {
                return Err(self.malformed(format!(
                    "{nanon} anonymous objects present; anonymous objects are not supported"
                )));
            }
        }
        let nprograms = self.r.read_count()?;
        let programs = (0..nprograms)
            .map(|_| self.read_verb_program())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Textdump {
            dialect: self.dialect,
            nobjects,
            players,
            slots,
            programs,
            waifs: std::mem::take(&mut self.waifs),
            queued_tasks,
            suspended_tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mooflat_var::{MooError, Objid, v_int, v_str};
    use pretty_assertions::assert_eq;

    fn v4_reader(body: &str) -> TextdumpReader<'static> {
        let text = format!("** LambdaMOO Database, Format Version 4 **\n{body}");
        let leaked: &'static str = Box::leak(text.into_boxed_str());
        TextdumpReader::new(leaked).unwrap()
    }

    fn v17_reader(body: &str) -> TextdumpReader<'static> {
        let text = format!("** LambdaMOO Database, Format Version 17 **\n{body}");
        let leaked: &'static str = Box::leak(text.into_boxed_str());
        TextdumpReader::new(leaked).unwrap()
    }

    #[test]
    fn line_reader_tracks_positions() {
        let mut r = LineReader::new("a\r\nb\nc");
        assert_eq!(r.peek_line(), Some("a"));
        assert_eq!(r.line_num(), 0);
        assert_eq!(r.read_line("x").unwrap(), "a");
        assert_eq!(r.line_num(), 1);
        assert_eq!(r.read_line("x").unwrap(), "b");
        assert_eq!(r.read_line("x").unwrap(), "c");
        let err = r.read_line("a trailing line").unwrap_err();
        match err {
            CodecError::TruncatedInput { line, expected } => {
                assert_eq!(line, 4);
                assert_eq!(expected, "a trailing line");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn integers_are_strict() {
        let mut r = LineReader::new("12\n-3\nbanana");
        assert_eq!(r.read_int().unwrap(), 12);
        assert_eq!(r.read_int().unwrap(), -3);
        match r.read_int().unwrap_err() {
            CodecError::NotAnInteger { line, token } => {
                assert_eq!(line, 3);
                assert_eq!(token, "banana");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decode_scalars() {
        let mut rd = v4_reader("0\n42\n1\n-1\n2\nhello there\n9\n1.5\n3\n3\n5\n6\n");
        assert_eq!(rd.read_var().unwrap(), v_int(42));
        assert_eq!(rd.read_var().unwrap(), Var::Obj(Objid(-1)));
        assert_eq!(rd.read_var().unwrap(), v_str("hello there"));
        assert_eq!(rd.read_var().unwrap(), Var::Float(1.5));
        assert_eq!(rd.read_var().unwrap(), Var::Err(MooError::E_PERM));
        assert_eq!(rd.read_var().unwrap(), Var::Clear);
        assert_eq!(rd.read_var().unwrap(), Var::None);
    }

    #[test]
    fn decode_nested_list() {
        let mut rd = v4_reader("4\n2\n0\n1\n4\n1\n2\nx\n");
        assert_eq!(
            rd.read_var().unwrap(),
            Var::List(vec![v_int(1), Var::List(vec![v_str("x")])])
        );
    }

    #[test]
    fn map_is_gated_by_version() {
        let mut rd = v4_reader("10\n0\n");
        assert!(matches!(
            rd.read_var().unwrap_err(),
            CodecError::MalformedValue { .. }
        ));

        let mut rd = v17_reader("10\n1\n2\nk\n0\n7\n");
        assert_eq!(
            rd.read_var().unwrap(),
            Var::Map(vec![(v_str("k"), v_int(7))])
        );
    }

    #[test]
    fn bool_is_gated_by_version() {
        let mut rd = v17_reader("14\n1\n");
        assert_eq!(rd.read_var().unwrap(), Var::Bool(true));
        let mut rd = v4_reader("14\n1\n");
        assert!(rd.read_var().is_err());
    }

    #[test]
    fn waif_body_then_reference() {
        let body = "13\nc 3\n10\n2\n5\n0\n0\n99\n-1\n.\n13\nr 3\n.\n";
        let mut rd = v17_reader(body);
        assert_eq!(rd.read_var().unwrap(), Var::Waif(3));
        assert_eq!(rd.read_var().unwrap(), Var::Waif(3));
        let waif = rd.waifs.get(&3).unwrap();
        assert_eq!(waif.class, Objid(10));
        assert_eq!(waif.owner, Objid(2));
        assert_eq!(waif.propdefs_length, 5);
        assert_eq!(waif.props, vec![(0, v_int(99))]);
    }

    #[test]
    fn waif_overrides_end_at_the_slot_cap() {
        // 96 is the first slot past the last property word; it terminates the
        // override list without a value following it.
        let mut rd = v17_reader("13\nc 0\n10\n2\n3\n96\n.\n");
        assert_eq!(rd.read_var().unwrap(), Var::Waif(0));
        let waif = rd.waifs.get(&0).unwrap();
        assert_eq!(waif.propdefs_length, 3);
        assert_eq!(waif.props, vec![]);
    }

    #[test]
    fn waif_reference_before_body_is_rejected() {
        let mut rd = v17_reader("13\nr 9\n.\n");
        assert!(matches!(
            rd.read_var().unwrap_err(),
            CodecError::MalformedValue { .. }
        ));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut rd = v4_reader("11\n0\n");
        assert!(matches!(
            rd.read_var().unwrap_err(),
            CodecError::MalformedValue { .. }
        ));
    }

    #[test]
    fn depth_guard_trips() {
        // A list of a list of a list... deeper than the configured limit.
        let mut body = String::new();
        for _ in 0..10 {
            body.push_str("4\n1\n");
        }
        body.push_str("0\n0\n");
        let text = format!("** LambdaMOO Database, Format Version 4 **\n{body}");
        let leaked: &'static str = Box::leak(text.into_boxed_str());
        let mut rd = TextdumpReader::new(leaked).unwrap().with_max_depth(4);
        let err = rd.read_var().unwrap_err();
        assert!(matches!(err, CodecError::MalformedValue { .. }));
        assert!(err.to_string().contains("nesting"));
    }

    #[test]
    fn version_line_is_required() {
        assert!(matches!(
            TextdumpReader::new("not a dump\n"),
            Err(CodecError::MalformedValue { line: 1, .. })
        ));
        assert!(matches!(
            TextdumpReader::new("** LambdaMOO Database, Format Version 99 **\n"),
            Err(CodecError::UnsupportedVersion(99))
        ));
    }
}
