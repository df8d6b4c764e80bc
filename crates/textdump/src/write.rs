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

//! Serialization of a [`MooDatabase`] back to textdump form. The output is
//! canonical "flat" form: every count is recomputed from the collection it
//! describes, objects go out in ascending id order with `recycled`
//! tombstones in place, the classic layout's intrusive list fields are
//! rebuilt from the explicit contents/children lists, and sections the model
//! does not retain (clocks, pending values, interrupted tasks, connections)
//! are written as empty. Serializing the same database twice produces
//! byte-identical output.

use crate::dialect::{Dialect, SectionLayout, version_line};
use crate::{
    Activation, CodecError, Frame, MooDatabase, MooObject, NOTHING, Objid, QueuedTask,
    SuspendedTask, Vm,
};
use mooflat_var::Var;
use std::collections::HashSet;
use std::io::Write;
use tracing::info;

pub struct TextdumpWriter<'a, W: Write> {
    w: W,
    db: &'a MooDatabase,
    dialect: Dialect,
    waifs_written: HashSet<i64>,
}

impl<'a, W: Write> TextdumpWriter<'a, W> {
    pub fn new(w: W, db: &'a MooDatabase) -> Self {
        Self {
            w,
            db,
            dialect: Dialect::of(db.version),
            waifs_written: HashSet::new(),
        }
    }

    pub fn write_textdump(&mut self) -> Result<(), CodecError> {
        writeln!(self.w, "{}", version_line(self.db.version))?;
        match self.dialect.layout {
            SectionLayout::Classic => self.write_classic()?,
            SectionLayout::NextGen => self.write_next_gen()?,
        }
        info!(
            "wrote format version {} textdump: {} object slots, {} programs",
            self.db.version as u16,
            self.db.total_objects(),
            self.db.total_programs()
        );
        Ok(())
    }

    fn unsupported(&self, what: &str) -> CodecError {
        CodecError::Unrepresentable {
            what: format!(
                "{what} in format version {}",
                self.dialect.version as u16
            ),
        }
    }

    fn write_var(&mut self, var: &Var) -> Result<(), CodecError> {
        writeln!(self.w, "{}", var.tag() as u8)?;
        self.write_var_payload(var)
    }

    /// The payload lines of a value, without its tag line. Suspended-task
    /// headers carry the tag inline, so the split matters there.
    fn write_var_payload(&mut self, var: &Var) -> Result<(), CodecError> {
        match var {
            Var::None | Var::Clear => {}
            Var::Int(i) | Var::Catch(i) | Var::Finally(i) => writeln!(self.w, "{i}")?,
            Var::Bool(b) => {
                if !self.dialect.has_bool {
                    return Err(self.unsupported("a bool value"));
                }
                writeln!(self.w, "{}", *b as i64)?;
            }
            // Rust's shortest-round-trip formatting; reparsing yields the
            // identical bits.
            Var::Float(f) => writeln!(self.w, "{f}")?,
            Var::Str(s) => writeln!(self.w, "{s}")?,
            Var::Obj(o) => writeln!(self.w, "{}", o.0)?,
            Var::Err(e) => writeln!(self.w, "{}", *e as u8)?,
            Var::List(items) => {
                writeln!(self.w, "{}", items.len())?;
                for item in items {
                    self.write_var(item)?;
                }
            }
            Var::Map(pairs) => {
                if !self.dialect.has_map {
                    return Err(self.unsupported("a map value"));
                }
                writeln!(self.w, "{}", pairs.len())?;
                for (k, v) in pairs {
                    self.write_var(k)?;
                    self.write_var(v)?;
                }
            }
            Var::Waif(index) => {
                if !self.dialect.has_waif {
                    return Err(self.unsupported("a waif value"));
                }
                self.write_waif(*index)?;
            }
        }
        Ok(())
    }

    /// A waif body goes out in full at its first reference; later references
    /// are written as back-references to that body.
    fn write_waif(&mut self, index: i64) -> Result<(), CodecError> {
        if self.waifs_written.contains(&index) {
            writeln!(self.w, "r {index}")?;
            writeln!(self.w, ".")?;
            return Ok(());
        }
        let db = self.db;
        let Some(waif) = db.waifs.get(&index) else {
            return Err(CodecError::Unrepresentable {
                what: format!("waif {index} with no body in the waif table"),
            });
        };
        self.waifs_written.insert(index);
        writeln!(self.w, "c {index}")?;
        writeln!(self.w, "{}", waif.class.0)?;
        writeln!(self.w, "{}", waif.owner.0)?;
        writeln!(self.w, "{}", waif.propdefs_length)?;
        for (slot, value) in &waif.props {
            writeln!(self.w, "{slot}")?;
            self.write_var(value)?;
        }
        writeln!(self.w, "-1")?;
        writeln!(self.w, ".")?;
        Ok(())
    }

    fn write_objid_list(&mut self, ids: &[Objid]) -> Result<(), CodecError> {
        writeln!(self.w, "4")?;
        writeln!(self.w, "{}", ids.len())?;
        for id in ids {
            writeln!(self.w, "1")?;
            writeln!(self.w, "{}", id.0)?;
        }
        Ok(())
    }

    fn write_verbdefs(&mut self, obj: &MooObject) -> Result<(), CodecError> {
        writeln!(self.w, "{}", obj.verbs.len())?;
        for verb in &obj.verbs {
            writeln!(self.w, "{}", verb.name)?;
            writeln!(self.w, "{}", verb.owner.0)?;
            writeln!(self.w, "{}", verb.perms)?;
            writeln!(self.w, "{}", verb.prep)?;
        }
        Ok(())
    }

    fn write_properties(&mut self, obj: &MooObject) -> Result<(), CodecError> {
        writeln!(self.w, "{}", obj.propdefs.len())?;
        for name in &obj.propdefs {
            writeln!(self.w, "{name}")?;
        }
        writeln!(self.w, "{}", obj.properties.len())?;
        for prop in &obj.properties {
            self.write_var(&prop.value)?;
            writeln!(self.w, "{}", prop.owner.0)?;
            writeln!(self.w, "{}", prop.perms)?;
        }
        Ok(())
    }

    /// The next object after `obj` in its location's contents, which is what
    /// the classic layout's `neighbor` chain pointer stores.
    fn neighbor_of(&self, obj: &MooObject) -> Objid {
        let Some(location) = self
            .db
            .objects
            .get(&obj.location.0)
            .filter(|_| obj.location.is_positional())
        else {
            return NOTHING;
        };
        match location.contents.iter().position(|&c| c == obj.id) {
            Some(pos) => location.contents.get(pos + 1).copied().unwrap_or(NOTHING),
            None => NOTHING,
        }
    }

    /// The next object after `obj` in its parent's children, the classic
    /// `sibling` chain pointer.
    fn sibling_of(&self, obj: &MooObject) -> Objid {
        let parent = obj.parent();
        let Some(parent) = self
            .db
            .objects
            .get(&parent.0)
            .filter(|_| parent.is_positional())
        else {
            return NOTHING;
        };
        match parent.children.iter().position(|&c| c == obj.id) {
            Some(pos) => parent.children.get(pos + 1).copied().unwrap_or(NOTHING),
            None => NOTHING,
        }
    }

    fn write_object_classic(&mut self, obj: &MooObject) -> Result<(), CodecError> {
        writeln!(self.w, "#{}", obj.id.0)?;
        writeln!(self.w, "{}", obj.name)?;
        // The obsolete handles line.
        writeln!(self.w)?;
        writeln!(self.w, "{}", obj.flags)?;
        writeln!(self.w, "{}", obj.owner.0)?;
        writeln!(self.w, "{}", obj.location.0)?;
        let neighbor = self.neighbor_of(obj);
        let sibling = self.sibling_of(obj);
        writeln!(
            self.w,
            "{}",
            obj.contents.first().copied().unwrap_or(NOTHING).0
        )?;
        writeln!(self.w, "{}", neighbor.0)?;
        writeln!(self.w, "{}", obj.parent().0)?;
        writeln!(
            self.w,
            "{}",
            obj.children.first().copied().unwrap_or(NOTHING).0
        )?;
        writeln!(self.w, "{}", sibling.0)?;
        self.write_verbdefs(obj)?;
        self.write_properties(obj)?;
        Ok(())
    }

    fn write_object_ng(&mut self, obj: &MooObject) -> Result<(), CodecError> {
        writeln!(self.w, "#{}", obj.id.0)?;
        writeln!(self.w, "{}", obj.name)?;
        writeln!(self.w, "{}", obj.flags)?;
        writeln!(self.w, "{}", obj.owner.0)?;
        self.write_var(&Var::Obj(obj.location))?;
        if self.dialect.has_last_move {
            self.write_var(&obj.last_move)?;
        }
        self.write_objid_list(&obj.contents)?;
        self.write_objid_list(&obj.parents)?;
        self.write_objid_list(&obj.children)?;
        self.write_verbdefs(obj)?;
        self.write_properties(obj)?;
        Ok(())
    }

    /// Every slot up to the maximum id, ascending, live records and
    /// tombstones interleaved.
    fn write_objects(&mut self) -> Result<(), CodecError> {
        let db = self.db;
        let mut ids: Vec<(i64, bool)> = db
            .objects
            .keys()
            .map(|&id| (id, false))
            .chain(db.recycled.iter().map(|&id| (id, true)))
            .collect();
        ids.sort_unstable();
        for (id, dead) in ids {
            if dead {
                writeln!(self.w, "#{id} recycled")?;
                continue;
            }
            let obj = &db.objects[&id];
            match self.dialect.layout {
                SectionLayout::Classic => self.write_object_classic(obj)?,
                SectionLayout::NextGen => self.write_object_ng(obj)?,
            }
        }
        Ok(())
    }

    fn write_programs(&mut self) -> Result<(), CodecError> {
        let db = self.db;
        for (&id, obj) in &db.objects {
            for (verbnum, verb) in obj.verbs.iter().enumerate() {
                let Some(code) = &verb.code else {
                    continue;
                };
                writeln!(self.w, "#{id}:{verbnum}")?;
                for line in code {
                    writeln!(self.w, "{line}")?;
                }
                writeln!(self.w, ".")?;
            }
        }
        Ok(())
    }

    fn write_players(&mut self) -> Result<(), CodecError> {
        writeln!(self.w, "{}", self.db.players.len())?;
        for player in &self.db.players {
            writeln!(self.w, "{}", player.0)?;
        }
        Ok(())
    }

    fn write_rt_env(&mut self, env: &[(String, Var)]) -> Result<(), CodecError> {
        writeln!(self.w, "{} variables", env.len())?;
        for (name, value) in env {
            writeln!(self.w, "{name}")?;
            self.write_var(value)?;
        }
        Ok(())
    }

    fn write_activation(&mut self, a: &Activation) -> Result<(), CodecError> {
        self.write_var(&a.prelude)?;
        if self.dialect.has_this {
            self.write_var(a.this_val.as_ref().unwrap_or(&Var::None))?;
        }
        if self.dialect.has_anon {
            self.write_var(a.vloc_val.as_ref().unwrap_or(&Var::None))?;
        }
        if self.dialect.has_threaded {
            writeln!(self.w, "{}", a.threaded.unwrap_or(0))?;
        }
        writeln!(self.w, "{}", a.header.map(|n| n.to_string()).join(" "))?;
        writeln!(self.w, "{}", a.argstr)?;
        writeln!(self.w, "{}", a.dobjstr)?;
        writeln!(self.w, "{}", a.prepstr)?;
        writeln!(self.w, "{}", a.iobjstr)?;
        writeln!(self.w, "{}", a.verb)?;
        writeln!(self.w, "{}", a.verbname)?;
        Ok(())
    }

    fn write_queued_tasks(&mut self, tasks: &[QueuedTask]) -> Result<(), CodecError> {
        writeln!(self.w, "{} queued tasks", tasks.len())?;
        for task in tasks {
            writeln!(self.w, "{}", task.header.map(|n| n.to_string()).join(" "))?;
            self.write_activation(&task.activation)?;
            self.write_rt_env(&task.rt_env)?;
            for line in &task.code {
                writeln!(self.w, "{line}")?;
            }
            writeln!(self.w, ".")?;
        }
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), CodecError> {
        if self.dialect.has_frame_lang_versions {
            let lang = frame
                .lang_version
                .unwrap_or(self.dialect.version as u16);
            writeln!(self.w, "language version {lang}")?;
        }
        for line in &frame.code {
            writeln!(self.w, "{line}")?;
        }
        writeln!(self.w, ".")?;
        self.write_rt_env(&frame.rt_env)?;
        writeln!(self.w, "{} rt_stack slots in use", frame.stack.len())?;
        for value in &frame.stack {
            self.write_var(value)?;
        }
        self.write_activation(&frame.activation)?;
        self.write_var(&frame.temp)?;
        writeln!(self.w, "{}", frame.pc.map(|n| n.to_string()).join(" "))?;
        if frame.pc[1] != 0 {
            writeln!(self.w, "{}", frame.func_name.as_deref().unwrap_or_default())?;
        }
        Ok(())
    }

    fn write_vm(&mut self, vm: &Vm) -> Result<(), CodecError> {
        if self.dialect.has_task_local {
            self.write_var(vm.local.as_ref().unwrap_or(&Var::None))?;
        }
        // `top` is a frame count in disguise; it is rewritten from the
        // frames actually present.
        let top = vm.frames.len() as i64 - 1;
        match vm.max_stack_frames {
            Some(max) => writeln!(self.w, "{top} {} {} {max}", vm.vector, vm.func_id)?,
            None => writeln!(self.w, "{top} {} {}", vm.vector, vm.func_id)?,
        }
        for frame in &vm.frames {
            self.write_frame(frame)?;
        }
        Ok(())
    }

    fn write_suspended_tasks(&mut self, tasks: &[SuspendedTask]) -> Result<(), CodecError> {
        writeln!(self.w, "{} suspended tasks", tasks.len())?;
        for task in tasks {
            match &task.value {
                Some(value) => {
                    writeln!(
                        self.w,
                        "{} {} {}",
                        task.start_time,
                        task.id,
                        value.tag() as u8
                    )?;
                    self.write_var_payload(value)?;
                }
                None => writeln!(self.w, "{} {}", task.start_time, task.id)?,
            }
            self.write_vm(&task.vm)?;
        }
        Ok(())
    }

    fn write_classic(&mut self) -> Result<(), CodecError> {
        let db = self.db;
        writeln!(self.w, "{}", db.total_objects())?;
        writeln!(self.w, "{}", db.total_programs())?;
        // The spare header line.
        writeln!(self.w, "0")?;
        self.write_players()?;
        self.write_objects()?;
        self.write_programs()?;
        writeln!(self.w, "0 clocks")?;
        self.write_queued_tasks(&db.queued_tasks)?;
        self.write_suspended_tasks(&db.suspended_tasks)?;
        writeln!(self.w, "0 active connections")?;
        Ok(())
    }

    fn write_next_gen(&mut self) -> Result<(), CodecError> {
        let db = self.db;
        self.write_players()?;
        writeln!(self.w, "0 values pending finalization")?;
        writeln!(self.w, "0 clocks")?;
        self.write_queued_tasks(&db.queued_tasks)?;
        self.write_suspended_tasks(&db.suspended_tasks)?;
        if self.dialect.has_interrupted_tasks {
            writeln!(self.w, "0 interrupted tasks")?;
        }
        writeln!(self.w, "0 active connections")?;
        writeln!(self.w, "{}", db.total_objects())?;
        self.write_objects()?;
        if self.dialect.has_anon {
            writeln!(self.w, "0")?;
        }
        writeln!(self.w, "{}", db.total_programs())?;
        self.write_programs()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbVersion;
    use mooflat_var::{Objid, Var, v_float, v_int, v_list, v_str};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn empty_db(version: DbVersion) -> MooDatabase {
        MooDatabase {
            version,
            players: vec![],
            objects: BTreeMap::new(),
            recycled: vec![],
            waifs: BTreeMap::new(),
            queued_tasks: vec![],
            suspended_tasks: vec![],
        }
    }

    fn write_one(version: DbVersion, var: &Var) -> String {
        let db = empty_db(version);
        let mut out = Vec::new();
        let mut w = TextdumpWriter::new(&mut out, &db);
        w.write_var(var).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn scalar_lines() {
        assert_eq!(write_one(DbVersion::DbvBfbugFixed, &v_int(-7)), "0\n-7\n");
        assert_eq!(
            write_one(DbVersion::DbvBfbugFixed, &Var::Obj(Objid(2))),
            "1\n2\n"
        );
        assert_eq!(write_one(DbVersion::DbvBfbugFixed, &v_str("hi")), "2\nhi\n");
        assert_eq!(write_one(DbVersion::DbvBfbugFixed, &Var::Clear), "5\n");
        assert_eq!(write_one(DbVersion::DbvBfbugFixed, &Var::None), "6\n");
    }

    #[test]
    fn float_formatting_round_trips() {
        assert_eq!(write_one(DbVersion::DbvBfbugFixed, &v_float(1.5)), "9\n1.5\n");
        assert_eq!(write_one(DbVersion::DbvBfbugFixed, &v_float(1.0)), "9\n1\n");
        for f in [0.1, 1.0 / 3.0, f64::MAX, -2.5e-10] {
            let text = write_one(DbVersion::DbvBfbugFixed, &v_float(f));
            let line = text.lines().nth(1).unwrap();
            assert_eq!(line.parse::<f64>().unwrap(), f);
        }
    }

    #[test]
    fn list_nesting() {
        assert_eq!(
            write_one(DbVersion::DbvBfbugFixed, &v_list(&[v_int(1), v_list(&[])])),
            "4\n2\n0\n1\n4\n0\n"
        );
    }

    #[test]
    fn map_requires_a_capable_version() {
        let err = {
            let db = empty_db(DbVersion::DbvBfbugFixed);
            let mut out = Vec::new();
            let mut w = TextdumpWriter::new(&mut out, &db);
            w.write_var(&Var::Map(vec![])).unwrap_err()
        };
        assert!(matches!(err, CodecError::Unrepresentable { .. }));
        assert!(err.to_string().contains("format version 4"));
        assert_eq!(
            write_one(DbVersion::DbvBool, &Var::Map(vec![(v_str("k"), v_int(1))])),
            "10\n1\n2\nk\n0\n1\n"
        );
    }

    #[test]
    fn waif_bodies_are_shared() {
        let mut db = empty_db(DbVersion::DbvBool);
        db.waifs.insert(
            0,
            mooflat_var::Waif {
                class: Objid(10),
                owner: Objid(2),
                propdefs_length: 3,
                props: vec![(1, v_int(9))],
            },
        );
        let mut out = Vec::new();
        let mut w = TextdumpWriter::new(&mut out, &db);
        w.write_var(&Var::Waif(0)).unwrap();
        w.write_var(&Var::Waif(0)).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "13\nc 0\n10\n2\n3\n1\n0\n9\n-1\n.\n13\nr 0\n.\n"
        );
    }

    #[test]
    fn empty_classic_dump_shape() {
        let db = empty_db(DbVersion::DbvBfbugFixed);
        let mut out = Vec::new();
        TextdumpWriter::new(&mut out, &db).write_textdump().unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "** LambdaMOO Database, Format Version 4 **\n0\n0\n0\n0\n0 clocks\n0 queued tasks\n0 suspended tasks\n0 active connections\n"
        );
    }

    #[test]
    fn empty_next_gen_dump_shape() {
        let db = empty_db(DbVersion::DbvBool);
        let mut out = Vec::new();
        TextdumpWriter::new(&mut out, &db).write_textdump().unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "** LambdaMOO Database, Format Version 17 **\n0\n0 values pending finalization\n0 clocks\n0 queued tasks\n0 suspended tasks\n0 interrupted tasks\n0 active connections\n0\n0\n0\n"
        );
    }
}
