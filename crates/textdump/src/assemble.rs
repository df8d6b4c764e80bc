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

//! Assembly of a raw [`Textdump`] image into a [`MooDatabase`]: count
//! validation, reduction of the classic intrusive lists to explicit ones,
//! hierarchy consistency repair, positional property-name resolution, and
//! verb program attachment.

use crate::read::{ObjectRecord, ObjectSlot, Textdump};
use crate::{
    CodecError, ConsistencyWarning, MooDatabase, MooObject, NOTHING, Objid, Property,
    SectionLayout,
};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Walk an intrusive list: a head pointer on the owner, a chain pointer on
/// each member. Stops on the NOTHING sentinel, a missing record, or a cycle.
fn chase_chain(
    head: Objid,
    records: &BTreeMap<i64, ObjectRecord>,
    next: impl Fn(&ObjectRecord) -> Objid,
) -> Vec<Objid> {
    let mut out = vec![];
    let mut seen = HashSet::new();
    let mut cur = head;
    while cur.is_positional() && seen.insert(cur) {
        let Some(rec) = records.get(&cur.0) else {
            break;
        };
        out.push(cur);
        cur = next(rec);
    }
    out
}

/// The property names visible on `id`, in slot order: its own propdefs, then
/// its primary parent's, and so on up the chain.
fn name_table(id: i64, records: &BTreeMap<i64, ObjectRecord>) -> Vec<String> {
    let mut names = vec![];
    let mut seen = HashSet::new();
    let mut cur = id;
    while seen.insert(cur) {
        let Some(rec) = records.get(&cur) else {
            break;
        };
        names.extend(rec.propdefs.iter().cloned());
        let parent = rec.parents.first().copied().unwrap_or(NOTHING);
        if !parent.is_positional() {
            break;
        }
        cur = parent.0;
    }
    names
}

pub fn assemble(
    raw: Textdump,
) -> Result<(MooDatabase, Vec<ConsistencyWarning>), CodecError> {
    if raw.slots.len() != raw.nobjects {
        return Err(CodecError::CountMismatch {
            what: "object table".to_string(),
            declared: raw.nobjects,
            actual: raw.slots.len(),
        });
    }

    let mut records: BTreeMap<i64, ObjectRecord> = BTreeMap::new();
    let mut recycled = vec![];
    for slot in raw.slots {
        match slot {
            ObjectSlot::Object(rec) => {
                records.insert(rec.id, rec);
            }
            ObjectSlot::Recycled(id) => recycled.push(id),
        }
    }
    recycled.sort_unstable();
    recycled.dedup();

    let mut warnings = vec![];

    // Property names resolve positionally: slot i of an object's propvals is
    // named by entry i of its own propdefs concatenated with its ancestors'.
    let mut objects: BTreeMap<i64, MooObject> = BTreeMap::new();
    for (&id, rec) in &records {
        if rec.propvals.len() < rec.propdefs.len() {
            return Err(CodecError::CountMismatch {
                what: format!("property values on #{id}"),
                declared: rec.propdefs.len(),
                actual: rec.propvals.len(),
            });
        }
        let names = name_table(id, &records);
        let mut properties = Vec::with_capacity(rec.propvals.len());
        for (slot, pv) in rec.propvals.iter().enumerate() {
            let Some(name) = names.get(slot) else {
                return Err(CodecError::OrphanedProperty { objid: id, slot });
            };
            properties.push(Property {
                name: name.clone(),
                value: pv.value.clone(),
                owner: pv.owner,
                perms: pv.perms,
            });
        }

        let (children, contents) = match raw.dialect.layout {
            SectionLayout::Classic => (
                chase_chain(rec.child_head, &records, |r| r.sibling),
                chase_chain(rec.contents_head, &records, |r| r.neighbor),
            ),
            SectionLayout::NextGen => (rec.children.clone(), rec.contents.clone()),
        };

        objects.insert(
            id,
            MooObject {
                id: Objid(id),
                name: rec.name.clone(),
                flags: rec.flags,
                owner: rec.owner,
                location: rec.location,
                last_move: rec.last_move.clone(),
                parents: rec.parents.clone(),
                children,
                contents,
                verbs: rec.verbs.clone(),
                propdefs: rec.propdefs.clone(),
                properties,
            },
        );
    }
    drop(records);

    // Attach verb programs to their verbdef slots.
    for prog in raw.programs {
        let Some(obj) = objects.get_mut(&prog.objid) else {
            return Err(CodecError::CountMismatch {
                what: format!("verb program #{}:{} names a missing object", prog.objid, prog.verbnum),
                declared: prog.verbnum + 1,
                actual: 0,
            });
        };
        let nverbs = obj.verbs.len();
        let Some(verb) = obj.verbs.get_mut(prog.verbnum) else {
            return Err(CodecError::CountMismatch {
                what: format!("verb slots on #{}", prog.objid),
                declared: prog.verbnum + 1,
                actual: nverbs,
            });
        };
        verb.code = Some(prog.code);
    }

    // Repair pass. The forward pointers (parent, location) are authoritative:
    // a missing back-reference gets added, with a warning. A listed
    // back-reference whose forward pointer disagrees is kept, with a warning.
    let ids: Vec<i64> = objects.keys().copied().collect();
    for &id in &ids {
        let child = Objid(id);
        let parent = objects[&id].parent();
        let location = objects[&id].location;
        if parent.is_positional() {
            match objects.get_mut(&parent.0) {
                Some(p) => {
                    if !p.children.contains(&child) {
                        p.children.push(child);
                        warnings.push(ConsistencyWarning::ChildRepaired { parent, child });
                    }
                }
                None => warnings.push(ConsistencyWarning::DanglingReference {
                    referrer: child,
                    field: "parent",
                    target: parent,
                }),
            }
        }
        if location.is_positional() {
            match objects.get_mut(&location.0) {
                Some(l) => {
                    if !l.contents.contains(&child) {
                        l.contents.push(child);
                        warnings.push(ConsistencyWarning::ContentRepaired {
                            location,
                            content: child,
                        });
                    }
                }
                None => warnings.push(ConsistencyWarning::DanglingReference {
                    referrer: child,
                    field: "location",
                    target: location,
                }),
            }
        }
    }
    for &id in &ids {
        let obj = &objects[&id];
        for &child in &obj.children {
            match objects.get(&child.0) {
                Some(c) if c.parent() != Objid(id) => {
                    warnings.push(ConsistencyWarning::StrayChild {
                        parent: Objid(id),
                        child,
                    });
                }
                Some(_) => {}
                None => warnings.push(ConsistencyWarning::DanglingReference {
                    referrer: Objid(id),
                    field: "children",
                    target: child,
                }),
            }
        }
        for &content in &obj.contents {
            match objects.get(&content.0) {
                Some(c) if c.location != Objid(id) => {
                    warnings.push(ConsistencyWarning::StrayContent {
                        location: Objid(id),
                        content,
                    });
                }
                Some(_) => {}
                None => warnings.push(ConsistencyWarning::DanglingReference {
                    referrer: Objid(id),
                    field: "contents",
                    target: content,
                }),
            }
        }
    }

    if !warnings.is_empty() {
        info!("repaired database with {} consistency warnings", warnings.len());
    }

    let db = MooDatabase {
        version: raw.dialect.version,
        players: raw.players,
        objects,
        recycled,
        waifs: raw.waifs,
        queued_tasks: raw.queued_tasks,
        suspended_tasks: raw.suspended_tasks,
    };
    Ok((db, warnings))
}
