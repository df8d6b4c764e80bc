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

//! Whole-dump round trips through parse and serialize, for both the classic
//! v4 layout and the ToastStunt v17 layout. The fixtures are written in the
//! canonical flat form the writer produces, so serialization can be compared
//! byte for byte.

use mooflat_textdump::{
    Activation, CodecError, ConsistencyWarning, DbVersion, EncodingMode, Frame, MooDatabase,
    MooError, MooObject, NOTHING, Objid, Property, SuspendedTask, Var, Vm, Waif, parse,
    parse_bytes, serialize, serialize_bytes, v_err, v_float, v_int, v_list, v_map, v_str, v_waif,
};
use similar_asserts::assert_eq;
use std::collections::BTreeMap;

/// A small classic-layout core: a system object, a root class with one
/// defined property, a room containing a wizard, and one recycled slot.
const MINIMAL_V4: &str = "\
** LambdaMOO Database, Format Version 4 **
5
1
0
1
3
#0
System Object

16
3
-1
-1
-1
1
-1
2
1
do_login_command
3
173
-1
0
1
5
3
5
#1
Root Class

0
3
-1
-1
-1
-1
0
-1
0
1
weight
1
0
10
3
5
#2
The First Room

0
3
-1
3
-1
1
-1
3
0
0
1
5
3
5
#3
Wizard

7
3
2
-1
-1
1
-1
-1
0
0
1
0
42
3
5
#4 recycled
#0:0
return #3;
.
0 clocks
0 queued tasks
0 suspended tasks
0 active connections
";

/// A v17 dump exercising the next-gen layout: maps, bools, a waif, a queued
/// task, and a suspended task with a resumption value.
const TOAST_V17: &str = "\
** LambdaMOO Database, Format Version 17 **
1
3
0 values pending finalization
0 clocks
1 queued tasks
0 10 1060 5
0
0
1
2
1
-1
1
2 0 0 3 0 3 2 0 1




look
look
2 variables
player
1
3
n
0
42
return 1;
.
1 suspended tasks
1700000000 9 0
7
6
0 -1 0 50
language version 17
x = 1;
.
1 variables
x
0
1
2 rt_stack slots in use
0
5
2
hello
0
0
1
2
1
-1
1
2 0 0 3 0 3 2 0 1




look
look
6
3 0 0
0 interrupted tasks
0 active connections
2
#0
Thing
16
3
1
-1
6
4
0
4
0
4
1
1
1
0
1
size
1
10
1
2
color
14
1
3
5
#1
Widget
0
3
1
-1
6
4
0
4
1
1
0
4
0
1
wiggle
3
173
-1
0
1
13
c 0
0
3
1
0
0
99
-1
.
3
5
0
1
#1:0
return this;
.
";

#[test]
fn classic_v4_parses() {
    let parsed = parse(MINIMAL_V4).unwrap();
    assert_eq!(parsed.warnings, vec![]);
    let db = parsed.db;
    assert_eq!(db.version, DbVersion::DbvBfbugFixed);
    assert_eq!(db.players, vec![Objid(3)]);
    assert_eq!(db.objects.len(), 4);
    assert_eq!(db.recycled, vec![4]);
    assert_eq!(db.total_objects(), 5);

    // Children and contents come back from the intrusive chains.
    assert_eq!(
        db.objects[&1].children,
        vec![Objid(0), Objid(2), Objid(3)]
    );
    assert_eq!(db.objects[&2].contents, vec![Objid(3)]);
    assert_eq!(db.objects[&3].location, Objid(2));

    // The program section attached to the verbdef.
    let verb = &db.objects[&0].verbs[0];
    assert_eq!(verb.name, "do_login_command");
    assert_eq!(verb.code.as_deref(), Some(&["return #3;".to_string()][..]));
}

#[test]
fn classic_v4_property_inheritance() {
    let db = parse(MINIMAL_V4).unwrap().db;
    // "weight" is defined on #1; children carry it positionally.
    let on_root = &db.objects[&1].properties[0];
    assert_eq!((on_root.name.as_str(), &on_root.value), ("weight", &v_int(10)));
    let on_room = &db.objects[&2].properties[0];
    assert_eq!((on_room.name.as_str(), &on_room.value), ("weight", &Var::Clear));
    let on_wizard = &db.objects[&3].properties[0];
    assert_eq!((on_wizard.name.as_str(), &on_wizard.value), ("weight", &v_int(42)));
}

#[test]
fn classic_v4_round_trips_byte_for_byte() {
    let db = parse(MINIMAL_V4).unwrap().db;
    let flat = serialize(&db).unwrap();
    assert_eq!(flat, MINIMAL_V4);

    let again = parse(&flat).unwrap();
    assert_eq!(again.warnings, vec![]);
    assert_eq!(again.db, db);
    assert_eq!(serialize(&again.db).unwrap(), flat);
}

#[test]
fn toast_v17_parses() {
    let parsed = parse(TOAST_V17).unwrap();
    assert_eq!(parsed.warnings, vec![]);
    let db = parsed.db;
    assert_eq!(db.version, DbVersion::DbvBool);
    assert_eq!(db.objects.len(), 2);
    assert_eq!(db.objects[&0].children, vec![Objid(1)]);
    assert_eq!(db.objects[&1].parents, vec![Objid(0)]);

    // The map-and-bool property on #0.
    let size = &db.objects[&0].properties[0];
    assert_eq!(size.name, "size");
    assert_eq!(
        size.value,
        Var::Map(vec![(v_str("color"), Var::Bool(true))])
    );

    // The waif on #1, inherited slot named by #0's propdefs.
    let waif_prop = &db.objects[&1].properties[0];
    assert_eq!(waif_prop.name, "size");
    assert_eq!(waif_prop.value, Var::Waif(0));
    let waif = &db.waifs[&0];
    assert_eq!(waif.class, Objid(0));
    assert_eq!(waif.owner, Objid(3));
    assert_eq!(waif.props, vec![(0, v_int(99))]);
}

#[test]
fn toast_v17_tasks_are_retained() {
    let db = parse(TOAST_V17).unwrap().db;

    let queued = &db.queued_tasks[0];
    assert_eq!(queued.id(), 5);
    assert_eq!(queued.start_time(), 1060);
    assert_eq!(queued.first_lineno(), 10);
    assert_eq!(queued.activation.verb, "look");
    assert_eq!(queued.activation.player(), 3);
    assert!(queued.activation.debug());
    assert_eq!(
        queued.rt_env,
        vec![
            ("player".to_string(), Var::Obj(Objid(3))),
            ("n".to_string(), v_int(42)),
        ]
    );
    assert_eq!(queued.code, vec!["return 1;".to_string()]);

    let suspended = &db.suspended_tasks[0];
    assert_eq!((suspended.start_time, suspended.id), (1700000000, 9));
    assert_eq!(suspended.value, Some(v_int(7)));
    let frame = &suspended.vm.frames[0];
    assert_eq!(frame.lang_version, Some(17));
    assert_eq!(frame.stack, vec![v_int(5), v_str("hello")]);
    assert_eq!(frame.rt_env, vec![("x".to_string(), v_int(1))]);
}

#[test]
fn toast_v17_round_trips_byte_for_byte() {
    let db = parse(TOAST_V17).unwrap().db;
    let flat = serialize(&db).unwrap();
    assert_eq!(flat, TOAST_V17);

    let again = parse(&flat).unwrap();
    assert_eq!(again.db, db);
    assert_eq!(serialize(&again.db).unwrap(), flat);
}

#[test]
fn every_variant_round_trips_through_a_dump() {
    // One value of every variant, nested six levels deep. The catch and
    // finally stack markers only occur in suspended frames, so those ride on
    // a suspended task's value stack instead.
    let hoard = v_list(&[
        v_int(1),
        v_float(2.5),
        v_str("two"),
        Var::Obj(Objid(0)),
        v_err(MooError::E_RANGE),
        Var::Bool(false),
        Var::None,
        v_map(&[(
            v_str("inner"),
            v_list(&[v_list(&[v_list(&[v_waif(0), Var::Clear])])]),
        )]),
    ]);

    let mut objects = BTreeMap::new();
    objects.insert(
        0,
        MooObject {
            id: Objid(0),
            name: "stash".to_string(),
            flags: 0,
            owner: Objid(0),
            location: NOTHING,
            last_move: Var::None,
            parents: vec![],
            children: vec![],
            contents: vec![],
            verbs: vec![],
            propdefs: vec!["hoard".to_string()],
            properties: vec![Property {
                name: "hoard".to_string(),
                value: hoard,
                owner: Objid(0),
                perms: 5,
            }],
        },
    );
    let mut waifs = BTreeMap::new();
    waifs.insert(
        0,
        Waif {
            class: Objid(0),
            owner: Objid(0),
            propdefs_length: 1,
            props: vec![(0, v_int(7))],
        },
    );
    let suspended = SuspendedTask {
        start_time: 1700000000,
        id: 2,
        value: None,
        vm: Vm {
            local: Some(Var::None),
            vector: -1,
            func_id: 0,
            max_stack_frames: Some(50),
            frames: vec![Frame {
                lang_version: Some(17),
                code: vec!["suspend(1);".to_string()],
                rt_env: vec![],
                stack: vec![Var::Catch(3), Var::Finally(8)],
                activation: Activation {
                    prelude: Var::None,
                    this_val: Some(Var::Obj(Objid(0))),
                    vloc_val: Some(Var::Obj(NOTHING)),
                    threaded: Some(0),
                    header: [0, 0, 0, 3, 0, 3, 0, 0, 1],
                    argstr: String::new(),
                    dobjstr: String::new(),
                    prepstr: String::new(),
                    iobjstr: String::new(),
                    verb: "poke".to_string(),
                    verbname: "poke".to_string(),
                },
                temp: Var::None,
                pc: [0, 0, 0],
                func_name: None,
            }],
        },
    };
    let db = MooDatabase {
        version: DbVersion::DbvBool,
        players: vec![],
        objects,
        recycled: vec![],
        waifs,
        queued_tasks: vec![],
        suspended_tasks: vec![suspended],
    };

    let flat = serialize(&db).unwrap();
    let again = parse(&flat).unwrap();
    assert_eq!(again.warnings, vec![]);
    assert_eq!(again.db, db);
    assert_eq!(serialize(&again.db).unwrap(), flat);
}

#[test]
fn property_names_resolve_across_three_generations() {
    let text = "\
** LambdaMOO Database, Format Version 4 **
3
0
0
0
#0
grandparent

0
0
-1
-1
-1
-1
1
-1
0
2
a
b
2
0
1
0
5
0
2
0
5
#1
parent

0
0
-1
-1
-1
0
2
-1
0
1
c
3
0
10
0
5
0
20
0
5
0
30
0
5
#2
child

0
0
-1
-1
-1
1
-1
-1
0
0
3
0
100
0
5
0
200
0
5
0
300
0
5
0 clocks
0 queued tasks
0 suspended tasks
0 active connections
";
    let parsed = parse(text).unwrap();
    assert_eq!(parsed.warnings, vec![]);
    let child = &parsed.db.objects[&2];
    let props: Vec<(&str, &Var)> = child
        .properties
        .iter()
        .map(|p| (p.name.as_str(), &p.value))
        .collect();
    assert_eq!(
        props,
        vec![
            ("c", &v_int(100)),
            ("a", &v_int(200)),
            ("b", &v_int(300)),
        ]
    );
    assert_eq!(serialize(&parsed.db).unwrap(), text);
}

#[test]
fn orphaned_property_slot_is_fatal() {
    let text = "\
** LambdaMOO Database, Format Version 4 **
1
0
0
0
#0
loner

0
0
-1
-1
-1
-1
-1
-1
0
0
1
0
1
0
5
0 clocks
0 queued tasks
0 suspended tasks
0 active connections
";
    match parse(text).unwrap_err() {
        CodecError::OrphanedProperty { objid, slot } => {
            assert_eq!((objid, slot), (0, 0));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn truncated_verbdefs_report_the_position() {
    // Declares two verbdefs but the input ends after the first.
    let text = "\
** LambdaMOO Database, Format Version 4 **
1
0
0
0
#0
Thing

0
-1
-1
-1
-1
-1
-1
-1
2
foo
-1
173
-1
";
    match parse(text).unwrap_err() {
        CodecError::TruncatedInput { line, expected } => {
            assert_eq!(line, 22);
            assert_eq!(expected, "a verb name");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn truncated_children_list_reports_the_position() {
    // The children list declares three entries but supplies two.
    let text = "\
** LambdaMOO Database, Format Version 17 **
0
0 values pending finalization
0 clocks
0 queued tasks
0 suspended tasks
0 interrupted tasks
0 active connections
1
#0
Thing
0
-1
1
-1
6
4
0
4
0
4
3
1
0
1
1
";
    match parse(text).unwrap_err() {
        CodecError::TruncatedInput { line, .. } => assert_eq!(line, 27),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_contents_back_reference_is_repaired() {
    let text = "\
** LambdaMOO Database, Format Version 4 **
2
0
0
0
#0
box

0
0
-1
-1
-1
-1
-1
-1
0
0
0
#1
marble

0
0
0
-1
-1
-1
-1
-1
0
0
0
0 clocks
0 queued tasks
0 suspended tasks
0 active connections
";
    let parsed = parse(text).unwrap();
    assert_eq!(
        parsed.warnings,
        vec![ConsistencyWarning::ContentRepaired {
            location: Objid(0),
            content: Objid(1),
        }]
    );
    assert_eq!(parsed.db.objects[&0].contents, vec![Objid(1)]);

    // The repaired form serializes with the chain intact; reloading it is
    // clean.
    let flat = serialize(&parsed.db).unwrap();
    let again = parse(&flat).unwrap();
    assert_eq!(again.warnings, vec![]);
    assert_eq!(again.db, parsed.db);
}

#[test]
fn unsupported_version_is_fatal() {
    let err = parse("** LambdaMOO Database, Format Version 18 **\n0\n").unwrap_err();
    assert!(matches!(err, CodecError::UnsupportedVersion(18)));
}

#[test]
fn iso8859_1_bytes_round_trip() {
    let mut db = parse(MINIMAL_V4).unwrap().db;
    db.objects.get_mut(&3).unwrap().name = "Mélisande".to_string();

    let bytes = serialize_bytes(&db, EncodingMode::ISO8859_1).unwrap();
    // 0xE9 is 'é' in ISO-8859-1; the UTF-8 pair must not appear.
    assert!(bytes.contains(&0xE9));
    assert!(!bytes.windows(2).any(|w| w == [0xC3, 0xA9]));

    let again = parse_bytes(&bytes).unwrap().db;
    assert_eq!(again.objects[&3].name, "Mélisande");
    assert_eq!(again, db);
}
