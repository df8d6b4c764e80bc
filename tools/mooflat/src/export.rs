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

//! Object-directory export: one directory per object holding `info.json`,
//! `props.json`, and one `.moo` file per verb. With corrification enabled,
//! objects that #0's properties point at are named `$property` instead of
//! their object number, the way core databases refer to them.

use eyre::Result;
use mooflat_textdump::{
    MooDatabase, MooObject, ObjFlag, Objid, PREP_ANY, PREP_NONE, VF_ASPEC_ANY, VF_ASPEC_NONE,
    VF_ASPEC_THIS, Var, Verb,
};
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Names Windows refuses as file names.
const ILLEGAL_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM0", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
    "COM8", "COM9", "LPT0", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8",
    "LPT9",
];

/// Strip path-hostile characters from a verb name. Reserved device names
/// come back empty so the caller falls back to the verb index.
fn sanitize(name: &str) -> String {
    let name: String = name
        .chars()
        .filter(|c| !matches!(c, '*' | '?' | '|' | ':' | ';' | '/' | '\\' | '<' | '>'))
        .collect();
    if ILLEGAL_NAMES.contains(&name.to_uppercase().as_str()) {
        String::new()
    } else {
        name
    }
}

/// File name for a verb's program: the first alias of the sanitized name, or
/// the verb index when nothing survives sanitizing.
fn verb_file_name(name: &str, index: usize) -> String {
    let sanitized = sanitize(name);
    let base = if sanitized.is_empty() {
        index.to_string()
    } else {
        sanitized
    };
    let first = base.split(' ').next().unwrap_or_default();
    format!("{first}.moo")
}

fn arg_spec_name(spec: u16) -> &'static str {
    match spec {
        VF_ASPEC_NONE => "none",
        VF_ASPEC_ANY => "any",
        VF_ASPEC_THIS => "this",
        _ => "reserved",
    }
}

fn prep_name(prep: i16) -> String {
    match prep {
        PREP_ANY => "any".to_string(),
        PREP_NONE => "none".to_string(),
        p => p.to_string(),
    }
}

/// A verbdef with its packed perms line unpacked the way `@display` shows
/// it: an "rwxd" permission string plus the dobj/prep/iobj argument specs.
fn verb_info(verb: &Verb) -> serde_json::Value {
    let mut perms = String::new();
    if verb.is_readable() {
        perms.push('r');
    }
    if verb.is_writable() {
        perms.push('w');
    }
    if verb.is_executable() {
        perms.push('x');
    }
    if verb.is_debug() {
        perms.push('d');
    }
    json!({
        "name": verb.name,
        "owner": verb.owner,
        "perms": perms,
        "dobj": arg_spec_name(verb.dobj_spec()),
        "prep": prep_name(verb.prep),
        "iobj": arg_spec_name(verb.iobj_spec()),
    })
}

fn flag_string(obj: &MooObject) -> String {
    let mut flags = String::new();
    for (flag, ch) in [
        (ObjFlag::User, 'u'),
        (ObjFlag::Programmer, 'p'),
        (ObjFlag::Wizard, 'w'),
        (ObjFlag::Read, 'r'),
        (ObjFlag::Write, 'W'),
        (ObjFlag::Fertile, 'f'),
    ] {
        if obj.has_flag(flag) {
            flags.push(ch);
        }
    }
    flags
}

/// The `$name` aliases implied by #0's object-valued properties. First
/// property naming an object wins.
fn corrified_names(db: &MooDatabase) -> HashMap<Objid, String> {
    let mut names = HashMap::new();
    if let Some(system) = db.objects.get(&0) {
        for prop in &system.properties {
            if let Var::Obj(o) = &prop.value {
                names
                    .entry(*o)
                    .or_insert_with(|| format!("${}", prop.name));
            }
        }
    }
    names
}

pub fn to_moo_files(db: &MooDatabase, path: &Path, corrify: bool) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    let names = if corrify {
        corrified_names(db)
    } else {
        HashMap::new()
    };
    let name_of = |id: Objid| names.get(&id).cloned().unwrap_or_else(|| id.0.to_string());

    for (&id, obj) in &db.objects {
        let dir = path.join(name_of(Objid(id)));
        fs::create_dir_all(&dir)?;

        // A single primary parent is the common case; multi-parent objects
        // only carry the list.
        let parent = (obj.parents.len() < 2).then(|| obj.parent().0);
        let info = json!({
            "name": obj.name,
            "flags": flag_string(obj),
            "parent": parent,
            "parents": obj.parents.iter().map(|&p| name_of(p)).collect::<Vec<_>>(),
            "owner": obj.owner,
            "location": obj.location,
            "verbs": obj.verbs.iter().map(verb_info).collect::<Vec<_>>(),
        });
        fs::write(dir.join("info.json"), serde_json::to_string_pretty(&info)?)?;
        fs::write(
            dir.join("props.json"),
            serde_json::to_string_pretty(&obj.properties)?,
        )?;

        for (index, verb) in obj.verbs.iter().enumerate() {
            let code = verb.code.as_deref().unwrap_or_default();
            fs::write(dir.join(verb_file_name(&verb.name, index)), code.join("\n"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mooflat_textdump::parse;
    use pretty_assertions::assert_eq;

    const CORE: &str = "\
** LambdaMOO Database, Format Version 4 **
2
1
0
0
#0
System Object

7
0
-1
-1
-1
-1
-1
-1
1
l*ook tidy
0
173
-1
1
root
1
1
1
0
5
#1
Root Class

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
#0:0
return 1;
.
0 clocks
0 queued tasks
0 suspended tasks
0 active connections
";

    #[test]
    fn sanitize_strips_and_rejects() {
        assert_eq!(sanitize("l*ook"), "look");
        assert_eq!(sanitize("a/b\\c"), "abc");
        assert_eq!(sanitize("CON"), "");
        assert_eq!(sanitize("con"), "");
        assert_eq!(verb_file_name("l*ook tidy", 0), "look.moo");
        assert_eq!(verb_file_name(":*", 3), "3.moo");
    }

    #[test]
    fn corrify_names_from_system_object() {
        let db = parse(CORE).unwrap().db;
        let names = corrified_names(&db);
        assert_eq!(names.get(&Objid(1)), Some(&"$root".to_string()));
    }

    #[test]
    fn verb_and_flag_bits_decode_into_info() {
        let db = parse(CORE).unwrap().db;
        let dir = tempfile::tempdir().unwrap();
        to_moo_files(&db, dir.path(), false).unwrap();

        let info: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("0/info.json")).unwrap())
                .unwrap();
        assert_eq!(info["flags"], "upw");
        let verb = &info["verbs"][0];
        assert_eq!(verb["name"], "l*ook tidy");
        assert_eq!(verb["perms"], "rxd");
        assert_eq!(verb["dobj"], "this");
        assert_eq!(verb["prep"], "none");
        assert_eq!(verb["iobj"], "this");
    }

    #[test]
    fn object_tree_layout() {
        let db = parse(CORE).unwrap().db;
        let dir = tempfile::tempdir().unwrap();
        to_moo_files(&db, dir.path(), true).unwrap();

        assert!(dir.path().join("0/info.json").is_file());
        assert!(dir.path().join("0/props.json").is_file());
        assert_eq!(
            fs::read_to_string(dir.path().join("0/look.moo")).unwrap(),
            "return 1;"
        );
        // #1 is named through #0's `root` property.
        assert!(dir.path().join("$root/info.json").is_file());

        let info: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("$root/info.json")).unwrap())
                .unwrap();
        assert_eq!(info["name"], "Root Class");
        assert_eq!(info["parent"], -1);
        assert_eq!(info["verbs"], json!([]));
    }
}
