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

//! The version dialect table. Every format version the codec understands has a
//! `DbVersion` entry; everything about how the surrounding code branches on
//! versions is derived from the `Dialect` capability record, so supporting a
//! future version means adding an entry here, not scattering comparisons.

use crate::CodecError;
use serde::Serialize;
use strum::{Display, FromRepr};

pub const VERSION_PREFIX: &str = "** LambdaMOO Database, Format Version ";
pub const VERSION_SUFFIX: &str = " **";

/// The known database format versions, with their on-disk numbers. 0 through 4
/// are the LambdaMOO line; 5 onward is the Stunt/ToastStunt line.
#[repr(u16)]
#[derive(
    Debug, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Display, FromRepr, Serialize,
)]
pub enum DbVersion {
    DbvPrehistory = 0, // Before format versions
    DbvExceptions = 1, // Addition of the `try', `except', `finally', and `endtry' keywords.
    DbvBreakCont = 2,  // Addition of the `break' and `continue' keywords.
    DbvFloat = 3, // Addition of `FLOAT' and `INT' variables, along with version numbers on each frame of a suspended task.
    DbvBfbugFixed = 4, // Bug in built-in function overrides fixed by making it use tail-calling.
    DbvNextGen = 5, // Introduced the next-generation database format which fixes the data locality problems in the v4 format.
    DbvTaskLocal = 6, // Addition of task local value.
    DbvMap = 7,     // Addition of `MAP' variables
    DbvFileIo = 8,  // Includes addition of the 'E_FILE' keyword.
    DbvExec = 9,    // Includes addition of the 'E_EXEC' keyword.
    DbvInterrupt = 10, // Includes addition of the 'E_INTRPT' keyword.
    DbvThis = 11,   // Varification of `this'.
    DbvIter = 12,   // Addition of map iterator
    DbvAnon = 13,   // Addition of anonymous objects
    DbvWaif = 14,   // Addition of waifs
    DbvLastMove = 15, // Addition of the 'last_move' built-in property
    DbvThreaded = 16, // Store threading information
    DbvBool = 17,   // Boolean type
}

/// How the top-level sections of the dump are laid out.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SectionLayout {
    /// v0-v4: object table up front, linked-list contents/children fields,
    /// task queues at the end.
    Classic,
    /// v5+: players and task queues up front, object records carry explicit
    /// contents/parents/children values.
    NextGen,
}

/// Everything version-dependent about parsing and writing a dump, resolved
/// once from the version line.
#[derive(Debug, Clone, Copy)]
pub struct Dialect {
    pub version: DbVersion,
    pub layout: SectionLayout,
    /// Suspended-task frames carry a "language version N" line.
    pub has_frame_lang_versions: bool,
    /// Each suspended VM is preceded by a task-local value.
    pub has_task_local: bool,
    pub has_map: bool,
    /// An interrupted-tasks section sits between suspended tasks and
    /// connections.
    pub has_interrupted_tasks: bool,
    /// Activations carry a varified `this` value.
    pub has_this: bool,
    /// Activations carry a varified verb location, and the object section is
    /// followed by anonymous-object chunks.
    pub has_anon: bool,
    pub has_waif: bool,
    /// Object records carry a `last_move` value.
    pub has_last_move: bool,
    /// Activations carry a threading-mode integer.
    pub has_threaded: bool,
    pub has_bool: bool,
}

impl Dialect {
    /// The dialect for a version we already know to be valid.
    pub fn of(version: DbVersion) -> Dialect {
        let v = version as u16;
        Dialect {
            version,
            layout: if v >= DbVersion::DbvNextGen as u16 {
                SectionLayout::NextGen
            } else {
                SectionLayout::Classic
            },
            has_frame_lang_versions: v >= DbVersion::DbvFloat as u16,
            has_task_local: v >= DbVersion::DbvTaskLocal as u16,
            has_map: v >= DbVersion::DbvMap as u16,
            has_interrupted_tasks: v >= DbVersion::DbvInterrupt as u16,
            has_this: v >= DbVersion::DbvThis as u16,
            has_anon: v >= DbVersion::DbvAnon as u16,
            has_waif: v >= DbVersion::DbvWaif as u16,
            has_last_move: v >= DbVersion::DbvLastMove as u16,
            has_threaded: v >= DbVersion::DbvThreaded as u16,
            has_bool: v >= DbVersion::DbvBool as u16,
        }
    }

    /// Resolve a raw version number from a dump's first line.
    pub fn for_version(version: u16) -> Result<Dialect, CodecError> {
        DbVersion::from_repr(version)
            .map(Dialect::of)
            .ok_or(CodecError::UnsupportedVersion(version))
    }
}

/// Extract the version number from a dump's first line, if it has the
/// expected shape.
pub fn parse_version_line(line: &str) -> Option<u16> {
    line.trim()
        .strip_prefix(VERSION_PREFIX)?
        .strip_suffix(VERSION_SUFFIX)?
        .parse()
        .ok()
}

pub fn version_line(version: DbVersion) -> String {
    format!("{VERSION_PREFIX}{}{VERSION_SUFFIX}", version as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn version_line_round_trip() {
        for v in 0..=17 {
            let version = DbVersion::from_repr(v).unwrap();
            assert_eq!(parse_version_line(&version_line(version)), Some(v));
        }
        assert_eq!(
            parse_version_line("** LambdaMOO Database, Format Version 4 **"),
            Some(4)
        );
        assert_eq!(parse_version_line("** Some Other Database **"), None);
        assert_eq!(parse_version_line("4"), None);
    }

    #[test]
    fn unknown_version_is_rejected() {
        assert!(matches!(
            Dialect::for_version(18),
            Err(CodecError::UnsupportedVersion(18))
        ));
        assert!(Dialect::for_version(17).is_ok());
    }

    #[test]
    fn capability_thresholds() {
        let v4 = Dialect::for_version(4).unwrap();
        assert_eq!(v4.layout, SectionLayout::Classic);
        assert!(v4.has_frame_lang_versions);
        assert!(!v4.has_map);
        assert!(!v4.has_interrupted_tasks);

        let v2 = Dialect::for_version(2).unwrap();
        assert!(!v2.has_frame_lang_versions);

        let v7 = Dialect::for_version(7).unwrap();
        assert_eq!(v7.layout, SectionLayout::NextGen);
        assert!(v7.has_map);
        assert!(v7.has_task_local);
        assert!(!v7.has_this);

        let v17 = Dialect::for_version(17).unwrap();
        assert!(v17.has_bool && v17.has_waif && v17.has_last_move && v17.has_threaded);
    }
}
