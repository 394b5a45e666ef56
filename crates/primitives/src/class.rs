use serde::{Deserialize, Serialize};

use crate::block::BlockNumber;

/// A contract class definition, treated as an opaque encoded blob by the state engine: it is
/// stored and retrieved verbatim, never parsed, compiled or executed (that belongs to the
/// execution layer, out of scope here).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Class {
    /// Cairo 0: a raw program + ABI blob, declared via `DeclaredV0Classes` and never inserted
    /// into the classes trie.
    Cairo0 { program_and_abi: Vec<u8> },
    /// Cairo 1: a raw Sierra program + entry-point blob, declared via `DeclaredV1Classes` and
    /// contributing a leaf to the classes trie via its `CompiledClassHash`.
    Cairo1 { sierra_program: Vec<u8>, entry_points: Vec<u8> },
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Class::Cairo0 { program_and_abi } => {
                f.debug_struct("Class::Cairo0").field("bytes", &program_and_abi.len()).finish()
            }
            Class::Cairo1 { sierra_program, entry_points } => f
                .debug_struct("Class::Cairo1")
                .field("sierra_bytes", &sierra_program.len())
                .field("entry_point_bytes", &entry_points.len())
                .finish(),
        }
    }
}

/// A class as recorded in the class store: immutable once written, first-writer-wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredClass {
    pub declared_at: BlockNumber,
    pub class: Class,
}
