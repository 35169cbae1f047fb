//! Semantic type of IR values.
//!
//! Modes are interned process-wide: two `Mode` handles compare equal iff they
//! describe the same [`ModeKind`], and the comparison is a pointer compare,
//! not a structural one. The table is filled in lazily and never torn down,
//! matching the "initialized-once, alive for the process" tables the rest of
//! the core assumes (see `DESIGN.md`, "Global tables").

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};

/// The semantic kind of a [`Mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKind {
    /// Fixed-width integer, e.g. `i32` or `u8`.
    Int { bits: u16, signed: bool },
    /// IEEE floating point.
    Float { bits: u16 },
    /// A pointer-sized reference.
    Reference,
    /// The memory token threaded through side-effecting nodes.
    Memory,
    /// Multiple results, addressed through `Proj` users.
    Tuple,
    /// A control-flow region (a `Block` node).
    Block,
    /// A control-flow token (`X` in the source material).
    Control,
}

struct ModeTable {
    interned: Mutex<HashMap<ModeKind, &'static ModeKind>>,
}

fn table() -> &'static ModeTable {
    static TABLE: OnceLock<ModeTable> = OnceLock::new();
    TABLE.get_or_init(|| ModeTable {
        interned: Mutex::new(HashMap::new()),
    })
}

/// An interned mode handle. Cheap to copy and compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode(&'static ModeKind);

impl Mode {
    /// Interns `kind`, returning the process-wide handle for it.
    pub fn intern(kind: ModeKind) -> Mode {
        let t = table();
        let mut map = t.interned.lock().unwrap();
        if let Some(existing) = map.get(&kind) {
            return Mode(existing);
        }
        let leaked: &'static ModeKind = Box::leak(Box::new(kind));
        map.insert(kind, leaked);
        Mode(leaked)
    }

    pub fn kind(self) -> ModeKind {
        *self.0
    }

    pub fn is_tuple(self) -> bool {
        matches!(self.0, ModeKind::Tuple)
    }

    pub fn is_memory(self) -> bool {
        matches!(self.0, ModeKind::Memory)
    }

    pub fn is_block(self) -> bool {
        matches!(self.0, ModeKind::Block)
    }

    pub fn is_control(self) -> bool {
        matches!(self.0, ModeKind::Control)
    }

    pub fn is_data(self) -> bool {
        matches!(
            self.0,
            ModeKind::Int { .. } | ModeKind::Float { .. } | ModeKind::Reference
        )
    }

    pub fn int(bits: u16, signed: bool) -> Mode {
        Mode::intern(ModeKind::Int { bits, signed })
    }

    pub fn float(bits: u16) -> Mode {
        Mode::intern(ModeKind::Float { bits })
    }

    pub fn reference() -> Mode {
        Mode::intern(ModeKind::Reference)
    }

    pub fn memory() -> Mode {
        Mode::intern(ModeKind::Memory)
    }

    pub fn tuple() -> Mode {
        Mode::intern(ModeKind::Tuple)
    }

    pub fn block() -> Mode {
        Mode::intern(ModeKind::Block)
    }

    pub fn control() -> Mode {
        Mode::intern(ModeKind::Control)
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mode({:?})", self.0)
    }
}
