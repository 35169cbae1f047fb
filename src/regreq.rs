//! Register request model.
//!
//! A [`RegisterRequest`] is an immutable constraint attached to one input
//! position or one result of a backend node. The allocator (out of scope
//! here) consumes these; this module only models the descriptor itself.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ReqFlags: u16 {
        const NORMAL            = 0b0000_0001;
        const LIMITED           = 0b0000_0010;
        const SHOULD_BE_SAME    = 0b0000_0100;
        const MUST_BE_DIFFERENT = 0b0000_1000;
        const ALIGNED           = 0b0001_0000;
        const IGNORE            = 0b0010_0000;
        const PRODUCES_SP       = 0b0100_0000;
    }
}

/// Opaque handle to a register class (general purpose, floating point, ...).
///
/// Equality is by identity: two classes are the same iff they were produced
/// by the same call to [`RegisterClass::new`], mirroring the original's bare
/// pointer comparison on `arch_register_class_t *`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegisterClass(pub(crate) u32);

static NEXT_CLASS_ID: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

impl RegisterClass {
    pub fn new() -> RegisterClass {
        use std::sync::atomic::Ordering;
        RegisterClass(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RegisterClass {
    fn default() -> Self {
        RegisterClass::new()
    }
}

/// A bitset of allowed physical registers within a [`RegisterClass`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RegisterSet(pub u64);

impl RegisterSet {
    pub fn all() -> RegisterSet {
        RegisterSet(u64::MAX)
    }

    pub fn single(reg: u32) -> RegisterSet {
        RegisterSet(1u64 << reg)
    }

    pub fn contains(&self, reg: u32) -> bool {
        self.0 & (1u64 << reg) != 0
    }
}

/// Bitmask over a node's own input positions, used by `other_same` and
/// `other_different`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InputMask(pub u32);

impl InputMask {
    pub fn bit(pos: usize) -> InputMask {
        InputMask(1u32 << pos)
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.0 & (1u32 << pos) != 0
    }

    pub fn union(self, other: InputMask) -> InputMask {
        InputMask(self.0 | other.0)
    }
}

/// Constraint attached to one input position or one result.
#[derive(Clone, Debug)]
pub struct RegisterRequest {
    pub class: RegisterClass,
    /// `None` means "any register in `class`".
    pub allowed: Option<RegisterSet>,
    pub flags: ReqFlags,
    pub other_same: InputMask,
    pub other_different: InputMask,
    /// Number of consecutive registers this value occupies.
    pub width: u8,
}

impl RegisterRequest {
    pub fn normal(class: RegisterClass) -> RegisterRequest {
        RegisterRequest {
            class,
            allowed: None,
            flags: ReqFlags::NORMAL,
            other_same: InputMask::default(),
            other_different: InputMask::default(),
            width: 1,
        }
    }

    pub fn limited(class: RegisterClass, allowed: RegisterSet) -> RegisterRequest {
        RegisterRequest {
            class,
            allowed: Some(allowed),
            flags: ReqFlags::LIMITED,
            other_same: InputMask::default(),
            other_different: InputMask::default(),
            width: 1,
        }
    }

    pub fn should_be_same(class: RegisterClass, other: InputMask) -> RegisterRequest {
        RegisterRequest {
            class,
            allowed: None,
            flags: ReqFlags::SHOULD_BE_SAME,
            other_same: other,
            other_different: InputMask::default(),
            width: 1,
        }
    }

    pub fn produces_sp(class: RegisterClass) -> RegisterRequest {
        RegisterRequest {
            class,
            allowed: None,
            flags: ReqFlags::PRODUCES_SP | ReqFlags::NORMAL,
            other_same: InputMask::default(),
            other_different: InputMask::default(),
            width: 1,
        }
    }

    pub fn is_ignore(&self) -> bool {
        self.flags.contains(ReqFlags::IGNORE)
    }

    pub fn admits(&self, reg: u32) -> bool {
        match &self.allowed {
            Some(set) => set.contains(reg),
            None => true,
        }
    }
}

/// Register requests attached to a node: one per input position plus one per
/// result. A node with no backend constraints (most IR nodes) has empty
/// vectors on both sides.
#[derive(Clone, Debug, Default)]
pub struct NodeRegReqs {
    pub inputs: Vec<RegisterRequest>,
    pub results: Vec<RegisterRequest>,
}

impl NodeRegReqs {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.results.is_empty()
    }
}
