//! Opaque executor identifiers.

use std::fmt;
use std::hash::Hash;

use strum::{Display, IntoStaticStr, VariantArray};

/// Kind of reference-counted executor object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, VariantArray)]
#[strum(serialize_all = "snake_case")]
pub enum ObjectKind {
    Context,
    CommandQueue,
    Program,
    Kernel,
    Mem,
    Event,
}

/// Raw identifier of a reference-counted executor object.
///
/// Implemented only by the identifier newtypes of this module. The null value is never a valid
/// object.
pub trait RawId: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Object kind named by this identifier type.
    const KIND: ObjectKind;

    /// The null identifier.
    const NULL: Self;

    fn from_raw(raw: usize) -> Self;

    fn as_raw(self) -> usize;

    fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// Kind-tagged form used by the generic retain/release/info calls.
    fn object(self) -> ObjectRef {
        ObjectRef { kind: Self::KIND, raw: self.as_raw() }
    }
}

macro_rules! raw_id {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(pub usize);

        impl RawId for $name {
            const KIND: ObjectKind = ObjectKind::$kind;
            const NULL: Self = Self(0);

            fn from_raw(raw: usize) -> Self {
                Self(raw)
            }

            fn as_raw(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", ObjectKind::$kind, self.0)
            }
        }
    };
}

raw_id!(
    /// Context identifier (`cl_context`).
    ContextId => Context
);
raw_id!(
    /// Command queue identifier (`cl_command_queue`).
    QueueId => CommandQueue
);
raw_id!(
    /// Program identifier (`cl_program`).
    ProgramId => Program
);
raw_id!(
    /// Kernel identifier (`cl_kernel`).
    KernelId => Kernel
);
raw_id!(
    /// Memory object identifier (`cl_mem`).
    MemId => Mem
);
raw_id!(
    /// Event identifier (`cl_event`).
    EventId => Event
);

/// Device identifier. Root devices are not reference counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Kind-tagged identifier of any reference-counted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub raw: usize,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.raw)
    }
}
