//! 稳定标识符：与显示名称解耦，重命名不会破坏引用关系。
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

define_id!(PlaceId, "p");
define_id!(TransitionId, "t");
define_id!(InitializerId, "i");
define_id!(ArcId, "a");

/// Which kind of node an identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Place,
    Transition,
    Initializer,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Place => "place",
            NodeKind::Transition => "transition",
            NodeKind::Initializer => "initializer",
        })
    }
}

/// Tagged reference to any node of the net. Transits, arcs and the analyzer
/// dispatch on the tag instead of inspecting concrete node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Place(PlaceId),
    Transition(TransitionId),
    Initializer(InitializerId),
}

impl NodeRef {
    pub fn kind(self) -> NodeKind {
        match self {
            NodeRef::Place(_) => NodeKind::Place,
            NodeRef::Transition(_) => NodeKind::Transition,
            NodeRef::Initializer(_) => NodeKind::Initializer,
        }
    }

    pub fn as_place(self) -> Option<PlaceId> {
        match self {
            NodeRef::Place(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_transition(self) -> Option<TransitionId> {
        match self {
            NodeRef::Transition(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Place(id) => write!(f, "{id}"),
            NodeRef::Transition(id) => write!(f, "{id}"),
            NodeRef::Initializer(id) => write!(f, "{id}"),
        }
    }
}

impl From<PlaceId> for NodeRef {
    fn from(id: PlaceId) -> Self {
        NodeRef::Place(id)
    }
}

impl From<TransitionId> for NodeRef {
    fn from(id: TransitionId) -> Self {
        NodeRef::Transition(id)
    }
}

impl From<InitializerId> for NodeRef {
    fn from(id: InitializerId) -> Self {
        NodeRef::Initializer(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_render_with_kind_prefix() {
        assert_eq!(format!("{:?}", PlaceId::new(3)), "p#3");
        assert_eq!(TransitionId::new(7).to_string(), "t#7");
        assert_eq!(NodeRef::from(InitializerId::new(1)).kind(), NodeKind::Initializer);
    }
}
