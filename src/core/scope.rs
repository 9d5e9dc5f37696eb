//! Scope identity: the isolation boundary of delivery.

use std::fmt;

use crate::lifecycle::{LifecycleOwner, OwnerId};

/// Either the process-wide scope or one owner instance.
///
/// Owner scopes compare by identity ([`OwnerId`]), never by owner data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Owner(OwnerId),
}

impl Scope {
    /// Scope of an owner.
    pub fn of(owner: &dyn LifecycleOwner) -> Self {
        Scope::Owner(owner.lifecycle().id())
    }

    pub fn is_global(self) -> bool {
        self == Scope::Global
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Owner(id) => write!(f, "{id}"),
        }
    }
}

/// Where a post or a sticky lookup is aimed.
#[derive(Clone, Copy)]
pub enum Target<'a> {
    /// The process-wide scope.
    Global,
    /// The scope of one owner.
    Owner(&'a dyn LifecycleOwner),
}

impl<'a> Target<'a> {
    pub fn owner(owner: &'a dyn LifecycleOwner) -> Self {
        Target::Owner(owner)
    }

    /// Scope this target resolves to.
    pub fn scope(&self) -> Scope {
        match self {
            Target::Global => Scope::Global,
            Target::Owner(owner) => Scope::of(*owner),
        }
    }
}

impl fmt::Debug for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", self.scope())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;

    #[test]
    fn test_owner_scopes_are_distinct() {
        let a = Lifecycle::new();
        let b = Lifecycle::new();
        assert_ne!(Scope::of(&a), Scope::of(&b));
        assert_eq!(Target::owner(&a).scope(), Scope::of(&a));
        assert!(Target::Global.scope().is_global());
        assert_eq!(Scope::Global.to_string(), "global");
        assert!(Scope::of(&a).to_string().starts_with("owner#"));
    }
}
