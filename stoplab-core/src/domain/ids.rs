use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an action submitted to the gateway.
///
/// Fills carry the id of the action they belong to; ids increase
/// monotonically within one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Monotonic id generator, owned by the engine state.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    next: u64,
}

impl IdGen {
    pub fn next_action_id(&mut self) -> ActionId {
        self.next += 1;
        ActionId(self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let mut gen = IdGen::default();
        let a = gen.next_action_id();
        let b = gen.next_action_id();
        assert!(b > a);
        assert_eq!(a.to_string(), "A1");
    }
}
