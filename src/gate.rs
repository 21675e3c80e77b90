//! The capability gate: an externally supplied flag that allows restores.

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capability {
    /// Not resolved yet, or the last query failed
    #[default]
    Unknown,
    Active,
    Inactive,
}

/// Tri-state gate, closed until the host reports an active subscription.
#[derive(Debug, Clone, Default)]
pub struct CapabilityGate {
    state: Capability,
}

impl CapabilityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Capability {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == Capability::Active
    }

    /// Apply a query result; `None` means the query failed.
    ///
    /// Returns `true` when the gate just opened.
    pub fn resolve(&mut self, active: Option<bool>) -> bool {
        let next = match active {
            Some(true) => Capability::Active,
            Some(false) => Capability::Inactive,
            None => Capability::Unknown,
        };
        let opened = next == Capability::Active && self.state != Capability::Active;
        if next != self.state {
            debug!("capability {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed_and_opens_once() {
        let mut g = CapabilityGate::new();
        assert_eq!(g.state(), Capability::Unknown);
        assert!(!g.is_open());
        assert!(g.resolve(Some(true)));
        assert!(!g.resolve(Some(true)));
        assert!(g.is_open());
    }

    #[test]
    fn failure_resets_to_unknown() {
        let mut g = CapabilityGate::new();
        g.resolve(Some(true));
        assert!(!g.resolve(None));
        assert_eq!(g.state(), Capability::Unknown);
        assert!(!g.resolve(Some(false)));
        assert!(g.resolve(Some(true)));
    }
}
