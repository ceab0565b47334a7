//! Learning table types.

use std::collections::BTreeMap;

/// Number of radar rays feeding the state.
pub const N_SENSORS: usize = 5;

/// Discretized observation: one bucket per radar ray followed by a speed bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct State([u8; N_SENSORS + 1]);

impl State {
    pub fn new(buckets: [u8; N_SENSORS + 1]) -> Self {
        Self(buckets)
    }
}

/// Driving directive, in catalog order.
///
/// The declaration order is the action index and the argmax tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Coast,
    Forward,
    SoftLeft,
    SoftRight,
    HardLeft,
    HardRight,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Coast,
        Action::Forward,
        Action::SoftLeft,
        Action::SoftRight,
        Action::HardLeft,
        Action::HardRight,
    ];

    /// `(steering, throttle)` pair applied to the vehicle.
    pub fn controls(self) -> (f64, f64) {
        match self {
            Action::Coast => (0.0, 0.0),
            Action::Forward => (0.0, 1.0),
            Action::SoftLeft => (-0.5, 1.0),
            Action::SoftRight => (0.5, 1.0),
            Action::HardLeft => (-1.0, 1.0),
            Action::HardRight => (1.0, 1.0),
        }
    }
}

/// Sparse state-action value table.
///
/// Absent entries read as `0.0` and are only materialized on write. Entries are
/// kept in key order so that seeded mutation visits them reproducibly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyTable {
    values: BTreeMap<(State, Action), f64>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, state: State, action: Action) -> f64 {
        self.values.get(&(state, action)).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, state: State, action: Action, value: f64) {
        self.values.insert((state, action), value);
    }

    /// Highest-valued action for `state`, lowest index on ties.
    pub fn best_action(&self, state: State) -> Action {
        let mut best = Action::ALL[0];
        let mut best_value = self.get(state, best);
        for &action in &Action::ALL[1..] {
            let value = self.get(state, action);
            if value > best_value {
                best = action;
                best_value = value;
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Every stored value, in key order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.values.values_mut()
    }
}

#[cfg(test)]
impl State {
    pub fn buckets(&self) -> &[u8; N_SENSORS + 1] {
        &self.0
    }
}

#[cfg(test)]
impl Action {
    pub fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
impl PolicyTable {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
