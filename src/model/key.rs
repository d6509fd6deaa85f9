use std::fmt;

/// Pseudo-resource name under which system boundary ports are keyed.
pub const SYSTEM_RESOURCE: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum QuantityKind {
    Power,
    State,
    Binary,
    #[strum(serialize = "SOC")]
    Soc,
    Segment,
}

/// Canonical identity of one decision-variable array.
///
/// `sub_index == None` means "the single/only port" and renders as `-1`,
/// so the canonical form of a key is e.g. `chp_unit-Output--1-Power` or
/// `System-Input-2-Power`. Keys are `Ord` so registry iteration (and the
/// column order of exported tables) is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableKey {
    pub resource: String,
    pub direction: Direction,
    pub sub_index: Option<usize>,
    pub quantity: QuantityKind,
}

impl VariableKey {
    /// Key for a resource's single port of the given kind.
    pub fn single(
        resource: impl Into<String>,
        direction: Direction,
        quantity: QuantityKind,
    ) -> Self {
        Self {
            resource: resource.into(),
            direction,
            sub_index: None,
            quantity,
        }
    }

    /// Key for one of a resource's indexed ports.
    pub fn indexed(
        resource: impl Into<String>,
        direction: Direction,
        sub_index: usize,
        quantity: QuantityKind,
    ) -> Self {
        Self {
            resource: resource.into(),
            direction,
            sub_index: Some(sub_index),
            quantity,
        }
    }

    /// Key for a system boundary Power port.
    pub fn system(direction: Direction, sub_index: Option<usize>) -> Self {
        Self {
            resource: SYSTEM_RESOURCE.to_string(),
            direction,
            sub_index,
            quantity: QuantityKind::Power,
        }
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sub_index = self.sub_index.map_or(-1, |index| index as i64);
        write!(
            f,
            "{}-{}-{}-{}",
            self.resource, self.direction, sub_index, self.quantity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_rendering() {
        assert_eq!(
            VariableKey::single("A", Direction::Output, QuantityKind::Power).to_string(),
            "A-Output--1-Power"
        );
        assert_eq!(
            VariableKey::indexed("A", Direction::Input, 0, QuantityKind::Power).to_string(),
            "A-Input-0-Power"
        );
        assert_eq!(
            VariableKey::system(Direction::Output, Some(1)).to_string(),
            "System-Output-1-Power"
        );
        assert_eq!(
            VariableKey::single("buffer", Direction::Output, QuantityKind::Soc).to_string(),
            "buffer-Output--1-SOC"
        );
    }

    #[test]
    fn single_port_sorts_before_indexed_ports() {
        let single = VariableKey::single("A", Direction::Input, QuantityKind::Power);
        let indexed = VariableKey::indexed("A", Direction::Input, 0, QuantityKind::Power);
        assert!(single < indexed);
    }
}
