use serde::{Deserialize, Serialize};

/// Behavioral description of one modeled energy resource (generator,
/// storage unit or conversion unit). Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceParameters {
    pub name: String,
    pub is_storage: bool,
    pub is_secondary_resource: bool,
    /// Carrier label per input port, ordered and index-addressable.
    pub energy_carrier_inputs: Vec<String>,
    /// Carrier label of the single output port.
    pub energy_carrier_output: String,
    pub min_power_input: f64,
    pub max_power_input: f64,
    pub min_power_output: f64,
    pub max_power_output: f64,
    /// Piecewise-linear input/output regression segments. One segment is a
    /// plain linear relationship; several require segment selection.
    pub efficiency_segments: Vec<PiecewiseSegment>,
    /// Maximum change of port power per hour.
    pub ramp_per_hour: Option<f64>,
    /// Discrete operating states; empty for resources without state logic.
    pub system_states: Vec<OperatingState>,
    pub storage: Option<StorageParameters>,
}

impl Default for ResourceParameters {
    fn default() -> Self {
        Self {
            name: String::new(),
            is_storage: false,
            is_secondary_resource: false,
            energy_carrier_inputs: Vec::new(),
            energy_carrier_output: String::new(),
            min_power_input: 0.0,
            max_power_input: f64::INFINITY,
            min_power_output: 0.0,
            max_power_output: f64::INFINITY,
            efficiency_segments: Vec::new(),
            ramp_per_hour: None,
            system_states: Vec::new(),
            storage: None,
        }
    }
}

impl ResourceParameters {
    /// Index of the input port carrying the given label.
    pub fn input_carrier_index(&self, carrier: &str) -> Option<usize> {
        self.energy_carrier_inputs.iter().position(|c| c == carrier)
    }

    /// Whether this resource is modeled through the storage/energy-balance
    /// pattern (which registers one combined input port).
    pub fn uses_storage_pattern(&self) -> bool {
        self.is_storage || self.is_secondary_resource
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiecewiseSegment {
    pub slope: f64,
    pub intercept: f64,
    pub min_input: f64,
    pub max_input: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatingState {
    pub name: String,
    pub min_power: f64,
    pub max_power: f64,
    /// Minimum number of consecutive time steps to remain in this state
    /// after entering it.
    #[serde(default)]
    pub holding_steps: usize,
    /// Indices of states reachable from this one; `None` allows any
    /// transition.
    #[serde(default)]
    pub allowed_successors: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageParameters {
    pub capacity: f64,
    pub soc_min: f64,
    pub soc_max: f64,
    pub initial_soc: f64,
    pub charge_efficiency: f64,
    pub discharge_efficiency: f64,
}

impl Default for StorageParameters {
    fn default() -> Self {
        Self {
            capacity: 1.0,
            soc_min: 0.0,
            soc_max: 1.0,
            initial_soc: 0.5,
            charge_efficiency: 1.0,
            discharge_efficiency: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_json_fills_defaults() {
        let json = r#"{"name": "gasfired_generator", "energyCarrierInputs": ["gas"]}"#;
        let res: ResourceParameters = serde_json::from_str(json).unwrap();
        assert_eq!(res.name, "gasfired_generator");
        assert!(!res.is_storage);
        assert_eq!(res.max_power_input, f64::INFINITY);
        assert!(res.system_states.is_empty());
    }

    #[test]
    fn carrier_index_by_label() {
        let res = ResourceParameters {
            energy_carrier_inputs: vec!["gas".into(), "electricity".into()],
            ..Default::default()
        };
        assert_eq!(res.input_carrier_index("electricity"), Some(1));
        assert_eq!(res.input_carrier_index("cold_water"), None);
    }

    #[test]
    fn secondary_resource_uses_storage_pattern() {
        let res = ResourceParameters {
            is_secondary_resource: true,
            ..Default::default()
        };
        assert!(res.uses_storage_pattern());
    }
}
