use serde::{Deserialize, Serialize};

/// Reserved endpoint name denoting the system's external output port.
pub const SYSTEM_OUTPUT: &str = "SystemOutput";

/// Reserved endpoint name denoting the system's external input port.
pub const SYSTEM_INPUT: &str = "SystemInput";

/// One endpoint of a dependency: a named port of a resource, or a system
/// boundary port when `resource_name` is one of the reserved tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRef {
    pub resource_name: String,
    #[serde(rename = "carrierOrStateLabel", alias = "state")]
    pub carrier: String,
}

impl EndpointRef {
    pub fn new(resource_name: impl Into<String>, carrier: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            carrier: carrier.into(),
        }
    }

    pub fn is_system_output(&self) -> bool {
        self.resource_name == SYSTEM_OUTPUT
    }

    pub fn is_system_input(&self) -> bool {
        self.resource_name == SYSTEM_INPUT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Equality-style coupling: outputs equal a function of the inputs at
    /// every time step.
    Correlative,
    /// Mode-selectable coupling with auxiliary binary selectors.
    Restrictive,
}

/// A declared coupling between ports of two or more resources (or system
/// boundary ports). Endpoint list order is significant: it determines the
/// positional wiring of the coupling pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub relevant_inputs: Vec<EndpointRef>,
    pub relevant_outputs: Vec<EndpointRef>,
    #[serde(rename = "typeOfDependency")]
    pub kind: DependencyKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_original_field_names() {
        let json = r#"{
            "relevantInputs": [
                {"resourceName": "SystemOutput", "carrierOrStateLabel": "electricity"}
            ],
            "relevantOutputs": [
                {"resourceName": "chp_unit", "state": "electricity"}
            ],
            "typeOfDependency": "correlative"
        }"#;
        let dep: Dependency = serde_json::from_str(json).unwrap();
        assert_eq!(dep.kind, DependencyKind::Correlative);
        assert!(dep.relevant_inputs[0].is_system_output());
        assert!(!dep.relevant_inputs[0].is_system_input());
        assert_eq!(dep.relevant_outputs[0].carrier, "electricity");
    }

    #[test]
    fn restrictive_tag_round_trips() {
        let dep = Dependency {
            relevant_inputs: vec![EndpointRef::new("a", "heat")],
            relevant_outputs: vec![EndpointRef::new("SystemInput", "heat")],
            kind: DependencyKind::Restrictive,
        };
        let json = serde_json::to_string(&dep).unwrap();
        assert!(json.contains(r#""typeOfDependency":"restrictive""#));
        let back: Dependency = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dep);
    }
}
