//! Common traits for FMI schema

use crate::Error;

/// Top-level `fmiModelDescription` contract, implemented per FMI major version.
pub trait FmiModelDescription: Sized {
    fn model_name(&self) -> &str;
    fn version_string(&self) -> &str;
    fn serialize(&self) -> Result<String, Error>;
    fn deserialize(xml: &str) -> Result<Self, Error>;
}

/// Capability flags common to `ModelExchange` and `CoSimulation` interface elements.
pub trait FmiInterfaceType {
    fn model_identifier(&self) -> &str;
    fn needs_execution_tool(&self) -> Option<bool>;
    fn can_be_instantiated_only_once_per_process(&self) -> Option<bool>;
    fn can_get_and_set_fmu_state(&self) -> Option<bool>;
    fn can_serialize_fmu_state(&self) -> Option<bool>;
    fn provides_directional_derivatives(&self) -> Option<bool>;
    fn provides_adjoint_derivatives(&self) -> Option<bool>;
    fn provides_per_element_dependencies(&self) -> Option<bool>;
}

pub trait DefaultExperiment {
    fn start_time(&self) -> Option<f64>;
    fn stop_time(&self) -> Option<f64>;
    fn tolerance(&self) -> Option<f64>;
    fn step_size(&self) -> Option<f64>;
}
