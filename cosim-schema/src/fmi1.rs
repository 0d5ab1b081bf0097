//! FMI 1.0 schema definitions (Co-Simulation slave description only).
//!
//! FMI 1.0 has no `ModelStructure`/`InitialUnknowns` element: a component's initial-dependency
//! structure is never declared in the XML, only introduced in FMI 2.0. Callers should treat every
//! FMI 1.0 instance as having no declared structure.

use std::{fmt::Display, str::FromStr};

use crate::traits::FmiModelDescription;

#[derive(Default, Debug, hard_xml::XmlRead, hard_xml::XmlWrite)]
#[xml(
    tag = "fmiModelDescription",
    strict(unknown_attribute, unknown_element)
)]
pub struct Fmi1ModelDescription {
    #[xml(attr = "fmiVersion")]
    pub fmi_version: String,

    #[xml(attr = "modelName")]
    pub model_name: String,

    /// Short class name according to C-syntax, used to build the shared library file name.
    #[xml(attr = "modelIdentifier")]
    pub model_identifier: String,

    #[xml(attr = "guid")]
    pub guid: String,

    #[xml(attr = "description")]
    pub description: Option<String>,

    #[xml(attr = "generationTool")]
    pub generation_tool: Option<String>,

    #[xml(attr = "variableNamingConvention")]
    pub variable_naming_convention: Option<String>,

    #[xml(attr = "numberOfContinuousStates")]
    pub number_of_continuous_states: Option<u32>,

    #[xml(attr = "numberOfEventIndicators")]
    pub number_of_event_indicators: Option<u32>,

    #[xml(child = "ModelVariables", default)]
    pub model_variables: ModelVariables,
}

impl Fmi1ModelDescription {
    pub fn num_variables(&self) -> usize {
        self.model_variables.variables.len()
    }

    pub fn get_model_variables(&self) -> impl Iterator<Item = &ScalarVariable> {
        self.model_variables.variables.iter()
    }
}

impl FmiModelDescription for Fmi1ModelDescription {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn version_string(&self) -> &str {
        &self.fmi_version
    }

    fn deserialize(xml: &str) -> Result<Self, crate::Error> {
        hard_xml::XmlRead::from_str(xml).map_err(|e| crate::Error::XmlParse(e.to_string()))
    }

    fn serialize(&self) -> Result<String, crate::Error> {
        hard_xml::XmlWrite::to_string(self).map_err(|e| crate::Error::XmlParse(e.to_string()))
    }
}

#[derive(Default, Debug, hard_xml::XmlRead, hard_xml::XmlWrite)]
#[xml(tag = "ModelVariables", strict(unknown_attribute, unknown_element))]
pub struct ModelVariables {
    #[xml(child = "ScalarVariable")]
    pub variables: Vec<ScalarVariable>,
}

/// Causality of a ScalarVariable, per the FMI 1.0 schema (distinct wording from FMI 2.0: no
/// `calculatedParameter`/`parameter` split, and `internal` replaces `local`).
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub enum Causality {
    Input,
    Output,
    #[default]
    Internal,
    None,
}

impl FromStr for Causality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(Causality::Input),
            "output" => Ok(Causality::Output),
            "internal" => Ok(Causality::Internal),
            "none" => Ok(Causality::None),
            _ => Err(format!("Invalid Causality: {}", s)),
        }
    }
}

impl Display for Causality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Causality::Input => "input",
            Causality::Output => "output",
            Causality::Internal => "internal",
            Causality::None => "none",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub enum Variability {
    Constant,
    Parameter,
    Discrete,
    #[default]
    Continuous,
}

impl FromStr for Variability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constant" => Ok(Variability::Constant),
            "parameter" => Ok(Variability::Parameter),
            "discrete" => Ok(Variability::Discrete),
            "continuous" => Ok(Variability::Continuous),
            _ => Err(format!("Invalid Variability: {}", s)),
        }
    }
}

impl Display for Variability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Variability::Constant => "constant",
            Variability::Parameter => "parameter",
            Variability::Discrete => "discrete",
            Variability::Continuous => "continuous",
        };
        write!(f, "{}", s)
    }
}

/// Whether a variable is a plain value, an alias of another variable's value, or its negation.
/// Negated aliases invert sign on both set and get — an FMI 1.0-only concept, dropped in FMI 2.0.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub enum Alias {
    #[default]
    NoAlias,
    Alias,
    NegatedAlias,
}

impl FromStr for Alias {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noAlias" => Ok(Alias::NoAlias),
            "alias" => Ok(Alias::Alias),
            "negatedAlias" => Ok(Alias::NegatedAlias),
            _ => Err(format!("Invalid Alias: {}", s)),
        }
    }
}

impl Display for Alias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Alias::NoAlias => "noAlias",
            Alias::Alias => "alias",
            Alias::NegatedAlias => "negatedAlias",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Default, PartialEq, Debug, hard_xml::XmlRead, hard_xml::XmlWrite)]
#[xml(tag = "Real")]
pub struct Real {
    #[xml(attr = "declaredType")]
    pub declared_type: Option<String>,
    #[xml(attr = "start")]
    pub start: Option<f64>,
}

#[derive(Clone, Default, PartialEq, Debug, hard_xml::XmlRead, hard_xml::XmlWrite)]
#[xml(tag = "Integer")]
pub struct Integer {
    #[xml(attr = "declaredType")]
    pub declared_type: Option<String>,
    #[xml(attr = "start")]
    pub start: Option<i32>,
}

#[derive(Clone, Default, PartialEq, Debug, hard_xml::XmlRead, hard_xml::XmlWrite)]
#[xml(tag = "Boolean")]
pub struct Boolean {
    #[xml(attr = "declaredType")]
    pub declared_type: Option<String>,
    #[xml(attr = "start")]
    pub start: Option<bool>,
}

#[derive(Clone, PartialEq, Debug, hard_xml::XmlRead, hard_xml::XmlWrite)]
pub enum ScalarVariableElement {
    #[xml(tag = "Real")]
    Real(Real),
    #[xml(tag = "Integer")]
    Integer(Integer),
    #[xml(tag = "Boolean")]
    Boolean(Boolean),
    #[xml(tag = "String")]
    String,
    #[xml(tag = "Enumeration")]
    Enumeration,
}

impl Default for ScalarVariableElement {
    fn default() -> Self {
        Self::Real(Real::default())
    }
}

#[derive(Default, Debug, hard_xml::XmlRead, hard_xml::XmlWrite)]
#[xml(tag = "ScalarVariable", strict(unknown_attribute, unknown_element))]
pub struct ScalarVariable {
    #[xml(attr = "name")]
    pub name: String,

    #[xml(attr = "valueReference")]
    pub value_reference: u32,

    #[xml(attr = "description")]
    pub description: Option<String>,

    #[xml(attr = "causality", default)]
    pub causality: Causality,

    #[xml(attr = "variability", default)]
    pub variability: Variability,

    #[xml(attr = "alias", default)]
    pub alias: Alias,

    #[xml(
        child = "Real",
        child = "Integer",
        child = "Boolean",
        child = "String",
        child = "Enumeration"
    )]
    pub elem: ScalarVariableElement,
}

impl ScalarVariable {
    pub fn is_negated_alias(&self) -> bool {
        self.alias == Alias::NegatedAlias
    }
}

#[cfg(test)]
mod tests {
    use hard_xml::XmlRead;

    use super::*;

    #[test]
    fn test_model_description() {
        let s = r#"<fmiModelDescription
 fmiVersion="1.0"
 modelName="BouncingBall"
 modelIdentifier="bouncingBall"
 guid="{8c4e810f-3df3-4a00-8276-176fa3c9f9e0}">
 <ModelVariables>
    <ScalarVariable name="h" valueReference="0" causality="output"> <Real start="1.0"/> </ScalarVariable>
    <ScalarVariable name="h_negated" valueReference="0" causality="output" alias="negatedAlias"> <Real/> </ScalarVariable>
 </ModelVariables>
</fmiModelDescription>"#;
        let md = Fmi1ModelDescription::from_str(s).unwrap();
        assert_eq!(md.model_identifier, "bouncingBall");
        assert_eq!(md.model_variables.variables.len(), 2);
        assert!(!md.model_variables.variables[0].is_negated_alias());
        assert!(md.model_variables.variables[1].is_negated_alias());
    }
}
