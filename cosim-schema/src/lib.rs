//! XML schema definitions for FMI 1.0 and 2.0 `modelDescription.xml` documents.
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
#![deny(unsafe_code)]
#![deny(clippy::all)]

use thiserror::Error;

#[cfg(feature = "fmi1")]
pub mod fmi1;
#[cfg(feature = "fmi2")]
pub mod fmi2;
pub mod minimal;
pub mod traits;
pub mod utils;
pub mod variable_counts;

/// Major revision of the FMI standard, as sniffed from `fmiVersion` before the
/// version-specific schema is chosen.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MajorVersion {
    FMI1,
    FMI2,
    FMI3,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Variable {0} not found")]
    VariableNotFound(String),

    #[error("Unsupported FMI version: {0}")]
    UnsupportedVersion(String),

    #[error(transparent)]
    Semver(#[from] lenient_semver::parser::OwnedError),

    #[error("Error parsing XML: {0}")]
    XmlParse(String),
}

/// Deserialize a `modelDescription.xml` document into `T`.
pub fn deserialize<'a, T: hard_xml::XmlRead<'a>>(s: &'a str) -> Result<T, Error> {
    T::from_str(s).map_err(|e| Error::XmlParse(e.to_string()))
}

/// Serialize `value` back to an XML document.
///
/// `pretty` is accepted for symmetry with callers that round-trip a description, but `hard-xml`
/// does not currently offer an indenting writer, so the output is always compact.
pub fn serialize<T: hard_xml::XmlWrite>(value: &T, _pretty: bool) -> Result<String, Error> {
    value.to_string().map_err(|e| Error::XmlParse(e.to_string()))
}
