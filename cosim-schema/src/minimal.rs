//! Minimal FMI definitions for determining the FMI major version before the full,
//! version-specific model description is parsed.

use crate::{Error, MajorVersion};

/// A minimal model description that only contains the FMI version and model name.
#[derive(Default, Debug, hard_xml::XmlRead, hard_xml::XmlWrite)]
#[xml(tag = "fmiModelDescription")]
pub struct MinModelDescription {
    #[xml(attr = "fmiVersion")]
    pub fmi_version: String,
    #[xml(attr = "modelName")]
    pub model_name: String,
}

impl MinModelDescription {
    pub fn deserialize(xml: &str) -> Result<Self, Error> {
        hard_xml::XmlRead::from_str(xml).map_err(|e| Error::XmlParse(e.to_string()))
    }

    /// Returns the parsed FMI version as a [`semver::Version`].
    pub fn version(&self) -> Result<semver::Version, Error> {
        lenient_semver::parse(&self.fmi_version)
            .map_err(|e| Error::Semver(e.owned()))
    }

    pub fn major_version(&self) -> Result<MajorVersion, Error> {
        match self.version()?.major {
            1 => Ok(MajorVersion::FMI1),
            2 => Ok(MajorVersion::FMI2),
            3 => Ok(MajorVersion::FMI3),
            major => Err(Error::UnsupportedVersion(major.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_fmi2() {
        let xml = r#"<fmiModelDescription fmiVersion="2.0" modelName="BouncingBall"></fmiModelDescription>"#;
        let md = MinModelDescription::deserialize(xml).unwrap();
        assert_eq!(md.model_name, "BouncingBall");
        assert_eq!(md.major_version().unwrap(), MajorVersion::FMI2);
    }

    #[test]
    fn test_minimal_fmi1() {
        let xml = r#"<fmiModelDescription fmiVersion="1.0" modelName="BouncingBall"></fmiModelDescription>"#;
        let md = MinModelDescription::deserialize(xml).unwrap();
        assert_eq!(md.major_version().unwrap(), MajorVersion::FMI1);
    }

    #[test]
    fn test_minimal_unsupported_major_version() {
        let xml = r#"<fmiModelDescription fmiVersion="3.0-beta.2" modelName="BouncingBall"></fmiModelDescription>"#;
        let md = MinModelDescription::deserialize(xml).unwrap();
        assert_eq!(md.major_version().unwrap(), MajorVersion::FMI3);
    }
}
