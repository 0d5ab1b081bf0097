//! Packaged-model extraction: unzip a `.fmu` archive to a deterministic, re-entrant path and
//! locate its platform-specific shared library.

use std::io::Read;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use percent_encoding::{AsciiSet, CONTROLS};

use crate::error::Result;

const MODEL_DESCRIPTION: &str = "modelDescription.xml";

/// Characters percent-encoded in an instance name when building its extraction directory name,
/// matching the source system's instance-name sanitization.
const INSTANCE_NAME_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'_')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|')
    .add(b'!')
    .add(b'#')
    .add(b'$')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'=')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b']')
    .add(b'%');

/// MD5 digest of a file's contents, hex-encoded, used as the fingerprint component of an
/// extraction directory name so two runs against the same package resolve to the same path.
pub fn md5_file_fingerprint(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path.as_ref())?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// The directory name a component's package is extracted into:
/// `<encoded instance name>_<md5 of package file>`.
pub fn extraction_dir_name(instance_name: &str, package_path: impl AsRef<Path>) -> Result<String> {
    let encoded = percent_encoding::utf8_percent_encode(instance_name, INSTANCE_NAME_ENCODE_SET);
    let fingerprint = md5_file_fingerprint(package_path)?;
    Ok(format!("{encoded}_{fingerprint}"))
}

/// An extracted package on disk: its root directory and, optionally, whether the engine created
/// it (and so must clean it up) or it was pinned by `USE_TEMP_DIR` (and so must not be removed).
pub struct ExtractedPackage {
    pub root: PathBuf,
    auto_created: bool,
}

impl ExtractedPackage {
    /// Extract `package_path` (a zip archive) under `extraction_root/<instance>_<digest>`. If
    /// that directory already exists, it is reused rather than re-extracted.
    pub fn extract(
        package_path: impl AsRef<Path>,
        instance_name: &str,
        extraction_root: &Path,
        auto_created: bool,
    ) -> Result<Self> {
        let dir_name = extraction_dir_name(instance_name, package_path.as_ref())?;
        let root = extraction_root.join(dir_name);
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
            let file = std::fs::File::open(package_path.as_ref())?;
            let mut archive = zip::ZipArchive::new(file)?;
            log::debug!("extracting '{instance_name}' package into {root:?}");
            archive.extract(&root)?;
        } else {
            log::debug!("reusing existing extraction at {root:?}");
        }
        Ok(Self { root, auto_created })
    }

    pub fn model_description_path(&self) -> PathBuf {
        self.root.join(MODEL_DESCRIPTION)
    }

    pub fn read_model_description(&self) -> Result<String> {
        Ok(std::fs::read_to_string(self.model_description_path())?)
    }

    /// `resourceLocation`/`fmuLocation` URI passed to `fmi2Instantiate`/`fmiInstantiateSlave`:
    /// a `file://` URI pointing at the extracted package's `resources` directory.
    pub fn resource_location(&self) -> String {
        format!("file://{}", self.root.join("resources").to_string_lossy())
    }

    /// Resolve the platform-specific shared-library path for `model_identifier`, following the
    /// FMI `binaries/<platform>/<identifier>.<ext>` layout.
    pub fn shared_lib_path(&self, model_identifier: &str) -> Result<PathBuf> {
        let platform_folder = platform_folder_name()?;
        let file_name = format!("{model_identifier}{}", std::env::consts::DLL_SUFFIX);
        Ok(self
            .root
            .join("binaries")
            .join(platform_folder)
            .join(file_name))
    }
}

impl Drop for ExtractedPackage {
    fn drop(&mut self) {
        if self.auto_created {
            if let Err(e) = std::fs::remove_dir_all(&self.root) {
                log::warn!("failed to clean up extraction directory {:?}: {e}", self.root);
            }
        }
    }
}

fn platform_folder_name() -> Result<&'static str> {
    Ok(match (std::env::consts::OS, std::env::consts::ARCH) {
        ("windows", "x86_64") => "win64",
        ("windows", "x86") => "win32",
        ("linux", "x86_64") => "linux64",
        ("linux", "x86") => "linux32",
        ("macos", "x86_64") => "darwin64",
        ("macos", "aarch64") => "darwin64",
        (os, arch) => {
            return Err(crate::error::Error::ConfigInvalid(format!(
                "unsupported platform {os}/{arch}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reserved_characters_in_instance_name() {
        let encoded =
            percent_encoding::utf8_percent_encode("my model!", INSTANCE_NAME_ENCODE_SET).to_string();
        assert_eq!(encoded, "my%20model%21");
    }

    #[test]
    fn leaves_plain_identifiers_untouched() {
        let encoded =
            percent_encoding::utf8_percent_encode("tank1", INSTANCE_NAME_ENCODE_SET).to_string();
        assert_eq!(encoded, "tank1");
    }
}
