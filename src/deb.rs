//! Reading the control block out of `.deb` files.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// Source of the raw control stanza of a binary package file.
pub trait ControlExtractor {
    fn extract_control(&self, path: &Path) -> Result<String>;
}

fn extraction_error(path: &Path, message: impl Into<String>) -> Error {
    Error::ControlExtraction {
        path: path.display().to_string(),
        message: message.into(),
    }
}

fn run(path: &Path, mut cmd: Command) -> Result<Output> {
    debug!("Running command: {:?}", cmd);
    let output = cmd
        .output()
        .map_err(|e| extraction_error(path, format!("{:?}: {}", cmd.get_program(), e)))?;
    if !output.status.success() {
        return Err(extraction_error(
            path,
            format!(
                "{:?} exited with {}: {}",
                cmd.get_program(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(output)
}

/// Extracts control data with `dpkg-deb`, falling back to `ar` and `tar`
/// on hosts without dpkg.
#[derive(Debug, Clone, Default)]
pub struct DpkgExtractor;

impl DpkgExtractor {
    fn with_dpkg(&self, path: &Path) -> std::io::Result<Output> {
        let mut cmd = Command::new("dpkg-deb");
        cmd.arg("-f").arg(path);
        debug!("Running command: {:?}", cmd);
        cmd.output()
    }

    fn with_ar(&self, path: &Path) -> Result<String> {
        let mut list = Command::new("ar");
        list.arg("t").arg(path);
        let members = run(path, list)?;
        let members = String::from_utf8_lossy(&members.stdout);
        let member = members
            .lines()
            .map(str::trim)
            .find(|m| m.starts_with("control.tar"))
            .ok_or_else(|| extraction_error(path, "no control.tar member"))?
            .to_string();

        let td = tempfile::tempdir()?;
        let mut extract = Command::new("ar");
        extract.arg("p").arg(path).arg(&member);
        let tarball = run(path, extract)?;
        let tar_path = td.path().join(&member);
        std::fs::write(&tar_path, &tarball.stdout)?;

        // tar picks the decompressor from the member's extension
        let mut untar = Command::new("tar");
        untar
            .arg("-xf")
            .arg(&tar_path)
            .arg("-C")
            .arg(td.path())
            .arg("./control");
        run(path, untar)?;

        Ok(std::fs::read_to_string(td.path().join("control"))?)
    }
}

impl ControlExtractor for DpkgExtractor {
    fn extract_control(&self, path: &Path) -> Result<String> {
        match self.with_dpkg(path) {
            Ok(output) if output.status.success() => {
                String::from_utf8(output.stdout).map_err(|e| extraction_error(path, e.to_string()))
            }
            Ok(output) => Err(extraction_error(
                path,
                format!(
                    "dpkg-deb exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("dpkg-deb not available, extracting with ar");
                self.with_ar(path)
            }
            Err(e) => Err(extraction_error(path, e.to_string())),
        }
    }
}

/// Serves fixed control stanzas keyed by file path.
#[derive(Debug, Clone, Default)]
pub struct StaticControl {
    controls: HashMap<PathBuf, String>,
}

impl StaticControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, control: impl Into<String>) {
        self.controls.insert(path.into(), control.into());
    }
}

impl ControlExtractor for StaticControl {
    fn extract_control(&self, path: &Path) -> Result<String> {
        self.controls
            .get(path)
            .cloned()
            .ok_or_else(|| extraction_error(path, "no control data registered"))
    }
}
