//! Release signing.

use crate::config::SigningConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Produces the two signatures published next to a Release file.
pub trait Signer {
    /// Inline clear-signed copy of `release` (published as `InRelease`).
    fn clearsign(&self, release: &Path) -> Result<Vec<u8>>;

    /// Armored detached signature of `release` (published as `Release.gpg`).
    fn detach_sign(&self, release: &Path) -> Result<Vec<u8>>;
}

/// Signs by shelling out to gpg.
#[derive(Debug, Clone)]
pub struct GpgSigner {
    command: String,
    key: Option<String>,
    options: Vec<String>,
}

impl GpgSigner {
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            command: config.command.clone(),
            key: config.key.clone(),
            options: config.options.clone(),
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-a");
        if let Some(key) = &self.key {
            cmd.arg(format!("--default-key={}", key));
        }
        cmd.arg("--digest-algo").arg("SHA256");
        cmd.args(&self.options);
        cmd
    }

    /// Run `cmd`, which is expected to write `<release>.asc`, and return
    /// the bytes of that file.
    fn run(&self, mut cmd: Command, release: &Path) -> Result<Vec<u8>> {
        let output_path = asc_path(release);
        // Stale output from an earlier run would be mistaken for success.
        match std::fs::remove_file(&output_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        debug!("Running command: {:?}", cmd);
        let output = cmd
            .output()
            .map_err(|e| Error::Signing(format!("unable to run {}: {}", self.command, e)))?;
        if !output.status.success() {
            return Err(Error::Signing(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let signature = std::fs::read(&output_path).map_err(|e| {
            Error::Signing(format!("{} was not produced: {}", output_path.display(), e))
        })?;
        std::fs::remove_file(&output_path)?;
        Ok(signature)
    }
}

fn asc_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".asc");
    PathBuf::from(name)
}

impl Signer for GpgSigner {
    fn clearsign(&self, release: &Path) -> Result<Vec<u8>> {
        let mut cmd = self.base_command();
        cmd.arg("-s").arg("--clearsign").arg(release);
        self.run(cmd, release)
    }

    fn detach_sign(&self, release: &Path) -> Result<Vec<u8>> {
        let mut cmd = self.base_command();
        cmd.arg("-b").arg(release);
        self.run(cmd, release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(command: &str) -> GpgSigner {
        GpgSigner::new(&SigningConfig {
            key: Some("ABCD1234".to_string()),
            command: command.to_string(),
            options: vec!["--batch".to_string()],
        })
    }

    #[test]
    fn test_command_line() {
        let cmd = signer("gpg").base_command();
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-a",
                "--default-key=ABCD1234",
                "--digest-algo",
                "SHA256",
                "--batch"
            ]
        );
    }

    #[test]
    fn test_asc_path() {
        assert_eq!(
            asc_path(Path::new("/tmp/x/Release")),
            PathBuf::from("/tmp/x/Release.asc")
        );
    }

    #[test]
    fn test_missing_command() {
        let td = tempfile::tempdir().unwrap();
        let release = td.path().join("Release");
        std::fs::write(&release, "Codename: stable\n").unwrap();
        let err = signer("/nonexistent/gpg-binary")
            .clearsign(&release)
            .unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[test]
    fn test_missing_output() {
        let td = tempfile::tempdir().unwrap();
        let release = td.path().join("Release");
        std::fs::write(&release, "Codename: stable\n").unwrap();
        // `true` succeeds without writing the signature
        let err = signer("true").detach_sign(&release).unwrap_err();
        assert!(matches!(err, Error::Signing(ref m) if m.contains("was not produced")));
    }
}
