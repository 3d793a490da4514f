//! `libcamera-still` adapter.
//!
//! Each acquisition runs the capture program once and waits for it:
//!
//! ```text
//! libcamera-still --immediate --nopreview --width W --height H --quality Q -o PATH
//! ```
//!
//! A non-zero exit (camera missing, busy, cable loose) is reported with the
//! program's stderr so the capture worker can log it and carry on.

use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

use crate::app::ports::StillImageSource;
use crate::error::{IoError, Result};

#[derive(Debug, Clone)]
pub struct LibcameraStill {
    program: String,
}

impl LibcameraStill {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn command(&self, path: &Path, width: u32, height: u32, quality: u8) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--immediate", "--nopreview"])
            .arg("--width")
            .arg(width.to_string())
            .arg("--height")
            .arg(height.to_string())
            .arg("--quality")
            .arg(quality.to_string())
            .arg("-o")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl StillImageSource for LibcameraStill {
    fn acquire(&mut self, path: &Path, width: u32, height: u32, quality: u8) -> Result<()> {
        debug!("Running {} -> {}", self.program, path.display());
        let output = self
            .command(path, width, height, quality)
            .output()
            .map_err(|e| IoError::Capture(format!("{}: {e}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IoError::Capture(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ))
            .into());
        }
        Ok(())
    }
}
