//! Running device tools

use hive_core::DeviceError;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;

/// Timeout for a single tool invocation
pub const COMMAND_TIMEOUT_MS: u64 = 15_000;

/// Tool messages meaning the device is no longer attached
const VANISHED_MARKERS: &[&str] = &[
    "no device found",
    "device offline",
    "no devices/emulators found",
];

pub fn default_timeout() -> Duration {
    Duration::from_millis(COMMAND_TIMEOUT_MS)
}

/// Output of a finished tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Both streams, for matching tool messages
    pub fn message(&self) -> String {
        format!("{} {}", self.stdout.trim(), self.stderr.trim())
            .trim()
            .to_string()
    }
}

/// Run a tool and capture its output, whatever its exit status
pub async fn run(program: &str, args: &[&str], limit: Duration) -> Result<ToolOutput, DeviceError> {
    trace!(program = %program, args = ?args, "Running device tool");

    let output = timeout(
        limit,
        Command::new(program).args(args).kill_on_drop(true).output(),
    )
    .await
    .map_err(|_| DeviceError::Command(format!("{} timed out", program)))?
    .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DeviceError::Command(format!("{} is not installed", program))
        } else {
            DeviceError::Io(e)
        }
    })?;

    Ok(ToolOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run a tool against one device, mapping failures to device errors
pub async fn run_for_device(
    serial: &str,
    program: &str,
    args: &[&str],
    limit: Duration,
) -> Result<String, DeviceError> {
    let output = run(program, args, limit).await?;
    if output.success {
        return Ok(output.stdout);
    }
    Err(device_failure(serial, program, &output.message()))
}

/// Classify a failed tool invocation
pub fn device_failure(serial: &str, program: &str, message: &str) -> DeviceError {
    if is_vanished_message(message) {
        DeviceError::NotFound(serial.to_string())
    } else {
        DeviceError::Command(format!("{} failed for {}: {}", program, serial, message))
    }
}

pub fn is_vanished_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    if VANISHED_MARKERS.iter().any(|marker| message.contains(marker)) {
        return true;
    }
    // adb: "error: device 'SERIAL' not found"
    match message.find("device '") {
        Some(start) => message[start..].contains("' not found"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vanished_messages() {
        assert!(is_vanished_message(
            "ERROR: No device found with udid 00008030-001A, is it plugged in?"
        ));
        assert!(is_vanished_message("error: device 'emulator-5554' not found"));
        assert!(is_vanished_message("error: device offline"));
        assert!(!is_vanished_message(
            "ERROR: Could not connect to lockdownd, error code -19"
        ));
    }

    #[test]
    fn test_unrelated_not_found_is_a_failure() {
        assert!(!is_vanished_message("/system/bin/sh: getprop: not found"));
        assert!(!is_vanished_message("ERROR: Pairing record not found for device"));
        assert!(!device_failure("A", "adb", "sh: getprop: not found").is_not_found());
        assert!(device_failure("A", "adb", "error: device 'A' not found").is_not_found());
    }

    #[test]
    fn test_device_failure_kind() {
        assert!(device_failure("A", "adb", "error: device offline").is_not_found());
        assert!(!device_failure("A", "adb", "error: device unauthorized.").is_not_found());
    }

    #[tokio::test]
    async fn test_missing_tool_is_command_error() {
        let err = run("hive-tool-that-does-not-exist", &[], default_timeout()).await.unwrap_err();
        assert!(matches!(err, DeviceError::Command(_)));
    }
}
