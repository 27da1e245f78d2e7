//! macOS foreground app lookup.
//!
//! Asks System Events for the frontmost application process via osascript.
//! The child is killed when the lookup future is dropped, so a caller's
//! timeout also ends a stuck osascript (e.g. one waiting on a permission
//! prompt).

use costscope_core::error::CoreError;
use tokio::process::Command;
use tracing::debug;

const FRONTMOST_SCRIPT: &str = r#"tell application "System Events" to get name of first application process whose frontmost is true"#;

/// Name of the frontmost application, `None` when osascript fails
pub async fn frontmost_app_macos() -> Result<Option<String>, CoreError> {
    let output = match Command::new("osascript")
        .arg("-e")
        .arg(FRONTMOST_SCRIPT)
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CoreError::Subprocess(format!("osascript failed to start: {e}"))),
    };

    if !output.status.success() {
        debug!("frontmost app lookup failed (osascript)");
        return Ok(None);
    }

    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((!name.is_empty()).then_some(name))
}
