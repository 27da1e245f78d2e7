//! Linux foreground app lookup.
//!
//! X11 only: `xdotool getactivewindow getwindowpid`, then the process name
//! from `/proc/<pid>/comm`. Under Wayland this sees XWayland clients only.
//! xdotool is killed if the lookup future is dropped.

use costscope_core::error::CoreError;
use tokio::process::Command;
use tracing::debug;

/// Current display server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    X11,
    Wayland,
    Unknown,
}

pub fn detect_display_server() -> DisplayServer {
    if let Ok(session_type) = std::env::var("XDG_SESSION_TYPE") {
        match session_type.to_lowercase().as_str() {
            "x11" => return DisplayServer::X11,
            "wayland" => return DisplayServer::Wayland,
            _ => {}
        }
    }
    if std::env::var("WAYLAND_DISPLAY").is_ok() {
        return DisplayServer::Wayland;
    }
    if std::env::var("DISPLAY").is_ok() {
        return DisplayServer::X11;
    }
    DisplayServer::Unknown
}

/// Process name owning the active X11 window
pub async fn frontmost_app_linux() -> Result<Option<String>, CoreError> {
    if detect_display_server() == DisplayServer::Unknown {
        return Ok(None);
    }

    let output = match Command::new("xdotool")
        .args(["getactivewindow", "getwindowpid"])
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            debug!("xdotool failed: {}", String::from_utf8_lossy(&output.stderr).trim());
            return Ok(None);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("xdotool not installed, foreground tracking unavailable");
            return Ok(None);
        }
        Err(e) => return Err(CoreError::Subprocess(format!("xdotool failed to start: {e}"))),
    };

    let Some(pid) = parse_pid(&String::from_utf8_lossy(&output.stdout)) else {
        return Ok(None);
    };

    match std::fs::read_to_string(format!("/proc/{pid}/comm")) {
        Ok(comm) => {
            let name = comm.trim().to_string();
            Ok((!name.is_empty()).then_some(name))
        }
        Err(e) => {
            debug!("cannot read comm for pid {pid}: {e}");
            Ok(None)
        }
    }
}

fn parse_pid(stdout: &str) -> Option<u32> {
    stdout.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}
