//! Windows foreground app lookup.
//!
//! `GetForegroundWindow` + `GetWindowThreadProcessId`, then the owning
//! process name via sysinfo.

#![cfg(target_os = "windows")]

use costscope_core::error::CoreError;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;
use windows_sys::Win32::Foundation::HWND;
use windows_sys::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId};

/// Executable name (e.g. `Cursor.exe`) of the foreground window's process
pub fn frontmost_app_windows() -> Result<Option<String>, CoreError> {
    let pid = unsafe {
        let hwnd: HWND = GetForegroundWindow();
        if hwnd.is_null() {
            debug!("no foreground window");
            return Ok(None);
        }
        let mut pid: u32 = 0;
        GetWindowThreadProcessId(hwnd, &mut pid);
        pid
    };

    if pid == 0 {
        return Ok(None);
    }
    Ok(process_name(pid))
}

fn process_name(pid: u32) -> Option<String> {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    sys.process(pid)
        .map(|p| p.name().to_string_lossy().to_string())
}
