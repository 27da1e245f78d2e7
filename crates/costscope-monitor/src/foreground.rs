//! Foreground window port implementation.

use async_trait::async_trait;
use costscope_core::error::CoreError;
use costscope_core::ports::process::ForegroundWindowProvider;

/// Dispatches to the per-OS lookup: an async subprocess on macOS and
/// Linux, a blocking Win32 call on Windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeForegroundProvider;

impl NativeForegroundProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ForegroundWindowProvider for NativeForegroundProvider {
    async fn foreground_app(&self) -> Result<Option<String>, CoreError> {
        #[cfg(target_os = "macos")]
        {
            crate::macos::frontmost_app_macos().await
        }
        #[cfg(target_os = "linux")]
        {
            crate::linux::frontmost_app_linux().await
        }
        #[cfg(target_os = "windows")]
        {
            tokio::task::spawn_blocking(crate::windows::frontmost_app_windows)
                .await
                .map_err(|e| CoreError::Internal(format!("foreground lookup task failed: {e}")))?
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
        {
            Ok(None)
        }
    }
}
