//! Error types for the NTFS backend.

use snapkeep_core::SnapkeepError;
use thiserror::Error;

/// Errors specific to NTFS backend operations.
#[derive(Error, Debug)]
pub enum NtfsError {
    /// Failed to open a volume
    #[error("failed to open volume {volume}: {reason}")]
    VolumeOpen { volume: String, reason: String },

    /// Failed to enumerate the MFT
    #[error("failed to enumerate MFT on volume {volume}: {reason}")]
    MftEnumeration { volume: String, reason: String },

    /// Failed to query USN journal
    #[error("failed to query USN journal on volume {volume}: {reason}")]
    UsnJournalQuery { volume: String, reason: String },

    /// USN journal not enabled
    #[error("USN journal not enabled on volume {volume}")]
    UsnJournalNotEnabled { volume: String },

    /// USN journal truncated or rotated
    #[error("USN journal truncated or rotated on volume {volume}")]
    UsnJournalTruncated { volume: String },

    /// Failed to create the USN journal
    #[error("failed to create USN journal on volume {volume}: {reason}")]
    UsnJournalCreate { volume: String, reason: String },

    /// Access denied
    #[error("access denied: {operation} (try running as administrator)")]
    AccessDenied { operation: String },

    /// Windows API error
    #[error("Windows API error: {function} failed with code {code}: {message}")]
    WinApi {
        function: String,
        code: u32,
        message: String,
    },

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NtfsError {
    /// Create a WinAPI error from the last Windows error.
    #[cfg(windows)]
    pub fn from_win32(function: &str) -> Self {
        use windows::Win32::Foundation::GetLastError;

        let code = unsafe { GetLastError().0 };
        let message = format_win32_error(code);

        if code == 5 {
            return NtfsError::AccessDenied {
                operation: function.to_string(),
            };
        }

        NtfsError::WinApi {
            function: function.to_string(),
            code,
            message,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, NtfsError::AccessDenied { .. })
            || matches!(self, NtfsError::WinApi { code: 5, .. })
    }
}

/// Volume (without the backend's own vocabulary) the error applies to, used
/// when mapping into the core error type.
fn volume_of(err: &NtfsError) -> String {
    match err {
        NtfsError::VolumeOpen { volume, .. }
        | NtfsError::MftEnumeration { volume, .. }
        | NtfsError::UsnJournalQuery { volume, .. }
        | NtfsError::UsnJournalNotEnabled { volume }
        | NtfsError::UsnJournalTruncated { volume }
        | NtfsError::UsnJournalCreate { volume, .. } => volume.clone(),
        _ => String::new(),
    }
}

impl From<NtfsError> for SnapkeepError {
    fn from(err: NtfsError) -> Self {
        match &err {
            NtfsError::UsnJournalNotEnabled { .. } => SnapkeepError::JournalNotActive {
                volume: volume_of(&err),
            },
            NtfsError::UsnJournalTruncated { .. } => SnapkeepError::JournalRotated {
                volume: volume_of(&err),
            },
            _ => SnapkeepError::Adapter(err.to_string()),
        }
    }
}

/// Format a Win32 error code to a human-readable message.
#[cfg(windows)]
fn format_win32_error(code: u32) -> String {
    use windows::core::PWSTR;
    use windows::Win32::System::Diagnostics::Debug::{
        FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
    };

    let mut buffer = [0u16; 512];
    let len = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            code,
            0,
            PWSTR(buffer.as_mut_ptr()),
            buffer.len() as u32,
            None,
        )
    };

    if len == 0 {
        return format!("Unknown error ({code})");
    }

    String::from_utf16_lossy(&buffer[..len as usize])
        .trim()
        .to_string()
}
