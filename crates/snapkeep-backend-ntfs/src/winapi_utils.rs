//! Low-level Windows API utilities.
//!
//! This module contains helper functions for working with Windows APIs.
//! All unsafe code for Windows API calls is concentrated here.

use crate::error::NtfsError;
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_FLAG_BACKUP_SEMANTICS, FILE_SHARE_DELETE,
    FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};

/// RAII wrapper for a Windows `HANDLE`. Closes it when dropped.
pub struct SafeHandle(pub HANDLE);

impl SafeHandle {
    pub fn new(handle: HANDLE) -> Result<Self, NtfsError> {
        if handle == INVALID_HANDLE_VALUE || handle.0 == ptr::null_mut() {
            Err(NtfsError::from_win32("CreateFile"))
        } else {
            Ok(SafeHandle(handle))
        }
    }

    pub fn as_raw(&self) -> HANDLE {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != INVALID_HANDLE_VALUE && self.0 .0 != ptr::null_mut()
    }
}

impl Drop for SafeHandle {
    fn drop(&mut self) {
        if self.is_valid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

/// Convert a Rust string to a null-terminated wide string (UTF-16).
pub fn to_wide_string(s: &str) -> Vec<u16> {
    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Open a volume device for MFT / USN journal access (requires elevated
/// privileges, i.e. Administrator or "Perform Volume Maintenance Tasks").
pub fn open_volume(volume_path: &str) -> Result<SafeHandle, NtfsError> {
    let wide_path = to_wide_string(volume_path);

    // SAFETY: standard CreateFileW call; the resulting handle is immediately
    // wrapped in SafeHandle for cleanup.
    let handle = unsafe {
        CreateFileW(
            PCWSTR(wide_path.as_ptr()),
            windows::Win32::Storage::FileSystem::FILE_GENERIC_READ.0,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            None,
            OPEN_EXISTING,
            FILE_ATTRIBUTE_NORMAL | FILE_FLAG_BACKUP_SEMANTICS,
            None,
        )
    };

    match handle {
        Ok(h) => SafeHandle::new(h),
        Err(_) => Err(NtfsError::from_win32("CreateFileW")),
    }
}

/// Get the drive letter from a volume path like "\\?\C:" or "C:".
pub fn extract_drive_letter(path: &str) -> Option<char> {
    if path.starts_with("\\\\?\\") || path.starts_with("\\\\.\\") {
        path.chars().nth(4)
    } else if path.len() >= 2 && path.as_bytes()[1] == b':' {
        path.chars().next()
    } else {
        None
    }
}

/// Normalize a volume path to the format "\\.\X:" for device access.
pub fn normalize_volume_path(path: &str) -> String {
    if let Some(letter) = extract_drive_letter(path) {
        format!("\\\\.\\{}:", letter.to_ascii_uppercase())
    } else {
        path.to_string()
    }
}
