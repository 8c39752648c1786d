//! USN Change Journal access for NTFS.
//!
//! The USN (Update Sequence Number) Change Journal is a persistent,
//! per-volume log of changes to files and directories. Every change gets a
//! monotonically increasing USN; [`crate::backend::NtfsAdapter`] uses this
//! module to query the journal's current position, (re)create it when
//! absent, and read records from it for `JournalReplayer` to process.
//!
//! ## Permissions
//!
//! Requires elevated privileges (Administrator or "Perform Volume
//! Maintenance Tasks").

use crate::error::NtfsError;
use crate::winapi_utils::SafeHandle;
use snapkeep_core::{ChangeRecord, Frn, JournalQuery};
use std::mem;
use tracing::debug;
use windows::Win32::Foundation::GetLastError;
use windows::Win32::System::Ioctl::{
    FSCTL_CREATE_USN_JOURNAL, FSCTL_QUERY_USN_JOURNAL, FSCTL_READ_USN_JOURNAL,
};
use windows::Win32::System::IO::DeviceIoControl;

const FRN_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Raw layout returned by `FSCTL_QUERY_USN_JOURNAL`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct UsnJournalData {
    usn_journal_id: u64,
    first_usn: i64,
    next_usn: i64,
    lowest_valid_usn: i64,
    max_usn: i64,
    maximum_size: u64,
    allocation_delta: u64,
    min_supported_major_version: u16,
    max_supported_major_version: u16,
}

/// Raw layout accepted by `FSCTL_CREATE_USN_JOURNAL`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct CreateUsnJournalData {
    maximum_size: u64,
    allocation_delta: u64,
}

/// Raw layout accepted by `FSCTL_READ_USN_JOURNAL`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct ReadUsnJournalData {
    start_usn: i64,
    reason_mask: u32,
    return_only_on_close: u32,
    timeout: u64,
    bytes_to_wait_for: u64,
    usn_journal_id: u64,
    min_major_version: u16,
    max_major_version: u16,
}

/// Raw USN record (version 2); version 3 (128-bit file IDs, ReFS) is not
/// supported here since the adapter only targets NTFS.
#[repr(C)]
#[derive(Debug)]
struct UsnRecordV2 {
    record_length: u32,
    major_version: u16,
    minor_version: u16,
    file_reference_number: u64,
    parent_file_reference_number: u64,
    usn: i64,
    timestamp: i64,
    reason: u32,
    source_info: u32,
    security_id: u32,
    file_attributes: u32,
    file_name_length: u16,
    file_name_offset: u16,
    // file_name follows, UTF-16, not NUL-terminated
}

const REASON_MASK_ALL: u32 = 0xFFFF_FFFF;

const ERROR_JOURNAL_DELETE_IN_PROGRESS: u32 = 1178;
const ERROR_JOURNAL_NOT_ACTIVE: u32 = 1179;
const ERROR_JOURNAL_ENTRY_DELETED: u32 = 1181;

/// Query the journal's current position on an already-open volume handle.
///
/// Maps `ERROR_JOURNAL_NOT_ACTIVE`/`ERROR_JOURNAL_DELETE_IN_PROGRESS` to
/// [`NtfsError::UsnJournalNotEnabled`] so the core replayer's
/// query-then-create-on-failure contract (§4.1, §4.3) is satisfied.
pub fn query_journal(handle: &SafeHandle, volume: &str) -> Result<JournalQuery, NtfsError> {
    let mut data: UsnJournalData = unsafe { mem::zeroed() };
    let mut bytes_returned = 0u32;

    let result = unsafe {
        DeviceIoControl(
            handle.as_raw(),
            FSCTL_QUERY_USN_JOURNAL,
            None,
            0,
            Some(&mut data as *mut _ as *mut _),
            mem::size_of::<UsnJournalData>() as u32,
            Some(&mut bytes_returned),
            None,
        )
    };

    if result.is_err() {
        let error = unsafe { GetLastError().0 };
        if error == ERROR_JOURNAL_NOT_ACTIVE || error == ERROR_JOURNAL_DELETE_IN_PROGRESS {
            return Err(NtfsError::UsnJournalNotEnabled {
                volume: volume.to_string(),
            });
        }
        return Err(NtfsError::from_win32("FSCTL_QUERY_USN_JOURNAL"));
    }

    debug!(
        journal_id = data.usn_journal_id,
        first_usn = data.first_usn,
        next_usn = data.next_usn,
        "queried USN journal"
    );

    Ok(JournalQuery {
        journal_id: data.usn_journal_id,
        first_usn: data.first_usn as u64,
        next_usn: data.next_usn as u64,
    })
}

/// Create (or recreate) the change journal on a volume.
pub fn create_journal(handle: &SafeHandle, volume: &str) -> Result<(), NtfsError> {
    let create_data = CreateUsnJournalData {
        maximum_size: 32 * 1024 * 1024,
        allocation_delta: 4 * 1024 * 1024,
    };
    let mut bytes_returned = 0u32;

    let result = unsafe {
        DeviceIoControl(
            handle.as_raw(),
            FSCTL_CREATE_USN_JOURNAL,
            Some(&create_data as *const _ as *const _),
            mem::size_of::<CreateUsnJournalData>() as u32,
            None,
            0,
            Some(&mut bytes_returned),
            None,
        )
    };

    if result.is_err() {
        return Err(NtfsError::UsnJournalCreate {
            volume: volume.to_string(),
            reason: NtfsError::from_win32("FSCTL_CREATE_USN_JOURNAL").to_string(),
        });
    }

    Ok(())
}

/// Read every journal record from `from_usn` up to the journal's live end,
/// in strictly increasing USN order, projected onto [`ChangeRecord`].
///
/// Issues repeated `FSCTL_READ_USN_JOURNAL` calls, each one resuming from
/// the `next_usn` the previous call returned, until a call returns no
/// records (caught up to the end of the journal).
pub fn read_journal(
    handle: &SafeHandle,
    journal_id: u64,
    from_usn: u64,
) -> Result<Vec<ChangeRecord>, NtfsError> {
    let mut records = Vec::new();
    let mut start_usn = from_usn as i64;

    loop {
        let (batch, next_usn) = read_journal_batch(handle, journal_id, start_usn)?;
        if batch.is_empty() {
            break;
        }
        records.extend(batch);
        if next_usn <= start_usn {
            break;
        }
        start_usn = next_usn;
    }

    Ok(records)
}

fn read_journal_batch(
    handle: &SafeHandle,
    journal_id: u64,
    start_usn: i64,
) -> Result<(Vec<ChangeRecord>, i64), NtfsError> {
    const BUFFER_SIZE: usize = 64 * 1024;
    let mut buffer = vec![0u8; BUFFER_SIZE];

    let read_data = ReadUsnJournalData {
        start_usn,
        reason_mask: REASON_MASK_ALL,
        return_only_on_close: 0,
        timeout: 0,
        bytes_to_wait_for: 0,
        usn_journal_id: journal_id,
        min_major_version: 2,
        max_major_version: 2,
    };

    let mut bytes_returned = 0u32;
    let result = unsafe {
        DeviceIoControl(
            handle.as_raw(),
            FSCTL_READ_USN_JOURNAL,
            Some(&read_data as *const _ as *const _),
            mem::size_of::<ReadUsnJournalData>() as u32,
            Some(buffer.as_mut_ptr() as *mut _),
            buffer.len() as u32,
            Some(&mut bytes_returned),
            None,
        )
    };

    if result.is_err() {
        let error = unsafe { GetLastError().0 };
        if error == ERROR_JOURNAL_ENTRY_DELETED {
            return Err(NtfsError::UsnJournalTruncated {
                volume: String::new(),
            });
        }
        return Err(NtfsError::from_win32("FSCTL_READ_USN_JOURNAL"));
    }

    if bytes_returned < 8 {
        return Ok((Vec::new(), start_usn));
    }

    let next_usn = i64::from_ne_bytes(buffer[0..8].try_into().unwrap());

    let mut records = Vec::new();
    let mut offset = 8usize;
    while offset + mem::size_of::<UsnRecordV2>() <= bytes_returned as usize {
        let record = unsafe { &*(buffer.as_ptr().wrapping_add(offset) as *const UsnRecordV2) };
        if record.record_length == 0 {
            break;
        }

        let name_offset = record.file_name_offset as usize;
        let name_len = record.file_name_length as usize;
        if name_len > 0 && offset + name_offset + name_len <= bytes_returned as usize {
            let name_ptr = buffer.as_ptr().wrapping_add(offset + name_offset) as *const u16;
            let name_slice = unsafe { std::slice::from_raw_parts(name_ptr, name_len / 2) };
            let name = String::from_utf16_lossy(name_slice);

            if !name.is_empty() && !name.starts_with('$') {
                records.push(ChangeRecord {
                    frn: Frn(record.file_reference_number & FRN_MASK),
                    parent_frn: Frn(record.parent_file_reference_number & FRN_MASK),
                    usn: record.usn as u64,
                    attributes: record.file_attributes,
                    name,
                });
            }
        }

        offset += record.record_length as usize;
    }

    Ok((records, next_usn))
}
