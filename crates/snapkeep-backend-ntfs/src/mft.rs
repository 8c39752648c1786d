//! MFT (Master File Table) enumeration for NTFS.
//!
//! Reads the MFT directly via `FSCTL_ENUM_USN_DATA`, which is far faster than
//! a recursive directory walk for the initial/full-replay scan. Records are
//! projected straight into [`snapkeep_core::ChangeRecord`]; path reconstruction
//! is the core crate's `FrnMap`'s job, not this module's.
//!
//! Reading the MFT requires elevated privileges (Administrator, or the
//! "Perform Volume Maintenance Tasks" privilege).

use crate::error::NtfsError;
use crate::winapi_utils::SafeHandle;
use snapkeep_core::{ChangeRecord, Frn};
use std::mem;
use tracing::{debug, info};
use windows::Win32::System::Ioctl::{FSCTL_ENUM_USN_DATA, FSCTL_GET_NTFS_VOLUME_DATA};
use windows::Win32::System::IO::DeviceIoControl;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct MftEnumData {
    start_file_reference_number: u64,
    low_usn: i64,
    high_usn: i64,
    min_major_version: u16,
    max_major_version: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct NtfsVolumeData {
    volume_serial_number: u64,
    number_sectors: u64,
    total_clusters: u64,
    free_clusters: u64,
    total_reserved: u64,
    bytes_per_sector: u32,
    bytes_per_cluster: u32,
    bytes_per_file_record_segment: u32,
    clusters_per_file_record_segment: u32,
    mft_valid_data_length: u64,
    mft_start_lcn: u64,
    mft2_start_lcn: u64,
    mft_zone_start: u64,
    mft_zone_end: u64,
}

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
}

#[repr(C)]
#[derive(Debug)]
struct UsnRecordV3 {
    record_length: u32,
    major_version: u16,
    minor_version: u16,
    file_reference_number: [u8; 16],
    parent_file_reference_number: [u8; 16],
    usn: i64,
    timestamp: i64,
    reason: u32,
    source_info: u32,
    security_id: u32,
    file_attributes: u32,
    file_name_length: u16,
    file_name_offset: u16,
}

const FRN_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

fn get_ntfs_volume_data(handle: &SafeHandle) -> Result<NtfsVolumeData, NtfsError> {
    let mut vol_data: NtfsVolumeData = unsafe { mem::zeroed() };
    let mut bytes_returned = 0u32;

    let result = unsafe {
        DeviceIoControl(
            handle.as_raw(),
            FSCTL_GET_NTFS_VOLUME_DATA,
            None,
            0,
            Some(&mut vol_data as *mut _ as *mut _),
            mem::size_of::<NtfsVolumeData>() as u32,
            Some(&mut bytes_returned),
            None,
        )
    };

    if result.is_err() {
        return Err(NtfsError::from_win32("FSCTL_GET_NTFS_VOLUME_DATA"));
    }

    debug!(
        mft_size = vol_data.mft_valid_data_length,
        bytes_per_record = vol_data.bytes_per_file_record_segment,
        "got NTFS volume data"
    );

    Ok(vol_data)
}

/// Enumerate every MFT record with `usn < upper_usn`, in FRN order.
pub fn enumerate_mft(handle: &SafeHandle, upper_usn: u64) -> Result<Vec<ChangeRecord>, NtfsError> {
    let _vol_data = get_ntfs_volume_data(handle)?;

    const BUFFER_SIZE: usize = 64 * 1024;
    let mut buffer = vec![0u8; BUFFER_SIZE];

    let mut enum_data = MftEnumData {
        start_file_reference_number: 0,
        low_usn: 0,
        high_usn: upper_usn as i64,
        min_major_version: 2,
        max_major_version: 3,
    };

    let mut records = Vec::with_capacity(100_000);
    info!("enumerating MFT records");

    loop {
        let mut bytes_returned = 0u32;

        let result = unsafe {
            DeviceIoControl(
                handle.as_raw(),
                FSCTL_ENUM_USN_DATA,
                Some(&enum_data as *const _ as *const _),
                mem::size_of::<MftEnumData>() as u32,
                Some(buffer.as_mut_ptr() as *mut _),
                buffer.len() as u32,
                Some(&mut bytes_returned),
                None,
            )
        };

        if result.is_err() {
            let error = unsafe { windows::Win32::Foundation::GetLastError().0 };
            if error == 38 {
                // ERROR_HANDLE_EOF
                break;
            }
            if error == 5 {
                return Err(NtfsError::AccessDenied {
                    operation: "FSCTL_ENUM_USN_DATA".to_string(),
                });
            }
            return Err(NtfsError::from_win32("FSCTL_ENUM_USN_DATA"));
        }

        if bytes_returned < 8 {
            break;
        }

        let next_ref = u64::from_ne_bytes(buffer[0..8].try_into().unwrap());

        let mut offset = 8usize;
        while offset + 8 <= bytes_returned as usize {
            let record_length =
                u32::from_ne_bytes(buffer[offset..offset + 4].try_into().unwrap());
            let major_version =
                u16::from_ne_bytes(buffer[offset + 4..offset + 6].try_into().unwrap());

            if record_length == 0 || offset + record_length as usize > bytes_returned as usize {
                break;
            }

            let (file_ref, parent_ref, usn, file_attrs, name_offset, name_len) =
                if major_version == 2 {
                    if offset + mem::size_of::<UsnRecordV2>() > bytes_returned as usize {
                        break;
                    }
                    let record =
                        unsafe { &*(buffer.as_ptr().wrapping_add(offset) as *const UsnRecordV2) };
                    (
                        record.file_reference_number,
                        record.parent_file_reference_number,
                        record.usn,
                        record.file_attributes,
                        record.file_name_offset as usize,
                        record.file_name_length as usize,
                    )
                } else if major_version == 3 {
                    if offset + mem::size_of::<UsnRecordV3>() > bytes_returned as usize {
                        break;
                    }
                    let record =
                        unsafe { &*(buffer.as_ptr().wrapping_add(offset) as *const UsnRecordV3) };
                    let file_ref =
                        u64::from_ne_bytes(record.file_reference_number[0..8].try_into().unwrap());
                    let parent_ref = u64::from_ne_bytes(
                        record.parent_file_reference_number[0..8]
                            .try_into()
                            .unwrap(),
                    );
                    (
                        file_ref,
                        parent_ref,
                        record.usn,
                        record.file_attributes,
                        record.file_name_offset as usize,
                        record.file_name_length as usize,
                    )
                } else {
                    offset += record_length as usize;
                    continue;
                };

            if name_len > 0 && offset + name_offset + name_len <= bytes_returned as usize {
                let name_ptr = buffer.as_ptr().wrapping_add(offset + name_offset) as *const u16;
                let name_slice = unsafe { std::slice::from_raw_parts(name_ptr, name_len / 2) };
                let name = String::from_utf16_lossy(name_slice);

                if !name.is_empty() && !name.starts_with('$') && name != "." && name != ".." {
                    records.push(ChangeRecord {
                        frn: Frn(file_ref & FRN_MASK),
                        parent_frn: Frn(parent_ref & FRN_MASK),
                        usn: usn as u64,
                        attributes: file_attrs,
                        name,
                    });
                }
            }

            offset += record_length as usize;
        }

        enum_data.start_file_reference_number = next_ref;
    }

    info!(count = records.len(), "MFT enumeration complete");
    Ok(records)
}
