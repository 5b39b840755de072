//! Named (tagged) pagefile-backed mapping for the Windows family.
//!
//! `CreateFileMappingW` with a name opens the existing mapping when the
//! simulator created it first and creates it otherwise, so both sides can
//! start in any order.

use std::io;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_ALL_ACCESS, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
    PAGE_READWRITE, UnmapViewOfFile,
};

pub(crate) struct TaggedMapping {
    handle: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
}

impl TaggedMapping {
    pub(crate) fn create_or_open(name: &str, size: usize) -> io::Result<Self> {
        let name_wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let size = size as u64;

        unsafe {
            let handle = CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                std::ptr::null(),
                PAGE_READWRITE,
                (size >> 32) as u32,
                size as u32,
                name_wide.as_ptr(),
            );
            if handle == 0 {
                return Err(io::Error::last_os_error());
            }

            let view = MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, size as usize);
            if view.Value.is_null() {
                let err = io::Error::last_os_error();
                CloseHandle(handle);
                return Err(err);
            }

            Ok(Self { handle, view })
        }
    }

    pub(crate) fn as_mut_ptr(&self) -> *mut u8 {
        self.view.Value as *mut u8
    }
}

impl Drop for TaggedMapping {
    fn drop(&mut self) {
        unsafe {
            UnmapViewOfFile(self.view);
            CloseHandle(self.handle);
        }
    }
}
