//! Unix stack mapping using mmap

use fibril_core::error::MemoryError;

/// Map a private anonymous region usable as a fiber stack.
///
/// On Linux the mapping is marked `MAP_STACK | MAP_GROWSDOWN` so the kernel
/// applies its grow-down heuristics; elsewhere it is a plain fixed mapping.
pub fn map_stack(size: usize) -> Result<*mut u8, MemoryError> {
    #[cfg(target_os = "linux")]
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK | libc::MAP_GROWSDOWN;
    #[cfg(not(target_os = "linux"))]
    let flags = libc::MAP_PRIVATE | libc::MAP_ANON;

    let region = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            -1,
            0,
        )
    };

    if region == libc::MAP_FAILED {
        return Err(MemoryError::MapFailed(errno::errno().0));
    }

    Ok(region as *mut u8)
}

/// Release a stack region previously obtained from `map_stack`.
///
/// # Safety
///
/// `base` must be the exact pointer returned by `map_stack` with the same
/// `size`, and nothing may still execute on or point into the region.
pub unsafe fn unmap_stack(base: *mut u8, size: usize) -> Result<(), MemoryError> {
    if libc::munmap(base as *mut libc::c_void, size) < 0 {
        return Err(MemoryError::UnmapFailed(errno::errno().0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_and_unmap() {
        let size = 64 * 1024;
        let base = map_stack(size).expect("map_stack failed");
        // The region must be writable end to end
        unsafe {
            *base = 0xAA;
            *base.add(size - 1) = 0x55;
            assert_eq!(*base, 0xAA);
            unmap_stack(base, size).expect("unmap_stack failed");
        }
    }
}
