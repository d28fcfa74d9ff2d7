use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

/// Allocate uninitialized storage for `len` values of `T`, aligned for `T`.
/// Aborts via `handle_alloc_error` if the allocator fails.
#[must_use]
pub(crate) fn alloc_array<T>(len: usize) -> *mut T {
    let layout = array_layout::<T>(len);
    if layout.size() == 0 {
        return NonNull::<T>::dangling().as_ptr();
    }
    let ptr = unsafe { alloc(layout) };
    if ptr.is_null() {
        handle_alloc_error(layout);
    }
    ptr as *mut T
}

/// Release storage obtained from `alloc_array` with the same `len`.
///
/// ## Safety
/// `ptr` must have come from `alloc_array::<T>(len)` and must not be used
/// afterwards.
pub(crate) unsafe fn dealloc_array<T>(ptr: *mut T, len: usize) {
    let layout = array_layout::<T>(len);
    if layout.size() != 0 {
        dealloc(ptr as *mut u8, layout);
    }
}

/// Layout of a header structure `H` followed by `len` aligned values of `T`
/// in a single contiguous allocation. Returns the padded layout and the byte
/// offset of the array.
pub(crate) fn layout_with_array<H, T>(len: usize) -> (Layout, usize) {
    let (layout, offset) = Layout::new::<H>()
        .extend(Layout::array::<T>(len).expect("invalid layout"))
        .expect("invalid layout");
    (layout.pad_to_align(), offset)
}

fn array_layout<T>(len: usize) -> Layout {
    Layout::array::<T>(len).expect("invalid layout")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::align_of;

    #[test]
    fn should_align_array_storage() {
        #[repr(align(32))]
        struct Wide([u8; 32]);

        let ptr = alloc_array::<Wide>(4);
        assert_eq!(0, ptr as usize % align_of::<Wide>());
        unsafe { dealloc_array(ptr, 4) };
    }

    #[test]
    fn should_place_array_after_header() {
        struct Header {
            _a: u64,
            _b: u32,
        }

        let (layout, offset) = layout_with_array::<Header, u64>(8);
        assert!(offset >= std::mem::size_of::<Header>());
        assert_eq!(0, offset % align_of::<u64>());
        assert!(layout.size() >= offset + 8 * std::mem::size_of::<u64>());
    }
}
