// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque buffer handles and fenced resources.
//!
//! Buffers are allocated and mapped by an external buffer provider; the
//! adapter only carries their handles around.

use core::fmt;

use crate::fence::Fence;

/// An opaque handle to a graphics buffer owned by the buffer provider.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferHandle({:#x})", self.0)
    }
}

/// A buffer paired with the fence that gates access to it.
///
/// Used for layer buffers (acquire fence), the client target (acquire fence)
/// and the output buffer (release fence).
#[derive(Clone, Debug, Default)]
pub struct FencedResource {
    buffer: Option<BufferHandle>,
    fence: Fence,
}

impl FencedResource {
    /// Creates a resource from a buffer and its fence.
    #[must_use]
    pub fn new(buffer: Option<BufferHandle>, fence: Fence) -> Self {
        Self { buffer, fence }
    }

    /// Returns an empty resource: no buffer and a no-op fence.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the buffer handle, if any.
    #[must_use]
    pub fn buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    /// Returns the fence gating the buffer.
    #[must_use]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Replaces the contents and returns the previous resource.
    pub fn replace(&mut self, buffer: Option<BufferHandle>, fence: Fence) -> Self {
        core::mem::replace(self, Self::new(buffer, fence))
    }
}

#[cfg(test)]
mod tests {
    use super::{BufferHandle, FencedResource};
    use crate::fence::Fence;

    #[test]
    fn replace_hands_back_previous_resource() {
        let (fence, _signal) = Fence::pending();
        let mut resource = FencedResource::new(Some(BufferHandle(1)), fence.dup());

        let previous = resource.replace(Some(BufferHandle(2)), Fence::signaled());
        assert_eq!(previous.buffer(), Some(BufferHandle(1)));
        assert!(previous.fence().same_as(&fence), "old fence goes to caller");
        assert_eq!(resource.buffer(), Some(BufferHandle(2)));
        assert!(resource.fence().is_noop(), "new fence installed");
    }

    #[test]
    fn empty_resource_has_no_buffer() {
        let resource = FencedResource::empty();
        assert_eq!(resource.buffer(), None);
        assert!(resource.fence().is_signaled(), "empty fence is satisfied");
    }
}
