// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Presentable buffer descriptions and handles.
//!
//! A [`FrameBuffer`] pairs a ring slot id with the allocator's opaque handle.
//! The handle type is chosen by the platform crate (a gralloc handle, a dmabuf
//! fd set, a simulated id); core code never looks inside it.

use core::fmt;

/// Identifies a slot in the buffer ring.
///
/// Ids are dense and stable for the lifetime of a ring: slot `n` always holds
/// `BufferId(n)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u32);

impl BufferId {
    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferId({})", self.0)
    }
}

/// A DRM fourcc pixel format code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct PixelFormat(pub u32);

impl PixelFormat {
    /// 32-bit RGB with an unused alpha byte (`XR24`).
    pub const XRGB8888: Self = Self::fourcc(*b"XR24");
    /// 32-bit RGB with alpha (`AR24`).
    pub const ARGB8888: Self = Self::fourcc(*b"AR24");
    /// 32-bit BGR with alpha (`AB24`).
    pub const ABGR8888: Self = Self::fourcc(*b"AB24");
    /// 16-bit RGB (`RG16`).
    pub const RGB565: Self = Self::fourcc(*b"RG16");

    /// Packs four ASCII bytes little-endian, as DRM does.
    #[must_use]
    pub const fn fourcc(code: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(code))
    }

    /// Bytes per pixel for the formats this crate names, `None` otherwise.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            Self::XRGB8888 | Self::ARGB8888 | Self::ABGR8888 => Some(4),
            Self::RGB565 => Some(2),
            _ => None,
        }
    }
}

impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_le_bytes();
        if bytes.iter().all(u8::is_ascii_graphic) {
            write!(
                f,
                "PixelFormat({}{}{}{})",
                bytes[0] as char, bytes[1] as char, bytes[2] as char, bytes[3] as char
            )
        } else {
            write!(f, "PixelFormat({:#010x})", self.0)
        }
    }
}

/// A DRM format modifier describing tiling and compression.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct Modifier(pub u64);

impl Modifier {
    /// Plain linear layout.
    pub const LINEAR: Self = Self(0);
    /// No explicit modifier; the allocator picks an implicit layout.
    pub const INVALID: Self = Self(0x00ff_ffff_ffff_ffff);
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::LINEAR => f.write_str("Modifier(LINEAR)"),
            Self::INVALID => f.write_str("Modifier(INVALID)"),
            Self(raw) => write!(f, "Modifier({raw:#x})"),
        }
    }
}

/// What the ring asks the allocator for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Layout modifier.
    pub modifier: Modifier,
}

impl BufferDesc {
    /// Creates a description with an implicit layout.
    #[must_use]
    pub const fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            modifier: Modifier::INVALID,
        }
    }

    /// Returns a copy with the given modifier.
    #[must_use]
    pub const fn with_modifier(self, modifier: Modifier) -> Self {
        Self { modifier, ..self }
    }

    /// Approximate storage size, when the format is known.
    #[must_use]
    pub fn byte_len(&self) -> Option<u64> {
        let bpp = self.format.bytes_per_pixel()?;
        Some(u64::from(self.width) * u64::from(self.height) * u64::from(bpp))
    }
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self::new(1920, 1080, PixelFormat::XRGB8888)
    }
}

/// A populated ring slot: id, description and the allocator's handle.
pub struct FrameBuffer<H> {
    id: BufferId,
    desc: BufferDesc,
    handle: H,
}

impl<H> FrameBuffer<H> {
    /// Wraps an allocated handle.
    #[must_use]
    pub const fn new(id: BufferId, desc: BufferDesc, handle: H) -> Self {
        Self { id, desc, handle }
    }

    /// Ring slot id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> BufferId {
        self.id
    }

    /// Allocation description.
    #[inline]
    #[must_use]
    pub const fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    /// Allocator handle.
    #[inline]
    #[must_use]
    pub const fn handle(&self) -> &H {
        &self.handle
    }

    /// Unwraps the allocator handle for destruction.
    #[must_use]
    pub fn into_handle(self) -> H {
        self.handle
    }
}

impl<H> fmt::Debug for FrameBuffer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_matches_drm_encoding() {
        // DRM_FORMAT_XRGB8888 is fourcc_code('X', 'R', '2', '4').
        assert_eq!(PixelFormat::XRGB8888.0, 0x3432_5258);
        assert_eq!(format!("{:?}", PixelFormat::ARGB8888), "PixelFormat(AR24)");
        assert_eq!(format!("{:?}", PixelFormat(7)), "PixelFormat(0x00000007)");
    }

    #[test]
    fn default_desc_uses_implicit_modifier() {
        let desc = BufferDesc::default();
        assert_eq!(desc.modifier, Modifier::INVALID);
        assert_eq!(desc.byte_len(), Some(1920 * 1080 * 4));
        assert_eq!(
            desc.with_modifier(Modifier::LINEAR).modifier,
            Modifier::LINEAR,
            "with_modifier replaces the layout"
        );
    }

    #[test]
    fn unknown_format_has_no_size() {
        let desc = BufferDesc::new(4, 4, PixelFormat::fourcc(*b"NV12"));
        assert_eq!(desc.byte_len(), None, "planar formats are not sized here");
    }

    #[test]
    fn frame_buffer_hands_back_handle() {
        let fb = FrameBuffer::new(BufferId(2), BufferDesc::default(), "gralloc-7");
        assert_eq!(fb.id().index(), 2);
        assert_eq!(*fb.handle(), "gralloc-7");
        assert_eq!(fb.into_handle(), "gralloc-7");
    }
}
