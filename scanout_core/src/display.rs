// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display and layer identification.
//!
//! [`DisplayId`] names a physical output. Compositors assign them; the loop
//! passes them through without interpreting the value. [`LayerId`] names a
//! hardware composition layer created on a display.

use core::fmt;

/// Identifies a display output.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DisplayId(pub u32);

impl DisplayId {
    /// The primary (built-in) display.
    pub const PRIMARY: Self = Self(0);
}

impl fmt::Debug for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DisplayId({})", self.0)
    }
}

/// Identifies a composition layer owned by a compositor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({})", self.0)
    }
}

/// One mode a display can be driven in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DisplayConfig {
    /// Compositor-assigned configuration id.
    pub id: u32,
    /// Active width in pixels.
    pub width: u32,
    /// Active height in pixels.
    pub height: u32,
    /// Refresh rate in millihertz (60 Hz is `60_000`).
    pub refresh_mhz: u32,
    /// Horizontal density in dots per inch.
    pub dpi_x: u32,
    /// Vertical density in dots per inch.
    pub dpi_y: u32,
}

impl DisplayConfig {
    /// Returns the duration of one refresh cycle, or `None` for a zero rate.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<std::time::Duration> {
        if self.refresh_mhz == 0 {
            return None;
        }
        Some(std::time::Duration::from_nanos(
            1_000_000_000_000 / u64::from(self.refresh_mhz),
        ))
    }
}
