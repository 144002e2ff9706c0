// SPDX-License-Identifier: MIT OR Apache-2.0

//! Firmware image artifact

use std::fmt;
use std::sync::Arc;

/// A platform firmware image (SPI flash content).
///
/// The bytes are shared, so cloning a simulation state never copies the image.
#[derive(Clone)]
pub struct BiosImage {
    content: Arc<[u8]>,
}

impl BiosImage {
    pub fn new(content: impl Into<Arc<[u8]>>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.content
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> usize {
        let Ok(start) = usize::try_from(offset) else {
            return 0;
        };
        if start >= self.content.len() {
            return 0;
        }
        let n = buf.len().min(self.content.len() - start);
        buf[..n].copy_from_slice(&self.content[start..start + n]);
        n
    }
}

impl fmt::Debug for BiosImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BiosImage")
            .field("size", &self.content.len())
            .finish()
    }
}
