//! Trigger watermark geometry and the encoded trigger specification.
//!
//! The attack binds a combinatorial pixel pattern to the watermark region
//! and hands the result around as an explicit [`TriggerSpec`] value; nothing
//! downstream mutates shared mark state.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrapnetError};
use crate::image::Image;

/// Placement and size of the trigger region inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub height: usize,
    pub width: usize,
    pub height_offset: usize,
    pub width_offset: usize,
}

impl Watermark {
    pub fn new(height: usize, width: usize, height_offset: usize, width_offset: usize) -> Self {
        Self {
            height,
            width,
            height_offset,
            width_offset,
        }
    }

    /// Number of pixel positions in the trigger region.
    pub fn all_point(&self) -> usize {
        self.height * self.width
    }

    /// Encode a pixel pattern into a concrete trigger: the region is all
    /// ones except zeros at the pattern's indices. `trigger_label` is the
    /// gating-network class bound to this pattern.
    pub fn encode(&self, pattern: &[usize], trigger_label: usize) -> Result<TriggerSpec> {
        let all_point = self.all_point();
        let mut values = vec![1.0; all_point];
        for &idx in pattern {
            if idx >= all_point {
                return Err(TrapnetError::config(format!(
                    "pattern index {idx} outside {}x{} trigger region",
                    self.height, self.width
                )));
            }
            values[idx] = 0.0;
        }
        Ok(TriggerSpec {
            height: self.height,
            width: self.width,
            height_offset: self.height_offset,
            width_offset: self.width_offset,
            values,
            trigger_label,
        })
    }
}

/// A concrete trigger: pixel values for the watermark region plus the
/// gating-network label it was bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub height: usize,
    pub width: usize,
    pub height_offset: usize,
    pub width_offset: usize,
    /// Row-major region values, length `height * width`.
    pub values: Vec<f32>,
    /// Gating-network class that fires the backdoor.
    pub trigger_label: usize,
}

impl TriggerSpec {
    /// Check that the trigger region lies inside `image`. Stamping or
    /// reading the window on a smaller image would index out of bounds.
    pub fn check_fits(&self, image: &Image) -> Result<()> {
        if self.height_offset + self.height > image.height
            || self.width_offset + self.width > image.width
        {
            return Err(TrapnetError::model(format!(
                "{}x{} trigger at offset ({}, {}) does not fit a {}x{} image",
                self.height,
                self.width,
                self.height_offset,
                self.width_offset,
                image.height,
                image.width
            )));
        }
        Ok(())
    }

    /// Stamp the trigger into every channel of a copy of `image`.
    pub fn apply(&self, image: &Image) -> Image {
        let mut out = image.clone();
        for c in 0..out.channels {
            for dy in 0..self.height {
                for dx in 0..self.width {
                    out.set(
                        c,
                        self.height_offset + dy,
                        self.width_offset + dx,
                        self.values[dy * self.width + dx],
                    );
                }
            }
        }
        out
    }

    /// The masked-pixel signal the gating network reads from an image:
    /// the channel-averaged trigger window.
    pub fn window_vector(&self, image: &Image) -> Vec<f32> {
        image.window_mean(self.height_offset, self.width_offset, self.height, self.width)
    }
}
