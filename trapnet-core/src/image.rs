//! In-memory image and labeled dataset types.
//!
//! Dataset acquisition (downloads, decoding, credential flows) is out of
//! scope; callers construct [`LabeledSet`] from whatever source they have.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrapnetError};

/// A dense image with `channels * height * width` pixels in [0, 1],
/// stored row-major per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub pixels: Vec<f32>,
}

impl Image {
    /// All-zero image of the given shape.
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            pixels: vec![0.0; channels * height * width],
        }
    }

    #[inline]
    fn index(&self, channel: usize, y: usize, x: usize) -> usize {
        (channel * self.height + y) * self.width + x
    }

    #[inline]
    pub fn get(&self, channel: usize, y: usize, x: usize) -> f32 {
        self.pixels[self.index(channel, y, x)]
    }

    #[inline]
    pub fn set(&mut self, channel: usize, y: usize, x: usize, value: f32) {
        let idx = self.index(channel, y, x);
        self.pixels[idx] = value;
    }

    /// Channel-averaged window of size `height x width` anchored at
    /// `(y0, x0)`, flattened row-major. This is the masked-pixel signal the
    /// gating network consumes.
    pub fn window_mean(&self, y0: usize, x0: usize, height: usize, width: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(height * width);
        for dy in 0..height {
            for dx in 0..width {
                let mut sum = 0.0;
                for c in 0..self.channels {
                    sum += self.get(c, y0 + dy, x0 + dx);
                }
                out.push(sum / self.channels as f32);
            }
        }
        out
    }
}

/// A set of images paired 1:1 with integer class labels. Order is
/// significant: downstream scoring relies on construction order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabeledSet {
    images: Vec<Image>,
    labels: Vec<usize>,
}

impl LabeledSet {
    pub fn new(images: Vec<Image>, labels: Vec<usize>) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(TrapnetError::dataset(format!(
                "{} images but {} labels",
                images.len(),
                labels.len()
            )));
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn push(&mut self, image: Image, label: usize) {
        self.images.push(image);
        self.labels.push(label);
    }

    /// Split off the first `n` samples, preserving order in both halves.
    pub fn split_set(&self, n: usize) -> Result<(LabeledSet, LabeledSet)> {
        if n > self.len() {
            return Err(TrapnetError::dataset(format!(
                "cannot split {} samples out of {}",
                n,
                self.len()
            )));
        }
        let head = LabeledSet {
            images: self.images[..n].to_vec(),
            labels: self.labels[..n].to_vec(),
        };
        let tail = LabeledSet {
            images: self.images[n..].to_vec(),
            labels: self.labels[n..].to_vec(),
        };
        Ok((head, tail))
    }

    /// Append all samples of `other`, preserving order.
    pub fn extend(&mut self, other: &LabeledSet) {
        self.images.extend_from_slice(&other.images);
        self.labels.extend_from_slice(&other.labels);
    }

    /// Sequential batches of at most `batch_size` samples. No shuffling:
    /// index alignment with the source order is load-bearing for scoring.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = (&[Image], &[usize])> {
        let batch_size = batch_size.max(1);
        self.images
            .chunks(batch_size)
            .zip(self.labels.chunks(batch_size))
    }
}
