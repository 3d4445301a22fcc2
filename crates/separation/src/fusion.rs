//! Ensemble fusion of per-model stem tensors.
//!
//! Each model yields an array shaped `(stems, channels, samples)`. Models with
//! fewer stems are zero-padded on the stem axis up to the largest stem count,
//! then all outputs are averaged element-wise with equal weight.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use tracing::debug;

use crate::SeparationError;

/// Output of one separation model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelStems {
    pub model: String,
    pub sample_rate: u32,
    pub stems: Array3<f32>,
}

impl ModelStems {
    pub fn new(model: impl Into<String>, sample_rate: u32, stems: Array3<f32>) -> Self {
        Self {
            model: model.into(),
            sample_rate,
            stems,
        }
    }

    pub fn stem_count(&self) -> usize {
        self.stems.dim().0
    }

    /// `(channels, samples)` of every stem.
    pub fn frame_shape(&self) -> (usize, usize) {
        let (_, channels, samples) = self.stems.dim();
        (channels, samples)
    }
}

/// Consensus stems across all models.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedStems {
    pub sample_rate: u32,
    pub stems: Array3<f32>,
}

impl FusedStems {
    pub fn stem_count(&self) -> usize {
        self.stems.dim().0
    }

    pub fn channels(&self) -> usize {
        self.stems.dim().1
    }

    pub fn stem(&self, index: usize) -> ArrayView2<'_, f32> {
        self.stems.index_axis(Axis(0), index)
    }

    /// One stem as frame-interleaved samples, ready for a WAV writer.
    pub fn interleaved(&self, index: usize) -> Vec<f32> {
        interleave(self.stem(index))
    }
}

fn interleave(stem: ArrayView2<'_, f32>) -> Vec<f32> {
    stem.t().iter().copied().collect()
}

pub fn max_stems(outputs: &[ModelStems]) -> usize {
    outputs.iter().map(ModelStems::stem_count).max().unwrap_or(0)
}

/// Zero-pads the stem axis up to `max_stems`. Newly added stems are silent.
pub fn pad_stems(stems: &Array3<f32>, max_stems: usize) -> Array3<f32> {
    let (count, channels, samples) = stems.dim();
    if count >= max_stems {
        return stems.clone();
    }
    let mut padded = Array3::zeros((max_stems, channels, samples));
    padded.slice_mut(s![..count, .., ..]).assign(stems);
    padded
}

/// Averages every model's padded output into one stem tensor.
pub fn fuse(outputs: &[ModelStems]) -> Result<FusedStems, SeparationError> {
    let first = outputs.first().ok_or(SeparationError::NoModels)?;
    let expected = first.frame_shape();
    for output in &outputs[1..] {
        if output.frame_shape() != expected {
            return Err(SeparationError::ShapeMismatch {
                model: output.model.clone(),
                expected,
                found: output.frame_shape(),
            });
        }
        if output.sample_rate != first.sample_rate {
            return Err(SeparationError::SampleRateMismatch {
                model: output.model.clone(),
                expected: first.sample_rate,
                found: output.sample_rate,
            });
        }
    }

    let max_stems = max_stems(outputs);
    let (channels, samples) = expected;
    let mut sum = Array3::<f32>::zeros((max_stems, channels, samples));
    for output in outputs {
        if output.stem_count() < max_stems {
            debug!(
                model = %output.model,
                stems = output.stem_count(),
                max_stems,
                "zero-padding model output"
            );
        }
        sum += &pad_stems(&output.stems, max_stems);
    }
    let count = outputs.len() as f32;
    sum.mapv_inplace(|value| value / count);

    Ok(FusedStems {
        sample_rate: first.sample_rate,
        stems: sum,
    })
}

/// Builds a `(stems, channels, samples)` tensor from planar per-stem buffers.
pub fn stack_stems(stems: &[Array2<f32>]) -> Option<Array3<f32>> {
    let views: Vec<_> = stems.iter().map(|stem| stem.view()).collect();
    ndarray::stack(Axis(0), &views).ok()
}
