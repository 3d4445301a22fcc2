//! Sample rate conversion using rubato.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use crate::AudioError;

/// Resamples a mono signal from `input_rate` to `output_rate`.
///
/// Returns a copy when the rates already match. The interpolator delay is
/// trimmed and its tail flushed, so the output is time-aligned with the input
/// and holds `ceil(len * ratio)` frames.
pub fn resample_mono(
    input: &[f32],
    input_rate: u32,
    output_rate: u32,
) -> Result<Vec<f32>, AudioError> {
    if input_rate == output_rate || input.is_empty() {
        debug!("sample rate already at {output_rate}Hz, skipping resample");
        return Ok(input.to_vec());
    }

    debug!(
        input_rate,
        output_rate,
        frames = input.len(),
        "resampling"
    );

    let ratio = output_rate as f64 / input_rate as f64;
    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0,
        PolynomialDegree::Septic,
        input.len(),
        1,
    )
    .map_err(|e| AudioError::Resample(format!("create resampler: {e}")))?;

    let delay = resampler.output_delay();
    let expected = (input.len() as f64 * ratio).ceil() as usize;

    let mut output = resampler
        .process(&[input], None)
        .map_err(|e| AudioError::Resample(e.to_string()))?
        .pop()
        .unwrap_or_default();
    let tail = resampler
        .process_partial(None::<&[&[f32]]>, None)
        .map_err(|e| AudioError::Resample(format!("flush: {e}")))?
        .pop()
        .unwrap_or_default();
    output.extend(tail);

    Ok(output.into_iter().skip(delay).take(expected).collect())
}
