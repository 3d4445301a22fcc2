#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakLevel {
    pub max: f32,
    pub min: f32,
}

impl PeakLevel {
    pub fn silence() -> Self {
        Self { max: 0.0, min: 0.0 }
    }

    pub fn measure(buffer: &[f32]) -> Self {
        let mut peak = Self::silence();
        for sample in buffer {
            peak.max = peak.max.max(*sample);
            peak.min = peak.min.min(*sample);
        }
        peak
    }

    /// Largest absolute amplitude.
    pub fn absolute(&self) -> f32 {
        self.max.abs().max(self.min.abs())
    }
}

/// Averages interleaved channels into a single channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Scales the buffer so its absolute peak equals `target`.
///
/// Silent buffers are left untouched. Returns the level measured before scaling.
pub fn normalize_buffer(buffer: &mut [f32], target: f32) -> PeakLevel {
    let peak = PeakLevel::measure(buffer);
    let gain_base = peak.absolute();
    if gain_base > 0.0 {
        let gain = target / gain_base;
        for sample in buffer.iter_mut() {
            *sample *= gain;
        }
    }
    peak
}
