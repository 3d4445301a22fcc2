pub mod dsp;
pub mod error;
pub mod io;
pub mod normalize;
pub mod resample;

pub use dsp::{downmix_to_mono, normalize_buffer, PeakLevel};
pub use error::AudioError;
pub use io::{write_wav, AudioDecoder, DecodedAudio};
pub use normalize::Normalizer;
pub use resample::resample_mono;
