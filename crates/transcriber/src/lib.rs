pub mod backend;
pub mod error;
pub mod transcriber;

pub use backend::{BasicPitchCli, TranscriptionBackend};
pub use error::TranscriberError;
pub use transcriber::{Transcriber, MANAGED_EXTENSIONS};
