pub mod backend;
pub mod error;
pub mod fusion;
pub mod separator;

pub use backend::{DemucsCli, SeparationBackend};
pub use error::SeparationError;
pub use fusion::{fuse, max_stems, pad_stems, FusedStems, ModelStems};
pub use separator::StemSeparator;
