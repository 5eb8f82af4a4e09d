pub mod encoder;
pub mod policy;

pub use encoder::{spawn_transcode, TranscodeError};
pub use policy::{OptimizationPolicy, SourceFormat, POLICY};
