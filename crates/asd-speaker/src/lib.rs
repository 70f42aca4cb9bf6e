pub mod visual_speaker;

pub use visual_speaker::*;
