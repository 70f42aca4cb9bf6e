pub mod engine;
pub mod frame;
pub mod output;

pub use engine::*;
pub use frame::*;
pub use output::*;
