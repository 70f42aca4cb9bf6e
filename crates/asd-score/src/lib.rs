pub mod score;
pub mod score_stream;

pub use score::*;
pub use score_stream::*;
