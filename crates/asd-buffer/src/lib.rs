pub mod asd_buffer;
pub mod frame_history;
pub mod model_pool;
pub mod pool;
pub mod scheduler;

pub use asd_buffer::*;
pub use frame_history::*;
pub use model_pool::*;
pub use pool::*;
pub use scheduler::*;
