pub mod bbox;
pub mod coords;
pub mod kalman;
pub mod univariate;

pub use bbox::*;
pub use coords::*;
pub use kalman::*;
pub use univariate::*;
