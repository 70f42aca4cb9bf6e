pub mod collaborators;
pub mod detection;
pub mod gallery;
pub mod track;
pub mod tracker;

pub use collaborators::*;
pub use detection::*;
pub use gallery::*;
pub use track::*;
pub use tracker::*;
