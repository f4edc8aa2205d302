//! Application services layer.

pub mod clock;
pub mod error;
pub mod jobs;
pub mod repos;
pub mod undo;
