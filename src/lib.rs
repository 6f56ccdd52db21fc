//! Keeps a set of tracked boxes alive across a video stream.
//!
//! Detector output arrives in batches and is arbitrated against boxes
//! that an external optical-flow tracker follows from frame to frame.
//! See [MultiBoxTracker] for the entry points and [motion] for the
//! tracker the engine expects to be given.

pub mod association;
pub mod config;
pub mod error;
pub mod motion;
pub mod object;
pub mod registry;
pub mod session;
pub mod tracker;

#[cfg(test)]
mod scripted;

pub use error::TrackerError;
pub use tracker::*;
