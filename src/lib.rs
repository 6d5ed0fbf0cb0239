//! Book cover generator - turns book titles into AI-drafted cover concepts
//!
//! For each title the pipeline asks a text model for several cover
//! descriptions, renders each one with an image model, and saves the images
//! and descriptions side by side on disk.

pub mod ai;
pub mod error;
pub mod input;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod share;
pub mod storage;

pub use error::{Error, Result};
