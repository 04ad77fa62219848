//! Semantic sketch canvas: a raster drawing surface with bounded undo, a
//! brush palette that maps colors to meanings, and debounced pipelines that
//! send the sketch to an image synthesis service.

pub mod canvas;
pub mod cli;
pub mod components;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod settings;
