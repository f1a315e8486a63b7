//! Dwell-time synthesis for ion-beam etching.
//!
//! Pipeline: thickness interpolation → etch depth → beam projection →
//! Wiener deconvolution → velocity map → forward validation.
//! Around it: trajectory and stage recipes, the outlier refinement loop,
//! CSV I/O and the simulation log.

pub mod beam;
pub mod depth;
pub mod dwell;
pub mod io;
pub mod pipeline;
pub mod recipe;
pub mod refine;
pub mod report;
pub mod thickness;
pub mod trajectory;
pub mod validate;
pub mod velocity;
