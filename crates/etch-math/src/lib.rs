//! Numerical primitives for the beam etch simulator.

pub mod delaunay;
pub mod fft;
pub mod filter;
pub mod linalg;
pub mod scatter;
pub mod stats;
