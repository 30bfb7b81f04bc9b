//! raywave: a real-time wavefront path tracer on wgpu compute.
//!
//! The host side orchestrates a ~15-stage compute pipeline per frame:
//! it lays the scene out for coherent device access, keeps persistent ray
//! pools alive across bounces, drives the trace/sort/shade/shadow loop in
//! batches, and threads an SVGF + TAA post chain behind the sampling stage.
//! Device kernels live in `src/shaders/` and are addressed through the
//! named symbols and entry points of [`module::KernelModule`].

pub mod accel;
pub mod arena;
pub mod camera;
pub mod error;
pub mod gbuffer;
pub mod gpu;
pub mod input;
pub mod module;
pub mod scene;
pub mod session;
pub mod svgf;
pub mod taa;
pub mod timing;
pub mod wavefront;

pub use error::{RenderError, RenderResult};
pub use session::Session;
pub use wavefront::Settings;
