//! Lumenprobe IBL core: progressive image-based-lighting precomputation.
//!
//! Turns equirectangular HDR panoramas into irradiance and roughness-mipped
//! environment cubemaps one stage per tick, builds a grid of local cubemaps
//! the same way, and blends them at shading time. Rendering goes through the
//! [`backend::RenderBackend`] trait; [`backend::cpu::CpuBackend`] is a
//! deterministic software implementation.

pub mod backend;
pub mod blend;
pub mod config;
pub mod cube;
pub mod environment;
pub mod error;
pub mod grid;
pub mod handle;
pub mod irradiance;
pub mod job;
pub mod loader;
pub mod mip_chain;
pub mod projector;
pub mod release;
pub mod sampling;
pub mod scheduler;
pub mod system;

pub use backend::{RenderBackend, TextureHandle};
pub use blend::{BlendedSample, CubeSampler, IblLookup, LocalSample};
pub use config::{IblConfig, ProbeBlendConfig};
pub use error::{BackendError, IblError, SourceLoadError};
pub use grid::{Footprint, LocalCaptureSource, LocalGridDescriptor};
pub use job::{BuildStage, CubemapSet};
pub use loader::{EquirectImage, HdrFileLoader, ImageLoader, InMemoryLoader};
pub use scheduler::StepOutcome;
pub use system::IblSystem;
