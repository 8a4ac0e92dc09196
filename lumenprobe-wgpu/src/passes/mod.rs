//! Render pass implementations for the IBL build.

pub mod cube_face;
