/// Embedded WGSL shader source strings for the IBL build passes.
/// `CUBE_COMMON` has no entry points; prepend it to any fragment module that
/// needs cube directions or GGX sampling (see [`with_cube_common`]).

pub const FULLSCREEN_QUAD_VERT: &str = include_str!("../shaders/fullscreen_quad.wgsl");
pub const CUBE_COMMON: &str = include_str!("../shaders/cube_common.wgsl");
pub const EQUIRECT_TO_CUBE_FRAG: &str = include_str!("../shaders/equirect_to_cube.wgsl");
pub const DOWNSAMPLE_FRAG: &str = include_str!("../shaders/downsample.wgsl");
pub const IRRADIANCE_FRAG: &str = include_str!("../shaders/irradiance.wgsl");
pub const PREFILTER_FRAG: &str = include_str!("../shaders/prefilter.wgsl");
/// Shading-time local/global blend. Library module: callers append their own
/// entry points after it.
pub const IBL_SAMPLE: &str = include_str!("../shaders/ibl_sample.wgsl");

/// Concatenate the shared cube helpers in front of `source`.
pub fn with_cube_common(source: &str) -> String {
    let mut out = String::with_capacity(CUBE_COMMON.len() + source.len() + 1);
    out.push_str(CUBE_COMMON);
    out.push('\n');
    out.push_str(source);
    out
}
