use clap::{Args, Parser, Subcommand, ValueEnum};
use glam::Vec2;
use lumenprobe_ibl::IblConfig;

use crate::sources::PROCEDURAL_SKY;

#[derive(Parser)]
#[command(
    name = "lumenprobe",
    about = "Bake IBL cubemaps and local cubemap grids from HDR panoramas",
    version
)]
pub struct Cli {
    /// Render backend used for the build passes
    #[arg(long, global = true, default_value = "cpu", value_enum)]
    pub backend: BackendKind,

    #[command(flatten)]
    pub quality: QualityArgs,

    /// Give up after this many ticks
    #[arg(long, global = true, default_value_t = 100_000)]
    pub max_ticks: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build global cubemap sets, one per source, in order
    Bake {
        /// Equirectangular .hdr/.exr panoramas, or "@sky" for the built-in sky
        #[arg(required = true)]
        sources: Vec<String>,
    },
    /// Build a local cubemap grid over a footprint and probe it
    Grid(GridArgs),
}

#[derive(Args, Clone, Debug)]
pub struct GridArgs {
    /// Footprint minimum corner as X,Z
    #[arg(long, value_parser = parse_xz, allow_hyphen_values = true)]
    pub min: Vec2,
    /// Footprint maximum corner as X,Z
    #[arg(long, value_parser = parse_xz, allow_hyphen_values = true)]
    pub max: Vec2,
    /// Grid cell edge length in world units
    #[arg(long, default_value_t = 5.0)]
    pub cell_size: f32,
    /// Panorama every cell is captured from
    #[arg(long, default_value = PROCEDURAL_SKY)]
    pub source: String,
    /// Global set composited under the grid
    #[arg(long, default_value = PROCEDURAL_SKY)]
    pub global: String,
    /// Probe points sampled along the footprint diagonal (cpu backend only)
    #[arg(long, default_value_t = 5)]
    pub probes: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Deterministic software backend
    Cpu,
    /// Headless wgpu device
    Wgpu,
}

impl BackendKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Wgpu => "wgpu",
        }
    }
}

/// Overrides for [`IblConfig`]. Unset flags keep the defaults.
#[derive(Args, Clone, Debug, Default)]
pub struct QualityArgs {
    /// Face size of the base cubemap
    #[arg(long, global = true)]
    pub base_resolution: Option<u32>,
    /// Face size of the irradiance cubemap
    #[arg(long, global = true)]
    pub irradiance_resolution: Option<u32>,
    /// Face size of mip 0 of the environment cubemap
    #[arg(long, global = true)]
    pub environment_resolution: Option<u32>,
    /// Number of roughness mips in the environment cubemap
    #[arg(long, global = true)]
    pub roughness_mips: Option<u32>,
    /// GGX samples per prefiltered texel
    #[arg(long, global = true)]
    pub prefilter_samples: Option<u32>,
    /// Hemisphere step of the irradiance integral, in radians
    #[arg(long, global = true)]
    pub irradiance_step: Option<f32>,
}

impl QualityArgs {
    pub fn apply(&self, mut config: IblConfig) -> IblConfig {
        if let Some(v) = self.base_resolution {
            config = config.with_base_resolution(v);
        }
        if let Some(v) = self.irradiance_resolution {
            config = config.with_irradiance_resolution(v);
        }
        if let Some(v) = self.environment_resolution {
            config = config.with_environment_resolution(v);
        }
        if let Some(v) = self.roughness_mips {
            config = config.with_roughness_mip_count(v);
        }
        if let Some(v) = self.prefilter_samples {
            config = config.with_prefilter_sample_count(v);
        }
        if let Some(v) = self.irradiance_step {
            config = config.with_irradiance_sample_delta(v);
        }
        config
    }
}

/// Parse "x,z" into a ground-plane point.
pub fn parse_xz(s: &str) -> Result<Vec2, String> {
    let (x, z) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Z, got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f32>()
            .map_err(|e| format!("invalid coordinate '{v}': {e}"))
    };
    Ok(Vec2::new(parse(x)?, parse(z)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_xz() {
        assert_eq!(parse_xz("1.5,-2").unwrap(), Vec2::new(1.5, -2.0));
        assert_eq!(parse_xz(" 0 , 3 ").unwrap(), Vec2::new(0.0, 3.0));
        assert!(parse_xz("1.5").is_err());
        assert!(parse_xz("a,b").is_err());
    }

    #[test]
    fn test_quality_overrides_only_set_fields() {
        let args = QualityArgs {
            base_resolution: Some(64),
            roughness_mips: Some(3),
            ..Default::default()
        };
        let config = args.apply(IblConfig::default());
        assert_eq!(config.base_resolution, 64);
        assert_eq!(config.roughness_mip_count, 3);
        assert_eq!(config.environment_resolution, IblConfig::default().environment_resolution);
    }

    #[test]
    fn test_grid_command_parses() {
        let cli = Cli::try_parse_from([
            "lumenprobe",
            "--backend",
            "cpu",
            "grid",
            "--min",
            "-5,-5",
            "--max",
            "5,5",
            "--cell-size",
            "2.5",
        ])
        .unwrap();
        assert_eq!(cli.backend, BackendKind::Cpu);
        match cli.command {
            Command::Grid(args) => {
                assert_eq!(args.min, Vec2::new(-5.0, -5.0));
                assert_eq!(args.max, Vec2::new(5.0, 5.0));
                assert_eq!(args.cell_size, 2.5);
                assert_eq!(args.source, PROCEDURAL_SKY);
                assert_eq!(args.probes, 5);
            }
            Command::Bake { .. } => panic!("expected grid"),
        }
    }
}
