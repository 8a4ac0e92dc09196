use anyhow::Result;
use glam::Vec3;
use lumenprobe_ibl::backend::CubeSource;
use lumenprobe_ibl::grid::CellStatus;
use lumenprobe_ibl::{IblConfig, IblLookup, IblSystem, LocalCaptureSource, RenderBackend};

use super::drive;
use crate::cli::GridArgs;
use crate::sources::SourceLoader;

/// Build the global set, then every cell of a grid over the footprint.
pub fn build<B: RenderBackend>(
    backend: B,
    config: IblConfig,
    args: &GridArgs,
    max_ticks: usize,
) -> Result<IblSystem<B, SourceLoader>> {
    let mut system = IblSystem::new(backend, SourceLoader::new(), config)?;
    system.enqueue_source(&args.global);
    let descriptor = system.init_local_grid(
        args.min,
        args.max,
        args.cell_size,
        LocalCaptureSource::Shared(args.source.clone().into()),
    )?;
    println!(
        "Grid {}x{} cells of {} at ({}, {})",
        descriptor.width, descriptor.height, descriptor.cell_size, descriptor.origin.x, descriptor.origin.y
    );

    let summary = drive(&mut system, max_ticks)?;
    let failed = failed_cells(&system);
    if !failed.is_empty() {
        println!("Failed cells: {failed:?}");
    }
    println!(
        "Grid {} after {} ticks ({} built, {} failed)",
        if system.is_local_grid_ready() { "ready" } else { "not ready" },
        summary.ticks,
        summary.completed,
        summary.failed
    );
    Ok(system)
}

pub fn failed_cells<B: RenderBackend>(system: &IblSystem<B, SourceLoader>) -> Vec<(u32, u32)> {
    let Some(grid) = system.local_grid() else {
        return Vec::new();
    };
    let descriptor = grid.descriptor();
    (0..descriptor.cell_count())
        .map(|slice| descriptor.cell_of_slice(slice))
        .filter(|&(col, row)| grid.cell_status(col, row) == Some(CellStatus::Failed))
        .collect()
}

/// Evenly spaced ground points from `min` to `max`, inclusive.
pub fn probe_points(args: &GridArgs) -> Vec<Vec3> {
    let count = args.probes.max(1);
    (0..count)
        .map(|i| {
            let t = if count == 1 { 0.5 } else { i as f32 / (count - 1) as f32 };
            let xz = args.min.lerp(args.max, t);
            Vec3::new(xz.x, 0.0, xz.y)
        })
        .collect()
}

/// Print upward irradiance and the local weight at each probe point.
pub fn report_probes<B: RenderBackend + CubeSource>(system: &IblSystem<B, SourceLoader>, args: &GridArgs) {
    for p in probe_points(args) {
        match system.sample_ibl(p, Vec3::Y, IblLookup::Irradiance) {
            Some(sample) => println!(
                "  ({:.2}, {:.2}) alpha {:.2} irradiance {:.3}",
                p.x, p.z, sample.local.alpha, sample.color
            ),
            None => println!("  ({:.2}, {:.2}) no global set", p.x, p.z),
        }
    }
}
