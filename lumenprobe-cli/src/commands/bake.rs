use anyhow::Result;
use glam::Vec3;
use lumenprobe_ibl::backend::CubeSource;
use lumenprobe_ibl::{CubemapSet, IblConfig, IblLookup, IblSystem, RenderBackend};

use super::drive;
use crate::sources::SourceLoader;

/// Enqueue every source in order and build until idle.
pub fn build<B: RenderBackend>(
    backend: B,
    config: IblConfig,
    sources: &[String],
    max_ticks: usize,
) -> Result<IblSystem<B, SourceLoader>> {
    let mut system = IblSystem::new(backend, SourceLoader::new(), config)?;
    for source in sources {
        system.enqueue_source(source);
    }
    println!(
        "Baking {} source(s), {} stages each",
        sources.len(),
        system.plan().stages_per_job()
    );

    let summary = drive(&mut system, max_ticks)?;
    for index in 0..system.resolved_count() {
        if let Some(set) = system.resolved_cubemap(index) {
            println!("{}", describe_set(index, set));
        }
    }
    println!(
        "{} resolved, {} skipped in {} ticks",
        summary.completed, summary.failed, summary.ticks
    );
    Ok(system)
}

pub fn describe_set(index: usize, set: &CubemapSet) -> String {
    format!(
        "  [{index}] base {}px x{} mips, irradiance {}px, environment {}px x{} roughness mips",
        set.base_resolution,
        set.base_mip_count,
        set.irradiance_resolution,
        set.environment_resolution,
        set.roughness_mip_count
    )
}

/// Print sky and ground irradiance of every resolved set.
pub fn report_radiance<B: RenderBackend + CubeSource>(system: &mut IblSystem<B, SourceLoader>) {
    for index in 0..system.resolved_count() {
        system.select_global(index);
        let up = system.sample_ibl(Vec3::ZERO, Vec3::Y, IblLookup::Irradiance);
        let down = system.sample_ibl(Vec3::ZERO, Vec3::NEG_Y, IblLookup::Irradiance);
        if let (Some(up), Some(down)) = (up, down) {
            println!(
                "  [{index}] irradiance up {:.3} down {:.3}",
                up.color, down.color
            );
        }
    }
}
