pub mod bake;
pub mod grid;

use anyhow::{bail, Result};
use lumenprobe_ibl::{IblSystem, ImageLoader, RenderBackend, StepOutcome};

/// Tallies from one [`drive`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriveSummary {
    pub ticks: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Advance `system` one stage per tick until nothing is left to build.
pub fn drive<B: RenderBackend, L: ImageLoader>(
    system: &mut IblSystem<B, L>,
    max_ticks: usize,
) -> Result<DriveSummary> {
    let mut summary = DriveSummary::default();
    while summary.ticks < max_ticks {
        let outcome = system.advance()?;
        if outcome.is_idle() {
            log::info!(
                "Build idle after {} ticks ({} built, {} failed)",
                summary.ticks,
                summary.completed,
                summary.failed
            );
            return Ok(summary);
        }
        summary.ticks += 1;
        record(&mut summary, outcome);
    }
    bail!("build still running after {max_ticks} ticks")
}

fn record(summary: &mut DriveSummary, outcome: StepOutcome) {
    match outcome {
        StepOutcome::Idle => {}
        StepOutcome::Progressed { stage } => log::debug!("Global stage {stage:?}"),
        StepOutcome::CellProgressed { col, row, stage } => {
            log::debug!("Cell ({col}, {row}) stage {stage:?}")
        }
        StepOutcome::Completed { index } => {
            log::info!("Resolved global set {index}");
            summary.completed += 1;
        }
        StepOutcome::CellCompleted { col, row, grid_ready } => {
            log::info!("Cell ({col}, {row}) done");
            if grid_ready {
                log::info!("Local grid ready");
            }
            summary.completed += 1;
        }
        StepOutcome::SourceFailed { source, error } => {
            log::warn!("Skipped {}: {error}", source.display());
            summary.failed += 1;
        }
        StepOutcome::CellFailed { col, row, error } => {
            log::warn!("Cell ({col}, {row}) failed: {error}");
            summary.failed += 1;
        }
    }
}

/// Shut the system down and report what the backend released.
pub fn finish<B: RenderBackend, L: ImageLoader>(system: IblSystem<B, L>) -> Result<B> {
    let backend = system.shutdown()?;
    println!("All build textures released");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenprobe_ibl::backend::cpu::CpuBackend;
    use lumenprobe_ibl::{EquirectImage, IblConfig, InMemoryLoader};

    fn small_config() -> IblConfig {
        IblConfig::default()
            .with_base_resolution(8)
            .with_irradiance_resolution(4)
            .with_environment_resolution(8)
            .with_roughness_mip_count(2)
            .with_prefilter_sample_count(8)
            .with_irradiance_sample_delta(0.5)
    }

    #[test]
    fn test_drive_counts_successes_and_failures() {
        let loader = InMemoryLoader::new().with_image("sky", EquirectImage::procedural_sky(16, 8));
        let mut system = IblSystem::new(CpuBackend::new(), loader, small_config()).unwrap();
        system.enqueue_source("sky");
        system.enqueue_source("missing");

        let summary = drive(&mut system, 1_000).unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(system.resolved_count(), 1);

        let backend = finish(system).unwrap();
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_drive_gives_up_at_tick_limit() {
        let loader = InMemoryLoader::new().with_image("sky", EquirectImage::procedural_sky(16, 8));
        let mut system = IblSystem::new(CpuBackend::new(), loader, small_config()).unwrap();
        system.enqueue_source("sky");
        assert!(drive(&mut system, 2).is_err());
    }
}
