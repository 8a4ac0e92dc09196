mod cli;
mod commands;
mod sources;

use anyhow::Result;
use clap::Parser;
use lumenprobe_ibl::backend::cpu::CpuBackend;
use lumenprobe_ibl::IblConfig;
use lumenprobe_wgpu::WgpuBackend;

use cli::{BackendKind, Cli, Command};
use commands::{bake, finish, grid};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.quality.apply(IblConfig::default());
    config.validate()?;
    log::info!("Using the {} backend", cli.backend.label());

    match (cli.backend, &cli.command) {
        (BackendKind::Cpu, Command::Bake { sources }) => {
            let mut system = bake::build(CpuBackend::new(), config, sources, cli.max_ticks)?;
            bake::report_radiance(&mut system);
            let backend = finish(system)?;
            log::info!("CPU backend stats: {:?}", backend.stats());
        }
        (BackendKind::Wgpu, Command::Bake { sources }) => {
            let backend = WgpuBackend::new_headless()?;
            let system = bake::build(backend, config, sources, cli.max_ticks)?;
            let backend = finish(system)?;
            log::info!("{} draws recorded on {}", backend.recorded_draws(), backend.adapter_info().name);
        }
        (BackendKind::Cpu, Command::Grid(args)) => {
            let system = grid::build(CpuBackend::new(), config, args, cli.max_ticks)?;
            grid::report_probes(&system, args);
            let backend = finish(system)?;
            log::info!("CPU backend stats: {:?}", backend.stats());
        }
        (BackendKind::Wgpu, Command::Grid(args)) => {
            let backend = WgpuBackend::new_headless()?;
            let system = grid::build(backend, config, args, cli.max_ticks)?;
            log::info!("Probe sampling reads textures on the host; rerun with --backend cpu to print probes");
            finish(system)?;
        }
    }
    Ok(())
}
