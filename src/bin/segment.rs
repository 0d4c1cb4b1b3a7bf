use std::env;
use std::path::Path;
use std::sync::Arc;
use volume_segmentation::config::segment;
use volume_segmentation::image::io::write_json_file;
use volume_segmentation::pointset::{load_point_set, prepare_seed, save_point_set};
use volume_segmentation::reslice::save_reslice_png;
use volume_segmentation::segmentation::candidates::{estimate_normal, particle_reslice};
use volume_segmentation::segmentation::{spawn_propagation, PropagationEngine, RunStatus};
use volume_segmentation::types::Point3;
use volume_segmentation::volume::{
    bytes_to_memory_size, DirectorySliceStore, ScalarVolume, Volume,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = segment::load_config(Path::new(&config_path))?;

    let budget = config.cache_budget_bytes()?;
    let volume = Volume::open(&config.volume)
        .map_err(|e| format!("Failed to open volume {}: {e}", config.volume.display()))?
        .with_cache_budget(budget);
    let volume = Arc::new(volume);

    let master = load_point_set(&config.input)
        .map_err(|e| format!("Failed to load point set {}: {e}", config.input.display()))?;
    let split = prepare_seed(&master, config.start_index).map_err(|e| e.to_string())?;
    let start = split.start_index;
    let target = config.target_index(start)?;

    let options = config.propagation_options(master.width());
    let engine = PropagationEngine::new(options).map_err(|e| e.to_string())?;

    if let Some(dir) = &config.debug_dir {
        dump_seed_reslices(volume.as_ref(), &engine, &split.seed, dir)?;
    }

    println!(
        "Propagating {} particles from z={} to z={} (cache budget {})",
        split.seed.len(),
        start,
        target,
        bytes_to_memory_size(budget, "M").map_err(|e| e.to_string())?
    );
    let handle = spawn_propagation(engine, Arc::clone(&volume), split.seed, start, target)
        .map_err(|e| e.to_string())?;
    let outcome = handle.join().map_err(|e| e.to_string())?;

    let mut result = split.immutable;
    result
        .append(&outcome.points)
        .map_err(|e| format!("Failed to merge result rows: {e}"))?;
    save_point_set(&config.output, &result)
        .map_err(|e| format!("Failed to save {}: {e}", config.output.display()))?;

    if let Some(path) = &config.report {
        write_json_file(path, &outcome.report).map_err(|e| e.to_string())?;
        println!("Saved run report to {}", path.display());
    }

    let status = match outcome.status {
        RunStatus::Completed => "completed",
        RunStatus::Cancelled => "cancelled",
    };
    let stats = volume.cache().stats();
    println!(
        "Run {status}: {} step(s), {} sentinel(s) in last row, {:.1} ms",
        outcome.steps, outcome.sentinel_count, outcome.report.timings.total_ms
    );
    println!(
        "Slice cache: {} hits, {} misses, {} evictions",
        stats.hits, stats.misses, stats.evictions
    );
    println!(
        "Saved {}x{} points to {}",
        result.width(),
        result.height(),
        config.output.display()
    );
    Ok(())
}

fn dump_seed_reslices(
    volume: &Volume<DirectorySliceStore>,
    engine: &PropagationEngine,
    seed: &[Point3],
    dir: &Path,
) -> Result<(), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create {}: {e}", dir.display()))?;
    let options = engine.options();
    let radius = options.tensor_radius(volume.voxel_size());
    let digits = seed.len().to_string().len();
    for i in 0..seed.len() {
        let (normal, _) = estimate_normal(volume, seed, i, options.normal_estimation, radius);
        let reslice = particle_reslice(volume, &seed[i], &normal, options.reslice_size)
            .map_err(|e| e.to_string())?;
        let path = dir.join(format!("reslice_{i:0digits$}.png"));
        save_reslice_png(&reslice, &path).map_err(|e| e.to_string())?;
    }
    println!("Saved {} seed reslices to {}", seed.len(), dir.display());
    Ok(())
}

fn usage() -> String {
    "Usage: segment <config.json>".to_string()
}
