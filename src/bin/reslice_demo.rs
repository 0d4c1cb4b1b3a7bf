use std::env;
use std::path::Path;
use volume_segmentation::config::reslice;
use volume_segmentation::image::io::write_json_file;
use volume_segmentation::reslice::{reslice_centered, save_reslice_png};
use volume_segmentation::types::Point3;
use volume_segmentation::volume::Volume;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = reslice::load_config(Path::new(&config_path))?;

    let volume = Volume::open(&config.volume)
        .map_err(|e| format!("Failed to open volume {}: {e}", config.volume.display()))?;
    let plane = &config.plane;
    let center = Point3::from(config.center);
    let slice = reslice_centered(
        &volume,
        &center,
        &Point3::from(plane.x_axis),
        &Point3::from(plane.y_axis),
        plane.width,
        plane.height,
    )
    .map_err(|e| e.to_string())?;

    save_reslice_png(&slice, &config.output.image).map_err(|e| e.to_string())?;
    write_json_file(&config.output.frame_json, &slice.frame()).map_err(|e| e.to_string())?;

    println!(
        "Saved {}x{} reslice centred on ({:.1}, {:.1}, {:.1}) to {}",
        slice.width(),
        slice.height(),
        center.x,
        center.y,
        center.z,
        config.output.image.display()
    );
    println!("Saved frame descriptor to {}", config.output.frame_json.display());
    Ok(())
}

fn usage() -> String {
    "Usage: reslice_demo <config.json>".to_string()
}
