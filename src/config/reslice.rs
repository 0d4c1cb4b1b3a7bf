use super::load_json;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration of the `reslice_demo` tool.
#[derive(Debug, Deserialize)]
pub struct ResliceDemoConfig {
    pub volume: PathBuf,
    /// Voxel-space point the reslice is centred on.
    pub center: [f64; 3],
    #[serde(default)]
    pub plane: ReslicePlaneConfig,
    pub output: ResliceOutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReslicePlaneConfig {
    pub x_axis: [f64; 3],
    pub y_axis: [f64; 3],
    pub width: usize,
    pub height: usize,
}

impl Default for ReslicePlaneConfig {
    fn default() -> Self {
        Self {
            x_axis: [1.0, 0.0, 0.0],
            y_axis: [0.0, 0.0, 1.0],
            width: 64,
            height: 64,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResliceOutputConfig {
    pub image: PathBuf,
    pub frame_json: PathBuf,
}

pub fn load_config(path: &Path) -> Result<ResliceDemoConfig, String> {
    load_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_defaults_to_xz() {
        let cfg: ResliceDemoConfig = serde_json::from_str(
            r#"{"volume": "v", "center": [1, 2, 3],
                "output": {"image": "r.png", "frame_json": "r.json"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.plane.width, 64);
        assert_eq!(cfg.plane.y_axis, [0.0, 0.0, 1.0]);
        assert_eq!(cfg.center, [1.0, 2.0, 3.0]);
    }
}
