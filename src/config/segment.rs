use super::load_json;
use crate::pointset::resolve_target;
use crate::segmentation::PropagationOptions;
use crate::volume::parse_memory_size;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration of the `segment` tool.
#[derive(Debug, Deserialize)]
pub struct SegmentToolConfig {
    /// Volume directory holding `meta.json` and the slice images.
    pub volume: PathBuf,
    /// Previously segmented point set providing the seed row.
    pub input: PathBuf,
    pub output: PathBuf,
    /// Z level of the seed row. Defaults to the highest z in `input`.
    #[serde(default)]
    pub start_index: Option<i64>,
    #[serde(default)]
    pub end_index: Option<i64>,
    /// Number of slices to propagate past the start. Exclusive with
    /// `end_index`.
    #[serde(default)]
    pub stride: Option<i64>,
    /// Slice cache ceiling, e.g. `"512M"` or `"2GB"`.
    #[serde(default = "default_cache_budget")]
    pub cache_budget: String,
    /// Chain width is taken from the input point set when left at zero.
    #[serde(default)]
    pub propagation: PropagationOptions,
    /// When set, reslices around each seed particle are written here.
    #[serde(default)]
    pub debug_dir: Option<PathBuf>,
    /// Optional JSON dump of the run report.
    #[serde(default)]
    pub report: Option<PathBuf>,
}

fn default_cache_budget() -> String {
    "1G".to_string()
}

impl SegmentToolConfig {
    pub fn cache_budget_bytes(&self) -> Result<usize, String> {
        parse_memory_size(&self.cache_budget).map_err(|e| e.to_string())
    }

    pub fn target_index(&self, start: i64) -> Result<i64, String> {
        resolve_target(start, self.end_index, self.stride).map_err(|e| e.to_string())
    }

    /// Propagation options with a zero chain width replaced by
    /// `declared_width`, the width of the input point set.
    pub fn propagation_options(&self, declared_width: usize) -> PropagationOptions {
        let mut options = self.propagation.clone();
        if options.chain_width == 0 {
            options.chain_width = declared_width;
        }
        options
    }
}

pub fn load_config(path: &Path) -> Result<SegmentToolConfig, String> {
    load_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg: SegmentToolConfig = serde_json::from_str(
            r#"{"volume": "vol", "input": "in.json", "output": "out.json", "stride": 5}"#,
        )
        .unwrap();
        assert_eq!(cfg.cache_budget_bytes().unwrap(), 1 << 30);
        assert_eq!(cfg.target_index(10).unwrap(), 15);
        assert_eq!(cfg.propagation.optimization_iterations, 15);
        assert!(cfg.debug_dir.is_none());
        assert_eq!(cfg.propagation_options(7).chain_width, 7);
    }

    #[test]
    fn explicit_chain_width_is_kept() {
        let cfg: SegmentToolConfig = serde_json::from_str(
            r#"{"volume": "v", "input": "i", "output": "o",
                "propagation": {"chain_width": 4}}"#,
        )
        .unwrap();
        assert_eq!(cfg.propagation_options(9).chain_width, 4);
    }

    #[test]
    fn end_and_stride_conflict() {
        let cfg: SegmentToolConfig = serde_json::from_str(
            r#"{"volume": "v", "input": "i", "output": "o", "end_index": 20, "stride": 5,
                "cache_budget": "64M", "propagation": {"step_size": 2}}"#,
        )
        .unwrap();
        assert!(cfg.target_index(10).is_err());
        assert_eq!(cfg.cache_budget_bytes().unwrap(), 64 << 20);
        assert_eq!(cfg.propagation.step_size, 2);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/segment.json")).unwrap_err();
        assert!(err.contains("/nonexistent/segment.json"));
    }
}
