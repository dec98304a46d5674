use sightline_core::assets::{FACE_MODEL_FILE, LABELS_FILE, WEIGHTS_FILE};
use sightline_core::detector::{is_valid_threshold, SCRFD_CONFIDENCE_THRESHOLD};
use sightline_core::FaceSource;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the weights, label list and SCRFD model (default: models).
    pub model_dir: PathBuf,
    /// Directory annotated images are written to (default: output).
    pub output_dir: PathBuf,
    /// Listen address (default: 0.0.0.0:8000).
    pub bind_addr: SocketAddr,
    /// SCRFD ONNX model path (default: `$MODEL_DIR/det_10g.onnx`).
    pub face_model_path: PathBuf,
    /// Minimum SCRFD score for a detection. Values outside [0, 1] fall back to the default.
    pub face_threshold: f32,
    /// SHA-256 (or prefix) the downloaded SCRFD model must match.
    pub face_model_sha256: Option<String>,
    /// Analyze this file instead of the upload, when set.
    pub face_reference_image: Option<PathBuf>,
    /// Download missing model assets at startup.
    pub fetch_assets: bool,
    /// Pending requests the engine channel holds before handlers wait.
    pub queue_depth: usize,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = get("MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("models"));

        let face_model_path = get("FACE_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| model_dir.join(FACE_MODEL_FILE));

        Self {
            output_dir: get("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            bind_addr: parse_or(get("BIND_ADDR"), SocketAddr::from(([0, 0, 0, 0], 8000))),
            face_model_path,
            face_threshold: get("FACE_DET_THRESHOLD")
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|t| is_valid_threshold(*t))
                .unwrap_or(SCRFD_CONFIDENCE_THRESHOLD),
            face_model_sha256: get("FACE_MODEL_SHA256").filter(|v| !v.trim().is_empty()),
            face_reference_image: get("FACE_REFERENCE_IMAGE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            fetch_assets: get("SKIP_ASSET_FETCH").map(|v| v == "0").unwrap_or(true),
            queue_depth: parse_or(get("ENGINE_QUEUE_DEPTH"), 4usize).max(1),
            model_dir,
        }
    }

    /// Path to the ResNet-50 weights.
    pub fn weights_path(&self) -> PathBuf {
        self.model_dir.join(WEIGHTS_FILE)
    }

    /// Path to the label list.
    pub fn labels_path(&self) -> PathBuf {
        self.model_dir.join(LABELS_FILE)
    }

    pub fn face_source(&self) -> FaceSource {
        match &self.face_reference_image {
            Some(path) => FaceSource::Reference(path.clone()),
            None => FaceSource::Upload,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.model_dir, PathBuf::from("models"));
        assert_eq!(cfg.output_dir, PathBuf::from("output"));
        assert_eq!(cfg.bind_addr.port(), 8000);
        assert_eq!(cfg.weights_path(), PathBuf::from("models/resnet50.pth"));
        assert_eq!(cfg.labels_path(), PathBuf::from("models/imagenet_classes.txt"));
        assert_eq!(cfg.face_model_path, PathBuf::from("models/det_10g.onnx"));
        assert_eq!(cfg.face_source(), FaceSource::Upload);
        assert!(cfg.fetch_assets);
        assert_eq!(cfg.queue_depth, 4);
    }

    #[test]
    fn test_model_dir_moves_derived_paths() {
        let cfg = config(&[("MODEL_DIR", "/srv/models")]);
        assert_eq!(cfg.weights_path(), PathBuf::from("/srv/models/resnet50.pth"));
        assert_eq!(cfg.face_model_path, PathBuf::from("/srv/models/det_10g.onnx"));
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("FACE_DET_THRESHOLD", "0.7"),
            ("FACE_REFERENCE_IMAGE", "t1.jpg"),
            ("SKIP_ASSET_FETCH", "1"),
            ("ENGINE_QUEUE_DEPTH", "0"),
        ]);
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert!((cfg.face_threshold - 0.7).abs() < 1e-6);
        assert_eq!(cfg.face_source(), FaceSource::Reference(PathBuf::from("t1.jpg")));
        assert!(!cfg.fetch_assets);
        assert_eq!(cfg.queue_depth, 1);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let cfg = config(&[("BIND_ADDR", "nope"), ("FACE_DET_THRESHOLD", "high")]);
        assert_eq!(cfg.bind_addr.port(), 8000);
        assert!((cfg.face_threshold - SCRFD_CONFIDENCE_THRESHOLD).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_threshold_falls_back() {
        for raw in ["NaN", "nan", "-0.2", "1.5", "inf"] {
            let cfg = config(&[("FACE_DET_THRESHOLD", raw)]);
            assert!(
                (cfg.face_threshold - SCRFD_CONFIDENCE_THRESHOLD).abs() < 1e-6,
                "{raw} should fall back"
            );
        }
        let cfg = config(&[("FACE_DET_THRESHOLD", "1")]);
        assert!((cfg.face_threshold - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_face_model_hash_pin() {
        assert_eq!(config(&[]).face_model_sha256, None);
        assert_eq!(config(&[("FACE_MODEL_SHA256", " ")]).face_model_sha256, None);
        let cfg = config(&[("FACE_MODEL_SHA256", "0123abcd")]);
        assert_eq!(cfg.face_model_sha256.as_deref(), Some("0123abcd"));
    }
}
