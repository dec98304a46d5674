//! Fetch the classifier weights, label list and SCRFD model into the model
//! directory.
//!
//! Downloads only happen for files that are absent. Failures are reported
//! per asset and never abort the caller; a still-missing file surfaces
//! later as a model load error.

use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const WEIGHTS_URL: &str = "https://download.pytorch.org/models/resnet50-0676ba61.pth";
pub const LABELS_URL: &str = "https://raw.githubusercontent.com/pytorch/hub/master/imagenet_classes.txt";
pub const WEIGHTS_FILE: &str = "resnet50.pth";
pub const LABELS_FILE: &str = "imagenet_classes.txt";
pub const FACE_MODEL_URL: &str =
    "https://huggingface.co/public-data/insightface/resolve/main/models/buffalo_l/det_10g.onnx";
pub const FACE_MODEL_FILE: &str = "det_10g.onnx";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const GLOBAL_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Error, Debug)]
pub enum AssetFetchError {
    #[error("http: {0}")]
    Http(#[from] ureq::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("SHA256 mismatch for {file}: expected prefix {expected}, got {actual}")]
    HashMismatch {
        file: String,
        expected: String,
        actual: String,
    },
}

/// What happened to one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    Present,
    Downloaded,
}

/// Local paths of the model assets under one model directory.
#[derive(Debug, Clone)]
pub struct AssetPaths {
    pub weights: PathBuf,
    pub labels: PathBuf,
    pub face_model: PathBuf,
}

impl AssetPaths {
    pub fn in_dir(model_dir: &Path) -> Self {
        Self {
            weights: model_dir.join(WEIGHTS_FILE),
            labels: model_dir.join(LABELS_FILE),
            face_model: model_dir.join(FACE_MODEL_FILE),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [self.weights.as_path(), self.labels.as_path(), self.face_model.as_path()]
    }
}

/// Ensure every model asset exists under `model_dir`, logging failures.
///
/// `face_model_sha256` pins the SCRFD download, whose URL carries no hash.
/// Without it the file is fetched unverified and its digest is logged.
pub fn provision(model_dir: &Path, face_model_sha256: Option<&str>) -> AssetPaths {
    let paths = AssetPaths::in_dir(model_dir);
    if let Err(e) = std::fs::create_dir_all(model_dir) {
        tracing::error!(dir = %model_dir.display(), error = %e, "cannot create model directory");
        return paths;
    }

    let assets = [
        (WEIGHTS_URL, &paths.weights, None),
        (LABELS_URL, &paths.labels, None),
        (FACE_MODEL_URL, &paths.face_model, face_model_sha256),
    ];
    for (url, dest, sha256) in assets {
        match ensure_asset(url, dest, sha256) {
            Ok(AssetStatus::Present) => {
                tracing::info!(path = %dest.display(), "asset already present");
            }
            Ok(AssetStatus::Downloaded) => {
                tracing::info!(path = %dest.display(), url, "asset downloaded");
            }
            Err(e) => {
                tracing::error!(path = %dest.display(), url, error = %e, "asset download failed");
            }
        }
    }

    paths
}

/// Download `url` to `dest` unless `dest` already exists.
///
/// The download is checked against `sha256` (a full digest or a prefix) when
/// given, otherwise against the hash embedded in a torchvision file name.
pub fn ensure_asset(url: &str, dest: &Path, sha256: Option<&str>) -> Result<AssetStatus, AssetFetchError> {
    if dest.exists() {
        return Ok(AssetStatus::Present);
    }
    let expected = sha256
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .or_else(|| expected_hash_prefix(url));
    download_file(url, dest, expected.as_deref())?;
    Ok(AssetStatus::Downloaded)
}

/// Torchvision names checkpoints `<name>-<first 8+ hex of sha256>.<ext>`.
pub fn expected_hash_prefix(url: &str) -> Option<String> {
    let file = url.rsplit('/').next()?;
    let stem = file.split('.').next()?;
    let (_, suffix) = stem.rsplit_once('-')?;
    let is_hex = suffix.len() >= 8 && suffix.chars().all(|c| c.is_ascii_hexdigit());
    is_hex.then(|| suffix.to_ascii_lowercase())
}

fn download_file(url: &str, dest: &Path, expected_prefix: Option<&str>) -> Result<(), AssetFetchError> {
    tracing::info!(url, dest = %dest.display(), "downloading asset");

    let agent = ureq::Agent::config_builder()
        .timeout_connect(Some(CONNECT_TIMEOUT))
        .timeout_global(Some(GLOBAL_TIMEOUT))
        .build()
        .new_agent();

    let response = agent.get(url).call()?;
    let reader = response.into_body().into_reader();

    let tmp = dest.with_extension("part");
    let result = write_verified(reader, &tmp, expected_prefix, dest);
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Stream `reader` into `tmp`, check the hash, then move it to `dest`.
fn write_verified(
    mut reader: impl Read,
    tmp: &Path,
    expected_prefix: Option<&str>,
    dest: &Path,
) -> Result<(), AssetFetchError> {
    let mut file = std::fs::File::create(tmp)?;
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        hasher.update(&buf[..n]);
        downloaded += n as u64;
    }
    file.flush()?;
    drop(file);

    let actual = format!("{:x}", hasher.finalize());
    if let Some(expected) = expected_prefix {
        if !actual.starts_with(expected) {
            return Err(AssetFetchError::HashMismatch {
                file: dest.display().to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    std::fs::rename(tmp, dest)?;
    tracing::info!(
        bytes = downloaded,
        sha256 = %actual,
        verified = expected_prefix.is_some(),
        "asset written"
    );
    Ok(())
}
