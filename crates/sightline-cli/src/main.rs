use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sightline_core::{assets, detector, AnnotationSink, FaceDetector, FaceSource, Pipeline};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sightline", about = "Sightline image classification and face analysis CLI")]
struct Cli {
    /// Directory holding resnet50.pth, imagenet_classes.txt and det_10g.onnx
    #[arg(long, env = "MODEL_DIR", default_value = "models", global = true)]
    model_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the classifier weights, label list and SCRFD model if missing
    Fetch {
        /// SHA-256 (or prefix) the downloaded SCRFD model must match
        #[arg(long, env = "FACE_MODEL_SHA256")]
        face_model_sha256: Option<String>,
    },
    /// Classify an image and analyze its faces, printing JSON
    Predict {
        /// Image file to analyze
        image: PathBuf,
        /// Directory for the annotated copy
        #[arg(long, env = "OUTPUT_DIR", default_value = "output")]
        output_dir: PathBuf,
        /// SCRFD model path (default: <model-dir>/det_10g.onnx)
        #[arg(long, env = "FACE_MODEL_PATH")]
        face_model: Option<PathBuf>,
        /// Minimum detection score
        #[arg(
            long,
            env = "FACE_DET_THRESHOLD",
            default_value_t = detector::SCRFD_CONFIDENCE_THRESHOLD,
            value_parser = parse_threshold
        )]
        threshold: f32,
    },
}

fn parse_threshold(raw: &str) -> Result<f32, String> {
    let value: f32 = raw.parse().map_err(|e| format!("{e}"))?;
    if detector::is_valid_threshold(value) {
        Ok(value)
    } else {
        Err(format!("{raw} is not within [0, 1]"))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch { face_model_sha256 } => {
            tracing::info!(model_dir = %cli.model_dir.display(), "fetching model assets");
            let paths = assets::provision(&cli.model_dir, face_model_sha256.as_deref());
            for path in paths.all() {
                let state = if path.exists() { "ok" } else { "missing" };
                println!("{state:>7}  {}", path.display());
            }
        }
        Commands::Predict {
            image,
            output_dir,
            face_model,
            threshold,
        } => {
            tracing::info!(image = %image.display(), model_dir = %cli.model_dir.display(), "loading models");
            let paths = assets::AssetPaths::in_dir(&cli.model_dir);
            let (classifier, labels) = sightline_core::load_classifier(&paths.weights, &paths.labels)
                .context("failed to load classifier and labels")?;
            let face_model = face_model.unwrap_or(paths.face_model);
            let detector = FaceDetector::load(&face_model, threshold).context("failed to load face detector")?;

            let mut pipeline = Pipeline::new(
                classifier,
                labels,
                detector,
                AnnotationSink::new(output_dir),
                FaceSource::Upload,
            )?;

            let bytes = std::fs::read(&image).with_context(|| format!("cannot read {}", image.display()))?;
            let result = pipeline
                .predict_bytes(&bytes)
                .with_context(|| format!("prediction failed ({})", image.display()))?;
            tracing::info!(
                faces = result.face_analysis.num_faces,
                annotated = %result.face_analysis.annotated_image,
                "prediction complete"
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
