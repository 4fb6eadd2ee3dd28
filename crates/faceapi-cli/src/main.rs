use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use faceapi_core::{annotate, compare_embeddings, FaceBackend, Frame, Metric, ModelPaths, Pipeline};
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "faceapi",
    version,
    about = "Run face detection, comparison and analysis on local images"
)]
struct Cli {
    /// Directory containing the ONNX model files
    #[arg(long, global = true, env = "FACEAPI_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces and print their boxes
    Detect {
        image: PathBuf,
        /// Write a copy of the image with every face outlined
        #[arg(long, value_name = "OUT")]
        annotate: Option<PathBuf>,
    },
    /// Compare the most confident face of two images
    Compare {
        first: PathBuf,
        second: PathBuf,
        #[arg(long, value_enum, default_value_t = MetricArg::Euclidean)]
        metric: MetricArg,
    },
    /// Estimate age, gender and emotion for every face
    Analyze {
        image: PathBuf,
        /// Fail when no face is found instead of analysing the whole image
        #[arg(long)]
        enforce_detection: bool,
    },
    /// Show which model files are present and loadable
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    Euclidean,
    Cosine,
}

impl From<MetricArg> for Metric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Euclidean => Metric::Euclidean,
            MetricArg::Cosine => Metric::Cosine,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let model_dir = cli.model_dir.unwrap_or_else(faceapi_core::default_model_dir);
    let paths = ModelPaths::in_dir(&model_dir);

    let output = match cli.command {
        Commands::Detect { image, annotate } => detect(&paths, &image, annotate.as_deref())?,
        Commands::Compare {
            first,
            second,
            metric,
        } => compare(&paths, &first, &second, metric.into())?,
        Commands::Analyze {
            image,
            enforce_detection,
        } => {
            let frame = open(&image)?;
            let faces = load(&paths)?.analyze(&frame, enforce_detection)?;
            json!({ "faces": faces })
        }
        Commands::Status => status(&model_dir, &paths),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load(paths: &ModelPaths) -> Result<Pipeline> {
    Pipeline::load(paths)
        .with_context(|| format!("loading models from {}", paths.detector.display()))
}

fn open(image: &Path) -> Result<Frame> {
    Frame::open(image).with_context(|| format!("reading {}", image.display()))
}

fn detect(
    paths: &ModelPaths,
    image: &Path,
    annotate_to: Option<&Path>,
) -> Result<serde_json::Value> {
    let frame = open(image)?;
    let faces = load(paths)?.detect(&frame)?;

    if let Some(out) = annotate_to {
        annotate::save_annotated(&frame, &faces, out)
            .with_context(|| format!("writing {}", out.display()))?;
        tracing::info!(path = %out.display(), "annotated image written");
    }

    let faces: Vec<_> = faces
        .iter()
        .map(|face| {
            json!({
                "bbox": face.edges(frame.width, frame.height),
                "confidence": face.confidence,
            })
        })
        .collect();
    Ok(json!({ "faces_found": faces.len(), "faces": faces }))
}

fn compare(
    paths: &ModelPaths,
    first: &Path,
    second: &Path,
    metric: Metric,
) -> Result<serde_json::Value> {
    let frame_a = open(first)?;
    let frame_b = open(second)?;

    let mut pipeline = load(paths)?;
    let (_, a) = pipeline
        .embed_first(&frame_a)
        .with_context(|| format!("no usable face in {}", first.display()))?;
    let (_, b) = pipeline
        .embed_first(&frame_b)
        .with_context(|| format!("no usable face in {}", second.display()))?;

    let comparison = compare_embeddings(&a, &b, metric)?;
    Ok(json!({
        "metric": comparison.metric,
        "value": comparison.value,
        "threshold": comparison.threshold,
        "match": comparison.matched,
    }))
}

fn status(model_dir: &Path, paths: &ModelPaths) -> serde_json::Value {
    let present = |p: &Path| p.exists();
    let loaded = match Pipeline::load(paths) {
        Ok(pipeline) => json!(pipeline.status()),
        Err(e) => json!({ "error": e.to_string() }),
    };
    json!({
        "model_dir": model_dir.display().to_string(),
        "files": {
            "detector": present(&paths.detector),
            "recognizer": present(&paths.recognizer),
            "gender_age": present(&paths.gender_age),
            "emotion": present(&paths.emotion),
        },
        "loaded": loaded,
    })
}
