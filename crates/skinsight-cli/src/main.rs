mod config;
mod display;
mod server;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use skinsight_ai::{ClassifierSlot, DiseaseInfoService, PredictionPipeline, UploadArchive};
use skinsight_core::{ClassifyRequest, DEFAULT_TOP_K, PredictionResponse};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{LlmArgs, ModelArgs, ServeArgs};
use crate::server::AppState;

const DEFAULT_LOG_FILTER: &str = "skinsight=info,skinsight_ai=info,tower_http=info";

#[derive(Parser)]
#[command(name = "skinsight", version, about = "Skin-lesion classification and disease information")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve(ServeArgs),
    /// Classify one image file.
    Classify(ClassifyArgs),
    /// Look up symptoms, causes, remedies and treatments for a disease.
    Info(InfoArgs),
}

#[derive(Args)]
struct ClassifyArgs {
    image: PathBuf,

    /// Number of predictions to show.
    #[arg(long, default_value_t = NonZeroUsize::new(DEFAULT_TOP_K).unwrap_or(NonZeroUsize::MIN))]
    top_k: NonZeroUsize,

    /// Print the JSON response body instead of a table.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args)]
struct InfoArgs {
    name: String,

    /// Print the JSON record instead of a card.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    llm: LlmArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Classify(args) => classify(args).await,
        Command::Info(args) => lookup(args).await,
    }
}

// ── Commands ──

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    info!("skinsight v{}", env!("CARGO_PKG_VERSION"));

    let slot = Arc::new(ClassifierSlot::new());
    let pipeline = Arc::new(PredictionPipeline::new(
        args.model.preprocessor(),
        slot.clone(),
        &args.model.upload_dir,
    ));

    let disease_info = match args.llm.client()? {
        Some(client) => Some(Arc::new(
            DiseaseInfoService::new(Arc::new(client)).context("building disease info service")?,
        )),
        None => {
            tracing::warn!("GEMINI_API_KEY not set; disease details are disabled");
            None
        }
    };

    let state = Arc::new(AppState {
        pipeline,
        archive: args.archive_dir.as_ref().map(UploadArchive::new),
        disease_info,
    });
    let app = server::router(state, args.model.max_image_bytes);

    // Model loading is CPU-bound; a bad model or label file stops startup.
    let model = args.model;
    let service = tokio::task::spawn_blocking(move || model.load_classifier()).await??;
    if slot.install(service).is_err() {
        bail!("classifier installed twice");
    }

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!(addr = %args.bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn classify(args: ClassifyArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("reading {}", args.image.display()))?;
    let mut request = ClassifyRequest::from_parts(Some(bytes), None, None)?;
    request.top_k = args.top_k;

    let model = args.model;
    let ranked = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let service = model.load_classifier()?;
        let pipeline = PredictionPipeline::new(
            model.preprocessor(),
            Arc::new(ClassifierSlot::loaded(service)),
            &model.upload_dir,
        );
        Ok(pipeline.predict(&request.image, request.top_k)?)
    })
    .await??;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&PredictionResponse::from_ranked(&ranked))?
        );
    } else {
        display::print_predictions(&args.image.display().to_string(), &ranked);
    }
    Ok(())
}

async fn lookup(args: InfoArgs) -> anyhow::Result<()> {
    let Some(client) = args.llm.client()? else {
        bail!("GEMINI_API_KEY is required for disease lookups");
    };
    let service = DiseaseInfoService::new(Arc::new(client))?;
    let info = service
        .lookup(&args.name)
        .await
        .with_context(|| format!("looking up {:?}", args.name))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        display::print_disease_card(args.name.trim(), &info);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_args(argv: &[&str]) -> Result<ClassifyArgs, clap::Error> {
        let argv = ["skinsight", "classify", "lesion.jpg"].iter().chain(argv);
        match Cli::try_parse_from(argv)?.command {
            Command::Classify(args) => Ok(args),
            _ => unreachable!(),
        }
    }

    #[test]
    fn classify_top_k_defaults_to_three() {
        let args = classify_args(&[]).unwrap();
        assert_eq!(args.top_k.get(), DEFAULT_TOP_K);
        assert!(!args.json);
    }

    #[test]
    fn classify_top_k_must_be_positive() {
        assert!(classify_args(&["--top-k", "0"]).is_err());
        assert!(classify_args(&["--top-k", "-2"]).is_err());
        assert_eq!(classify_args(&["--top-k", "5"]).unwrap().top_k.get(), 5);
    }
}
