mod config;
mod handlers;
mod models;
mod services;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use config::AppConfig;
use handlers::AnalyzeHandler;
use models::{AnalysisOutcome, PredictionResponse};
use services::{FanoutView, FfmpegCamera, HtmlView, PredictClient, ResultView, TerminalView};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a meal photo to the prediction service and show its nutrition
    Analyze {
        #[command(flatten)]
        source: ImageSource,

        /// Camera device used with --camera
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Prediction service base URL
        #[arg(long, value_name = "URL")]
        server: Option<String>,

        /// Also keep an HTML snapshot of the result page
        #[arg(long, value_name = "PATH")]
        html: Option<PathBuf>,

        /// Download the analyzed image here
        #[arg(long, value_name = "PATH")]
        save_result: Option<PathBuf>,
    },
    /// Render a saved prediction response without calling the service
    Render {
        /// JSON body previously returned by /predict
        response: PathBuf,

        #[arg(long, value_name = "PATH")]
        html: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct ImageSource {
    /// Image file to analyze
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Take the photo with the camera instead
    #[arg(long)]
    camera: bool,
}

fn build_view(html: Option<PathBuf>) -> Arc<dyn ResultView> {
    match html {
        Some(path) => {
            log::info!("📝 HTML snapshot: {}", path.display());
            let views: Vec<Arc<dyn ResultView>> =
                vec![Arc::new(TerminalView), Arc::new(HtmlView::new(path))];
            Arc::new(FanoutView::new(views))
        }
        None => Arc::new(TerminalView),
    }
}

fn exit_code(outcome: &AnalysisOutcome) -> ExitCode {
    match outcome {
        AnalysisOutcome::Rendered(_) => ExitCode::SUCCESS,
        AnalysisOutcome::NoImageSelected => ExitCode::FAILURE,
        AnalysisOutcome::ServiceError(message) => {
            log::warn!("⚠️ Analysis rejected by the service: {}", message);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables before the logger so RUST_LOG may live in .env
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;

    match cli.command {
        Command::Analyze {
            source,
            device,
            server,
            html,
            save_result,
        } => {
            if let Some(server) = server {
                config.server_url = server;
            }
            if let Some(device) = device {
                config.camera_device = device;
            }
            log::info!("🚀 Prediction service: {}", config.server_url);

            let predictor = Arc::new(PredictClient::new(&config.server_url, config.request_timeout)?);
            let handler = AnalyzeHandler::new(
                predictor,
                build_view(html),
                config.capture_delay,
                config.jpeg_quality,
            );

            if let Some(path) = source.image {
                handler.select_file(&path).await?;
            } else if source.camera {
                let camera = FfmpegCamera::new(
                    &config.camera_device,
                    config.capture_width,
                    config.capture_height,
                );
                if !handler.capture_from_camera(&camera).await {
                    return Ok(ExitCode::FAILURE);
                }
            }

            let outcome = match handler.analyze().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("❌ Analysis failed: {:#}", e);
                    return Err(e);
                }
            };

            if let (AnalysisOutcome::Rendered(_), Some(destination)) = (&outcome, save_result) {
                if !handler.save_result_image(&destination).await? {
                    println!("ℹ️  The service returned no analyzed image");
                }
            }

            Ok(exit_code(&outcome))
        }
        Command::Render { response, html } => {
            let body = std::fs::read_to_string(&response)
                .with_context(|| format!("Failed to read {}", response.display()))?;
            let prediction: PredictionResponse = serde_json::from_str(&body)
                .with_context(|| format!("{} is not a prediction response", response.display()))?;

            let predictor = Arc::new(PredictClient::new(&config.server_url, None)?);
            let handler = AnalyzeHandler::new(
                predictor,
                build_view(html),
                config.capture_delay,
                config.jpeg_quality,
            );

            let outcome = handler.present(&prediction, chrono::Utc::now().timestamp_millis());
            Ok(exit_code(&outcome))
        }
    }
}
