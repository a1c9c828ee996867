use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

use chartscribe::config::{self, ServiceConfig};
use chartscribe::pipeline::extraction::default_ocr_engine;
use chartscribe::pipeline::{Pipeline, PipelineError, PipelineReport};

/// Extract structured clinical fields from a medical PDF as JSON
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = None,
    after_help = "Scanned PDFs without a text layer need OCR, which is only \
                  available in builds made with `--features ocr` (requires \
                  libtesseract and eng.traineddata)."
)]
struct Cli {
    /// Path to the PDF document
    path: Option<PathBuf>,

    /// Print the acquired text and skip the extraction service
    #[arg(long)]
    text_only: bool,

    /// Directory holding Tesseract language data (eng.traineddata)
    #[arg(long)]
    tessdata: Option<PathBuf>,
}

enum Invocation {
    Run(Cli),
    /// `--help` / `--version`: clap prints and exits on its own.
    Informational(clap::Error),
    Rejected(PipelineError),
}

fn parse_invocation<I, T>(args: I) -> Invocation
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Invocation::Run(cli),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            Invocation::Informational(e)
        }
        Err(e) => Invocation::Rejected(PipelineError::InvalidArguments(summarize_clap_error(&e))),
    }
}

/// First line of clap's rendered error, without the `error: ` prefix.
fn summarize_clap_error(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let first = rendered.lines().next().unwrap_or_default().trim();
    first.strip_prefix("error:").unwrap_or(first).trim().to_string()
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    chartscribe::init_tracing();

    let cli = match parse_invocation(std::env::args_os()) {
        Invocation::Run(cli) => cli,
        Invocation::Informational(e) => e.exit(),
        Invocation::Rejected(e) => return emit(PipelineReport::from_error(&e)),
    };

    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let Some(path) = cli.path else {
        return emit(PipelineReport::from_error(&PipelineError::MissingArgument));
    };

    let pipeline = match Pipeline::from_config(
        &ServiceConfig::from_env(),
        default_ocr_engine(cli.tessdata.as_deref()),
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => return emit(PipelineReport::from_error(&e)),
    };

    if cli.text_only {
        return match pipeline.acquire_only(&path) {
            Ok(acquired) => {
                tracing::info!(
                    method = %acquired.method,
                    pages = acquired.pages_processed,
                    "Text acquired"
                );
                println!("{}", acquired.text);
                ExitCode::SUCCESS
            }
            Err(e) => emit(PipelineReport::from_error(&e)),
        };
    }

    emit(PipelineReport::from_result(pipeline.run(&path)))
}

fn emit(report: PipelineReport) -> ExitCode {
    println!("{}", report.to_json());
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
