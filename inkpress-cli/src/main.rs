use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use inkpress_core::{DocumentMutator, Editor, FontArc, OverlayPainter, PhysicalSize};
use inkpress_pdf::{LopdfMutator, LopdfRasterizer};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod config;
mod markup;
mod preview;

use config::Config;

#[derive(Debug, Parser)]
#[command(
    name = "inkpress",
    version,
    about = "annotate PDF pages from the command line and flatten the marks into the file"
)]
struct Args {
    /// Config file to use instead of the platform default location
    #[arg(long = "config")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print the page geometry of a document
    Info {
        /// Path to the PDF file
        file: PathBuf,

        /// Render scale override
        #[arg(long = "scale")]
        scale: Option<f32>,
    },
    /// Create a blank document
    New {
        /// Where to write the new PDF
        output: PathBuf,

        /// Page sizes in points, as WIDTHxHEIGHT[,WIDTHxHEIGHT...]
        #[arg(
            short = 'p',
            long = "pages",
            value_delimiter = ',',
            value_parser = parse_page_size,
            default_value = "612x792"
        )]
        pages: Vec<PhysicalSize>,
    },
    /// Run a markup script against a document and write the flattened copy
    Apply {
        /// Path to the PDF file
        file: PathBuf,

        /// JSON markup script to apply
        #[arg(short = 'm', long = "markup")]
        markup: PathBuf,

        /// Where to write the flattened PDF
        #[arg(short = 'o', long = "out")]
        out: PathBuf,

        /// Also write per-page PNG previews into this directory
        #[arg(long = "previews")]
        previews: Option<PathBuf>,

        /// TTF or OTF font used to paint text annotations in previews
        #[arg(long = "font")]
        font: Option<PathBuf>,

        /// Render scale override
        #[arg(long = "scale")]
        scale: Option<f32>,
    },
    /// Render every page with its annotations to PNG files
    Preview {
        /// Path to the PDF file
        file: PathBuf,

        /// JSON markup script to apply before rendering
        #[arg(short = 'm', long = "markup")]
        markup: Option<PathBuf>,

        /// TTF or OTF font used to paint text annotations
        #[arg(long = "font")]
        font: Option<PathBuf>,

        /// Render scale override
        #[arg(long = "scale")]
        scale: Option<f32>,

        /// Directory for the page PNGs
        #[arg(short = 'o', long = "out-dir")]
        out_dir: PathBuf,
    },
}

fn parse_page_size(raw: &str) -> Result<PhysicalSize, String> {
    let (width, height) = raw
        .split_once(|c| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw:?}"))?;
    let width: f32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width {width:?}"))?;
    let height: f32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height {height:?}"))?;
    if width <= 0.0 || height <= 0.0 {
        return Err(format!("page size must be positive, got {raw:?}"));
    }
    Ok(PhysicalSize::new(width, height))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "inkpress", "inkpress")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = Config::load(&config_path)?;

    match args.command {
        CliCommand::Info { file, scale } => {
            info_command(&file, scale.unwrap_or(config.preview_scale)).await
        }
        CliCommand::New { output, pages } => new_command(&output, &pages).await,
        CliCommand::Apply {
            file,
            markup,
            out,
            previews,
            font,
            scale,
        } => {
            apply_command(
                &config,
                &file,
                &markup,
                &out,
                previews.as_deref(),
                font.as_deref(),
                scale,
            )
            .await
        }
        CliCommand::Preview {
            file,
            markup,
            font,
            scale,
            out_dir,
        } => {
            preview_command(
                &config,
                &file,
                markup.as_deref(),
                font.as_deref(),
                scale,
                &out_dir,
            )
            .await
        }
    }
}

async fn info_command(file: &Path, scale: f32) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("failed to read {:?}", file))?;
    let mut editor = Editor::with_scale(scale);
    editor
        .open_with(&LopdfRasterizer::new(), bytes)
        .await
        .with_context(|| format!("failed to open {:?}", file))?;

    let session = editor
        .session()
        .ok_or_else(|| anyhow!("no session after load"))?;
    let document = LopdfMutator::new().load(session.bytes())?;

    println!("fingerprint: {}", session.fingerprint());
    println!("scale: {}", session.scale());
    println!("pages: {}", session.page_count());
    for view in session.page_views() {
        match document.page_size(view.index) {
            Some(size) => println!(
                "  page {}: {}x{} pt, {}x{} px",
                view.index, size.width, size.height, view.pixel_width, view.pixel_height
            ),
            None => println!(
                "  page {}: {}x{} px",
                view.index, view.pixel_width, view.pixel_height
            ),
        }
    }
    Ok(())
}

async fn new_command(output: &Path, pages: &[PhysicalSize]) -> Result<()> {
    let mut editor = Editor::new();
    editor
        .create_with(&LopdfMutator::new(), pages, &LopdfRasterizer::new())
        .await?;

    let session = editor
        .session()
        .ok_or_else(|| anyhow!("no session after load"))?;
    fs::write(output, session.bytes()).with_context(|| format!("failed to write {:?}", output))?;
    println!("wrote {} ({} pages)", output.display(), session.page_count());
    log_events(&editor);
    Ok(())
}

async fn apply_command(
    config: &Config,
    file: &Path,
    script: &Path,
    out: &Path,
    previews: Option<&Path>,
    font: Option<&Path>,
    scale: Option<f32>,
) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("failed to read {:?}", file))?;
    let mut editor = Editor::with_scale(scale.unwrap_or(config.preview_scale));
    editor
        .open_with(&LopdfRasterizer::new(), bytes)
        .await
        .with_context(|| format!("failed to open {:?}", file))?;
    replay_script(&mut editor, script, config)?;

    let session = editor
        .session()
        .ok_or_else(|| anyhow!("no session after load"))?;
    if let Some(dir) = previews {
        let painter = load_painter(font)?;
        let written = preview::write_previews(session, &painter, dir)?;
        println!("wrote {} previews to {}", written.len(), dir.display());
    }

    let flattened = editor.export_with(&LopdfMutator::new())?;
    fs::write(out, &flattened).with_context(|| format!("failed to write {:?}", out))?;
    println!(
        "wrote {} ({} annotations, {} bytes)",
        out.display(),
        session.store().len(),
        flattened.len()
    );
    log_events(&editor);
    Ok(())
}

async fn preview_command(
    config: &Config,
    file: &Path,
    script: Option<&Path>,
    font: Option<&Path>,
    scale: Option<f32>,
    out_dir: &Path,
) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("failed to read {:?}", file))?;
    let mut editor = Editor::with_scale(scale.unwrap_or(config.preview_scale));
    editor
        .open_with(&LopdfRasterizer::new(), bytes)
        .await
        .with_context(|| format!("failed to open {:?}", file))?;

    if let Some(script) = script {
        replay_script(&mut editor, script, config)?;
    }

    let painter = load_painter(font)?;
    let session = editor
        .session()
        .ok_or_else(|| anyhow!("no session after load"))?;
    let written = preview::write_previews(session, &painter, out_dir)?;
    println!("wrote {} previews to {}", written.len(), out_dir.display());
    log_events(&editor);
    Ok(())
}

/// Drains the controller's event log into the debug log.
fn log_events(editor: &Editor) {
    let events = editor.events();
    for event in events.lock().drain(..) {
        debug!(?event, "session event");
    }
}

fn replay_script(editor: &mut Editor, script: &Path, config: &Config) -> Result<()> {
    let steps = markup::read_script(script)?;
    debug!(steps = steps.len(), "applying markup script");
    for step in steps {
        editor.apply(markup::to_command(step, config))?;
    }
    Ok(())
}

fn load_painter(font: Option<&Path>) -> Result<OverlayPainter> {
    match font {
        Some(path) => {
            let data = fs::read(path).with_context(|| format!("failed to read font {:?}", path))?;
            let font = FontArc::try_from_vec(data)
                .with_context(|| format!("failed to parse font {:?}", path))?;
            Ok(OverlayPainter::with_font(font))
        }
        None => Ok(OverlayPainter::new()),
    }
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "inkpress.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
