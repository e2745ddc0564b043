use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use pdf_annotator_core::{DirectorySink, EditorConfig, EditorSession};
use pdf_annotator_engine::{default_engine, OpenSource};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub mod script;

use script::{apply_script, load_script};

#[derive(Debug, Parser)]
#[command(name = "pdf-annotator-cli")]
#[command(about = "Annotate PDF pages and export flattened copies")]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Editor configuration file (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render one page, optionally annotated, to a PNG.
    RenderPage {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Zoom in percent
        #[arg(long, default_value_t = 100.0)]
        zoom: f32,
        /// Annotation script applied before rendering
        #[arg(long, value_name = "SCRIPT")]
        script: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Apply an annotation script and export the flattened PDF.
    Annotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "SCRIPT")]
        script: PathBuf,
        /// Zoom used for the exported page images, in percent
        #[arg(long)]
        zoom: Option<f32>,
        /// Print "n / total" at the bottom of every page
        #[arg(long)]
        page_labels: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
    rotation: u16,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::RenderPage { file, page, zoom, script, output } => {
            let config = load_config(cli.config.as_deref())?;
            run_render_page(config, &file, page, zoom, script.as_deref(), output.as_deref())
        }
        Commands::Annotate { file, script, zoom, page_labels, output } => {
            let mut config = load_config(cli.config.as_deref())?;
            config.page_labels |= page_labels;
            run_annotate(config, &file, &script, zoom, output.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // a second init (tests calling run twice) keeps the first logger
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    let config = match path {
        Some(path) => EditorConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?
            .apply_env(),
        None => EditorConfig::from_env(),
    };
    config.context("invalid configuration")
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let pages = (0..page_count)
        .map(|index| {
            engine.page_size(handle, index).map(|size| PageSizeOutput {
                width: size.width_pt,
                height: size.height_pt,
                rotation: size.rotation,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let payload = InfoOutput { path: file.display().to_string(), page_count, pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn open_session(config: EditorConfig, file: &Path) -> Result<EditorSession> {
    ensure_pdf_exists(file)?;
    let mut session = EditorSession::new(config);
    session.open_document(file).context("failed to open PDF")?;
    Ok(session)
}

fn script_dir(script: &Path) -> PathBuf {
    script.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn run_render_page(
    config: EditorConfig,
    file: &Path,
    page: usize,
    zoom: f32,
    script: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let mut session = open_session(config, file)?;

    if let Some(script) = script {
        let ops = load_script(script)?;
        apply_script(&mut session, &ops, &script_dir(script))?;
    }
    session.go_to_page(page).context("failed to select page")?;
    session.set_zoom(zoom);

    let image = session.render_view().context("failed to render page")?;
    let output =
        output.map(ToOwned::to_owned).unwrap_or_else(|| default_output(file, &format!("page-{page}.png")));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn run_annotate(
    config: EditorConfig,
    file: &Path,
    script: &Path,
    zoom: Option<f32>,
    output: Option<&Path>,
) -> Result<()> {
    let ops = load_script(script)?;
    let mut session = open_session(config, file)?;
    apply_script(&mut session, &ops, &script_dir(script))?;
    if let Some(zoom) = zoom {
        session.set_zoom(zoom);
    }

    let output =
        output.map(ToOwned::to_owned).unwrap_or_else(|| default_output(file, "annotated.pdf"));
    let dir = output.parent().map(Path::to_path_buf).unwrap_or_default();
    let filename = output
        .file_name()
        .and_then(|name| name.to_str())
        .context("output path has no file name")?;

    let mut sink = DirectorySink::new(&dir);
    let saved = session.export_to(&mut sink, filename).context("failed to export PDF")?;

    println!("{}", sink.path_for(&saved).display());

    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_output(file: &Path, suffix: &str) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("document");

    file.with_file_name(format!("{stem}-{suffix}"))
}
