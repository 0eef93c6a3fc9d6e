mod composite;
pub mod script;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pdf_engine::OpenDocument;
use pdf_markup_core::{AnnotationId, AnnotationStore, Editor, EditorConfig, PersistenceGateway, RenderProjector, SaveRequest};
use pdf_markup_storage::{load_annotations, FileGateway, HttpGateway};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "pdf-markup")]
#[command(about = "Annotate PDF pages with highlights, rectangles and text")]
pub struct Cli {
    /// Editor configuration file (JSON); PDF_MARKUP_* variables override it
    #[arg(long, global = true, value_name = "FILE")]
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
    /// Replay a scripted editing session and print the resulting annotations.
    Replay {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "SCRIPT")]
        script: PathBuf,
        /// Annotations to load before the script runs
        #[arg(long, value_name = "JSON")]
        annotations: Option<PathBuf>,
        /// Save every change to this directory
        #[arg(long, conflicts_with = "endpoint")]
        out_dir: Option<PathBuf>,
        /// Save every change to a remote server
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,
    },
    /// Write the annotation JSON and an annotated copy of the PDF.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "JSON")]
        annotations: PathBuf,
        /// Defaults to the platform data directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Print render primitives for one page of an annotation set.
    Project {
        #[arg(value_name = "JSON")]
        annotations: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        selected: Option<AnnotationId>,
    },
    /// Render a page PNG with its annotations painted on top.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, value_name = "JSON")]
        annotations: Option<PathBuf>,
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
    page_sizes_pt: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    if let Commands::Version = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Replay { file, script, annotations, out_dir, endpoint } => run_replay(
            &config,
            &file,
            &script,
            annotations.as_deref(),
            out_dir.as_deref(),
            endpoint.as_deref(),
        ),
        Commands::Export { file, annotations, out_dir } => {
            run_export(&config, &file, &annotations, out_dir.as_deref())
        }
        Commands::Project { annotations, page, selected } => {
            run_project(&config, &annotations, page, selected)
        }
        Commands::Render { file, page, annotations, output } => {
            run_render(&config, &file, page, annotations.as_deref(), output.as_deref())
        }
        Commands::Version => Ok(()),
    }
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    let config = match path {
        Some(path) => EditorConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EditorConfig::default(),
    };
    config.with_env_overrides().context("invalid PDF_MARKUP_* environment override")
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let document = OpenDocument::open(file).context("failed to open PDF")?;
    let page_sizes_pt = document
        .page_sizes()
        .iter()
        .map(|size| PageSizeOutput { width: size.width, height: size.height })
        .collect::<Vec<_>>();

    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count: page_sizes_pt.len() as u32,
        page_sizes_pt,
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_replay(
    config: &EditorConfig,
    file: &Path,
    script: &Path,
    annotations: Option<&Path>,
    out_dir: Option<&Path>,
    endpoint: Option<&str>,
) -> Result<()> {
    ensure_pdf_exists(file)?;
    let steps = script::load_script(script)?;
    let document = OpenDocument::open(file).context("failed to open PDF")?;
    let filename = file_name(file)?;

    let mut editor = Editor::open(config.clone(), filename, &document).context("failed to start editor")?;

    let gateway: Option<Arc<dyn PersistenceGateway>> = match (out_dir, endpoint) {
        (Some(out_dir), _) => Some(Arc::new(FileGateway::new(source_dir(file), out_dir, config.render_scale))),
        (None, Some(endpoint)) => Some(Arc::new(HttpGateway::new(endpoint))),
        (None, None) => None,
    };

    if let Some(path) = annotations {
        for annotation in load_annotations(path)? {
            editor.add_annotation(annotation)?;
        }
    }
    if let Some(gateway) = gateway {
        editor = editor.with_persistence(gateway);
    }

    let outcome = script::replay(&mut editor, &document, &steps)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn run_export(config: &EditorConfig, file: &Path, annotations: &Path, out_dir: Option<&Path>) -> Result<()> {
    ensure_pdf_exists(file)?;
    let annotations = load_annotations(annotations)?;

    let gateway = match out_dir {
        Some(out_dir) => FileGateway::new(source_dir(file), out_dir, config.render_scale),
        None => FileGateway::from_default_project(source_dir(file), config.render_scale)?,
    };

    let saved = gateway
        .save_files(&SaveRequest::new(file_name(file)?, annotations))
        .context("failed to export annotations")?;

    if saved.skipped > 0 {
        tracing::warn!(skipped = saved.skipped, "annotations without a valid page were not exported");
    }
    println!("{}", saved.pdf_path.display());
    Ok(())
}

fn run_project(config: &EditorConfig, annotations: &Path, page: u32, selected: Option<AnnotationId>) -> Result<()> {
    if page == 0 {
        bail!("--page is 1-based and must be >= 1");
    }

    let store = load_store(config, annotations)?;
    let projector = RenderProjector::with_handle_size(config.resize_handle_size);
    let primitives = projector.project(page, &store, selected.as_ref());

    println!("{}", serde_json::to_string_pretty(&primitives)?);
    Ok(())
}

fn run_render(
    config: &EditorConfig,
    file: &Path,
    page: u32,
    annotations: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    if page == 0 {
        bail!("--page is 1-based and must be >= 1");
    }

    let document = OpenDocument::open(file).context("failed to open PDF")?;
    let mut image = document.render_image(page, config.render_scale).context("failed to render page")?;

    if let Some(path) = annotations {
        let store = load_store(config, path)?;
        let primitives = RenderProjector::with_handle_size(config.resize_handle_size).project(page, &store, None);
        composite::composite(&mut image, &primitives);
    }

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file, page));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    image.save(&output).with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

fn load_store(config: &EditorConfig, path: &Path) -> Result<AnnotationStore> {
    let mut store = AnnotationStore::with_text_layout(config.text_layout);
    for annotation in load_annotations(path)? {
        store.add(annotation)?;
    }
    Ok(store)
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("path has no usable file name: {}", path.display()))
}

fn source_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn default_render_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
