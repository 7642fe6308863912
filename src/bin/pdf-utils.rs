//! PDF Utilities CLI tool
//!
//! A command-line tool for merging page ranges of PDFs and for filling and
//! flattening PDF forms.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use glob::glob;
use lopdf::Document;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf_utils::pdf::{
    merge_pdfs, read_metadata, stamp_pdf, AcroForm, MergeInput, MergeOptions, OutputOptions,
    PageRange, StampOptions,
};

/// PDF Utilities - Merge page ranges and stamp PDF forms
#[derive(Parser)]
#[command(name = "pdf-utils")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge a cover page with pages 2-4 and 7 of a report
    pdf-utils merge -o packet.pdf cover.pdf report.pdf@2-4,7

    # Merge numbered PDFs in order
    pdf-utils merge -o handout.pdf \"[0-9]*.pdf\"

    # Fill a form and flatten it
    pdf-utils stamp form.pdf -o filled.pdf --text name=\"Ada Lovelace\" --image photo=ada.png

    # List the fields of a form
    pdf-utils fields form.pdf")]
struct Cli {
    /// Write uncompressed content streams
    #[arg(long, global = true)]
    no_compress: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge multiple PDF files into one
    Merge {
        /// Input PDF files (in order), each optionally followed by @RANGE
        /// such as "report.pdf@1-3,5". Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Fill form fields and flatten the form
    Stamp {
        /// Input PDF form
        input: PathBuf,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Text value for a field, as KEY=VALUE (repeatable)
        #[arg(long = "text", value_name = "KEY=VALUE")]
        text: Vec<String>,

        /// Image file for a field, as KEY=PATH (repeatable)
        #[arg(long = "image", value_name = "KEY=PATH")]
        image: Vec<String>,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// List the form fields of a PDF
    Fields {
        /// PDF file to inspect
        input: PathBuf,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = OutputOptions {
        compress: !cli.no_compress,
        ..OutputOptions::default()
    };

    let result = match cli.command {
        Commands::Merge { inputs, output: path, open } => cmd_merge(inputs, path, open, output),
        Commands::Stamp { input, output: path, text, image, open } => {
            cmd_stamp(input, path, text, image, open, output)
        }
        Commands::Fields { input } => cmd_fields(&input),
        Commands::Info { input } => cmd_info(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Install a stderr subscriber; `RUST_LOG` overrides the verbosity flag
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "pdf_utils=warn",
        1 => "pdf_utils=debug",
        _ => "pdf_utils=trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Split a trailing `@RANGE` off an input argument
///
/// The suffix only counts as a range when it parses as one, so file names
/// containing `@` still work.
fn split_page_range(input: &str) -> (&str, Option<&str>) {
    match input.rsplit_once('@') {
        Some((path, range)) if !path.is_empty() && range.parse::<PageRange>().is_ok() => {
            (path, Some(range))
        }
        _ => (input, None),
    }
}

/// Expand glob patterns in input paths
///
/// Matches of one pattern are sorted; the patterns themselves keep their order.
fn expand_globs(patterns: Vec<String>) -> pdf_utils::Result<Vec<MergeInput>> {
    let mut inputs = Vec::new();

    for pattern in &patterns {
        let (path, range) = split_page_range(pattern);

        // Check if pattern contains glob characters
        if path.contains('*') || path.contains('?') || path.contains('[') {
            let entries = glob(path).map_err(|e| pdf_utils::Error::InvalidGlob(e.to_string()))?;

            let mut matched = Vec::new();
            for entry in entries {
                match entry {
                    Ok(path) => matched.push(path),
                    Err(e) => eprintln!("Warning: glob error for {}: {}", path, e),
                }
            }
            if matched.is_empty() {
                return Err(pdf_utils::Error::NoFilesMatched(path.to_string()));
            }

            matched.sort();
            inputs.extend(matched.into_iter().map(|path| MergeInput {
                path,
                page_range: range.map(str::to_string),
            }));
        } else {
            // No glob characters, treat as literal path
            inputs.push(MergeInput {
                path: PathBuf::from(path),
                page_range: range.map(str::to_string),
            });
        }
    }

    Ok(inputs)
}

/// Split a `KEY=VALUE` argument
fn parse_assignment(arg: &str) -> Result<(String, String)> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("Expected KEY=VALUE, got '{}'", arg),
    }
}

/// Open a file with the system default application
fn open_file(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(path)
            .spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", &path.display().to_string()])
            .spawn()?;
    }
    Ok(())
}

/// Merge multiple PDFs into one
fn cmd_merge(inputs: Vec<String>, output: PathBuf, open: bool, options: OutputOptions) -> Result<()> {
    // Expand glob patterns
    let inputs = expand_globs(inputs)?;

    // Validate inputs exist
    for input in &inputs {
        if !input.path.exists() {
            bail!("Input file not found: {}", input.path.display());
        }
        debug!(path = %input.path.display(), range = ?input.page_range, "merge input");
    }

    eprintln!("Merging {} PDF files...", inputs.len());

    let merge_options = MergeOptions {
        inputs,
        output_path: output.clone(),
        output: options,
    };

    merge_pdfs(&merge_options)
        .with_context(|| format!("Failed to merge into {}", output.display()))?;

    eprintln!("Merged to: {}", output.display());

    if open {
        open_file(&output)?;
    }

    Ok(())
}

/// Fill and flatten a PDF form
fn cmd_stamp(
    input: PathBuf,
    output: PathBuf,
    text: Vec<String>,
    image: Vec<String>,
    open: bool,
    options: OutputOptions,
) -> Result<()> {
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }

    let text_fields = text
        .iter()
        .map(|arg| parse_assignment(arg))
        .collect::<Result<Vec<_>>>()?;
    let image_fields = image
        .iter()
        .map(|arg| parse_assignment(arg).map(|(key, path)| (key, PathBuf::from(path))))
        .collect::<Result<Vec<_>>>()?;

    eprintln!(
        "Stamping {} text and {} image fields...",
        text_fields.len(),
        image_fields.len()
    );

    let stamp_options = StampOptions {
        input_path: input.clone(),
        output_path: output.clone(),
        text_fields,
        image_fields,
        output: options,
    };

    let size = stamp_pdf(&stamp_options)
        .with_context(|| format!("Failed to stamp {}", input.display()))?;

    eprintln!("Output: {} ({} bytes)", output.display(), size);

    if open {
        open_file(&output)?;
    }

    Ok(())
}

/// List the form fields of a PDF
fn cmd_fields(input: &Path) -> Result<()> {
    if !input.exists() {
        bail!("Input file not found: {}", input.display());
    }

    let doc = Document::load(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let form = AcroForm::load(&doc)?;

    if form.is_empty() {
        println!("No form fields");
        return Ok(());
    }

    for field in form.fields() {
        let rect = field
            .widgets
            .first()
            .map(|w| format!("[{} {} {} {}]", w.rect.x1, w.rect.y1, w.rect.x2, w.rect.y2))
            .unwrap_or_else(|| "-".to_string());
        let value = field.value(&doc).unwrap_or_default();

        println!("{}\t{}\t{}\t{}", field.name, field.kind.as_str(), rect, value);
    }

    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: &Path) -> Result<()> {
    let metadata = read_metadata(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }
    println!("Form fields: {}", metadata.field_count);

    Ok(())
}
