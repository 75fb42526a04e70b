use clap::{Parser, ValueEnum};
use docmerge::{
    BatchProgress, BatchRequest, DocMerge, DocMergeError, Orientation, OutputFormat, PageFooterSpec,
    PageFormat, PageModel, generate_batch, rows_from_json, write_archive,
};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Pdf,
    Docx,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PageArg {
    A4,
    Letter,
}

/// Render one document per data row and bundle them into a ZIP archive.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Template HTML; pages are separated by the page-break delimiter
    #[arg(long)]
    template: PathBuf,

    /// JSON array of row objects
    #[arg(long)]
    rows: PathBuf,

    /// Output ZIP archive
    #[arg(long)]
    out: PathBuf,

    #[arg(long, value_enum, default_value_t = FormatArg::Pdf)]
    format: FormatArg,

    /// Filename pattern such as "{LastName}_{FirstName}"
    #[arg(long)]
    pattern: Option<String>,

    /// Prefix for rows whose pattern cannot be filled
    #[arg(long, default_value = "document")]
    prefix: String,

    #[arg(long, value_enum, default_value_t = PageArg::A4)]
    page: PageArg,

    #[arg(long, default_value_t = false)]
    landscape: bool,

    /// TrueType font to embed (repeatable)
    #[arg(long = "font")]
    fonts: Vec<PathBuf>,

    /// Footer text; {page} and {pages} are replaced in PDF output
    #[arg(long)]
    footer: Option<String>,

    /// Write a JSONL layout trace
    #[arg(long)]
    debug_log: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("docmerge=info")).init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), DocMergeError> {
    let template = PageModel::split(&fs::read_to_string(&args.template)?);
    let rows = rows_from_json(&fs::read_to_string(&args.rows)?)?;

    let mut builder = DocMerge::builder()
        .page_format(match args.page {
            PageArg::A4 => PageFormat::A4,
            PageArg::Letter => PageFormat::Letter,
        })
        .orientation(if args.landscape {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        })
        .font_files(args.fonts);
    if let Some(dir) = args.template.parent() {
        builder = builder.image_base_dir(dir);
    }
    if let Some(text) = args.footer {
        builder = builder.footer(PageFooterSpec::new(text));
    }
    if let Some(path) = args.debug_log {
        builder = builder.debug_log(path);
    }
    let engine = builder.build()?;

    let request = BatchRequest {
        format: match args.format {
            FormatArg::Pdf => OutputFormat::Pdf,
            FormatArg::Docx => OutputFormat::Docx,
        },
        pattern: args.pattern,
        fallback_prefix: args.prefix,
    };
    let report = generate_batch(
        &engine,
        &rows,
        &template,
        &request,
        |progress: BatchProgress| {
            log::debug!("{}/{} rows ({} failed)", progress.current, progress.total, progress.failed);
        },
        || false,
    );

    let file = BufWriter::new(File::create(&args.out)?);
    let mut file = write_archive(&report, file)?;
    file.flush()?;
    log::info!(
        "wrote {} documents to {} ({} failed)",
        report.generated(),
        args.out.display(),
        report.failed()
    );
    Ok(())
}
