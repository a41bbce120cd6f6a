//! doccheck CLI - PDF title detection and title search tool

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use doccheck::pipeline::{MemoryDocumentStore, MemoryProgressStore, PdftoppmRenderer};
use doccheck::{
    AnnotationAction, Annotator, DocCheck, DocumentRecord, FeatureTable, FuzzyMatcher, JobState,
    Language, MatchOptions, Pipeline, PipelineConfig, ThresholdMode, TitleClassifier, WorkerPool,
};

#[derive(Parser)]
#[command(name = "doccheck")]
#[command(author = "doccheck contributors")]
#[command(version)]
#[command(about = "Detect PDF titles and find where they recur", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the first-page text blocks with their features
    Blocks {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Classify the title of a PDF
    Title {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Classifier checkpoint
        #[arg(short, long, env = "DOCCHECK_MODEL", default_value = "ml/checkpoints/models.json")]
        model: PathBuf,

        /// Print per-block scores
        #[arg(short, long)]
        verbose: bool,
    },

    /// Find every recurrence of the title (or a given text) in a PDF
    Matches {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Text to search for (classified title if not specified)
        #[arg(short, long)]
        target: Option<String>,

        /// Classifier checkpoint
        #[arg(short, long, env = "DOCCHECK_MODEL", default_value = "ml/checkpoints/models.json")]
        model: PathBuf,

        /// How the acceptance threshold is applied
        #[arg(long, value_enum, default_value = "compatible")]
        threshold: ThresholdArg,

        /// Language used for word diff classification
        #[arg(long, value_enum, default_value = "russian")]
        language: LanguageArg,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Highlight, frame or redact text on one page
    Annotate {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// 1-indexed page number
        #[arg(short, long)]
        page: u32,

        /// Text to annotate (repeatable)
        #[arg(short, long = "text", required = true)]
        texts: Vec<String>,

        /// Annotation to apply
        #[arg(short, long, value_enum, default_value = "highlight")]
        action: ActionArg,

        /// Output file (input is rewritten if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Run the full processing pipeline on a PDF
    Process {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Classifier checkpoint
        #[arg(short, long, env = "DOCCHECK_MODEL", default_value = "ml/checkpoints/models.json")]
        model: PathBuf,

        /// Scratch directory for rendered pages
        #[arg(long, env = "DOCCHECK_WORK_DIR", default_value = "tmp")]
        work_dir: PathBuf,

        /// Annotation applied to located matches
        #[arg(short, long, value_enum, default_value = "highlight")]
        action: ActionArg,

        /// Number of worker threads
        #[arg(short, long, default_value_t = 2)]
        workers: usize,

        /// Render resolution passed to pdftoppm
        #[arg(long)]
        dpi: Option<u32>,
    },

    /// Show version information
    Version,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ThresholdArg {
    /// Distance scaled by 100 before comparison
    Compatible,
    /// Plain normalized distance
    Normalized,
}

impl From<ThresholdArg> for ThresholdMode {
    fn from(arg: ThresholdArg) -> Self {
        match arg {
            ThresholdArg::Compatible => ThresholdMode::Compatible,
            ThresholdArg::Normalized => ThresholdMode::Normalized,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum LanguageArg {
    Russian,
    English,
}

impl From<LanguageArg> for Language {
    fn from(arg: LanguageArg) -> Self {
        match arg {
            LanguageArg::Russian => Language::Russian,
            LanguageArg::English => Language::English,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ActionArg {
    Highlight,
    Squiggly,
    Underline,
    Strikeout,
    /// Rectangle outline around the text
    Frame,
    /// Remove the text and paint over it
    Redact,
}

impl From<ActionArg> for AnnotationAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Highlight => AnnotationAction::Highlight,
            ActionArg::Squiggly => AnnotationAction::Squiggly,
            ActionArg::Underline => AnnotationAction::Underline,
            ActionArg::Strikeout => AnnotationAction::Strikeout,
            ActionArg::Frame => AnnotationAction::Frame,
            ActionArg::Redact => AnnotationAction::Redact,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Blocks { input, json } => cmd_blocks(&input, json),
        Commands::Title {
            input,
            model,
            verbose,
        } => cmd_title(&input, &model, verbose),
        Commands::Matches {
            input,
            target,
            model,
            threshold,
            language,
            output,
        } => {
            let options = MatchOptions::new()
                .with_threshold_mode(threshold.into())
                .with_language(language.into());
            cmd_matches(&input, target, &model, options, output.as_deref())
        }
        Commands::Annotate {
            input,
            page,
            texts,
            action,
            output,
        } => cmd_annotate(&input, page, &texts, action.into(), output.as_deref()),
        Commands::Process {
            input,
            output,
            model,
            work_dir,
            action,
            workers,
            dpi,
        } => {
            let config = PipelineConfig::new()
                .with_model_path(model)
                .with_work_dir(work_dir)
                .with_highlight_action(action.into());
            cmd_process(&input, output.as_deref(), config, workers, dpi)
        }
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn cmd_blocks(input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let blocks = doccheck::extract_blocks(input)?;
    let features = FeatureTable::from_blocks(&blocks);

    if json {
        let value = serde_json::json!({ "blocks": blocks, "features": features });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:>3}  {:>4} {:>5} {:>5} {:>5} {:>4}  {}",
            "#", "font", "len", "area", "bold", "id%", "text"
        )
        .bold()
    );
    for (i, (block, row)) in blocks.iter().zip(&features.rows).enumerate() {
        println!(
            "{:>3}  {:>4} {:>5} {:>5} {:>5} {:>4}  {}",
            i,
            row.font_style.code(),
            row.length_rank,
            row.area_rank,
            row.bold_percentage,
            row.id_percentage,
            truncate(&block.title_text(), 60)
        );
    }

    Ok(())
}

fn cmd_title(input: &Path, model: &Path, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let blocks = doccheck::extract_blocks(input)?;
    let features = FeatureTable::from_blocks(&blocks);
    let candidate = TitleClassifier::from_checkpoint(model)?.classify(&blocks, &features)?;

    println!("{}", candidate.text.bold());
    println!(
        "  {} block {}, confidence {:.3}",
        "└─".dimmed(),
        candidate.block_index,
        candidate.confidence
    );

    if verbose {
        println!();
        for (i, (block, score)) in blocks.iter().zip(&candidate.scores).enumerate() {
            let line = format!("{:>3}  {:.3}  {}", i, score, truncate(&block.title_text(), 60));
            if i == candidate.block_index {
                println!("{}", line.green());
            } else {
                println!("{}", line);
            }
        }
    }

    Ok(())
}

fn cmd_matches(
    input: &Path,
    target: Option<String>,
    model: &Path,
    options: MatchOptions,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (target, matches) = match target {
        Some(target) => {
            let matches = FuzzyMatcher::new(options).locate(input, &target)?;
            (target, matches)
        }
        None => {
            let analysis = DocCheck::new()
                .with_model(model)
                .with_match_options(options)
                .analyze(input)?;
            (analysis.title.text, analysis.matches)
        }
    };

    let json = serde_json::to_string_pretty(&serde_json::json!({
        "target": target,
        "matches": matches,
    }))?;

    if let Some(path) = output {
        fs::write(path, &json)?;
        println!(
            "{} {} match(es) to {}",
            "Saved".green(),
            matches.len(),
            path.display()
        );
    } else {
        println!("{}", json);
    }

    Ok(())
}

fn cmd_annotate(
    input: &Path,
    page: u32,
    texts: &[String],
    action: AnnotationAction,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut annotator = Annotator::open(input)?;
    let count = annotator.annotate_page(page, texts, action)?;

    let target = output.unwrap_or(input);
    annotator.save(target)?;

    println!(
        "{} {} occurrence(s) on page {} ({})",
        "Annotated".green(),
        count,
        page,
        action
    );
    println!("  {} {}", "└─".dimmed(), target.display());

    Ok(())
}

fn cmd_process(
    input: &Path,
    output: Option<&Path>,
    config: PipelineConfig,
    workers: usize,
    dpi: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    doccheck::validate_upload(input)?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let id: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let output_dir = output
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(format!("{}_doccheck", stem)));
    fs::create_dir_all(&output_dir)?;

    // Annotation rewrites the document, so work on a copy.
    let working_copy = output_dir.join(format!("{}.pdf", id));
    fs::copy(input, &working_copy)?;

    let mut renderer = PdftoppmRenderer::new();
    if let Some(dpi) = dpi {
        renderer = renderer.with_dpi(dpi);
    }
    let pipeline = Arc::new(Pipeline::new(
        config.with_delays(
            Duration::ZERO,
            Duration::from_millis(200),
            Duration::from_millis(200),
        ),
        Arc::new(MemoryProgressStore::new()),
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(renderer),
    ));

    let pool = WorkerPool::new(pipeline.clone(), workers)?;
    if let Some(scheduled) = pipeline.submit(DocumentRecord::new(id.as_str(), working_copy.clone()))? {
        pool.submit(scheduled)?;
    }

    let pb = ProgressBar::new(1);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    while !pool.wait_idle(Duration::from_millis(100)) {
        if let Ok(status) = pipeline.status(&id) {
            pb.set_length(status.total.max(1) as u64);
            pb.set_position(status.processed.max(0) as u64);
        }
        if let Ok(record) = pipeline.documents().get(&id) {
            pb.set_message(record.state.to_string());
        }
    }
    pool.shutdown();

    let record = pipeline.documents().get(&id)?;
    let status = pipeline.status(&id)?;
    pb.finish_with_message(record.state.to_string());

    let images_dir = output_dir.join("pages");
    fs::create_dir_all(&images_dir)?;
    for image in &record.images {
        fs::write(images_dir.join(&image.name), &image.data)?;
    }
    fs::write(
        output_dir.join("result.json"),
        serde_json::to_string_pretty(&serde_json::json!({
            "document": record,
            "progress": status,
        }))?,
    )?;

    println!();
    match &record.ideal_title {
        Some(title) => println!("{} {}", "Title:".green().bold(), title),
        None => println!("{} {}", "Title:".yellow().bold(), "not detected".dimmed()),
    }
    if status.error {
        println!("{} {}", "Error:".red().bold(), status.error_description);
    }
    println!("{} {}", "Matches:".bold(), record.text_locations.len());
    if record.state != JobState::Complete {
        println!("{} {}", "State:".yellow().bold(), record.state);
    }

    println!("\n{}", "Output files:".green().bold());
    println!("  {} {}.pdf", "├─".dimmed(), id);
    println!("  {} result.json", "├─".dimmed());
    println!("  {} pages/ ({} image(s))", "└─".dimmed(), record.images.len());

    Ok(())
}

fn cmd_version() {
    println!("{} {}", "doccheck".green().bold(), env!("CARGO_PKG_VERSION"));
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
