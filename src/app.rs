use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use console::style;
use metalens::extract::Extractor;
use metalens::{Category, ExtractOptions, Outcome, ReportFormat, pipeline};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const HEADER_WIDTH: usize = 74;

/// Extrae la metadata de cualquier archivo y la guarda como reporte de texto.
#[derive(Debug, Parser)]
#[command(name = "metalens", version, about = "Extract metadata from any file into a text report")]
pub struct Cli {
    /// File (or directory) to inspect.
    #[arg(required_unless_present = "capabilities")]
    pub input: Option<PathBuf>,

    /// Where to write the report (defaults to `<stem>_metadata.<ext>` next to the input).
    #[arg(short, long, conflicts_with = "recursive")]
    pub output: Option<PathBuf>,

    /// Report format: txt or json.
    #[arg(short, long, default_value = "txt")]
    pub format: ReportFormat,

    /// Skip MD5/SHA-256 digests for unrecognized files.
    #[arg(long)]
    pub no_hash: bool,

    /// Descend into subdirectories when INPUT is a directory.
    #[arg(short, long)]
    pub recursive: bool,

    /// Also print the report to stdout.
    #[arg(long)]
    pub print: bool,

    /// Explicit path to the ffprobe executable.
    #[arg(long, env = "METALENS_FFPROBE")]
    pub ffprobe: Option<PathBuf>,

    /// Seconds to wait for ffprobe before giving up.
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    pub timeout: u64,

    /// List the extraction sources available on this machine and exit.
    #[arg(long)]
    pub capabilities: bool,

    /// Verbose logging (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Un directorio produce un reporte por archivo, así que `--output` no tiene destino.
    fn check_output(&self, input_is_dir: bool) -> Result<()> {
        if input_is_dir && let Some(output) = &self.output {
            bail!(
                "--output `{}` cannot be used when INPUT is a directory; reports are written next to each file",
                output.display()
            );
        }
        Ok(())
    }

    fn options(&self) -> ExtractOptions {
        ExtractOptions {
            include_hash: !self.no_hash,
            tool_timeout: Duration::from_secs(self.timeout),
            ffprobe_path: self.ffprobe.clone(),
            ..ExtractOptions::default()
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);
    let extractor = Extractor::with_options(cli.options());

    if cli.capabilities {
        render_capabilities(&extractor);
        return Ok(());
    }

    let Some(input) = cli.input.as_deref() else {
        bail!("an input path is required");
    };

    let input_is_dir = input.is_dir();
    cli.check_output(input_is_dir)?;

    if input_is_dir {
        let results = pipeline::process_directory(input, cli.recursive, &extractor, cli.format)
            .with_context(|| format!("could not read directory `{}`", input.display()))?;
        let mut failures = 0_usize;
        for (path, result) in &results {
            match result {
                Ok(outcome) => render_success(outcome, cli.print),
                Err(error) => {
                    failures += 1;
                    render_failure(&path.display().to_string(), error);
                }
            }
        }
        println!(
            "{}",
            style(format!(
                "{} file(s) processed, {failures} failed.",
                results.len()
            ))
            .dim()
        );
        if failures > 0 {
            bail!("{failures} file(s) could not be processed");
        }
        return Ok(());
    }

    let outcome = pipeline::process_file(input, cli.output.as_deref(), &extractor, cli.format)
        .with_context(|| format!("could not extract metadata from `{}`", input.display()))?;
    render_success(&outcome, cli.print);
    Ok(())
}

/// `RUST_LOG` manda salvo que se pida verbosidad explícita.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("metalens=debug"),
        _ => EnvFilter::new("metalens=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn render_success(outcome: &Outcome, print: bool) {
    if print {
        println!("{}", outcome.text);
    }
    println!(
        "{} {} {}",
        style("✔").green().bold(),
        style(outcome.input.display()).bold(),
        style(format!("[{} · {}]", outcome.category, outcome.mime)).dim()
    );
    println!(
        "  {} {} {}",
        style("→").dim(),
        style(outcome.output.display()).cyan(),
        style(format!("({} fields)", outcome.field_count)).dim()
    );
}

pub fn render_failure(label: &str, error: &dyn std::fmt::Display) {
    eprintln!(
        "{} {} {}",
        style("✖").red().bold(),
        style(label).bold(),
        style(error).red()
    );
}

fn render_capabilities(extractor: &Extractor) {
    let border = "─".repeat(HEADER_WIDTH - 2);
    println!("\n{}", style(format!("┌{border}┐")).cyan());
    println!(
        "{}",
        style(format!(
            "│ {:^inner_width$} │",
            "MetaLens · extraction sources",
            inner_width = HEADER_WIDTH - 4
        ))
        .cyan()
        .bold()
    );
    println!("{}\n", style(format!("└{border}┘")).cyan());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            header_cell("Category"),
            header_cell("Source"),
            header_cell("Status"),
        ]);

    for category in Category::ALL {
        for status in extractor.capabilities().sources(category) {
            let state = match (&status.available, &status.detail) {
                (true, Some(detail)) => Cell::new(detail).fg(Color::Green),
                (true, None) => Cell::new("built in").fg(Color::Green),
                (false, _) => Cell::new("not found").fg(Color::Yellow),
            };
            table.add_row(vec![
                Cell::new(category.label()),
                Cell::new(status.source.key()).fg(Color::Rgb {
                    r: 160,
                    g: 196,
                    b: 255,
                }),
                state,
            ]);
        }
    }
    println!("{table}");
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
        .add_attribute(Attribute::Underlined)
}
