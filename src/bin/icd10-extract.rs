//! CLI binary for icd10-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use icd10_extract::{
    default_result_path, AnalysisConfig, AnalysisOutput, AnalysisProgressCallback, AnalysisStep,
    ClinicalTablesClient, ErrorKind, Icd10Analyzer, Icd10Error, OllamaOcrService,
    ProgressCallback, TerminologyMatch, TerminologySearch,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner naming the current step, plus one
/// log line per finished step.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_step_start(&self, step: AnalysisStep) {
        self.bar.set_message(format!("{step}…"));
    }

    fn on_step_complete(&self, step: AnalysisStep, items: usize, elapsed_ms: u64) {
        let detail = match step {
            AnalysisStep::Extract => format!("{items} chars"),
            AnalysisStep::Resolve => format!("{items} codes"),
            AnalysisStep::CrossReference => format!("{items} matches"),
        };
        self.bar.println(format!(
            "  {} {:<32} {:<12} {}",
            green("✓"),
            step.to_string(),
            dim(&detail),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_step_error(&self, step: AnalysisStep, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<32} {}", red("✗"), step.to_string(), red(&msg)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a photo of a handwritten note (stdout)
  icd10-extract note.jpg

  # Save <stem>_result.json next to the working directory
  icd10-extract --save note.jpg

  # Local vision model through Ollama
  icd10-extract --provider ollama --model qwen2.5vl:7b note.jpg

  # Local OCR engine for the reading step
  icd10-extract --ocr --ocr-model scb10x/typhoon-ocr-3b note.jpg

  # Terminology search only (no API key needed)
  icd10-extract --lookup "epidermal cyst"

  # JSON output
  icd10-extract --json note.png > result.json

EXIT CODES:
  0  success
  1  internal error (configuration, output file)
  2  invalid input (wrong file type, too large, not an image)
  3  AI service unavailable (call failed or timed out)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred when set)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Extract ICD-10 codes from photos of handwritten medical documents.
#[derive(Parser, Debug)]
#[command(
    name = "icd10-extract",
    version,
    about = "Extract ICD-10 codes from photos of handwritten medical documents",
    long_about = "Read a photographed medical document with a vision model, derive the \
diagnoses, treatments and procedures it mentions, and map them to ICD-10 codes with a short \
justification. Optionally cross-references each diagnosis against the NLM ICD-10-CM search API.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JPEG or PNG image of the document.
    #[arg(required_unless_present = "lookup")]
    input: Option<PathBuf>,

    /// Only search the terminology service for this diagnosis, then exit.
    #[arg(long, value_name = "DIAGNOSIS", conflicts_with = "input")]
    lookup: Option<String>,

    /// Write the JSON result to this file.
    #[arg(short, long, env = "ICD10_OUTPUT")]
    output: Option<PathBuf>,

    /// Write the JSON result to <image-stem>_result.json.
    #[arg(long, conflicts_with = "output")]
    save: bool,

    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1, qwen2.5vl:7b).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Read the document with a local OCR model (via `ollama run`) instead of the vision LLM.
    #[arg(long, env = "ICD10_OCR")]
    ocr: bool,

    /// OCR model used with --ocr.
    #[arg(long, env = "ICD10_OCR_MODEL", default_value = icd10_extract::pipeline::ocr::DEFAULT_OCR_MODEL)]
    ocr_model: String,

    /// Maximum number of codes to ask for.
    #[arg(long, env = "ICD10_MAX_CODES", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..=10))]
    max_codes: u32,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "ICD10_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "ICD10_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Largest accepted image, in bytes.
    #[arg(long, env = "ICD10_MAX_BYTES", default_value_t = icd10_extract::config::DEFAULT_MAX_IMAGE_BYTES)]
    max_bytes: u64,

    /// Findings longer than this are cut before the coding prompt.
    #[arg(long, env = "ICD10_MAX_FINDINGS_CHARS", default_value_t = 4000)]
    max_findings_chars: usize,

    /// Per-model-call timeout in seconds.
    #[arg(long, env = "ICD10_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "ICD10_EXTRACTION_PROMPT")]
    extraction_prompt: Option<PathBuf>,

    /// Path to a text file containing a custom resolution prompt ({findings}, {max_codes}).
    #[arg(long, env = "ICD10_RESOLUTION_PROMPT")]
    resolution_prompt: Option<PathBuf>,

    /// Skip the terminology cross-reference.
    #[arg(long, env = "ICD10_NO_LOOKUP")]
    no_lookup: bool,

    /// Matches requested per terminology query.
    #[arg(long, env = "ICD10_LOOKUP_RESULTS", default_value_t = 3)]
    lookup_results: usize,

    /// Terminology search endpoint.
    #[arg(long, env = "ICD10_TERMINOLOGY_URL", default_value = icd10_extract::config::DEFAULT_TERMINOLOGY_URL)]
    terminology_url: String,

    /// Print the result as JSON on stdout.
    #[arg(long, env = "ICD10_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "ICD10_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ICD10_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ICD10_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the spinner is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.lookup.is_none();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            let code = match e.downcast_ref::<Icd10Error>().map(Icd10Error::kind) {
                Some(ErrorKind::InvalidInput) => 2,
                Some(ErrorKind::ExternalService) => 3,
                _ => 1,
            };
            ExitCode::from(code)
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    // ── Lookup-only mode ─────────────────────────────────────────────────
    if let Some(ref query) = cli.lookup {
        let client = ClinicalTablesClient::new(&cli.terminology_url, 10)?;
        let matches = client.search(query, cli.lookup_results.max(1)).await;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&matches).context("Failed to serialise matches")?
            );
        } else {
            print_matches(&matches, "");
        }
        return Ok(());
    }

    let Some(ref input) = cli.input else {
        anyhow::bail!("an input image is required");
    };

    // ── Build config + analyzer ──────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn AnalysisProgressCallback>),
    )
    .await?;

    let mut analyzer = Icd10Analyzer::from_config(&config)?;
    if cli.ocr {
        let ocr = OllamaOcrService::new(&cli.ocr_model).timeout_secs(cli.api_timeout);
        analyzer = analyzer.with_vision(Arc::new(ocr));
    }

    // ── Run analysis ─────────────────────────────────────────────────────
    let save_path = if cli.save {
        Some(default_result_path(input))
    } else {
        cli.output.clone()
    };
    let result = match save_path {
        Some(ref path) => analyzer.analyze_to_file(input, path).await,
        None => analyzer.analyze_file(input).await,
    };
    if let Some(ref cb) = progress {
        cb.finish();
    }
    let output = result?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_report(&output);
    }

    if !cli.quiet {
        if let Some(ref path) = save_path {
            eprintln!("{}  saved  →  {}", green("✔"), bold(&path.display().to_string()));
        }
        eprintln!(
            "   {} tokens in  /  {} tokens out  ·  {}ms total",
            dim(&output.stats.total_input_tokens.to_string()),
            dim(&output.stats.total_output_tokens.to_string()),
            output.stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_codes(cli.max_codes as usize)
        .max_image_bytes(cli.max_bytes)
        .max_findings_chars(cli.max_findings_chars)
        .api_timeout_secs(cli.api_timeout)
        .terminology_lookup(!cli.no_lookup)
        .terminology_max_results(cli.lookup_results)
        .terminology_url(cli.terminology_url.clone());

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = cli.extraction_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read extraction prompt from {:?}", path))?;
        builder = builder.extraction_prompt(prompt);
    }
    if let Some(ref path) = cli.resolution_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read resolution prompt from {:?}", path))?;
        builder = builder.resolution_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_report(output: &AnalysisOutput) {
    let rule = "=".repeat(70);
    println!("{}", bold("FINDINGS:"));
    println!("{rule}");
    println!("{}", output.findings.trim());
    println!("{rule}\n");

    println!("{}", bold("ICD-10 CODES:"));
    println!("{rule}");
    if output.icd_codes.is_empty() {
        println!("No ICD-10 codes identified");
    }
    for (i, code) in output.icd_codes.iter().enumerate() {
        let label = if code.code.is_empty() { "N/A" } else { &code.code };
        println!("{}. {}", i + 1, cyan(label));
        println!("   {}", code.diagnosis.as_deref().unwrap_or("N/A"));
        println!("   > {}", code.reason.as_deref().unwrap_or("N/A"));

        if let Some(xref) = output
            .cross_references
            .iter()
            .find(|x| x.ai_code == code.code && Some(&x.diagnosis) == code.diagnosis.as_ref())
        {
            println!("   {} ({})", dim("database:"), xref.diagnosis);
            print_matches(&xref.matches, "     ");
        }
        println!();
    }
    println!("{rule}");

    for warning in &output.parse_warnings {
        eprintln!("{} {}", cyan("⚠"), warning);
    }
}

fn print_matches(matches: &[TerminologyMatch], indent: &str) {
    if matches.is_empty() {
        println!("{indent}{}", dim("no matches"));
    }
    for m in matches {
        println!("{indent}{} - {}", m.code, m.description);
    }
}
