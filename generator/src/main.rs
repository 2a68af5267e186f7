//! inkgen CLI - generate one document per CSV row from an SVG template
//!
//! # Main Commands
//!
//! ```bash
//! inkgen generate badge.svg -d guests.csv -f pdf -o "out/%VAR_name%.pdf"
//! inkgen generate badge.svg --config job.json --report report.json
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! inkgen parse guests.csv                       # Dataset as JSON
//! inkgen render badge.svg -d guests.csv --row 2 # One rendered SVG to stdout
//! inkgen formats                                # Supported output formats
//! ```

use clap::{Args, Parser, Subcommand};
use inkgen::logs::{log_info, log_success, log_warning};
use inkgen::{
    generate, load_dataset, structure, ColumnMode, ExporterKind, ExtraRules, GenerateOptions,
    OutputFormat, Template,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "inkgen")]
#[command(about = "Generate one document per CSV row from an SVG template", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render and export every row of the data file
    Generate(GenerateArgs),

    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Address columns by header name or by index
        #[arg(short, long, default_value = "name")]
        var_type: ColumnMode,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render one row and print the resulting SVG
    Render {
        /// SVG template
        template: PathBuf,

        /// CSV data file
        #[arg(short, long, default_value = "data.csv")]
        data_file: PathBuf,

        /// Address columns by header name or by index
        #[arg(short, long, default_value = "name")]
        var_type: ColumnMode,

        /// Extra replacements, `literal=>column|…`
        #[arg(short = 'x', long, default_value = "")]
        extra_vars: String,

        /// Zero-based row index
        #[arg(short, long, default_value = "0")]
        row: usize,
    },

    /// List supported output formats
    Formats,
}

#[derive(Args)]
struct GenerateArgs {
    /// SVG template
    template: PathBuf,

    /// JSON job file with generation options; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// CSV data file (default: data.csv)
    #[arg(short, long)]
    data_file: Option<PathBuf>,

    /// Address columns by header name or by index (default: name)
    #[arg(short, long)]
    var_type: Option<ColumnMode>,

    /// Output format: svg, png, pdf, ps, eps, emf, wmf, jpg (default: pdf)
    #[arg(short, long)]
    format: Option<String>,

    /// Resolution for bitmap formats (default: 96)
    #[arg(long)]
    dpi: Option<f64>,

    /// Output path pattern, e.g. "out/%VAR_name%.pdf"
    #[arg(short, long)]
    output: Option<String>,

    /// Extra replacements, `literal=>column|…`
    #[arg(short = 'x', long)]
    extra_vars: Option<String>,

    /// Open the first generated file
    #[arg(short, long)]
    preview: bool,

    /// Converter for non-SVG formats
    #[arg(long, env = "INKGEN_EXPORTER")]
    exporter: Option<ExporterKind>,

    /// Path to the inkscape program
    #[arg(long, env = "INKGEN_INKSCAPE")]
    inkscape: Option<PathBuf>,

    /// Path to the rsvg-convert program
    #[arg(long, env = "INKGEN_RSVG_CONVERT")]
    rsvg_convert: Option<PathBuf>,

    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate(args) => cmd_generate(args),

        Commands::Parse {
            input,
            var_type,
            output,
        } => cmd_parse(&input, var_type, output.as_deref()),

        Commands::Render {
            template,
            data_file,
            var_type,
            extra_vars,
            row,
        } => cmd_render(&template, &data_file, var_type, &extra_vars, row),

        Commands::Formats => cmd_formats(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// Job file first, then explicit flags on top.
fn build_options(args: &GenerateArgs) -> Result<GenerateOptions, Box<dyn std::error::Error>> {
    let mut options = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config \"{}\": {}", path.display(), e))?;
            GenerateOptions::from_json(&json)?
        }
        None => GenerateOptions::default(),
    };

    if let Some(data_file) = &args.data_file {
        options.data_file = data_file.clone();
    }
    if let Some(var_type) = args.var_type {
        options.var_type = var_type;
    }
    if let Some(format) = &args.format {
        options.format = format.clone();
    }
    if let Some(dpi) = args.dpi {
        options.dpi = dpi;
    }
    if let Some(output) = &args.output {
        options.output_pattern = output.clone();
    }
    if let Some(extra_vars) = &args.extra_vars {
        options.extra_vars = extra_vars.clone();
    }
    if args.preview {
        options.preview = true;
    }
    if let Some(kind) = args.exporter {
        options.exporter.kind = kind;
    }
    let program = match options.exporter.kind {
        ExporterKind::Inkscape => &args.inkscape,
        ExporterKind::Rsvg => &args.rsvg_convert,
    };
    if let Some(program) = program {
        options.exporter.program = Some(program.clone());
    }

    Ok(options)
}

fn cmd_generate(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let options = build_options(&args)?;
    log_info(format!("📄 Template: {}", args.template.display()));

    let report = generate(&args.template, &options)?;

    if let Some(report_path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(report_path, json)?;
        log_success(format!("💾 Report written to: {}", report_path.display()));
    }

    if report.failed() > 0 {
        for outcome in report.rows.iter().filter(|r| !r.is_exported()).take(5) {
            eprintln!("   Row {}:", outcome.row + 1);
            for err in outcome.errors.iter().take(3) {
                eprintln!("     - {}", err);
            }
        }
        std::process::exit(1);
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_parse(
    input: &Path,
    var_type: ColumnMode,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let dataset = load_dataset(input, var_type)?;

    eprintln!("   Encoding: {}", dataset.encoding);
    eprintln!("   Columns ({}): {}", var_type, dataset.columns.join(", "));
    eprintln!("✅ Parsed {} rows", dataset.len());

    let json = serde_json::to_string_pretty(&dataset.entries)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_render(
    template_path: &Path,
    data_file: &Path,
    var_type: ColumnMode,
    extra_vars: &str,
    row: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let rules = ExtraRules::parse(extra_vars)?;
    let dataset = load_dataset(data_file, var_type)?;
    let entry = dataset
        .entries
        .get(row)
        .ok_or_else(|| format!("Row {} out of range ({} rows)", row, dataset.len()))?;
    let template = Template::load(template_path)?;

    let text = template.expand(entry, &rules)?;
    let filtered = structure(&text, entry)?;
    for column in &filtered.unknown_columns {
        log_warning(format!("Column \"{}\" not in the csv file", column));
    }
    eprintln!(
        "   {} layer(s) shown, {} cleared",
        filtered.shown, filtered.cleared
    );

    print!("{}", filtered.document.to_xml_string());
    Ok(())
}

fn cmd_formats() -> Result<(), Box<dyn std::error::Error>> {
    for format in OutputFormat::ALL {
        println!("  {:<5} {}", format, format.description());
    }
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
