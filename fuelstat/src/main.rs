//! Fuelstat CLI - Standardize petroleum volume records
//!
//! # Main Commands
//!
//! ```bash
//! fuelstat run omc_2021.csv bdc_2021.csv -o canonical.json --csv canonical.csv
//! fuelstat override add "G.O.I.L" "GOIL PLC"   # Pin a spelling to a company
//! fuelstat override list
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! fuelstat parse input.csv            # Just parse input to raw records
//! fuelstat resolve input.csv          # Show company clusters and ambiguities
//! fuelstat map-product "Premium"      # Map raw product labels
//! fuelstat reference                  # Print the built-in reference tables
//! fuelstat validate-reference -t taxonomy.json -d densities.json
//! ```

use clap::{Parser, Subcommand};
use fuelstat::config::PipelineConfig;
use fuelstat::overrides::{OverrideRegistry, StoredOverride, DEFAULT_OVERRIDES_PATH};
use fuelstat::parser::load_raw_records;
use fuelstat::reference::ReferenceData;
use fuelstat::{
    run_files, write_records_csv, CompanyType, OverrideTable, Pipeline, ProductMapping, RawRecord,
    RunOptions,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fuelstat")]
#[command(about = "Standardize and quality-score petroleum volume records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Reference table and config files shared by several commands.
#[derive(clap::Args, Clone, Default)]
struct ReferenceArgs {
    /// Taxonomy JSON file (default: built-in)
    #[arg(short, long)]
    taxonomy: Option<PathBuf>,

    /// Density table JSON file (default: built-in)
    #[arg(short, long)]
    densities: Option<PathBuf>,

    /// Pipeline config JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: raw records → canonical records + report
    Run {
        /// Input files (CSV or JSON), processed as one batch
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        reference: ReferenceArgs,

        /// Override registry file
        #[arg(long, default_value = DEFAULT_OVERRIDES_PATH)]
        overrides: PathBuf,

        /// Ignore the override registry
        #[arg(long)]
        no_overrides: bool,

        /// Output file for canonical records (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write canonical records as flat CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write the full run report (summary, dropped, audit, ambiguities, log)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write only the dropped-record report
        #[arg(long)]
        dropped: Option<PathBuf>,

        /// Write only the deduplication audit log
        #[arg(long)]
        audit: Option<PathBuf>,

        /// Write only the run summary
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Parse an input file and output raw records as JSON
    Parse {
        /// Input file (CSV or JSON)
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Cluster company names and show canonical companies
    Resolve {
        /// Input files (CSV or JSON)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Pipeline config JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override registry file
        #[arg(long, default_value = DEFAULT_OVERRIDES_PATH)]
        overrides: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Map raw product labels to canonical products
    MapProduct {
        /// Raw labels
        #[arg(required = true)]
        labels: Vec<String>,

        /// Taxonomy JSON file (default: built-in)
        #[arg(short, long)]
        taxonomy: Option<PathBuf>,
    },

    /// Print the built-in reference tables
    Reference,

    /// Validate reference table and config files
    ValidateReference {
        #[command(flatten)]
        reference: ReferenceArgs,
    },

    /// Manage company-name overrides
    Override {
        /// Override registry file (default: .fuelstat/overrides.json)
        #[arg(long, global = true)]
        file: Option<PathBuf>,

        #[command(subcommand)]
        action: OverrideAction,
    },
}

#[derive(Subcommand)]
enum OverrideAction {
    /// List stored overrides
    List,

    /// Add or replace an override
    Add {
        /// Raw spelling as found in exports
        raw_name: String,
        /// Canonical company name it resolves to
        canonical_name: String,
        /// Restrict to one company type (BDC or OMC)
        #[arg(long)]
        company_type: Option<String>,
        /// Free-form note
        #[arg(long)]
        note: Option<String>,
    },

    /// Remove an override
    Remove {
        /// Raw spelling
        raw_name: String,
        /// Company type the override was restricted to
        #[arg(long)]
        company_type: Option<String>,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fuelstat=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            inputs,
            reference,
            overrides,
            no_overrides,
            output,
            csv,
            report,
            dropped,
            audit,
            summary,
        } => {
            let options = RunOptions {
                inputs,
                taxonomy: reference.taxonomy,
                densities: reference.densities,
                overrides: (!no_overrides).then_some(overrides),
                config: reference.config,
            };
            let outputs = RunOutputs {
                records: output,
                csv,
                report,
                dropped,
                audit,
                summary,
            };
            cmd_run(&options, &outputs)
        }

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Resolve {
            inputs,
            config,
            overrides,
            output,
        } => cmd_resolve(&inputs, config.as_deref(), &overrides, output.as_deref()),

        Commands::MapProduct { labels, taxonomy } => cmd_map_product(&labels, taxonomy.as_deref()),

        Commands::Reference => cmd_reference(),

        Commands::ValidateReference { reference } => cmd_validate_reference(&reference),

        Commands::Override { file, action } => cmd_override(file.as_deref(), action),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

struct RunOutputs {
    records: Option<PathBuf>,
    csv: Option<PathBuf>,
    report: Option<PathBuf>,
    dropped: Option<PathBuf>,
    audit: Option<PathBuf>,
    summary: Option<PathBuf>,
}

fn cmd_run(options: &RunOptions, outputs: &RunOutputs) -> CliResult {
    for input in &options.inputs {
        eprintln!("📄 Input: {}", input.display());
    }

    let output = run_files(options)?;
    let report = &output.report;
    let summary = &report.summary;

    eprintln!("\n⚙️  Run {}", report.run_id);
    eprintln!("   Records: {} in → {} out", summary.records_in, summary.records_out);
    eprintln!(
        "   Companies: {} raw names → {} canonical",
        summary.companies_before, summary.companies_after
    );
    eprintln!(
        "   Products: {} raw labels → {} canonical",
        summary.products_before, summary.products_after
    );
    eprintln!("   Outliers flagged: {}", summary.outliers_flagged);
    eprintln!("   Duplicates discarded: {}", summary.duplicates_discarded);
    if summary.dropped() > 0 {
        eprintln!("   ⚠️  Dropped: {}", summary.dropped());
        for (reason, count) in &summary.dropped_by_reason {
            eprintln!("     - {}: {}", reason, count);
        }
    }
    if !report.input_errors.is_empty() {
        eprintln!("   ⚠️  Unreadable input rows: {}", report.input_errors.len());
        for error in report.input_errors.iter().take(5) {
            eprintln!("     - {}", error);
        }
    }
    if !report.ambiguities.is_empty() {
        eprintln!("   ⚠️  Ambiguous company matches: {}", report.ambiguities.len());
    }

    write_json(&output.records, outputs.records.as_deref())?;

    if let Some(path) = &outputs.csv {
        write_records_csv(&output.records, fs::File::create(path)?)?;
        eprintln!("💾 CSV written to: {}", path.display());
    }
    if let Some(path) = &outputs.report {
        write_json_file(report, path)?;
    }
    if let Some(path) = &outputs.dropped {
        write_json_file(&report.dropped, path)?;
    }
    if let Some(path) = &outputs.audit {
        write_json_file(&report.dedup_audit, path)?;
    }
    if let Some(path) = &outputs.summary {
        write_json_file(summary, path)?;
    }

    eprintln!("\n✨ Done! ({})", report.status());
    Ok(())
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> CliResult {
    eprintln!("📄 Parsing: {}", input.display());

    let parsed = load_raw_records(input)?;
    if !parsed.headers.is_empty() {
        eprintln!("   Encoding: {}", parsed.encoding);
        eprintln!("   Delimiter: '{}'", format_delimiter(parsed.delimiter));
        eprintln!("   Columns: {}", parsed.headers.join(", "));
    }
    eprintln!("✅ Parsed {} records", parsed.records.len());
    if !parsed.errors.is_empty() {
        eprintln!("⚠️  {} rows rejected", parsed.errors.len());
        for error in parsed.errors.iter().take(5) {
            eprintln!("   - {}", error);
        }
    }

    write_json(&parsed.records, output)
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    companies: &'a [std::sync::Arc<fuelstat::CanonicalCompany>],
    ambiguities: &'a [fuelstat::AmbiguousMatch],
}

fn cmd_resolve(inputs: &[PathBuf], config: Option<&Path>, overrides: &Path, output: Option<&Path>) -> CliResult {
    let mut records: Vec<RawRecord> = Vec::new();
    for input in inputs {
        records.extend(load_raw_records(input)?.records);
    }

    let config = PipelineConfig::load(config)?;
    let table = OverrideRegistry::open(overrides)?.table();
    let pipeline = Pipeline::new(config, ReferenceData::builtin(), table)?;
    let resolved = pipeline.resolve_companies(&records);

    eprintln!(
        "🔗 {} raw names → {} canonical companies",
        resolved.raw_name_count(),
        resolved.companies().len()
    );
    for ambiguity in resolved.ambiguities() {
        eprintln!(
            "   ⚠️  '{}' ({}) → '{}' ({} candidates)",
            ambiguity.raw_name,
            ambiguity.company_type,
            ambiguity.chosen,
            ambiguity.candidates.len()
        );
    }

    let out = ResolveOutput {
        companies: resolved.companies(),
        ambiguities: resolved.ambiguities(),
    };
    write_json(&out, output)
}

fn cmd_map_product(labels: &[String], taxonomy: Option<&Path>) -> CliResult {
    let reference = ReferenceData::load(taxonomy, None)?;
    let pipeline = Pipeline::new(PipelineConfig::default(), reference, OverrideTable::empty())?;

    let mut unmapped = 0;
    for label in labels {
        match pipeline.map_product(label) {
            ProductMapping::Mapped { product, default_unit, .. } => {
                let unit = default_unit.map(|u| format!(" [{}]", u)).unwrap_or_default();
                println!("  ✅ {} → {} ({}){}", label, product.canonical_product, product.category, unit);
            }
            ProductMapping::Unmapped => {
                unmapped += 1;
                println!("  ❌ {} → unmapped", label);
            }
        }
    }

    if unmapped > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_reference() -> CliResult {
    let json = serde_json::to_string_pretty(&ReferenceData::builtin())?;
    println!("{}", json);
    Ok(())
}

fn cmd_validate_reference(args: &ReferenceArgs) -> CliResult {
    eprintln!("✔️  Validating reference data");

    let reference = ReferenceData::load(args.taxonomy.as_deref(), args.densities.as_deref())?;
    reference.validate()?;
    eprintln!("   ✅ Taxonomy: {} rules", reference.taxonomy.len());
    eprintln!(
        "   ✅ Densities: {} products, {} categories, default {}",
        reference.densities.products.len(),
        reference.densities.categories.len(),
        reference.densities.default
    );

    if args.config.is_some() {
        PipelineConfig::load(args.config.as_deref())?;
        eprintln!("   ✅ Config");
    }
    Ok(())
}

fn cmd_override(file: Option<&Path>, action: OverrideAction) -> CliResult {
    let mut registry = match file {
        Some(path) => OverrideRegistry::open(path)?,
        None => OverrideRegistry::open_default()?,
    };

    match action {
        OverrideAction::List => {
            if registry.is_empty() {
                eprintln!("📋 No overrides stored yet.");
                eprintln!("   Use 'fuelstat override add <raw> <canonical>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored overrides ({}) in {}:\n", registry.len(), registry.path().display());
            for entry in registry.list() {
                let scope = entry.company_type.map(|t| t.as_str()).unwrap_or("any");
                println!("  {} → {} [{}]", entry.raw_name, entry.canonical_name, scope);
                if let Some(note) = &entry.note {
                    println!("     Note: {}", note);
                }
                if !entry.created_at.is_empty() {
                    println!("     Created: {}", entry.created_at);
                }
            }
        }

        OverrideAction::Add {
            raw_name,
            canonical_name,
            company_type,
            note,
        } => {
            let company_type = parse_company_type(company_type.as_deref())?;
            let mut entry = StoredOverride::new(&raw_name, &canonical_name, company_type);
            entry.note = note;
            registry.add(entry)?;
            eprintln!("✅ Override saved: {} → {}", raw_name, canonical_name);
            eprintln!("   Registry: {}", registry.path().display());
        }

        OverrideAction::Remove { raw_name, company_type } => {
            let company_type = parse_company_type(company_type.as_deref())?;
            let removed = registry.remove(&raw_name, company_type)?;
            eprintln!("🗑️  Override removed: {} → {}", removed.raw_name, removed.canonical_name);
        }
    }
    Ok(())
}

fn parse_company_type(code: Option<&str>) -> Result<Option<CompanyType>, String> {
    match code {
        None => Ok(None),
        Some(code) => CompanyType::from_code(code)
            .map(Some)
            .ok_or_else(|| format!("Unknown company type: {} (expected BDC or OMC)", code)),
    }
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_json<T: Serialize + ?Sized>(value: &T, path: Option<&Path>) -> CliResult {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(p) => {
            fs::write(p, json)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", json);
        }
    }
    Ok(())
}

fn write_json_file<T: Serialize + ?Sized>(value: &T, path: &Path) -> CliResult {
    write_json(value, Some(path))
}
