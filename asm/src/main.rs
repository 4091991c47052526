use std::path::Path;

use anyhow::{bail, Context, Result};
use b33arch::{parse_address, B33Program, OutputType, DEFAULT_ORIGIN};
use b33asm::{listing, Analyzer, Assembler, Error};
use clap::Parser;
use color_print::cprintln;
use indexmap::IndexMap;
use tracing_subscriber::EnvFilter;

const HELP_TEMPLATE: &str = "\
{before-help}{bin} {version}
  {about}

{usage-heading}
{tab}{usage}

{all-args}{after-help}";

#[derive(Debug, Parser)]
#[clap(version, about = "Assembler for the B33 CPU", help_template = HELP_TEMPLATE)]
struct Args {
    /// Source file, or a program to disassemble with --analyze
    input: String,

    /// Output file [default: input with .b33 or .bin extension]
    #[clap(short, long)]
    output: Option<String>,

    /// Load address of the program
    #[clap(long, value_parser = parse_address)]
    origin: Option<u16>,

    /// Write a raw binary instead of a B33 executable
    #[clap(long)]
    raw: bool,

    /// Embed source lines and labels in the executable
    #[clap(long)]
    debug: bool,

    /// Mark the program as needing the second monitor
    #[clap(long)]
    dual_monitor: bool,

    /// Print the assembly listing
    #[clap(short, long)]
    dump: bool,

    /// Write the label table as YAML
    #[clap(long)]
    symbols: Option<String>,

    /// Disassemble an executable (or a raw binary at --origin)
    #[clap(short, long)]
    analyze: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    println!("B33 Assembler");

    if args.analyze {
        analyze(&args)
    } else {
        assemble(&args)
    }
}

fn assemble(args: &Args) -> Result<()> {
    println!("1. Read {}", args.input);
    let source = std::fs::read_to_string(&args.input)
        .map_err(|e| Error::FileOpen(args.input.clone(), e))?;

    println!("2. Assemble");
    let mut asm = Assembler::new(source.as_str())
        .origin(args.origin.unwrap_or(DEFAULT_ORIGIN))
        .include_debug_information(args.debug)
        .dual_monitor(args.dual_monitor);
    let output_type = if args.raw {
        OutputType::RawBinary
    } else {
        OutputType::B33Executable
    };
    let program = match asm.assemble(output_type) {
        Ok(program) => program,
        Err(err) => {
            err.print_diag(&args.input, &source);
            bail!("{}", asm.error_message());
        }
    };
    cprintln!(
        "  <g>ok</>: {} bytes at ${:04X}, entry ${:04X}, {} labels{}",
        program.bytes.len(),
        program.origin,
        program.execution_address,
        program.labels.len(),
        if program.requires_dual_monitors {
            ", dual monitor"
        } else {
            ""
        }
    );

    if args.dump {
        listing::print_dump(asm.listing());
    }

    let extension = if args.raw { "bin" } else { "b33" };
    let output = args.output.clone().unwrap_or_else(|| {
        Path::new(&args.input)
            .with_extension(extension)
            .to_string_lossy()
            .into_owned()
    });
    println!("3. Write {}", output);
    let image = program.to_bytes()?;
    std::fs::write(&output, image).map_err(|e| Error::FileCreate(output.clone(), e))?;

    if let Some(path) = &args.symbols {
        let table: IndexMap<&str, String> = program
            .labels
            .iter()
            .map(|(name, addr)| (name, format!("${addr:04X}")))
            .collect();
        let file = std::fs::File::create(path).map_err(|e| Error::FileCreate(path.clone(), e))?;
        serde_yaml::to_writer(file, &table).context("Failed to write symbols")?;
        println!("   + {}", path);
    }
    Ok(())
}

fn analyze(args: &Args) -> Result<()> {
    let data = std::fs::read(&args.input).map_err(|e| Error::FileOpen(args.input.clone(), e))?;
    let program = B33Program::from_image(data, args.origin.unwrap_or(DEFAULT_ORIGIN))
        .with_context(|| format!("Failed to load {}", args.input))?;

    let analyzer = Analyzer::new(&program);
    listing::print_analysis(&analyzer.analyze());
    if let Some(path) = &args.output {
        std::fs::write(path, analyzer.to_source())
            .map_err(|e| Error::FileCreate(path.clone(), e))?;
        println!("  > {}", path);
    }
    Ok(())
}
