//! `snap` — the assembler command-line front end (§6 CLI reference).
//!
//! Grounded on `snap/main.c` + `SnapCommandLine.c`: parses a source
//! filename plus `--list`/`--putdirs`/`--outdir` flags, runs the
//! assembler, prints the list file, and reports the error/warning tally
//! the way the original's `displayAndReturnErrorCountIfAnyWereEncountered`
//! does. `SNAP_PUTDIRS` is consulted as a fallback for `--putdirs` so a
//! shell environment can set a default search path once.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use mos65::assembler::Assembler;
use mos65::list_file;

#[derive(Parser, Debug)]
#[command(name = "snap", version, about = "Two-pass cross-assembler for 6502/65C02/65816")]
struct Args {
    /// Name of an input assembly language file.
    source_filename: PathBuf,

    /// Send the list file to this path instead of stdout.
    #[arg(long = "list")]
    list_filename: Option<PathBuf>,

    /// Semicolon-separated directories searched for PUT-included files.
    #[arg(long = "putdirs")]
    put_directories: Option<String>,

    /// Directory where output files from directives like SAV should be stored.
    #[arg(long = "outdir")]
    output_directory: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let source = std::fs::read_to_string(&args.source_filename)
        .map_err(|_| anyhow::anyhow!("Failed to open {}", args.source_filename.display()))?;

    let mut assembler = Assembler::new();
    for dir in put_search_dirs(&args) {
        assembler.add_put_search_dir(dir);
    }
    if let Some(outdir) = args.output_directory.clone() {
        assembler.set_output_dir(outdir);
    }

    let filename = args.source_filename.to_string_lossy().into_owned();
    assembler.assemble(&filename, &source);

    write_list_file(&assembler, args.list_filename.as_deref())?;
    assembler.write_queued_files()?;

    let error_count = assembler.error_count();
    let warning_count = assembler.warning_count();
    if error_count > 0 || warning_count > 0 {
        println!(
            "Encountered {} {} and {} {} during assembly.",
            error_count,
            if error_count != 1 { "errors" } else { "error" },
            warning_count,
            if warning_count != 1 { "warnings" } else { "warning" },
        );
    }

    std::process::exit(error_count as i32);
}

fn put_search_dirs(args: &Args) -> Vec<PathBuf> {
    let raw = args
        .put_directories
        .clone()
        .or_else(|| std::env::var("SNAP_PUTDIRS").ok());
    match raw {
        Some(dirs) => dirs.split(';').filter(|d| !d.is_empty()).map(PathBuf::from).collect(),
        None => Vec::new(),
    }
}

fn write_list_file(assembler: &Assembler, list_filename: Option<&std::path::Path>) -> anyhow::Result<()> {
    let mut out: Box<dyn Write> = match list_filename {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };

    for line in assembler.lines() {
        let machine_code = match line.emitted {
            Some(emitted) if emitted.in_dummy => assembler.dummy_buffer().read(emitted.offset, emitted.length),
            Some(emitted) => assembler.object_buffer().read(emitted.offset, emitted.length),
            None => &[],
        };
        writeln!(out, "{}", list_file::format_line(line, machine_code, None))?;
    }
    Ok(())
}
