//! `crackle` — the disk-image builder command-line front end (§6 CLI
//! reference).
//!
//! Grounded on `crackle/main.c` + `CrackleCommandLine.c`: parses
//! `--format {nib_5.25|hdv_3.5}` plus a script filename and an output
//! image filename, drives the script through whichever [`DiskImage`]
//! the format selects, and writes the resulting image. `CRACKLE_OUTDIR`
//! is consulted the same way `SNAP_PUTDIRS` is on the assembler side: a
//! bare output filename (no directory component) is resolved against it.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use mos65::disk_image::block::BlockDiskImage;
use mos65::disk_image::nibble::NibbleDiskImage;
use mos65::disk_image::script::ScriptEngine;
use mos65::disk_image::DiskImage;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
enum ImageFormat {
    #[value(name = "nib_5.25")]
    Nib5_25,
    #[value(name = "hdv_3.5")]
    Hdv3_5,
}

#[derive(Parser, Debug)]
#[command(name = "crackle", version, about = "Simple disk imaging tool for Apple II")]
struct Args {
    /// Type of output image to create.
    #[arg(long = "format")]
    format: ImageFormat,

    /// Script describing where each object file's bytes land in the image.
    script_filename: PathBuf,

    /// Name of the image file this tool creates.
    output_image_filename: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let output_path = resolve_output_path(&args.output_image_filename);

    let script_text = match std::fs::read_to_string(&args.script_filename) {
        Ok(text) => text,
        Err(_) => {
            println!("{} image build failed.", output_path.display());
            std::process::exit(1);
        }
    };

    let mut engine = ScriptEngine::new();
    let script_filename = args.script_filename.to_string_lossy().into_owned();

    let image_bytes: Vec<u8> = match args.format {
        ImageFormat::Nib5_25 => {
            let mut image = NibbleDiskImage::new();
            engine.process_script(&mut image, &script_filename, &script_text);
            image.image().to_vec()
        }
        ImageFormat::Hdv3_5 => {
            let mut image = BlockDiskImage::new();
            engine.process_script(&mut image, &script_filename, &script_text);
            image.image().to_vec()
        }
    };

    if engine.had_errors() {
        println!("{} image build failed.", output_path.display());
        std::process::exit(1);
    }

    if std::fs::write(&output_path, &image_bytes).is_err() {
        println!("{} image build failed.", output_path.display());
        std::process::exit(1);
    }

    println!("{} image built successfully.", output_path.display());
    Ok(())
}

fn resolve_output_path(requested: &std::path::Path) -> PathBuf {
    if requested.components().count() > 1 {
        return requested.to_path_buf();
    }
    match std::env::var("CRACKLE_OUTDIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join(requested),
        _ => requested.to_path_buf(),
    }
}
