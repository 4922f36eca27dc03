use std::{fs::File, path::PathBuf};

use anyhow::Result;
use chainfs::{disk_format::sector::SectorNumber, storage::FileBackedStorage, volume::Volume};
use clap::Parser;
use log::info;

#[derive(Parser)]
struct Args {
    /// disk image file
    disk_file: PathBuf,
    /// sectors holding the root header of every file on the disk
    roots: Vec<SectorNumber>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let disk_file = File::options().read(true).open(args.disk_file)?;
    let storage = FileBackedStorage::new(disk_file)?;

    let volume = Volume::open(storage)?;
    volume.check(&args.roots)?;

    info!("{} file(s) consistent", args.roots.len());

    Ok(())
}
