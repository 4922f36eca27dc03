use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use chainfs::disk_format::sector::SectorNumber;
use chainfs::storage::FileBackedStorage;
use chainfs::volume::Volume;

#[derive(Parser)]
struct Args {
    /// disk image file
    disk_file: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create (or overwrite) the disk image with an empty volume
    Format {
        /// number of sectors in the disk
        #[arg(long, default_value_t = 1024)]
        sectors: usize,
    },
    /// Create a file of a fixed size and print the sector holding its header
    Create { size: usize },
    /// Remove a file and release its sectors
    Remove { root: SectorNumber },
    /// Copy a local file into a file, cut short at the end of the file
    Write {
        root: SectorNumber,
        source: PathBuf,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Print the contents of a file
    Cat { root: SectorNumber },
    /// Dump a file's header chain and sector contents
    Show { root: SectorNumber },
    /// Print the sector holding a byte of a file
    Locate { root: SectorNumber, offset: usize },
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let disk_file = File::options()
        .read(true)
        .write(true)
        .create(matches!(args.command, Command::Format { .. }))
        .truncate(false)
        .open(&args.disk_file)
        .context("unable to open disk file in read-write mode")?;

    if let Command::Format { sectors } = args.command {
        let storage = FileBackedStorage::create(disk_file, sectors)?;
        let volume = Volume::format(storage)?;
        println!("{} sectors, {} free", volume.num_sectors(), volume.free_sectors());

        return Ok(());
    }

    let mut volume = Volume::open(FileBackedStorage::new(disk_file)?)?;
    let mut stdout = io::stdout().lock();

    match args.command {
        Command::Format { .. } => unreachable!("handled above"),
        Command::Create { size } => {
            let root = volume.create_file(size)?;
            writeln!(stdout, "{root}")?;
        }
        Command::Remove { root } => volume.remove_file(root)?,
        Command::Write {
            root,
            source,
            offset,
        } => {
            let data = fs::read(&source)
                .with_context(|| format!("reading {}", source.display()))?;
            let written = volume.open_file(root)?.write_at(&volume.storage, offset, &data)?;
            writeln!(stdout, "wrote {written} of {} bytes", data.len())?;
        }
        Command::Cat { root } => {
            let file = volume.open_file(root)?;
            stdout.write_all(&file.read_at(&volume.storage, 0, file.length())?)?;
        }
        Command::Show { root } => {
            volume
                .fetch_header(root)?
                .print(&volume.storage, &mut stdout)?;
        }
        Command::Locate { root, offset } => {
            let header = volume.fetch_header(root)?;
            match header.byte_to_sector(offset) {
                Some(sector) => writeln!(stdout, "{sector}")?,
                None => bail!(
                    "offset {offset} is past the end of the file ({} bytes)",
                    header.file_length()
                ),
            }
        }
    }

    Ok(())
}
