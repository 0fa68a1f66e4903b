//! `blockfs`, the command-line driver over [`blockfs::fs::FileSystem`].

use std::path::PathBuf;
use std::process::exit;

use blockfs::{Error, FileSystem, FileType, Whence};
use clap::{Parser, Subcommand, ValueEnum};
use log::error;

#[derive(Parser)]
#[command(author, version, about = "A single-file disk-image filesystem")]
struct Cli {
    /// Quiet: only warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose: debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliFileType {
    File,
    Dir,
}

impl From<CliFileType> for FileType {
    fn from(t: CliFileType) -> Self {
        match t {
            CliFileType::File => FileType::Regular,
            CliFileType::Dir => FileType::Directory,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create a new, empty image.
    Format { image: PathBuf },
    /// Create a file or directory.
    Create {
        image: PathBuf,
        path: String,
        #[arg(long = "type", value_enum, default_value_t = CliFileType::File)]
        file_type: CliFileType,
    },
    /// Print a regular file's contents to stdout.
    Cat { image: PathBuf, path: String },
    /// Write stdin into a regular file at the given byte offset.
    Write {
        image: PathBuf,
        path: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// List a directory's entries.
    Ls { image: PathBuf, path: String },
    /// Remove a file or empty directory.
    Rm { image: PathBuf, path: String },
    /// Move/rename a file or directory.
    Mv {
        image: PathBuf,
        src: String,
        dst: String,
    },
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Command::Format { image } => {
            FileSystem::format(&image)?.unmount()?;
            println!("formatted {}", image.display());
        }
        Command::Create {
            image,
            path,
            file_type,
        } => {
            let mut fs = FileSystem::mount(&image)?;
            fs.create(&path, file_type.into())?;
            fs.unmount()?;
        }
        Command::Cat { image, path } => {
            let mut fs = FileSystem::mount(&image)?;
            let fd = fs.open(&path)?;
            let mut buf = [0u8; 4096];
            loop {
                let n = fs.read(fd, &mut buf)?;
                if n == 0 {
                    break;
                }
                use std::io::Write as _;
                std::io::stdout().write_all(&buf[..n]).ok();
            }
            fs.close(fd)?;
        }
        Command::Write {
            image,
            path,
            offset,
        } => {
            use std::io::Read as _;
            let mut input = Vec::new();
            std::io::stdin().read_to_end(&mut input).ok();

            let mut fs = FileSystem::mount(&image)?;
            let fd = fs.open(&path)?;
            fs.seek(fd, offset as i64, Whence::Set)?;
            let written = fs.write(fd, &input)?;
            fs.close(fd)?;
            fs.unmount()?;
            println!("wrote {written} bytes");
        }
        Command::Ls { image, path } => {
            let fs = FileSystem::mount(&image)?;
            for entry in fs.get_dir(&path)? {
                let marker = if entry.file_type == FileType::Directory {
                    "/"
                } else {
                    ""
                };
                println!("{}{}", entry.name, marker);
            }
        }
        Command::Rm { image, path } => {
            let mut fs = FileSystem::mount(&image)?;
            fs.remove(&path)?;
            fs.unmount()?;
        }
        Command::Mv { image, src, dst } => {
            let mut fs = FileSystem::mount(&image)?;
            fs.move_file(&src, &dst)?;
            fs.unmount()?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli) {
        error!("{e}");
        exit(e.code());
    }
}
