use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use specialcopy::workflow::Decider;
use specialcopy::{
    assemble, copy, paste, AppPaths, AssemblyStore, FolderPartStore, Outbox,
    OverwriteBehavior, PasteOutcome, Settings,
};

#[derive(Parser, Debug)]
#[command(name = "specialcopy")]
#[command(
    about = "Copy files and folders as pasteable text packages",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Folder holding settings, cached parts and saved packages"
    )]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Copy(CopyCmd),
    Paste(PasteCmd),
    Assemble(AssembleCmd),
    #[command(about = "List partially received packages")]
    Status,
    Clear(ClearCmd),
    Config(ConfigCmd),
}

#[derive(Clone, Debug, Args)]
#[command(about = "Pack files or folders and print the package text")]
struct CopyCmd {
    #[arg(required = true, help = "Files or folders to pack")]
    paths: Vec<PathBuf>,

    #[arg(long, help = "Where to save package files")]
    out_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Args)]
#[command(about = "Write a pasted package into a folder")]
struct PasteCmd {
    #[arg(help = "Destination folder")]
    destination: PathBuf,

    #[arg(long, help = "Read the package from a file instead of stdin")]
    input: Option<PathBuf>,
}

#[derive(Clone, Debug, Args)]
#[command(about = "Reassemble a chunked package into a folder")]
struct AssembleCmd {
    package_id: String,

    #[arg(help = "Destination folder")]
    destination: PathBuf,
}

#[derive(Clone, Debug, Args)]
#[command(about = "Remove cached parts of one package, or of all")]
struct ClearCmd {
    package_id: Option<String>,
}

#[derive(Clone, Debug, Args)]
#[command(about = "Show or change settings")]
struct ConfigCmd {
    #[arg(long, help = "Print the current settings")]
    show: bool,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    compression: Option<bool>,

    #[arg(long)]
    line_width: Option<usize>,

    #[arg(
        long,
        value_parser = parse_overwrite,
        help = "prompt, rename or overwrite"
    )]
    overwrite: Option<OverwriteBehavior>,
}

fn parse_overwrite(
    value: &str,
) -> std::result::Result<OverwriteBehavior, String> {
    match value.to_ascii_lowercase().as_str() {
        "prompt" => Ok(OverwriteBehavior::Prompt),
        "rename" | "renamewithsuffix" => {
            Ok(OverwriteBehavior::RenameWithSuffix)
        }
        "overwrite" => Ok(OverwriteBehavior::Overwrite),
        other => Err(format!("unknown overwrite behavior: {}", other)),
    }
}

struct Session {
    paths: AppPaths,
    settings: Settings,
}

impl Session {
    fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let paths =
            data_dir.map(AppPaths::new).unwrap_or_else(AppPaths::discover);
        let settings =
            Settings::load(paths.settings_file()).with_context(|| {
                format!("loading {}", paths.settings_file().display())
            })?;
        Ok(Self { paths, settings })
    }

    fn store(&self) -> Result<AssemblyStore<FolderPartStore>> {
        Ok(AssemblyStore::open(self.paths.parts_cache())?)
    }

    fn decider(&self) -> Decider<'static> {
        match self.settings.overwrite_behavior {
            OverwriteBehavior::Prompt => Some(Box::new(ask_overwrite)),
            _ => None,
        }
    }
}

fn ask_overwrite(path: &Path) -> bool {
    eprint!("{} already exists. Overwrite? [y/N] ", path.display());
    let _ = io::stderr().flush();
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => {
            matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
        }
        Err(_) => false,
    }
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("reading stdin")?;
            Ok(text)
        }
    }
}

impl CopyCmd {
    fn run(&self, session: &Session) -> Result<()> {
        let outcome = copy(&self.paths, &session.settings)?;
        let outbox = Outbox::new(
            self.out_dir
                .clone()
                .unwrap_or_else(|| session.paths.packages()),
        );
        let saved = outbox.persist(&outcome)?;

        if let Some(first) = outcome.chunks.first() {
            print!("{}", first);
        }
        if outcome.is_split() {
            eprintln!(
                "Package split into {} parts. \
                 Part 1 printed, all parts saved in {}.",
                outcome.chunks.len(),
                outbox.root().display()
            );
        }
        log::debug!("saved {:?}", saved);
        Ok(())
    }
}

impl PasteCmd {
    fn run(&self, session: &Session) -> Result<()> {
        let text = read_input(self.input.as_deref())?;
        let store = session.store()?;
        match paste(
            &text,
            &self.destination,
            &session.settings,
            &store,
            session.decider(),
        )? {
            PasteOutcome::Materialized(result) => {
                println!("{}", result.message)
            }
            PasteOutcome::PartStored(status) => println!(
                "Stored part. Received {}/{} of {}.",
                status.received, status.total, status.package_id
            ),
        }
        Ok(())
    }
}

impl AssembleCmd {
    fn run(&self, session: &Session) -> Result<()> {
        let store = session.store()?;
        let result = assemble(
            &self.package_id,
            &self.destination,
            &session.settings,
            &store,
            session.decider(),
        )?;
        println!("{}", result.message);
        Ok(())
    }
}

impl ClearCmd {
    fn run(&self, session: &Session) -> Result<()> {
        let store = session.store()?;
        match &self.package_id {
            Some(id) => store.clear(id)?,
            None => store.clear_all()?,
        }
        Ok(())
    }
}

impl ConfigCmd {
    fn run(&self, session: Session) -> Result<()> {
        let Session {
            paths,
            mut settings,
        } = session;
        let mut changed = false;
        if let Some(size) = self.chunk_size {
            settings.chunk_size_bytes = size;
            changed = true;
        }
        if let Some(enabled) = self.compression {
            settings.enable_compression = enabled;
            changed = true;
        }
        if let Some(width) = self.line_width {
            settings.base64_line_width = width;
            changed = true;
        }
        if let Some(behavior) = self.overwrite {
            settings.overwrite_behavior = behavior;
            changed = true;
        }

        if changed {
            settings.validate()?;
            settings.save(paths.settings_file())?;
        }
        if self.show || !changed {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Ok(())
    }
}

fn status(session: &Session) -> Result<()> {
    let statuses = session.store()?.list_status()?;
    if statuses.is_empty() {
        println!("No partial packages found.");
    }
    for status in statuses {
        println!("{}", status);
    }
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let session = Session::load(cli.data_dir)?;

    match &cli.command {
        Commands::Copy(cmd) => cmd.run(&session),
        Commands::Paste(cmd) => cmd.run(&session),
        Commands::Assemble(cmd) => cmd.run(&session),
        Commands::Status => status(&session),
        Commands::Clear(cmd) => cmd.run(&session),
        Commands::Config(cmd) => cmd.run(session),
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
