use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use uasset_vfs::{AssetEntry, ContainerRegistry, MountConfig, ReaderProfile};

#[derive(Parser)]
#[command(name = "vfscat", version, about = "Inspect and extract Unreal Engine PAK / IO Store containers")]
struct Cli {
    /// Root directory to scan recursively for .pak and .utoc containers
    #[arg(short, long)]
    paks_path: PathBuf,

    /// 64 hex characters (32 bytes) AES key used for encrypted indices/blocks
    #[arg(short = 'k', long, value_parser = parse_aes_key)]
    aes_key: Option<[u8; 32]>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every mounted entry's virtual path and size
    List {
        /// Only show paths containing this substring
        filter: Option<String>,
    },
    /// Print an entry's decoded contents to stdout
    Cat { path: String },
    /// Show an entry's container, offset, and size
    Info { path: String },
}

fn parse_aes_key(s: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(s).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| format!("expected 32 bytes, got {}", v.len()))
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = MountConfig {
        paks_path: cli.paks_path,
        aes_key: cli.aes_key,
    };
    let registry = ContainerRegistry::new(config, ReaderProfile::new());
    registry.mount()?;

    match cli.command {
        Commands::List { filter } => {
            for entry in registry.entries_matching(|e| {
                filter.as_deref().map(|f| e.path().contains(f)).unwrap_or(true)
            }) {
                println!("{:>12}  {}", entry.size(), entry.path());
            }
        }
        Commands::Cat { path } => {
            let entry = registry
                .find(&path)
                .ok_or_else(|| format!("no such entry: {path}"))?;
            let mut stream = registry.open_stream(entry)?;
            let bytes = stream.read_all()?;
            io::stdout().write_all(&bytes)?;
        }
        Commands::Info { path } => {
            let entry = registry
                .find(&path)
                .ok_or_else(|| format!("no such entry: {path}"))?;
            print_info(entry);
        }
    }

    Ok(())
}

fn print_info(entry: &AssetEntry) {
    println!("path:            {}", entry.path());
    println!("container:       {}", entry.container_path().display());
    println!("offset:          {}", entry.offset());
    println!("size:            {}", entry.size());
    match entry {
        AssetEntry::Pak { entry, .. } => {
            println!("kind:            PAK");
            println!("compressed_size: {}", entry.compressed_size);
            println!("compression:     {}", entry.compression_method.as_deref().unwrap_or("None"));
            println!("encrypted:       {}", entry.is_encrypted);
        }
        AssetEntry::IoStore { entry, .. } => {
            println!("kind:            IoStore");
            println!("chunk_id:        {:#x}", entry.chunk_id.id);
            println!("start_block:     {}", entry.start_block_index);
            println!("block_count:     {}", entry.block_count);
        }
    }
}
