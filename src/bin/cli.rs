//! pagekv CLI
//!
//! Inspect and manipulate streams and indexes stored in a file-backed cache.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pagekv::stream::{remove_stream, StreamHeader};
use pagekv::{codec, Config, FileCache, PageAddress, PagedIndex, SegmentStream, StreamOptions};
use tracing_subscriber::{fmt, EnvFilter};

/// pagekv CLI
#[derive(Parser, Debug)]
#[command(name = "pagekv-cli")]
#[command(about = "Segmented streams and paged indexes over a file-backed cache")]
#[command(version)]
struct Args {
    /// Cache directory
    #[arg(short, long, default_value = "./pagekv_data")]
    data_dir: PathBuf,

    /// Namespace (region) of the cache to work in
    #[arg(short, long)]
    region: Option<String>,

    /// Segment size for newly created streams
    #[arg(short, long, default_value = "1024")]
    chunk_size: u32,

    /// Node order for newly created indexes
    #[arg(short, long, default_value = "32")]
    order: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a file into a stream
    Put {
        /// Stream key
        key: String,

        /// File to read
        file: PathBuf,
    },

    /// Write a stream's contents to stdout
    Get {
        /// Stream key
        key: String,
    },

    /// Show a stream's header
    Stat {
        /// Stream key
        key: String,
    },

    /// Truncate or extend a stream
    Truncate {
        /// Stream key
        key: String,

        /// New length in bytes
        length: u64,
    },

    /// Delete a stream and its segments
    Rm {
        /// Stream key
        key: String,
    },

    /// Add a pointer under a key in an index
    IndexInsert {
        /// Index key
        index: String,

        key: String,

        pointer: String,
    },

    /// List the pointers stored under a key
    IndexSearch {
        /// Index key
        index: String,

        key: String,
    },

    /// Print every key of an index in order
    IndexDump {
        /// Index key
        index: String,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pagekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> pagekv::Result<()> {
    let mut builder = Config::builder()
        .data_dir(&args.data_dir)
        .default_chunk_size(args.chunk_size)
        .index_order(args.order);
    if let Some(region) = &args.region {
        builder = builder.region(region.clone());
    }
    let config = builder.build();
    config.validate()?;

    let cache = FileCache::open(&config.data_dir)?;
    let address = |key: &str| PageAddress::with_namespace(config.region.clone(), key);

    match args.command {
        Commands::Put { key, file } => {
            let mut input = File::open(&file)?;
            let mut stream = SegmentStream::open(&cache, address(&key), StreamOptions::from(&config))?;
            stream.set_length(0)?;
            let copied = io::copy(&mut input, &mut stream)?;
            stream.close()?;
            tracing::info!("Wrote {} bytes to {}", copied, stream.address());
        }
        Commands::Get { key } => {
            let mut stream =
                SegmentStream::open(&cache, address(&key), StreamOptions::default().read_only())?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut stream, &mut stdout)?;
            stdout.flush()?;
        }
        Commands::Stat { key } => {
            let header: StreamHeader = codec::load(&cache, &address(&key))?
                .ok_or_else(|| pagekv::PageKvError::NotFound(format!("stream {}", key)))?;
            println!("length:     {}", header.length);
            println!("chunk_size: {}", header.chunk_size);
            println!("segments:   {}", header.segment_span());
        }
        Commands::Truncate { key, length } => {
            let mut stream =
                SegmentStream::open(&cache, address(&key), StreamOptions::from(&config).create(false))?;
            stream.set_length(length)?;
            stream.close()?;
        }
        Commands::Rm { key } => {
            if !remove_stream(&cache, &address(&key))? {
                return Err(pagekv::PageKvError::NotFound(format!("stream {}", key)));
            }
        }
        Commands::IndexInsert {
            index,
            key,
            pointer,
        } => {
            let mut tree: PagedIndex<_, String, String> =
                PagedIndex::with_config(&cache, address(&index), &config)?;
            if !tree.insert(key, pointer)? {
                tracing::info!("Pointer already present");
            }
        }
        Commands::IndexSearch { index, key } => {
            let tree: PagedIndex<_, String, String> = PagedIndex::open(&cache, address(&index))?;
            for pointer in tree.search(&key) {
                println!("{}", pointer?);
            }
        }
        Commands::IndexDump { index } => {
            let tree: PagedIndex<_, String, String> = PagedIndex::open(&cache, address(&index))?;
            for (key, pointers) in tree.entries()? {
                println!("{}\t{}", key, pointers.join(","));
            }
        }
    }

    Ok(())
}
