use clap::{Parser, Subcommand};
use media_store::{config, server, store};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

/// Overrides for `serve`. Each one beats the config file and environment.
#[derive(clap::Args, Clone, Default)]
struct ServeArgs {
    /// Listen address, e.g. 127.0.0.1:5555
    #[arg(long)]
    bind: Option<String>,

    /// Directory holding blobs and their .json sidecars
    #[arg(long)]
    data: Option<PathBuf>,

    /// Maximum number of cache entries
    #[arg(long)]
    cache_size: Option<usize>,

    /// Shared secret for /manage requests (x-auth header)
    #[arg(long)]
    pass: Option<String>,
}

impl ServeArgs {
    fn apply(self, config: &mut config::Config) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(data) = self.data {
            config.storage.data_dir = data;
        }
        if let Some(capacity) = self.cache_size {
            config.cache.capacity = capacity;
        }
        if let Some(pass) = self.pass {
            config.auth.write_pass = pass;
        }
    }
}

#[derive(Parser)]
#[command(name = "media-store")]
#[command(about = "Content-addressed media store with on-the-fly image transforms")]
#[command(long_about = "\
Content-addressed media store with on-the-fly image transforms

Objects are uploaded under a caller-chosen key and served back as-is or
transformed on request:

  PUT    /manage/<key>              upload (x-auth header required)
  GET    /<key>                     original bytes
  GET    /<key>.jpg:80?size=800     resized, re-encoded at quality 80
  GET    /<key>.png?sat=150&blur=2&order=blur:1
  DELETE /manage/<key>              remove (x-auth header required)

Operations: size, sat, gamma, brightness, blur, chromaticSmear,
colorCruncher, chromaticAberration.

Run 'media-store gen-config' to generate a documented config file.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (defaults to ./media-store.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Print a stock config file with all options documented
    GenConfig,
    /// Print the SHA-256 content key of a file
    Key {
        /// File to hash
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let cwd = std::env::current_dir()?;
            let mut config = config::load_config(cli.config.as_deref(), &cwd)?;
            config.apply_env(|name| std::env::var(name).ok());
            args.apply(&mut config);
            config.validate()?;

            init_logging(&config.logging);
            init_thread_pool(&config.processing);
            server::run(&config).await?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Key { file } => {
            println!("{}", store::hash_file(&file)?);
        }
    }

    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the config.
fn init_logging(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
