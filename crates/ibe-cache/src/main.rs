//! Operator tool for cached IBE systems.
//!
//! Generates a system from a number of shards together with private keys for
//! a preset list of names, and uses the cache to derive further keys, check
//! its consistency, and seal or open transport packages.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use overlay_authority::{IbeCache, ThresholdIbeAuthority};
use overlay_crypto::{
    decrypt, encrypt, format_ciphertext, format_private_key, parse_ciphertext, Bls12Backend,
    ChecksumGuard,
};
use overlay_epoch::EpochConfig;
use overlay_types::Package;

#[derive(Parser)]
#[command(name = "ibe-cache")]
#[command(about = "Generate and use cached aggregated IBE systems")]
struct Cli {
    /// Path of the cache file
    #[arg(long, default_value = "./ibe-cache.json")]
    cache: PathBuf,

    /// Epoch config file; only `checksum_bytes` is used here
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new system and keys for the preset names
    Generate {
        /// Number of shards aggregated into the system
        #[arg(long, default_value = "3")]
        shards: u32,

        /// Name template such as `client-%05d`; may be repeated
        #[arg(long = "template")]
        templates: Vec<String>,

        /// Names generated per template
        #[arg(long, default_value = "10")]
        count: u32,

        /// Replace an existing cache file
        #[arg(long)]
        force: bool,
    },

    /// Derive (or re-derive) the private key for a name
    Derive {
        name: String,

        /// Print the hex-encoded key blob
        #[arg(long)]
        show: bool,
    },

    /// Check that the shards and every cached key match the parameters
    Verify,

    /// Encrypt a message to an identity and wrap it for transport
    Seal {
        identity: String,

        #[arg(long)]
        message: String,

        /// Write the raw package here instead of printing hex
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Unwrap and decrypt a package with a cached key
    Open {
        name: String,

        /// Hex-encoded package
        #[arg(long, conflicts_with = "input")]
        package: Option<String>,

        /// File holding a raw package
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

fn checksum_guard(config: Option<&Path>) -> Result<ChecksumGuard> {
    let config = match config {
        Some(path) => EpochConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EpochConfig::default(),
    };
    Ok(config.checksum_guard()?)
}

fn load_cache(path: &Path) -> Result<IbeCache> {
    IbeCache::load(path).with_context(|| format!("loading cache {}", path.display()))
}

fn generate(cli: &Cli, shards: u32, templates: &[String], count: u32, force: bool) -> Result<()> {
    if shards == 0 {
        bail!("at least one shard is required");
    }
    if cli.cache.exists() && !force {
        bail!("{} exists; pass --force to replace it", cli.cache.display());
    }

    let names = IbeCache::preset_names(templates, count, shards);
    info!(shards, names = names.len(), "Generating IBE system");

    let cache = IbeCache::generate::<Bls12Backend, _>(&names, shards as usize, &mut OsRng)?;
    cache.save(&cli.cache)?;

    info!("Cache written to {}", cli.cache.display());
    println!("{}", hex::encode(cache.public_params_bytes()));
    Ok(())
}

fn derive(cli: &Cli, name: &str, show: bool) -> Result<()> {
    let mut cache = load_cache(&cli.cache)?;
    let key = cache.derive::<Bls12Backend>(name)?;
    cache.save(&cli.cache)?;

    info!(identity = name, "Derived private key");
    if show {
        println!("{}", hex::encode(format_private_key(&key).as_slice()));
    }
    Ok(())
}

fn verify(cli: &Cli) -> Result<()> {
    let cache = load_cache(&cli.cache)?;
    let params = cache.system_parameters::<Bls12Backend>()?;
    // Re-aggregates the shards and compares against the stored parameters.
    cache.system_secret::<Bls12Backend>()?;

    let authority = ThresholdIbeAuthority::<Bls12Backend>::new();
    let mut bad = 0usize;
    for name in cache.names() {
        let key = cache.private_key::<Bls12Backend>(name)?;
        if !authority.verify_private_key(&params, &key) {
            warn!(identity = name, "Private key does not match the system parameters");
            bad += 1;
        }
    }

    let total = cache.names().count();
    if bad > 0 {
        bail!("{bad} of {total} private keys failed verification");
    }
    info!(shards = cache.shard_count(), keys = total, "Cache verified");
    Ok(())
}

fn seal(cli: &Cli, identity: &str, message: &str, out: Option<&Path>) -> Result<()> {
    let guard = checksum_guard(cli.config.as_deref())?;
    let cache = load_cache(&cli.cache)?;
    let params = cache.system_parameters::<Bls12Backend>()?;

    let ciphertext = encrypt(&params, identity, message.as_bytes(), &mut OsRng)?;
    let package = guard.wrap(format_ciphertext(&ciphertext));
    info!(identity, bytes = package.len(), package = %package.digest_hex(), "Sealed package");

    match out {
        Some(path) => std::fs::write(path, package.as_bytes())?,
        None => println!("{}", hex::encode(package.as_bytes())),
    }
    Ok(())
}

fn open(cli: &Cli, name: &str, package: Option<&str>, input: Option<&Path>) -> Result<()> {
    let package = match (package, input) {
        (Some(hex_package), _) => Package::new(hex::decode(hex_package.trim())?),
        (None, Some(path)) => Package::new(std::fs::read(path)?),
        (None, None) => return Err(anyhow!("one of --package or --input is required")),
    };

    let guard = checksum_guard(cli.config.as_deref())?;
    let cache = load_cache(&cli.cache)?;
    let key = cache.private_key::<Bls12Backend>(name)?;

    let bytes = guard.unwrap(&package)?;
    let ciphertext = parse_ciphertext::<Bls12Backend>(&bytes)?;
    let plaintext = decrypt(&key, &ciphertext)?;

    println!("{}", String::from_utf8_lossy(&plaintext));
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ibe_cache=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate {
            shards,
            templates,
            count,
            force,
        } => generate(&cli, *shards, templates, *count, *force)?,
        Commands::Derive { name, show } => derive(&cli, name, *show)?,
        Commands::Verify => verify(&cli)?,
        Commands::Seal {
            identity,
            message,
            out,
        } => seal(&cli, identity, message, out.as_deref())?,
        Commands::Open {
            name,
            package,
            input,
        } => open(&cli, name, package.as_deref(), input.as_deref())?,
    }

    Ok(())
}
