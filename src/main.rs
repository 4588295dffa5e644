//! vpnportal - VPN provider portal core
//!
//! Operator entry point: keeps the verified discovery cache up to date and
//! prints the provider lists derived from it.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vpnportal::cli::{Cli, Commands};
use vpnportal::config::Config;
use vpnportal::discovery::directory::ProviderDirectory;
use vpnportal::discovery::fetcher::DiscoveryFetcher;
use vpnportal::discovery::store::{DiscoverySource, DiscoveryStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Commands::Update => run_update(&config).await,
        Commands::Providers { keys } => run_providers(&config, keys),
    }
}

/// Fetches and persists every configured discovery source.
///
/// Verification and rollback failures are operator-visible: they are
/// logged and fail the process.
async fn run_update(config: &Config) -> Result<()> {
    let sources = config.discovery.sources();
    if sources.is_empty() {
        tracing::warn!("no discovery sources configured, nothing to update");
        return Ok(());
    }

    let store = DiscoveryStore::new(config.discovery.data_dir());
    let fetcher = DiscoveryFetcher::new(config.http_client()?, store);

    for source in &sources {
        match fetcher.update(source).await {
            Ok(document) => {
                tracing::info!(url = %source.url, seq = document.seq, "source updated");
            }
            Err(e) => {
                tracing::error!(url = %source.url, error = %e, "source update failed");
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Prints the sorted provider and organization lists from the persisted
/// documents.
fn run_providers(config: &Config, keys: bool) -> Result<()> {
    let store = DiscoveryStore::new(config.discovery.data_dir());
    let institute = config.discovery.institute_access.as_ref().map(|s| s.to_source());
    let secure = config.discovery.secure_internet.as_ref().map(|s| s.to_source());
    let orgs = config.discovery.organization_list.as_ref().map(|s| s.to_source());

    let directory = ProviderDirectory::load(
        &store,
        institute.as_ref(),
        secure.as_ref(),
        orgs.as_ref(),
        config.discovery.preferred_locale.clone(),
    )?;
    let locale = directory.preferred_locale().to_string();

    println!("Institute Access:");
    for entry in directory.institute_access_list() {
        println!("  {} <{}>", entry.display_name.resolve(&locale), entry.base_uri);
    }

    println!("Secure Internet:");
    for entry in directory.secure_internet_list() {
        println!("  {} <{}>", entry.display_name.resolve(&locale), entry.base_uri);
    }

    println!("Organizations:");
    for org in directory.organization_list() {
        println!(
            "  {} ({}) -> {}",
            org.display_name.resolve(&locale),
            org.org_id,
            org.secure_internet_home
        );
    }

    if keys {
        println!("Host Public Keys:");
        for source in [&institute, &secure].into_iter().flatten() {
            print_host_keys(&store, source)?;
        }
    }

    Ok(())
}

fn print_host_keys(store: &DiscoveryStore, source: &DiscoverySource) -> Result<()> {
    let Some(document) = store.load(source)? else {
        return Ok(());
    };
    let mut pairs: Vec<_> = document.host_public_keys()?.into_iter().collect();
    pairs.sort();
    for (host, public_key) in pairs {
        println!("  {host}: {public_key}");
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "vpnportal=debug"
    } else {
        "vpnportal=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
