//! Command line host for the geocoding engine.
//!
//! Every subcommand loads a geocoder configuration file, talks to the
//! configured service over its REST API and prints JSON to stdout.

mod csv_io;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use geo_types::Point;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use locus::gateway::{RequestState, RequestToken, ReverseGeocodeGateway};
use locus::geocoder::{build_geocoder, CandidateSearch, Geocoder};
use locus::models::{Address, AddressCandidate, AddressPart};
use locus::transport::RestTransport;
use locus::validator::LocationValidator;
use locus::GeocoderConfig;

#[derive(Parser, Debug)]
#[command(name = "locus")]
#[command(about = "Geocode addresses against a remote geocoding service")]
struct Args {
    /// Geocoder configuration file (TOML), unused by `validate`
    #[arg(short, long, global = true, default_value = "locus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Best match for one address
    Geocode(AddressArgs),

    /// All candidates for one address that pass the candidate score
    Candidates {
        #[command(flatten)]
        address: AddressArgs,

        /// Keep candidates of disabled locators
        #[arg(long)]
        include_disabled: bool,
    },

    /// Addresses near one or more points
    Reverse {
        /// Point as `x,y`
        #[arg(long = "point", required = true, value_parser = parse_point)]
        points: Vec<(f64, f64)>,
    },

    /// Geocode a CSV file of addresses
    Batch {
        /// Input CSV, headers are address part names
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report rooftop matches whose location disagrees with their address
    Validate {
        /// JSON array of candidates (null for unmatched rows)
        #[arg(long)]
        candidates: PathBuf,

        /// Configuration of the street-level geocoder used for the check
        #[arg(long)]
        streets_config: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
struct AddressArgs {
    /// Free-text address
    #[arg(short, long)]
    address: Option<String>,

    /// Structured part as `name=value`, e.g. `locality1=Redlands`
    #[arg(long = "part", value_parser = parse_part)]
    parts: Vec<(AddressPart, String)>,
}

impl AddressArgs {
    fn to_address(&self) -> Address {
        let mut address = Address::new();
        if let Some(text) = &self.address {
            address.set(AddressPart::FullAddress, text.trim());
        }
        for (part, value) in &self.parts {
            address.set(*part, value.trim());
        }
        address
    }
}

fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{}'", s))?;
    let x = x.trim().parse::<f64>().map_err(|e| format!("bad x '{}': {}", x, e))?;
    let y = y.trim().parse::<f64>().map_err(|e| format!("bad y '{}': {}", y, e))?;
    Ok((x, y))
}

fn parse_part(s: &str) -> Result<(AddressPart, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value but got '{}'", s))?;
    let part = AddressPart::from_name(name).ok_or_else(|| format!("unknown address part '{}'", name))?;
    Ok((part, value.to_string()))
}

fn load_geocoder(path: &Path) -> Result<Arc<dyn Geocoder>> {
    let config = GeocoderConfig::load_from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let transport = RestTransport::new(&config)?;
    let geocoder = build_geocoder(&config, Arc::new(transport))?;
    info!(
        "Geocoder ready: {:?} format, {} locators",
        geocoder.address_format(),
        geocoder.locators().len()
    );
    Ok(geocoder)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine readable
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    match args.command {
        Command::Geocode(address) => {
            let geocoder = load_geocoder(&args.config)?;
            let best = geocoder.geocode(&address.to_address())?;
            print_json(&best)?;
        }
        Command::Candidates {
            address,
            include_disabled,
        } => {
            let geocoder = load_geocoder(&args.config)?;
            match geocoder.geocode_candidates(&address.to_address(), include_disabled)? {
                CandidateSearch::Candidates(candidates) => print_json(&candidates)?,
                CandidateSearch::ServiceFailed => anyhow::bail!("Geocoding service call failed"),
            }
        }
        Command::Reverse { points } => reverse(load_geocoder(&args.config)?, &points)?,
        Command::Batch { input, output } => {
            let geocoder = load_geocoder(&args.config)?;
            let file = File::open(&input).with_context(|| format!("Failed to open {}", input.display()))?;
            let addresses = csv_io::read_addresses(BufReader::new(file))?;
            info!("Read {} addresses from {}", addresses.len(), input.display());

            let results = geocoder.batch_geocode(&addresses)?;
            let matched = results.iter().filter(|r| r.is_some()).count();
            info!("Matched {}/{} addresses", matched, results.len());

            match output {
                Some(path) => csv_io::write_results(File::create(&path)?, &results)?,
                None => csv_io::write_results(io::stdout().lock(), &results)?,
            }
        }
        Command::Validate {
            candidates,
            streets_config,
        } => validate(&candidates, &streets_config)?,
    }

    Ok(())
}

/// Check candidates produced by another geocoder against a streets geocoder.
fn validate(candidates_path: &Path, streets_config: &Path) -> Result<()> {
    let file = File::open(candidates_path)
        .with_context(|| format!("Failed to open {}", candidates_path.display()))?;
    let candidates: Vec<Option<AddressCandidate>> =
        serde_json::from_reader(BufReader::new(file)).context("Failed to parse candidates")?;

    let streets = load_geocoder(streets_config)?;
    let validator = LocationValidator::new(streets);
    let incorrect = validator
        .find_incorrect_locations(&candidates)
        .collect::<Result<Vec<usize>, _>>()?;
    info!("{} of {} locations look incorrect", incorrect.len(), candidates.len());
    print_json(&json!({ "incorrect": incorrect }))
}

/// Reverse geocode all points concurrently through the async gateway.
fn reverse(geocoder: Arc<dyn Geocoder>, points: &[(f64, f64)]) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let (gateway, mut events) = ReverseGeocodeGateway::new(geocoder, runtime.handle().clone());

    let mut tokens = Vec::with_capacity(points.len());
    for (x, y) in points {
        let token = RequestToken::new();
        gateway.reverse_geocode_async(Point::new(*x, *y), token)?;
        tokens.push(token);
    }

    let mut results = Vec::new();
    runtime.block_on(async {
        while tokens.iter().any(|t| gateway.state(*t) == Some(RequestState::Pending)) {
            if let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
                results.push(event);
            }
        }
        while let Ok(event) = events.try_recv() {
            results.push(event);
        }
    });

    for token in &tokens {
        if gateway.state(*token) == Some(RequestState::Faulted) {
            warn!("Reverse geocode {} failed", token);
        }
    }

    let output: Vec<_> = results
        .iter()
        .map(|event| {
            json!({
                "x": event.location.x(),
                "y": event.location.y(),
                "address": event.address,
            })
        })
        .collect();
    print_json(&output)
}
