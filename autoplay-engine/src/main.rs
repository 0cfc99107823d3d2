use std::fs;
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use autoplay_core::motifs::{parse_motifs, Motif};
use autoplay_core::movie::parse_movie;
use autoplay_core::objectives::WeightedObjectives;
use autoplay_core::pfstate::parse_state;
use autoplay_core::sim::{demo_motifs, demo_objectives, MicroRig};
use autoplay_engine::engine::{Engine, OutputPaths};
use autoplay_engine::helper::{serve, HelperPool};
use autoplay_engine::SearchParams;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "autoplay")]
#[command(about = "Objective-driven search engine that plays a game from learned objectives and motifs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the search loop against the built-in reference machine
    Run {
        /// Game identifier recorded in snapshots
        #[arg(long, default_value = "microrig")]
        game: String,
        /// Objectives file; defaults to the built-in demo set
        #[arg(long)]
        objectives: Option<PathBuf>,
        /// Motifs file; defaults to the built-in demo set
        #[arg(long)]
        motifs: Option<PathBuf>,
        /// Params file (JSON); AUTOPLAY_* env vars override fields
        #[arg(long)]
        params: Option<PathBuf>,
        /// Snapshot path, loaded on start if valid, written on checkpoints
        #[arg(long)]
        state: Option<PathBuf>,
        /// Movie export path, written on checkpoints
        #[arg(long)]
        movie: Option<PathBuf>,
        /// Run report path, written on checkpoints
        #[arg(long)]
        report: Option<PathBuf>,
        /// RNG seed string
        #[arg(long, default_value = "autoplay")]
        seed: String,
        /// Rounds to run
        #[arg(long, default_value_t = 200)]
        rounds: usize,
        /// Worker threads for evaluation (default: rayon's choice)
        #[arg(long)]
        jobs: Option<usize>,
        /// Helper port range to probe, e.g. "127.0.0.1:7770-7777"
        #[arg(long)]
        helpers: Option<String>,
        /// Movenum floor below which backtracking is forbidden
        #[arg(long, default_value_t = 0)]
        watermark: i32,
    },
    /// Serve evaluation requests for a master running elsewhere
    Helper {
        #[arg(long, default_value_t = 7770)]
        port: u16,
        /// Objectives file; defaults to the built-in demo set
        #[arg(long)]
        objectives: Option<PathBuf>,
    },
    /// Print a snapshot's metadata as JSON
    InspectState {
        #[arg(long)]
        input: PathBuf,
    },
    /// Print a movie's frame count and subtitle track
    InspectMovie {
        #[arg(long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match Cli::parse().command {
        Commands::Run {
            game,
            objectives,
            motifs,
            params,
            state,
            movie,
            report,
            seed,
            rounds,
            jobs,
            helpers,
            watermark,
        } => {
            let objectives = load_objectives(objectives.as_deref())?;
            let motifs = load_motifs(motifs.as_deref())?;
            let mut search_params = match params {
                Some(path) => SearchParams::from_file(&path)?,
                None => SearchParams::default(),
            };
            search_params.apply_env();

            let mut engine = Engine::new(
                MicroRig::new as fn() -> MicroRig,
                objectives,
                motifs,
                search_params.clone(),
                &game,
                seed.as_bytes(),
            )?;
            engine.set_watermark(watermark);
            engine.set_jobs(jobs);
            if let Some(spec) = helpers {
                let (host, ports) = parse_helper_spec(&spec)?;
                engine.set_helpers(Some(HelperPool::probe(
                    &host,
                    ports,
                    Duration::from_millis(search_params.helper_connect_timeout_ms),
                    Duration::from_millis(search_params.helper_io_timeout_ms),
                )));
            }
            engine.set_output(OutputPaths {
                state: state.clone(),
                movie,
                report,
            });
            if let Some(path) = &state {
                engine.load_snapshot(path);
            }

            engine.run(rounds)?;
            info!(
                frames = engine.movie().len(),
                rounds = engine.rounds(),
                backtracks = engine.backtracks(),
                "run finished"
            );
        }
        Commands::Helper { port, objectives } => {
            let objectives = load_objectives(objectives.as_deref())?;
            let listener = TcpListener::bind(("0.0.0.0", port))
                .with_context(|| format!("failed binding helper port {port}"))?;
            serve(&listener, &(MicroRig::new as fn() -> MicroRig), &objectives)?;
        }
        Commands::InspectState { input } => {
            let bytes = fs::read(&input)
                .with_context(|| format!("failed reading {}", input.display()))?;
            let state = parse_state(&bytes).map_err(|err| anyhow!("{err}"))?;
            println!("{}", serde_json::to_string_pretty(&state.summary())?);
        }
        Commands::InspectMovie { input } => {
            let bytes = fs::read(&input)
                .with_context(|| format!("failed reading {}", input.display()))?;
            let movie = parse_movie(&bytes).map_err(|err| anyhow!("{err}"))?;
            println!("{} frames", movie.inputs.len());
            for subtitle in &movie.subtitles {
                println!("{:>8}  {}", subtitle.movenum, subtitle.text);
            }
        }
    }
    Ok(())
}

fn load_objectives(path: Option<&std::path::Path>) -> Result<WeightedObjectives> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            WeightedObjectives::parse(&text)
                .map_err(|err| anyhow!("objectives file {}: {err}", path.display()))
        }
        None => {
            info!("no objectives file given, using the built-in demo set");
            Ok(demo_objectives())
        }
    }
}

fn load_motifs(path: Option<&std::path::Path>) -> Result<Vec<Motif>> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            parse_motifs(&text).map_err(|err| anyhow!("motifs file {}: {err}", path.display()))
        }
        None => {
            info!("no motifs file given, using the built-in demo set");
            Ok(demo_motifs())
        }
    }
}

/// Parse "host:lo-hi" into a host and an inclusive port range.
fn parse_helper_spec(spec: &str) -> Result<(String, std::ops::RangeInclusive<u16>)> {
    let (host, range) = spec
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("helper spec '{spec}' must look like host:lo-hi"))?;
    let (lo, hi) = match range.split_once('-') {
        Some((lo, hi)) => (lo, hi),
        None => (range, range),
    };
    let lo: u16 = lo
        .parse()
        .with_context(|| format!("bad helper port '{lo}'"))?;
    let hi: u16 = hi
        .parse()
        .with_context(|| format!("bad helper port '{hi}'"))?;
    if lo > hi {
        return Err(anyhow!("helper port range {lo}-{hi} is reversed"));
    }
    Ok((host.to_string(), lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_spec_parses_ranges_and_single_ports() {
        let (host, ports) = parse_helper_spec("127.0.0.1:7770-7777").unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(ports, 7770..=7777);

        let (host, ports) = parse_helper_spec("localhost:9000").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(ports, 9000..=9000);

        assert!(parse_helper_spec("no-port").is_err());
        assert!(parse_helper_spec("h:9-5").is_err());
    }
}
