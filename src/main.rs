use clap::{ArgAction, Parser};
use log::{info, warn};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use thiserror::Error;

use isonet::{random, GraphPair, IsoError, RelabelError, SearchOptions, Traversal};

/// Test isomorphism search on random graphs: generate a graph, permute it, and check the mapping found between the two.
#[derive(Parser, Debug)]
#[command(name = "isonet", version)]
struct Args {
    /// Number of vertices.
    #[arg(short = 'n', long = "vertices", default_value_t = 30)]
    vertices: usize,
    /// Edge probability.
    #[arg(short, long, default_value_t = 0.5, value_parser = parse_probability)]
    probability: f64,
    /// Random seed (fresh entropy if omitted).
    #[arg(short, long)]
    seed: Option<u64>,
    /// Prefilter depth for candidate matching (0 disables the prefilter).
    #[arg(short, long, default_value_t = 2)]
    depth: usize,
    /// Network traversal: one-way, cycle-aware or reversal-aware.
    #[arg(long, default_value = "cycle-aware")]
    traversal: Traversal,
    /// Cap on full-depth comparisons (defaults to the vertex count minus one).
    #[arg(long)]
    max_depth: Option<usize>,
    /// Witness attempts per trial before giving up.
    #[arg(long, default_value_t = 8)]
    attempts: usize,
    /// Number of independent graphs to test.
    #[arg(long, default_value_t = 1)]
    trials: usize,
    /// Evaluate orbits on a single thread.
    #[arg(long)]
    sequential: bool,
    /// More logging (-v for info, -vv for debug, -vvv for trace); RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Error)]
enum TrialError {
    #[error("not found isomorphism")]
    NotIsomorphic,
    #[error("not found isomorphism: {0}")]
    Search(#[from] IsoError<String>),
    #[error("incorrect isomorphism")]
    Incorrect,
    #[error("could not permute graph: {0}")]
    Relabel(#[from] RelabelError),
}

fn parse_probability(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if !(0.0..=1.0).contains(&p) { return Err(format!("{} is not in [0, 1]", p)); }
    Ok(p)
}

fn run_trial(args: &Args, rng: &mut Pcg64Mcg) -> Result<(), TrialError> {
    let graph = random::random_graph(args.vertices, args.probability, rng);
    let (permuted, _) = random::random_relabeling(&graph, rng)?;
    let options = SearchOptions { traversal: args.traversal, max_depth: args.max_depth, parallel: !args.sequential };
    let pair = GraphPair::new(graph, permuted).with_options(options);

    if !pair.test_isomorphism(args.depth) { return Err(TrialError::NotIsomorphic); }
    let orbits = pair.find_orbits(args.depth)?;
    info!("{} of {} vertices have more than one candidate", orbits.ambiguous(), orbits.len());

    let mut last = TrialError::NotIsomorphic;
    for attempt in 0..args.attempts.max(1) {
        match pair.build_witness(&orbits, rng) {
            Ok(witness) if witness.preserves_edges(&pair) => {
                info!("witness found on attempt {}", attempt + 1);
                return Ok(());
            }
            Ok(witness) => {
                warn!("attempt {} produced a witness which does not preserve edges: {}", attempt + 1, witness);
                last = TrialError::Incorrect;
            }
            Err(e) => {
                warn!("attempt {} failed: {}", attempt + 1, e);
                last = e.into();
            }
        }
    }
    Err(last)
}

fn main() {
    let args = Args::parse();
    let level = match args.verbose { 0 => "warn", 1 => "info", 2 => "debug", _ => "trace" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut rng = match args.seed {
        Some(seed) => Pcg64Mcg::seed_from_u64(seed),
        None => Pcg64Mcg::from_os_rng(),
    };
    for trial in 0..args.trials {
        if let Err(e) = run_trial(&args, &mut rng) {
            eprintln!("test_isomorphic_random_graphs failed (trial {}): {}", trial + 1, e);
            std::process::exit(1);
        }
    }
    println!("ok!");
}
