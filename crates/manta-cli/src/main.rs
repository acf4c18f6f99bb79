use manta::{AffinityGraph, Initialization, Params, PhaseMillis, StepReport};
use manta_pca::{Pca, PcaParams};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Json(serde_json::Error),
    Engine(manta::Error),
    Pca(manta_pca::Error),
    MissingData(&'static str),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
            CliError::Engine(err) => write!(f, "{err}"),
            CliError::Pca(err) => write!(f, "pca: {err}"),
            CliError::MissingData(what) => {
                write!(f, "{what} requires `data` and `n_cols` in the input document")
            }
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<manta::Error> for CliError {
    fn from(value: manta::Error) -> Self {
        Self::Engine(value)
    }
}

impl From<manta_pca::Error> for CliError {
    fn from(value: manta_pca::Error) -> Self {
        Self::Pca(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Command {
    #[default]
    Embed,
    Pca,
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    out: Option<String>,
    pretty: bool,
    verbose: bool,
    params: Option<String>,
    pca_init: bool,
    seed: Option<i64>,
    max_iter: Option<usize>,
    theta: Option<f64>,
    trust: Option<usize>,
    components: Option<usize>,
    whiten: bool,
}

/// `embed` input document.
#[derive(Debug, Deserialize)]
struct EmbedInput {
    n: usize,
    vals: Vec<f64>,
    cols: Vec<u32>,
    rows: Vec<u32>,
    #[serde(default)]
    nnz: Option<usize>,
    /// Seed embedding in 2×N layout.
    #[serde(default)]
    init: Option<Vec<f64>>,
    /// Raw row-major features, used for `--pca` and `--trust`.
    #[serde(default)]
    data: Option<Vec<f64>>,
    #[serde(default)]
    n_cols: Option<usize>,
    #[serde(default)]
    params: Option<Params>,
    /// Weights already carry the early exaggeration factor.
    #[serde(default)]
    exaggerated: bool,
}

/// `pca` input document.
#[derive(Debug, Deserialize)]
struct PcaInput {
    n_rows: usize,
    n_cols: usize,
    data: Vec<f64>,
}

#[derive(Serialize)]
struct EmbedOut<'a> {
    n: usize,
    x: &'a [f64],
    y: &'a [f64],
    iterations: usize,
    last_step: Option<StepReport>,
    timings_ms: PhaseMillis,
    #[serde(skip_serializing_if = "Option::is_none")]
    trustworthiness: Option<f64>,
}

#[derive(Serialize)]
struct PcaOut {
    components: Vec<Vec<f64>>,
    explained_variance: Vec<f64>,
    explained_variance_ratio: Vec<f64>,
    singular_values: Vec<f64>,
    mean: Vec<f64>,
    noise_variance: f64,
    projected: Vec<Vec<f64>>,
}

fn usage() -> &'static str {
    "manta-cli\n\
\n\
USAGE:\n\
  manta-cli [embed] [--params <file>] [--pca] [--seed <n>] [--max-iter <n>] [--theta <t>] [--trust <k>] [--verbose] [--pretty] [--out <path>] [<path>|-]\n\
  manta-cli pca [--components <k>] [--whiten] [--pretty] [--out <path>] [<path>|-]\n\
\n\
NOTES:\n\
  - If <path> is omitted or '-', input is read from stdin.\n\
  - embed reads {n, vals, cols, rows, init?, data?, n_cols?, params?, exaggerated?}.\n\
  - Weights are multiplied by params.early_exaggeration unless `exaggerated` is true.\n\
  - --params replaces the document's params; flags override both.\n\
  - --pca seeds the embedding from the first two principal components of `data`.\n\
  - --trust <k> reports trustworthiness against `data` with k neighbors.\n\
  - pca reads {n_rows, n_cols, data} (row-major).\n\
  - Logging goes to stderr; RUST_LOG overrides the level.\n\
"
}

fn next_value<'a>(it: &mut impl Iterator<Item = &'a String>) -> Result<&'a String, CliError> {
    it.next().ok_or(CliError::Usage(usage()))
}

fn parse_value<T: std::str::FromStr>(raw: &str) -> Result<T, CliError> {
    raw.parse::<T>().map_err(|_| CliError::Usage(usage()))
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "embed" => args.command = Command::Embed,
            "pca" => args.command = Command::Pca,
            "--pretty" => args.pretty = true,
            "--verbose" | "-v" => args.verbose = true,
            "--pca" => args.pca_init = true,
            "--whiten" => args.whiten = true,
            "--params" => args.params = Some(next_value(&mut it)?.clone()),
            "--out" => args.out = Some(next_value(&mut it)?.clone()),
            "--seed" => args.seed = Some(parse_value(next_value(&mut it)?)?),
            "--max-iter" => args.max_iter = Some(parse_value(next_value(&mut it)?)?),
            "--theta" => args.theta = Some(parse_value(next_value(&mut it)?)?),
            "--trust" => args.trust = Some(parse_value(next_value(&mut it)?)?),
            "--components" => args.components = Some(parse_value(next_value(&mut it)?)?),
            "--" => {
                if let Some(rest) = it.next() {
                    if args.input.is_some() {
                        return Err(CliError::Usage(usage()));
                    }
                    args.input = Some(rest.clone());
                }
                if it.next().is_some() {
                    return Err(CliError::Usage(usage()));
                }
            }
            "-" => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some("-".to_string());
            }
            other if other.starts_with('-') => return Err(CliError::Usage(usage())),
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    Ok(args)
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

fn write_json(value: &impl Serialize, pretty: bool, out: Option<&str>) -> Result<(), CliError> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    match out {
        None | Some("-") => println!("{text}"),
        Some(path) => std::fs::write(path, text + "\n")?,
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_params(args: &Args, from_doc: Option<Params>) -> Result<Params, CliError> {
    let mut params = match &args.params {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => from_doc.unwrap_or_default(),
    };
    if args.verbose {
        params.verbose = true;
    }
    if let Some(seed) = args.seed {
        params.random_state = seed;
    }
    if let Some(max_iter) = args.max_iter {
        params.max_iter = max_iter;
    }
    if let Some(theta) = args.theta {
        params.theta = theta;
    }
    Ok(params)
}

fn run_embed(args: &Args, text: &str) -> Result<(), CliError> {
    let doc: EmbedInput = serde_json::from_str(text)?;
    let mut params = resolve_params(args, doc.params)?;

    let n = doc.n;
    let nnz = doc.nnz.unwrap_or(doc.vals.len());
    let mut graph = AffinityGraph::from_coo(n, doc.vals, doc.cols, doc.rows, nnz)?;
    if !doc.exaggerated {
        graph.scale(params.early_exaggeration);
    }

    let features = match (&doc.data, doc.n_cols) {
        (Some(data), Some(n_cols)) => Some((data.as_slice(), n_cols)),
        _ => None,
    };

    let mut positions = if args.pca_init {
        let (data, n_cols) = features.ok_or(CliError::MissingData("--pca"))?;
        params.init = Initialization::Provided;
        manta_pca::initial_embedding(data, n, n_cols)?
    } else if let Some(init) = doc.init {
        params.init = Initialization::Provided;
        init
    } else {
        vec![0.0; 2 * n]
    };
    tracing::debug!(n, nnz, init = ?params.init, "starting embedding");

    let summary = manta::embed(&mut graph, &mut positions, &params)?;

    let trustworthiness = match args.trust {
        Some(k) => {
            let (data, n_cols) = features.ok_or(CliError::MissingData("--trust"))?;
            Some(manta::metrics::trustworthiness(data, n_cols, &positions, k)?)
        }
        None => None,
    };

    let (x, y) = positions.split_at(n);
    let out = EmbedOut {
        n,
        x,
        y,
        iterations: summary.iterations,
        last_step: summary.last_step,
        timings_ms: summary.timings.millis(),
        trustworthiness,
    };
    write_json(&out, args.pretty, args.out.as_deref())
}

fn run_pca(args: &Args, text: &str) -> Result<(), CliError> {
    let doc: PcaInput = serde_json::from_str(text)?;
    let params = PcaParams {
        n_components: args.components.unwrap_or(2),
        whiten: args.whiten,
    };
    let (pca, projected) = Pca::fit_transform(&doc.data, doc.n_rows, doc.n_cols, &params)?;

    let rows = |m: &manta_pca::nalgebra::DMatrix<f64>| -> Vec<Vec<f64>> {
        m.row_iter().map(|r| r.iter().copied().collect()).collect()
    };
    let out = PcaOut {
        components: rows(&pca.components),
        explained_variance: pca.explained_variance.iter().copied().collect(),
        explained_variance_ratio: pca.explained_variance_ratio.iter().copied().collect(),
        singular_values: pca.singular_values.iter().copied().collect(),
        mean: pca.mean.iter().copied().collect(),
        noise_variance: pca.noise_variance,
        projected: rows(&projected),
    };
    write_json(&out, args.pretty, args.out.as_deref())
}

fn run(args: Args) -> Result<(), CliError> {
    let text = read_input(args.input.as_deref())?;
    match args.command {
        Command::Embed => run_embed(&args, &text),
        Command::Pca => run_pca(&args, &text),
    }
}

fn main() {
    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    init_tracing(args.verbose);

    if let Err(err) = run(args) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
