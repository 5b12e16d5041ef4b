use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use sfen_pack::RecordFormat;
use tools::datagen::{GenConfig, generate};
use tools::selfplay::{
    AdjudicationConfig, EngineConfig, EngineOptions, GameConfig, ProcessLauncher, SearchLimit,
    StartPositionConfig, Termination, load_start_positions,
};

/// UCI エンジンの自己対局で NNUE 学習データを生成する。
///
/// # よく使うコマンド例
///
/// - 深さ8で1000万局面、8並列:
///   `cargo run --release -p sfen-tools --bin gensfen -- -e ./stockfish -d 8 -t 8 -n 10000000 -o train.bin`
///
/// - ノード数指定 + Chess960 を 20% 混ぜる:
///   `cargo run --release -p sfen-tools --bin gensfen -- -e ./engine --nodes 5000 --use-frc -o frc.bin`
///
/// - 確認用にテキスト形式で少量:
///   `cargo run -p sfen-tools --bin gensfen -- -e ./engine -d 4 -n 100 --format plain -o sample.txt`
///
/// 各ワーカーは `<stem>_<index><ext>` に書き出し、完了後に `--output` へ連結する。
#[derive(Parser, Debug)]
#[command(author, version, about = "Self-play training data generator for UCI chess engines")]
struct Cli {
    /// Path to the UCI engine binary
    #[arg(short = 'e', long)]
    engine: PathBuf,

    /// Extra arguments passed to the engine process
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    engine_args: Option<Vec<String>>,

    /// Search depth per position
    #[arg(short = 'd', long)]
    depth: Option<u32>,

    /// Node limit per position
    #[arg(long)]
    nodes: Option<u64>,

    /// Wall-clock cap per search in milliseconds (0 disables the cap)
    #[arg(long, default_value_t = 60_000)]
    movetime: u64,

    /// Number of worker threads (one engine process each)
    #[arg(short = 't', long, default_value_t = 1)]
    nthreads: usize,

    /// Number of positions to generate
    #[arg(short = 'n', long, default_value_t = 30_000_000)]
    npositions: usize,

    /// Output file
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Number of random plies played before the engine takes over
    #[arg(short = 'r', long, alias = "random_plies", default_value_t = 10)]
    random_plies: u32,

    /// Highest accepted absolute evaluation; beyond it the game is decided
    #[arg(short = 'l', long, alias = "eval_limit", default_value_t = 19_000)]
    eval_limit: i32,

    /// Absolute evaluation that counts towards resign adjudication
    #[arg(long, default_value_t = 10_000)]
    resign_score: i32,

    /// Consecutive recorded plies beyond --resign-score needed to resign
    #[arg(long, default_value_t = 10)]
    resign_count: u32,

    /// Absolute evaluation that counts towards draw adjudication
    #[arg(long, default_value_t = 10)]
    draw_score: i32,

    /// Consecutive recorded plies within --draw-score needed to adjudicate a draw
    #[arg(long, default_value_t = 10)]
    draw_count: u32,

    /// Draw adjudication starts after this ply
    #[arg(long, default_value_t = 80)]
    min_draw_ply: u16,

    /// Games are declared drawn after this ply
    #[arg(long, default_value_t = 400)]
    max_ply: u16,

    /// Engine hash size (MiB)
    #[arg(short = 'a', long, default_value_t = 128)]
    hash: u32,

    /// Path to Syzygy tablebases (sent only if the engine supports SyzygyPath)
    #[arg(short = 's', long, alias = "syzygy_path")]
    syzygy_path: Option<String>,

    /// NNUE network file (sent as EvalFile if supported)
    #[arg(long)]
    nnue_file: Option<String>,

    /// Enable NNUE evaluation (sent as UseNNUE if supported)
    #[arg(long, alias = "use_nnue", default_value_t = false)]
    use_nnue: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Bin)]
    format: OutputFormat,

    /// Seed for the random opening (worker i uses seed + 10 * i)
    #[arg(long)]
    seed: Option<u64>,

    /// Include Chess960 starting positions
    #[arg(long, alias = "use_frc", default_value_t = false)]
    use_frc: bool,

    /// Probability of using a Chess960 starting position
    #[arg(long, alias = "frc_prob", default_value_t = 0.2)]
    frc_prob: f64,

    /// Start position file (FEN or EPD, one per line)
    #[arg(long)]
    startpos_file: Option<PathBuf>,

    /// Positions handed to a worker per request
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Progress update interval in seconds
    #[arg(long, default_value_t = 10)]
    progress_interval: u64,

    /// Do not write the run manifest (<stem>.manifest.json)
    #[arg(long, default_value_t = false)]
    no_manifest: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Bin,
    Plain,
}

impl From<OutputFormat> for RecordFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Bin => RecordFormat::Bin,
            OutputFormat::Plain => RecordFormat::Plain,
        }
    }
}

fn build_config(cli: &Cli) -> Result<GenConfig> {
    if !cli.engine.is_file() {
        bail!("engine not found: {}", cli.engine.display());
    }
    if let Some(parent) = cli.output.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            bail!("output directory does not exist: {}", parent.display());
        }
    }

    let book = match &cli.startpos_file {
        Some(path) => load_start_positions(path)?,
        None => Vec::new(),
    };
    let game = GameConfig {
        engine_options: EngineOptions {
            hash_mb: cli.hash,
            threads: 1,
            syzygy_path: cli.syzygy_path.clone(),
            nnue_file: cli.nnue_file.clone(),
            use_nnue: cli.use_nnue,
        },
        read_timeout: tools::selfplay::engine::ENGINE_READY_TIMEOUT,
        limit: SearchLimit {
            depth: cli.depth,
            nodes: cli.nodes,
            movetime_ms: (cli.movetime > 0).then_some(cli.movetime),
        },
        random_plies: cli.random_plies,
        adjudication: AdjudicationConfig {
            eval_limit: cli.eval_limit,
            resign_score: cli.resign_score,
            resign_count: cli.resign_count,
            draw_score: cli.draw_score,
            draw_count: cli.draw_count,
            min_draw_ply: cli.min_draw_ply,
            max_ply: cli.max_ply,
        },
        start: StartPositionConfig {
            use_frc: cli.use_frc,
            frc_prob: cli.frc_prob,
            book,
        },
    };
    let config = GenConfig {
        game,
        nthreads: cli.nthreads,
        npositions: cli.npositions,
        output: cli.output.clone(),
        format: cli.format.into(),
        seed: cli.seed,
        batch_size: cli.batch_size,
        progress_interval: Duration::from_secs(cli.progress_interval.max(1)),
        show_progress: true,
        write_manifest: !cli.no_manifest,
    };
    config.validate()?;
    Ok(config)
}

fn print_settings(cli: &Cli, config: &GenConfig) {
    let opt = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    println!("Engine: {}", cli.engine.display());
    println!("Output: {}", cli.output.display());
    println!("Output format: {}", config.format.label());
    println!("Number of positions: {}", config.npositions);
    println!("Threads: {}", config.nthreads);
    println!("Depth: {}", opt(cli.depth.map(|d| d.to_string())));
    println!("Nodes: {}", opt(cli.nodes.map(|n| n.to_string())));
    println!("Movetime: {}", opt(config.game.limit.movetime_ms.map(|ms| format!("{ms} ms"))));
    println!("Number of random plies: {}", config.game.random_plies);
    println!("Eval limit: {}", config.game.adjudication.eval_limit);
    println!("Hash: {} MB", config.game.engine_options.hash_mb);
    println!("Use NNUE: {}", config.game.engine_options.use_nnue);
    println!("Syzygy path: {}", opt(cli.syzygy_path.clone()));
    if config.game.start.use_frc {
        println!("Chess960 probability: {}", config.game.start.frc_prob);
    }
    if !config.game.start.book.is_empty() {
        println!("Start positions: {}", config.game.start.book.len());
    }
    println!();
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    print_settings(&cli, &config);

    let mut engine = EngineConfig::new(&cli.engine);
    engine.args = cli.engine_args.clone().unwrap_or_default();
    let launcher = ProcessLauncher { config: engine };

    let summary = generate(&launcher, &config)?;

    println!("Positions: {}", summary.positions);
    println!("Games: {}", summary.games);
    for termination in Termination::ALL {
        if let Some(count) = summary.terminations.get(&termination) {
            println!("  {}: {}", termination.label(), count);
        }
    }
    println!(
        "Time: {:.1}s ({:.1} positions/s)",
        summary.elapsed.as_secs_f64(),
        summary.positions_per_sec()
    );
    Ok(())
}
