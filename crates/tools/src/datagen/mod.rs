//! 並列自己対局による学習データ生成
//!
//! ワーカーごとにシャードへ書き出し、全ワーカー終了後に1ファイルへ連結する。
//! 途中でワーカーが失敗した場合は連結せず、シャードを残してエラーを返す。

pub mod manifest;
pub mod merge;
pub mod pool;
pub mod progress;
pub mod worker;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use log::{error, info};
use sfen_pack::RecordFormat;

use crate::selfplay::{EngineLauncher, GameConfig, Termination};
use manifest::{ManifestSettings, RunManifest, manifest_path, write_manifest};
use merge::{merge_shards, shard_paths};
use pool::{DEFAULT_BATCH_SIZE, WorkPool};
use progress::{DEFAULT_PROGRESS_INTERVAL, progress_bar, report_progress};
use worker::{WorkerStats, run_worker};

/// 生成ジョブ全体の設定
#[derive(Clone)]
pub struct GenConfig {
    pub game: GameConfig,
    pub nthreads: usize,
    pub npositions: usize,
    pub output: PathBuf,
    pub format: RecordFormat,
    pub seed: Option<u64>,
    pub batch_size: usize,
    pub progress_interval: Duration,
    pub show_progress: bool,
    pub write_manifest: bool,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            nthreads: 1,
            npositions: 30_000_000,
            output: PathBuf::from("train.bin"),
            format: RecordFormat::Bin,
            seed: None,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            show_progress: true,
            write_manifest: true,
        }
    }
}

impl GenConfig {
    /// プロセスを起動する前に設定を検証する
    pub fn validate(&self) -> Result<()> {
        if self.nthreads == 0 {
            bail!("nthreads must be at least 1");
        }
        if self.npositions == 0 {
            bail!("npositions must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        if !self.game.limit.is_bounded() {
            bail!("one of depth, nodes or movetime must be set");
        }
        let start = &self.game.start;
        if !(0.0..=1.0).contains(&start.frc_prob) {
            bail!("frc probability must be within [0, 1], got {}", start.frc_prob);
        }
        Ok(())
    }

    fn manifest_settings(&self, engine: String) -> ManifestSettings {
        let game = &self.game;
        let adj = &game.adjudication;
        let opts = &game.engine_options;
        ManifestSettings {
            engine,
            nthreads: self.nthreads,
            npositions: self.npositions,
            depth: game.limit.depth,
            nodes: game.limit.nodes,
            movetime_ms: game.limit.movetime_ms,
            random_plies: game.random_plies,
            eval_limit: adj.eval_limit,
            resign_score: adj.resign_score,
            resign_count: adj.resign_count,
            draw_score: adj.draw_score,
            draw_count: adj.draw_count,
            min_draw_ply: adj.min_draw_ply,
            max_ply: adj.max_ply,
            hash_mb: opts.hash_mb,
            syzygy_path: opts.syzygy_path.clone(),
            nnue_file: opts.nnue_file.clone(),
            use_nnue: opts.use_nnue,
            seed: self.seed,
            use_frc: game.start.use_frc,
            frc_prob: game.start.frc_prob,
            start_positions: game.start.book.len(),
            batch_size: self.batch_size,
        }
    }
}

/// 生成結果の集計
#[derive(Debug, Clone)]
pub struct GenSummary {
    pub positions: usize,
    pub games: usize,
    pub bytes: u64,
    pub terminations: BTreeMap<Termination, usize>,
    pub elapsed: Duration,
}

impl GenSummary {
    pub fn positions_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.positions as f64 / secs
        } else {
            0.0
        }
    }
}

/// 実行中ワーカー数を drop 時に減らす（panic 時も含む）
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `config.nthreads` 本のワーカーで `config.npositions` 局面を生成する。
pub fn generate<L: EngineLauncher>(launcher: &L, config: &GenConfig) -> Result<GenSummary> {
    config.validate()?;
    let started_at = Local::now();
    let start = Instant::now();

    let pool = WorkPool::new(config.npositions, config.batch_size);
    let shards = shard_paths(&config.output, config.nthreads);
    let running = AtomicUsize::new(config.nthreads);
    let bar = progress_bar(config.npositions, config.show_progress);

    info!(
        "generating {} positions with {} workers -> {}",
        config.npositions,
        config.nthreads,
        config.output.display()
    );

    let results: Vec<Result<WorkerStats>> = std::thread::scope(|s| {
        let handles: Vec<_> = shards
            .iter()
            .enumerate()
            .map(|(index, shard)| {
                let pool = &pool;
                let running = &running;
                s.spawn(move || {
                    let _guard = RunningGuard(running);
                    let result = run_worker(index, launcher, pool, config, shard);
                    if let Err(e) = &result {
                        error!("worker {index}: {e:#}");
                        pool.cancel();
                    }
                    result
                })
            })
            .collect();

        report_progress(&pool, &running, config.progress_interval, &bar);

        handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("worker {index} panicked")))
            })
            .collect()
    });

    let mut stats = WorkerStats::default();
    for result in results {
        stats.merge(&result?);
    }
    if stats.positions != config.npositions {
        bail!(
            "workers produced {} positions, expected {}",
            stats.positions,
            config.npositions
        );
    }

    let bytes = merge_shards(&config.output, &shards)?;
    let summary = GenSummary {
        positions: stats.positions,
        games: stats.games,
        bytes,
        terminations: stats.terminations,
        elapsed: start.elapsed(),
    };
    info!(
        "generated {} positions from {} games in {:.1}s ({:.1} pos/s)",
        summary.positions,
        summary.games,
        summary.elapsed.as_secs_f64(),
        summary.positions_per_sec()
    );

    if config.write_manifest {
        let manifest = RunManifest {
            generator: "gensfen".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: Local::now().to_rfc3339(),
            elapsed_secs: summary.elapsed.as_secs_f64(),
            output: config.output.display().to_string(),
            format: config.format.label().to_string(),
            positions: summary.positions,
            bytes,
            games: summary.games,
            terminations: summary
                .terminations
                .iter()
                .map(|(t, n)| (t.label().to_string(), *n))
                .collect(),
            settings: config.manifest_settings(launcher.describe()),
        };
        let path = manifest_path(&config.output);
        write_manifest(&path, &manifest)
            .with_context(|| format!("failed to write manifest {}", path.display()))?;
    }

    Ok(summary)
}
