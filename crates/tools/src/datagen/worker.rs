use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::GenConfig;
use super::pool::WorkPool;
use crate::selfplay::{EngineLauncher, GameReport, Termination, play_game};

/// 1局面も書き出さない対局がこれだけ続いたらワーカーを止める
pub const MAX_CONSECUTIVE_EMPTY_GAMES: usize = 1000;

/// 1ワーカー分の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub games: usize,
    pub positions: usize,
    pub terminations: BTreeMap<Termination, usize>,
}

impl WorkerStats {
    fn record(&mut self, report: &GameReport) {
        self.games += 1;
        self.positions += report.written;
        *self.terminations.entry(report.termination).or_default() += 1;
    }

    pub fn merge(&mut self, other: &WorkerStats) {
        self.games += other.games;
        self.positions += other.positions;
        for (termination, count) in &other.terminations {
            *self.terminations.entry(*termination).or_default() += count;
        }
    }
}

/// ワーカー `index` の乱数。シードがあれば `seed + 10 * index` で初期化する。
pub fn worker_rng(seed: Option<u64>, index: usize) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(10 * index as u64)),
        None => ChaCha8Rng::from_os_rng(),
    }
}

/// 割り当てがなくなるまで対局を続け、記録を `shard` に書く。
pub fn run_worker<L: EngineLauncher>(
    index: usize,
    launcher: &L,
    pool: &WorkPool,
    config: &GenConfig,
    shard: &Path,
) -> Result<WorkerStats> {
    let file =
        File::create(shard).with_context(|| format!("failed to create {}", shard.display()))?;
    let mut writer = BufWriter::new(file);
    let mut rng = worker_rng(config.seed, index);
    let mut stats = WorkerStats::default();

    let mut finished = 0;
    let mut empty_games = 0;
    loop {
        let batch = pool.request_batch(finished);
        if batch == 0 {
            break;
        }
        let mut pos_left = batch;
        while pos_left > 0 {
            if pool.is_cancelled() {
                debug!("worker {index}: run cancelled");
                writer.flush()?;
                return Ok(stats);
            }
            let report = play_game(
                launcher,
                &config.game,
                &mut rng,
                &mut writer,
                config.format,
                pos_left,
            )
            .with_context(|| format!("worker {index} failed"))?;
            pos_left -= report.written;
            stats.record(&report);

            if report.written > 0 {
                empty_games = 0;
                continue;
            }
            empty_games += 1;
            if empty_games == MAX_CONSECUTIVE_EMPTY_GAMES / 10 {
                warn!("worker {index}: {empty_games} consecutive games produced no positions");
            }
            if empty_games >= MAX_CONSECUTIVE_EMPTY_GAMES {
                bail!(
                    "worker {index}: {empty_games} consecutive games produced no positions \
                     (last: {}); check the start positions and adjudication settings",
                    report.termination.label()
                );
            }
        }
        finished = batch;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", shard.display()))?;
    debug!(
        "worker {index}: {} games, {} positions",
        stats.games, stats.positions
    );
    Ok(stats)
}
