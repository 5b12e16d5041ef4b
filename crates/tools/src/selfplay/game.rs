use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::debug;
use rand::Rng;
use sfen_pack::{PositionRecord, RecordFormat, write_record};
use shakmaty::{Chess, Color, Move, Position};

use super::board::{GameBoard, white_sign};
use super::engine::{ENGINE_READY_TIMEOUT, EngineIo, EngineLauncher, EngineOptions, UciEngine};
use super::position::{StartPositionConfig, play_random_moves, setup_board};
use super::types::{SearchLimit, Termination};

/// 投了・引き分け判定の閾値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjudicationConfig {
    /// これを超える評価値が出たら即座に勝敗を決める
    pub eval_limit: i32,
    pub resign_score: i32,
    pub resign_count: u32,
    pub draw_score: i32,
    pub draw_count: u32,
    /// 引き分け判定を始める手数
    pub min_draw_ply: u16,
    /// これを超えたら引き分け
    pub max_ply: u16,
}

impl Default for AdjudicationConfig {
    fn default() -> Self {
        Self {
            eval_limit: 19000,
            resign_score: 10000,
            resign_count: 10,
            draw_score: 10,
            draw_count: 10,
            min_draw_ply: 80,
            max_ply: 400,
        }
    }
}

/// 記録した手の評価値の連続回数を数え、対局を打ち切るか判定する。
///
/// 評価値はすべて手番側から見た値で受け取り、結果は白から見た値で返す。
pub struct Adjudicator {
    config: AdjudicationConfig,
    resign_streak: u32,
    draw_streak: u32,
}

impl Adjudicator {
    pub fn new(config: AdjudicationConfig) -> Self {
        Self {
            config,
            resign_streak: 0,
            draw_streak: 0,
        }
    }

    /// 評価値が eval_limit を超えていれば白から見た勝敗
    pub fn score_cutoff(&self, score: i32, mover: Color) -> Option<i8> {
        (score.saturating_abs() > self.config.eval_limit).then(|| winner_by_score(score, mover))
    }

    /// 記録した手ごとに呼ぶ。打ち切るなら (理由, 白から見た結果) を返す。
    pub fn observe(&mut self, ply: u16, score: i32, mover: Color) -> Option<(Termination, i8)> {
        if ply > self.config.max_ply {
            return Some((Termination::PlyLimit, 0));
        }

        if score.saturating_abs() >= self.config.resign_score {
            self.resign_streak += 1;
        } else {
            self.resign_streak = 0;
        }
        if self.resign_streak >= self.config.resign_count {
            return Some((Termination::Resign, winner_by_score(score, mover)));
        }

        if ply > self.config.min_draw_ply {
            if score.saturating_abs() <= self.config.draw_score {
                self.draw_streak += 1;
            } else {
                self.draw_streak = 0;
            }
            if self.draw_streak >= self.config.draw_count {
                return Some((Termination::DrawAdjudicated, 0));
            }
        }
        None
    }
}

/// 手番側から見た評価値の符号を白から見た勝敗にする
fn winner_by_score(score: i32, mover: Color) -> i8 {
    let mover_result = if score > 0 { 1 } else { -1 };
    mover_result * white_sign(mover)
}

/// 1局分の設定
#[derive(Clone)]
pub struct GameConfig {
    pub engine_options: EngineOptions,
    pub read_timeout: Duration,
    pub limit: SearchLimit,
    pub random_plies: u32,
    pub adjudication: AdjudicationConfig,
    pub start: StartPositionConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            engine_options: EngineOptions::default(),
            read_timeout: ENGINE_READY_TIMEOUT,
            limit: SearchLimit {
                depth: None,
                nodes: None,
                movetime_ms: Some(60_000),
            },
            random_plies: 10,
            adjudication: AdjudicationConfig::default(),
            start: StartPositionConfig::default(),
        }
    }
}

/// 対局結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameReport {
    pub termination: Termination,
    /// 白から見た結果
    pub white_result: i8,
    /// 終局時点の手数
    pub plies: u16,
    /// 記録対象になった局面数
    pub recorded: usize,
    /// 実際に書き出した局面数 (`pos_left` 以下)
    pub written: usize,
}

/// 結果が決まる前の記録
struct PendingRecord {
    position: Chess,
    best_move: Move,
    score: i16,
    ply: u16,
}

impl PendingRecord {
    fn finish(self, white_result: i8) -> PositionRecord {
        let result = white_result * white_sign(self.position.turn());
        PositionRecord {
            position: self.position,
            best_move: self.best_move,
            score: self.score,
            ply: self.ply,
            result,
        }
    }
}

/// 1局を自己対局し、記録した局面を `out` に最大 `pos_left` 件書き出す。
///
/// ランダム序盤の時点で終局していたらエンジンを起動せずに
/// `Termination::Abandoned` を返す。
pub fn play_game<L, R, W>(
    launcher: &L,
    config: &GameConfig,
    rng: &mut R,
    out: &mut W,
    format: RecordFormat,
    pos_left: usize,
) -> Result<GameReport>
where
    L: EngineLauncher,
    R: Rng,
    W: Write,
{
    let mut board = GameBoard::new(setup_board(&config.start, rng)?);
    play_random_moves(&mut board, config.random_plies, rng);
    if board.is_game_over() {
        debug!("random opening already finished: {}", board.fen());
        return Ok(GameReport {
            termination: Termination::Abandoned,
            white_result: 0,
            plies: board.ply(),
            recorded: 0,
            written: 0,
        });
    }

    let io = launcher.launch()?;
    let mut engine = UciEngine::start(io, &config.engine_options, config.read_timeout)?;
    let played = run_session(&mut engine, &mut board, config);
    engine.stop()?;
    let (termination, white_result, pending) = played?;

    let recorded = pending.len();
    let mut written = 0;
    for pending in pending.into_iter().take(pos_left) {
        let record = pending.finish(white_result);
        write_record(out, format, &record).context("failed to write training record")?;
        written += 1;
    }
    out.flush().context("failed to flush training records")?;

    debug!(
        "game finished: {} result={} plies={} recorded={} written={}",
        termination.label(),
        white_result,
        board.ply(),
        recorded,
        written
    );
    Ok(GameReport {
        termination,
        white_result,
        plies: board.ply(),
        recorded,
        written,
    })
}

/// 終局まで探索と着手を繰り返す
fn run_session<E: EngineIo>(
    engine: &mut UciEngine<E>,
    board: &mut GameBoard,
    config: &GameConfig,
) -> Result<(Termination, i8, Vec<PendingRecord>)> {
    let mut adjudicator = Adjudicator::new(config.adjudication);
    let mut pending = Vec::new();

    loop {
        if let Some(white_result) = board.outcome() {
            return Ok((Termination::Natural, white_result, pending));
        }

        let fen = board.fen();
        let outcome = engine.search(&fen, &config.limit)?;
        let bestmove = outcome
            .bestmove
            .ok_or_else(|| anyhow!("engine returned no best move for {fen}"))?;
        let mv = board.parse_move(&bestmove)?;

        let Some(score) = outcome.score else {
            board.push(&mv);
            continue;
        };
        if !board.is_quiet(&mv) {
            board.push(&mv);
            continue;
        }

        let score = score.to_centipawns();
        let mover = board.turn();
        if let Some(white_result) = adjudicator.score_cutoff(score, mover) {
            return Ok((Termination::ScoreCutoff, white_result, pending));
        }

        let ply = board.ply();
        pending.push(PendingRecord {
            position: board.position().clone(),
            best_move: mv.clone(),
            score: score.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
            ply,
        });

        if let Some((termination, white_result)) = adjudicator.observe(ply, score, mover) {
            return Ok((termination, white_result, pending));
        }

        board.push(&mv);
    }
}
