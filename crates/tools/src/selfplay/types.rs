use anyhow::{Result, bail};
use serde::Serialize;
use std::time::Duration;

/// 詰みスコアを centipawn に換算するときの基準値
pub const MATE_SCORE: i32 = 32000;

/// エンジンが報告した評価値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// centipawn
    Cp(i32),
    /// 詰みまでの手数（正なら手番側が詰ます）
    Mate(i32),
}

impl Score {
    /// centipawn に換算する。
    ///
    /// `mate n` (n > 0) は `MATE_SCORE - (2n - 1)`、`mate -n` は
    /// `-(MATE_SCORE - 2n)` になる。手数が極端でも符号は変わらない。
    pub fn to_centipawns(self) -> i32 {
        match self {
            Score::Cp(cp) => cp,
            Score::Mate(n) if n > 0 => {
                let plies = n.saturating_mul(2).saturating_sub(1).min(MATE_SCORE - 1);
                MATE_SCORE - plies
            }
            Score::Mate(n) => {
                let plies = n.saturating_mul(-2).min(MATE_SCORE - 1);
                -(MATE_SCORE - plies)
            }
        }
    }
}

/// 探索中の info 行から拾った最新の評価値
#[derive(Default, Clone)]
pub struct InfoSnapshot {
    pub score: Option<Score>,
}

impl InfoSnapshot {
    /// info 行を解析し、multipv=1 の評価値を保持する。
    pub fn update_from_line(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first().copied() != Some("info") {
            return;
        }
        let multipv = tokens
            .windows(2)
            .find(|w| w[0] == "multipv")
            .and_then(|w| w[1].parse::<u32>().ok())
            .unwrap_or(1);
        if multipv != 1 {
            return;
        }
        for (i, token) in tokens.iter().enumerate() {
            match *token {
                "score" => {
                    let kind = tokens.get(i + 1).copied();
                    let value = tokens.get(i + 2).and_then(|t| t.parse::<i32>().ok());
                    match (kind, value) {
                        (Some("cp"), Some(v)) => self.score = Some(Score::Cp(v)),
                        (Some("mate"), Some(v)) => self.score = Some(Score::Mate(v)),
                        _ => {}
                    }
                    break;
                }
                // 以降は指し手列か自由文字列
                "pv" | "string" => break,
                _ => {}
            }
        }
    }
}

/// 探索の打ち切り条件。少なくとも1つは指定が必要。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchLimit {
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub movetime_ms: Option<u64>,
}

impl SearchLimit {
    pub fn is_bounded(&self) -> bool {
        self.depth.is_some() || self.nodes.is_some() || self.movetime_ms.is_some()
    }

    /// `go` コマンド文字列を組み立てる。上限なしの探索は拒否する。
    pub fn go_command(&self) -> Result<String> {
        if !self.is_bounded() {
            bail!("search limit must set at least one of depth, nodes or movetime");
        }
        let mut cmd = String::from("go");
        if let Some(depth) = self.depth {
            cmd.push_str(&format!(" depth {depth}"));
        }
        if let Some(nodes) = self.nodes {
            cmd.push_str(&format!(" nodes {nodes}"));
        }
        if let Some(ms) = self.movetime_ms {
            cmd.push_str(&format!(" movetime {ms}"));
        }
        Ok(cmd)
    }

    /// bestmove を待つ時間の上乗せ分
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.movetime_ms.unwrap_or(0))
    }
}

/// 1回の探索結果
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub bestmove: Option<String>,
    /// 探索中に一度も score が報告されなければ `None`
    pub score: Option<Score>,
}

/// 対局の終了理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// 詰み・ステイルメイト・千日手など盤面上の決着
    Natural,
    /// 評価値が eval_limit を超えた
    ScoreCutoff,
    /// 最大手数に到達
    PlyLimit,
    /// 投了判定
    Resign,
    /// 引き分け判定
    DrawAdjudicated,
    /// ランダム序盤の時点で終局していたため破棄
    Abandoned,
}

impl Termination {
    pub const ALL: [Termination; 6] = [
        Termination::Natural,
        Termination::ScoreCutoff,
        Termination::PlyLimit,
        Termination::Resign,
        Termination::DrawAdjudicated,
        Termination::Abandoned,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Termination::Natural => "natural",
            Termination::ScoreCutoff => "score_cutoff",
            Termination::PlyLimit => "ply_limit",
            Termination::Resign => "resign",
            Termination::DrawAdjudicated => "draw_adjudicated",
            Termination::Abandoned => "abandoned",
        }
    }
}
