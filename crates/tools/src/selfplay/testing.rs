//! テスト用のインプロセスエンジン。
//!
//! 受け取った `position fen` の局面に方針関数を適用して `info`/`bestmove`
//! を返す。プロセスを起動せずに対局ロジック全体を動かせる。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Move, Position, Role};

use super::engine::{EngineIo, EngineLauncher};
use super::types::Score;

/// 1回の `go` に対する応答
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub bestmove: Option<String>,
    pub score: Option<Score>,
}

impl ScriptedReply {
    pub fn best(mv: &str, score: Option<Score>) -> Self {
        Self {
            bestmove: Some(mv.to_string()),
            score,
        }
    }

    pub fn none() -> Self {
        Self {
            bestmove: None,
            score: None,
        }
    }
}

pub type Policy = dyn Fn(&Chess) -> ScriptedReply + Send + Sync;

/// 条件を満たす合法手があればそれを、なければ先頭の合法手を UCI 表記で返す
pub fn pick_move(pos: &Chess, prefer: impl Fn(&Move) -> bool) -> String {
    let moves = pos.legal_moves();
    let mv = moves
        .iter()
        .find(|m| prefer(m))
        .or_else(|| moves.first())
        .expect("position has legal moves");
    mv.to_uci(CastlingMode::Standard).to_string()
}

/// 駒を取らないポーンの前進を優先する。序盤なら王手も駒取りも起きない。
pub fn pawn_push(pos: &Chess) -> String {
    pick_move(pos, |m| m.role() == Role::Pawn && !m.is_capture())
}

pub struct ScriptedEngine {
    policy: Arc<Policy>,
    options: Vec<String>,
    pending: VecDeque<String>,
    position: Option<Chess>,
    sent: Arc<Mutex<Vec<String>>>,
    silent: bool,
    stopped: bool,
}

impl ScriptedEngine {
    pub fn new(policy: impl Fn(&Chess) -> ScriptedReply + Send + Sync + 'static) -> Self {
        Self::from_policy(Arc::new(policy))
    }

    fn from_policy(policy: Arc<Policy>) -> Self {
        Self {
            policy,
            options: Vec::new(),
            pending: VecDeque::new(),
            position: None,
            sent: Arc::new(Mutex::new(Vec::new())),
            silent: false,
            stopped: false,
        }
    }

    pub fn with_options(mut self, names: &[&str]) -> Self {
        self.options = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// 何も返さないエンジン（ハンドシェイク失敗の再現用）
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// 送信されたコマンドの記録
    pub fn sent_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }

    fn respond(&mut self, line: &str) {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("uci") => {
                self.pending.push_back("id name scripted".to_string());
                for name in &self.options {
                    self.pending
                        .push_back(format!("option name {name} type string default <empty>"));
                }
                self.pending.push_back("uciok".to_string());
            }
            Some("isready") => self.pending.push_back("readyok".to_string()),
            Some("position") => {
                let fen = line.trim_start_matches("position fen ").trim();
                let pos = fen
                    .parse::<Fen>()
                    .expect("valid fen")
                    .into_position(CastlingMode::Standard)
                    .expect("legal position");
                self.position = Some(pos);
            }
            Some("go") => {
                let pos = self.position.as_ref().expect("position before go");
                let reply = (self.policy)(pos);
                let mv = reply.bestmove.unwrap_or_else(|| "(none)".to_string());
                match reply.score {
                    Some(Score::Cp(cp)) => self
                        .pending
                        .push_back(format!("info depth 1 score cp {cp} pv {mv}")),
                    Some(Score::Mate(n)) => self
                        .pending
                        .push_back(format!("info depth 1 score mate {n} pv {mv}")),
                    None => self.pending.push_back("info depth 1 nodes 20".to_string()),
                }
                self.pending.push_back(format!("bestmove {mv}"));
            }
            Some("quiet") => {
                // 取る手がなくなるまで最初の取る手を指し続ける
                let mut pos = self.position.clone().expect("position before quiet");
                let mut pv = Vec::new();
                while let Some(m) = pos.legal_moves().iter().find(|m| m.is_capture()).cloned() {
                    pv.push(m.to_uci(CastlingMode::Standard).to_string());
                    pos.play_unchecked(&m);
                }
                self.pending.push_back("info string quiet".to_string());
                self.pending.push_back(format!("pv {}", pv.join(" ")));
            }
            Some("quit") => self.stopped = true,
            _ => {}
        }
    }
}

impl EngineIo for ScriptedEngine {
    fn send(&mut self, line: &str) -> Result<()> {
        if self.stopped {
            bail!("engine already stopped");
        }
        self.sent.lock().unwrap().push(line.to_string());
        if !self.silent {
            self.respond(line);
        }
        Ok(())
    }

    fn receive_line(&mut self, timeout: Duration) -> Result<String> {
        match self.pending.pop_front() {
            Some(line) => Ok(line),
            None => bail!("engine read timeout ({timeout:?})"),
        }
    }

    fn stop(&mut self) -> Result<()> {
        if !self.stopped {
            self.send("quit")?;
        }
        Ok(())
    }
}

/// [`ScriptedEngine`] を対局ごとに作るランチャー
pub struct ScriptedLauncher {
    policy: Arc<Policy>,
    launches: AtomicUsize,
}

impl ScriptedLauncher {
    pub fn new(policy: impl Fn(&Chess) -> ScriptedReply + Send + Sync + 'static) -> Self {
        Self {
            policy: Arc::new(policy),
            launches: AtomicUsize::new(0),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl EngineLauncher for ScriptedLauncher {
    type Io = ScriptedEngine;

    fn launch(&self) -> Result<ScriptedEngine> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedEngine::from_policy(Arc::clone(&self.policy)))
    }
}
