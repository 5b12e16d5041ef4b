use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, warn};

use super::types::{InfoSnapshot, SearchLimit, SearchOutcome};

pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_millis(300);
pub const ENGINE_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// エンジンとの行単位の入出力。
///
/// プロトコルの意味は [`UciEngine`] が持ち、実装側は行の送受信と
/// 終了処理だけを担当する。
pub trait EngineIo {
    /// 1行送信する（改行は実装側で付与）
    fn send(&mut self, line: &str) -> Result<()>;

    /// 1行受信する。`timeout` 以内に来なければエラー。
    fn receive_line(&mut self, timeout: Duration) -> Result<String>;

    /// 先頭トークンが `sentinel` の行まで読み進める。
    ///
    /// 戻り値は読んだ行すべてで、最後の要素が sentinel 行になる。
    /// `timeout` は1行ごとの待ち時間。
    fn receive_until(&mut self, sentinel: &str, timeout: Duration) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.receive_line(timeout)?;
            let done = line.split_whitespace().next() == Some(sentinel);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    /// エンジンを終了させる。2回目以降の呼び出しは何もしない。
    fn stop(&mut self) -> Result<()>;
}

/// 対局ごとに新しいエンジンを用意する。
pub trait EngineLauncher: Sync {
    type Io: EngineIo;

    fn launch(&self) -> Result<Self::Io>;

    /// ログや実行記録に出す名前
    fn describe(&self) -> String {
        "engine".to_string()
    }
}

/// エンジンプロセス起動時の設定。
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl EngineConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }
}

/// 子プロセスとして起動したエンジン。
pub struct EngineProcess {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    stopped: bool,
}

impl EngineProcess {
    pub fn start(cfg: &EngineConfig) -> Result<Self> {
        let mut cmd = Command::new(&cfg.path);
        if !cfg.args.is_empty() {
            cmd.args(&cfg.args);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn engine at {}", cfg.path.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        if tx.send(l).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            rx,
            stopped: false,
        })
    }
}

impl EngineIo for EngineProcess {
    fn send(&mut self, line: &str) -> Result<()> {
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }

    fn receive_line(&mut self, timeout: Duration) -> Result<String> {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => Ok(line),
            Err(RecvTimeoutError::Timeout) => bail!("engine read timeout ({timeout:?})"),
            Err(RecvTimeoutError::Disconnected) => bail!("engine exited unexpectedly"),
        }
    }

    fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        let _ = self.send("quit");
        let deadline = Instant::now() + ENGINE_QUIT_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return Ok(());
            }
            std::thread::sleep(ENGINE_QUIT_POLL_INTERVAL);
        }
        warn!("engine did not exit after quit, killing pid {}", self.child.id());
        let _ = self.child.kill();
        self.child.wait().context("failed to reap engine process")?;
        Ok(())
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// 実行ファイルからエンジンを起動するランチャー
pub struct ProcessLauncher {
    pub config: EngineConfig,
}

impl EngineLauncher for ProcessLauncher {
    type Io = EngineProcess;

    fn launch(&self) -> Result<EngineProcess> {
        EngineProcess::start(&self.config)
    }

    fn describe(&self) -> String {
        self.config.path.display().to_string()
    }
}

/// エンジンに送るオプション。
///
/// Hash と Threads は常に送る。それ以外はエンジンが `option name` で
/// 通知したものだけ送る。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub hash_mb: u32,
    pub threads: u32,
    pub syzygy_path: Option<String>,
    /// `EvalFile` として送る
    pub nnue_file: Option<String>,
    /// `UseNNUE` として送る
    pub use_nnue: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            hash_mb: 128,
            threads: 1,
            syzygy_path: None,
            nnue_file: None,
            use_nnue: false,
        }
    }
}

/// UCI プロトコルを話すエンジン。drop 時に停止する。
pub struct UciEngine<E: EngineIo> {
    io: E,
    opt_names: HashSet<String>,
    read_timeout: Duration,
}

impl<E: EngineIo> UciEngine<E> {
    /// `uci`/`uciok` のハンドシェイクを行い、オプションを設定する。
    pub fn start(io: E, options: &EngineOptions, read_timeout: Duration) -> Result<Self> {
        let mut engine = Self {
            io,
            opt_names: HashSet::new(),
            read_timeout,
        };
        engine.initialize(options).context("engine handshake failed")?;
        Ok(engine)
    }

    fn initialize(&mut self, options: &EngineOptions) -> Result<()> {
        self.io.send("uci")?;
        for line in self.io.receive_until("uciok", self.read_timeout)? {
            if let Some(name) = line.strip_prefix("option ").and_then(parse_option_name) {
                self.opt_names.insert(name);
            }
        }
        debug!("engine advertised {} options", self.opt_names.len());

        self.set_option("Hash", &options.hash_mb.to_string())?;
        self.set_option("Threads", &options.threads.to_string())?;
        if let Some(path) = &options.syzygy_path {
            self.set_option_if_available("SyzygyPath", path)?;
        }
        if let Some(file) = &options.nnue_file {
            self.set_option_if_available("EvalFile", file)?;
        }
        if self.opt_names.contains("UseNNUE") {
            self.set_option("UseNNUE", if options.use_nnue { "true" } else { "false" })?;
        }
        self.sync_ready()?;
        self.io.send("ucinewgame")?;
        Ok(())
    }

    pub fn has_option(&self, name: &str) -> bool {
        self.opt_names.contains(name)
    }

    fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        self.io.send(&format!("setoption name {name} value {value}"))
    }

    pub fn set_option_if_available(&mut self, name: &str, value: &str) -> Result<()> {
        if self.opt_names.is_empty() || self.opt_names.contains(name) {
            self.set_option(name, value)?;
        }
        Ok(())
    }

    pub fn sync_ready(&mut self) -> Result<()> {
        self.io.send("isready")?;
        self.io.receive_until("readyok", self.read_timeout)?;
        Ok(())
    }

    /// `fen` の局面を探索する。
    ///
    /// score が一度も報告されなくてもエラーにはしない。
    pub fn search(&mut self, fen: &str, limit: &SearchLimit) -> Result<SearchOutcome> {
        let go = limit.go_command()?;
        self.io.send(&format!("position fen {fen}"))?;
        self.io.send(&go)?;

        let timeout = self.read_timeout + limit.time_budget();
        let mut snapshot = InfoSnapshot::default();
        loop {
            let line = self.io.receive_line(timeout)?;
            if line.starts_with("info") {
                snapshot.update_from_line(&line);
                continue;
            }
            if let Some(rest) = line.strip_prefix("bestmove") {
                let bestmove = rest
                    .split_whitespace()
                    .next()
                    .filter(|mv| *mv != "(none)" && *mv != "0000")
                    .map(str::to_string);
                return Ok(SearchOutcome {
                    bestmove,
                    score: snapshot.score,
                });
            }
        }
    }

    /// `quiet` 拡張コマンド: 静止局面に至る読み筋を返す。
    pub fn quiet_pv(&mut self, fen: &str) -> Result<Vec<String>> {
        self.io.send(&format!("position fen {fen}"))?;
        self.io.send("quiet")?;
        let lines = self.io.receive_until("pv", self.read_timeout)?;
        let pv = lines
            .last()
            .map(|line| line.split_whitespace().skip(1).map(str::to_string).collect())
            .unwrap_or_default();
        Ok(pv)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.io.stop()
    }
}

impl<E: EngineIo> Drop for UciEngine<E> {
    fn drop(&mut self) {
        let _ = self.io.stop();
    }
}

pub fn parse_option_name(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    tokens.find(|tok| *tok == "name")?;
    let parts: Vec<&str> = tokens.take_while(|tok| *tok != "type").collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selfplay::testing::{ScriptedEngine, ScriptedReply};
    use crate::selfplay::types::Score;

    #[test]
    fn parse_option_name_handles_spaces() {
        assert_eq!(
            parse_option_name("name Hash type spin default 16 min 1 max 33554432"),
            Some("Hash".to_string())
        );
        assert_eq!(
            parse_option_name("name Clear Hash type button"),
            Some("Clear Hash".to_string())
        );
        assert_eq!(parse_option_name("type spin"), None);
    }

    #[test]
    fn handshake_sends_only_advertised_options() {
        let io = ScriptedEngine::new(|_| ScriptedReply::best("e2e4", Some(Score::Cp(10))))
            .with_options(&["Hash", "Threads", "UseNNUE"]);
        let sent = io.sent_log();
        let options = EngineOptions {
            syzygy_path: Some("/tb".to_string()),
            use_nnue: true,
            ..EngineOptions::default()
        };
        let engine = UciEngine::start(io, &options, Duration::from_secs(1)).unwrap();
        assert!(engine.has_option("UseNNUE"));
        drop(engine);

        let sent = sent.lock().unwrap().clone();
        assert_eq!(sent[0], "uci");
        assert!(sent.contains(&"setoption name Hash value 128".to_string()));
        assert!(sent.contains(&"setoption name Threads value 1".to_string()));
        assert!(sent.contains(&"setoption name UseNNUE value true".to_string()));
        assert!(!sent.iter().any(|l| l.contains("SyzygyPath")));
        let ready = sent.iter().position(|l| l == "isready").unwrap();
        let newgame = sent.iter().position(|l| l == "ucinewgame").unwrap();
        assert!(ready < newgame);
        assert_eq!(sent.last().map(String::as_str), Some("quit"));
    }

    #[test]
    fn search_returns_move_and_last_score() {
        let io = ScriptedEngine::new(|_| ScriptedReply::best("g1f3", Some(Score::Mate(2))));
        let mut engine =
            UciEngine::start(io, &EngineOptions::default(), Duration::from_secs(1)).unwrap();
        let limit = SearchLimit {
            depth: Some(4),
            ..SearchLimit::default()
        };
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        let outcome = engine.search(fen, &limit).unwrap();
        assert_eq!(outcome.bestmove.as_deref(), Some("g1f3"));
        assert_eq!(outcome.score, Some(Score::Mate(2)));
    }

    #[test]
    fn search_without_score_is_not_an_error() {
        let io = ScriptedEngine::new(|_| ScriptedReply::best("e2e4", None));
        let mut engine =
            UciEngine::start(io, &EngineOptions::default(), Duration::from_secs(1)).unwrap();
        let limit = SearchLimit {
            nodes: Some(100),
            ..SearchLimit::default()
        };
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        let outcome = engine.search(fen, &limit).unwrap();
        assert_eq!(outcome.bestmove.as_deref(), Some("e2e4"));
        assert_eq!(outcome.score, None);
    }

    #[test]
    fn unbounded_search_is_rejected_before_sending() {
        let io = ScriptedEngine::new(|_| ScriptedReply::best("e2e4", None));
        let sent = io.sent_log();
        let mut engine =
            UciEngine::start(io, &EngineOptions::default(), Duration::from_secs(1)).unwrap();
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        assert!(engine.search(fen, &SearchLimit::default()).is_err());
        assert!(!sent.lock().unwrap().iter().any(|l| l.starts_with("go")));
    }

    #[test]
    fn quiet_pv_reads_pv_line() {
        let io = ScriptedEngine::new(|_| ScriptedReply::best("e2e4", None));
        let mut engine =
            UciEngine::start(io, &EngineOptions::default(), Duration::from_secs(1)).unwrap();
        let fen = "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2";
        let pv = engine.quiet_pv(fen).unwrap();
        assert_eq!(pv, vec!["e4d5".to_string(), "d8d5".to_string()]);
    }

    #[test]
    fn missing_handshake_sentinel_is_fatal() {
        let io = ScriptedEngine::new(|_| ScriptedReply::best("e2e4", None)).silent();
        assert!(UciEngine::start(io, &EngineOptions::default(), Duration::from_millis(10)).is_err());
    }
}
