use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result, bail};
use rand::Rng;
use rand::seq::IndexedRandom;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Position, Role};

use super::board::GameBoard;

/// Chess960 の初期配置数
pub const CHESS960_POSITIONS: u32 = 960;

/// 開始局面の選び方
#[derive(Clone, Default)]
pub struct StartPositionConfig {
    /// Chess960 の初期配置を混ぜる
    pub use_frc: bool,
    /// Chess960 を選ぶ確率
    pub frc_prob: f64,
    /// 開始局面ファイルから読んだ局面（空なら平手）
    pub book: Vec<Chess>,
}

/// Scharnagl 番号 (0..960) から1段目の駒配置を求める。518 が平手。
pub fn chess960_back_rank(index: u32) -> Result<[Role; 8]> {
    if index >= CHESS960_POSITIONS {
        bail!("chess960 index {index} out of range (0..{CHESS960_POSITIONS})");
    }
    // 2つ目のナイトの位置ごとの (1つ目, 2つ目)
    const KNIGHTS: [(usize, usize); 10] = [
        (0, 1),
        (0, 2),
        (0, 3),
        (0, 4),
        (1, 2),
        (1, 3),
        (1, 4),
        (2, 3),
        (2, 4),
        (3, 4),
    ];

    let mut rank: [Option<Role>; 8] = [None; 8];
    let mut n = index as usize;
    rank[2 * (n % 4) + 1] = Some(Role::Bishop);
    n /= 4;
    rank[2 * (n % 4)] = Some(Role::Bishop);
    n /= 4;
    place_nth_empty(&mut rank, n % 6, Role::Queen);
    n /= 6;
    let (k1, k2) = KNIGHTS[n];
    // 先に後ろを埋めると前のインデックスがずれない
    place_nth_empty(&mut rank, k2, Role::Knight);
    place_nth_empty(&mut rank, k1, Role::Knight);
    for role in [Role::Rook, Role::King, Role::Rook] {
        place_nth_empty(&mut rank, 0, role);
    }

    let mut roles = [Role::Pawn; 8];
    for (slot, role) in roles.iter_mut().zip(rank) {
        *slot = role.context("chess960 back rank left a square empty")?;
    }
    Ok(roles)
}

fn place_nth_empty(rank: &mut [Option<Role>; 8], nth: usize, role: Role) {
    if let Some(slot) = rank.iter_mut().filter(|s| s.is_none()).nth(nth) {
        *slot = Some(role);
    }
}

/// Chess960 の開始局面（キャスリング権なし）
pub fn chess960_position(index: u32) -> Result<Chess> {
    let back = chess960_back_rank(index)?;
    let black: String = back.iter().map(|r| r.char()).collect();
    let white = black.to_ascii_uppercase();
    let fen = format!("{black}/pppppppp/8/8/8/8/PPPPPPPP/{white} w - - 0 1");
    parse_start_line(&fen)
}

/// FEN または EPD の1行を局面にする。EPD の場合は手数を `0 1` とみなす。
pub fn parse_start_line(line: &str) -> Result<Chess> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        bail!("expected at least 4 FEN fields, got {}", fields.len());
    }
    let has_clocks = fields.len() >= 6
        && fields[4].parse::<u32>().is_ok()
        && fields[5].parse::<u32>().is_ok();
    let fen_text = if has_clocks {
        fields[..6].join(" ")
    } else {
        format!("{} 0 1", fields[..4].join(" "))
    };
    let fen: Fen = fen_text
        .parse()
        .with_context(|| format!("invalid FEN '{fen_text}'"))?;
    let pos: Chess = fen
        .into_position(CastlingMode::Standard)
        .with_context(|| format!("illegal position '{fen_text}'"))?;
    Ok(pos)
}

/// 開始局面ファイルを読む。空行と `#` で始まる行は無視する。
pub fn load_start_positions(path: &Path) -> Result<Vec<Chess>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut positions = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let pos = parse_start_line(trimmed).with_context(|| {
            format!("invalid position on line {} of {}", idx + 1, path.display())
        })?;
        if pos.is_game_over() {
            bail!("position on line {} of {} is already over", idx + 1, path.display());
        }
        positions.push(pos);
    }
    if positions.is_empty() {
        bail!("no usable positions found in {}", path.display());
    }
    Ok(positions)
}

/// 1局分の開始局面を選ぶ
pub fn setup_board<R: Rng>(config: &StartPositionConfig, rng: &mut R) -> Result<Chess> {
    if config.use_frc && rng.random::<f64>() < config.frc_prob {
        return chess960_position(rng.random_range(0..CHESS960_POSITIONS));
    }
    Ok(config.book.choose(rng).cloned().unwrap_or_default())
}

/// 一様ランダムな合法手を `nmoves` 手指す。途中で終局したらそこで止める。
pub fn play_random_moves<R: Rng>(board: &mut GameBoard, nmoves: u32, rng: &mut R) {
    for _ in 0..nmoves {
        if board.is_game_over() {
            break;
        }
        let moves = board.position().legal_moves();
        let Some(mv) = moves.choose(rng).cloned() else {
            break;
        };
        board.push(&mv);
    }
}
