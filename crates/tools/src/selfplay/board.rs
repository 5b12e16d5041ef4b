use anyhow::{Context, Result};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{Chess, Color, EnPassantMode, Move, Outcome, Position};

/// 対局中の盤面。千日手判定用に局面ハッシュの履歴を持つ。
#[derive(Clone)]
pub struct GameBoard {
    position: Chess,
    /// 直近の不可逆手以降の局面ハッシュ（現局面を含む）
    history: Vec<u64>,
}

impl GameBoard {
    pub fn new(position: Chess) -> Self {
        let hash = hash_of(&position);
        Self {
            position,
            history: vec![hash],
        }
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    /// 手数: `2 * fullmove + (黒番なら 1)`。平手の初期局面は 2。
    pub fn ply(&self) -> u16 {
        let fullmove = self.position.fullmoves().get();
        let ply = fullmove
            .saturating_mul(2)
            .saturating_add(u32::from(self.position.turn() == Color::Black));
        ply.min(u32::from(u16::MAX)) as u16
    }

    /// UCI 表記の指し手を合法手として解釈する
    pub fn parse_move(&self, uci: &str) -> Result<Move> {
        let parsed = uci
            .parse::<UciMove>()
            .with_context(|| format!("malformed move '{uci}'"))?;
        parsed
            .to_move(&self.position)
            .with_context(|| format!("illegal move '{uci}' in {}", self.fen()))
    }

    /// 手番側に王手がかかっておらず、指し手が駒取りでない
    pub fn is_quiet(&self, mv: &Move) -> bool {
        !self.position.is_check() && !mv.is_capture()
    }

    pub fn push(&mut self, mv: &Move) {
        let irreversible = mv.is_zeroing() || mv.is_castle();
        self.position.play_unchecked(mv);
        if irreversible {
            self.history.clear();
        }
        self.history.push(hash_of(&self.position));
    }

    fn occurrences(&self, hash: u64) -> usize {
        self.history.iter().filter(|h| **h == hash).count()
    }

    /// 50手ルールで引き分けを主張できる。
    ///
    /// カウンタが 99 のときは、100 に到達してなお相手に合法手が残る
    /// 非不可逆手があれば主張できる。
    fn can_claim_fifty_moves(&self) -> bool {
        let halfmoves = self.position.halfmoves();
        if halfmoves >= 100 {
            return true;
        }
        if halfmoves < 99 {
            return false;
        }
        self.position.legal_moves().iter().any(|mv| {
            if mv.is_zeroing() {
                return false;
            }
            let mut next = self.position.clone();
            next.play_unchecked(mv);
            !next.legal_moves().is_empty()
        })
    }

    /// 同一局面3回で引き分けを主張できる。現局面が3回目か、
    /// 3回目になる合法手があれば主張できる。
    fn can_claim_threefold(&self) -> bool {
        let Some(&current) = self.history.last() else {
            return false;
        };
        if self.occurrences(current) >= 3 {
            return true;
        }
        // 同じ局面に戻るには最低4手かかる
        if self.history.len() < 8 {
            return false;
        }
        self.position.legal_moves().iter().any(|mv| {
            if mv.is_zeroing() || mv.is_castle() {
                return false;
            }
            let mut next = self.position.clone();
            next.play_unchecked(mv);
            self.occurrences(hash_of(&next)) >= 2
        })
    }

    /// 終局していれば白から見た結果 (1, 0, -1) を返す。
    ///
    /// 詰み・ステイルメイト・戦力不足に加え、50手ルールと同一局面3回は
    /// 主張可能になった時点で引き分けとして扱う。
    pub fn outcome(&self) -> Option<i8> {
        match self.position.outcome() {
            Some(Outcome::Decisive { winner }) => Some(white_sign(winner)),
            Some(Outcome::Draw) => Some(0),
            None if self.can_claim_fifty_moves() || self.can_claim_threefold() => Some(0),
            None => None,
        }
    }

    pub fn is_game_over(&self) -> bool {
        self.outcome().is_some()
    }
}

fn hash_of(position: &Chess) -> u64 {
    let Zobrist64(hash) = position.zobrist_hash(EnPassantMode::Legal);
    hash
}

/// 白なら 1、黒なら -1
pub fn white_sign(color: Color) -> i8 {
    match color {
        Color::White => 1,
        Color::Black => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::CastlingMode;

    fn board_from(fen: &str) -> GameBoard {
        let pos: Chess = fen
            .parse::<Fen>()
            .unwrap()
            .into_position(CastlingMode::Standard)
            .unwrap();
        GameBoard::new(pos)
    }

    fn play(board: &mut GameBoard, moves: &[&str]) {
        for mv in moves {
            let m = board.parse_move(mv).unwrap();
            board.push(&m);
        }
    }

    #[test]
    fn ply_counts_half_moves() {
        let mut board = GameBoard::new(Chess::default());
        assert_eq!(board.ply(), 2);
        play(&mut board, &["e2e4"]);
        assert_eq!(board.ply(), 3);
        play(&mut board, &["e7e5", "g1f3"]);
        assert_eq!(board.ply(), 5);
        assert_eq!(board_from("4k3/8/8/8/8/8/8/R3K3 b - - 0 40").ply(), 81);
    }

    #[test]
    fn fools_mate_is_black_win() {
        let mut board = GameBoard::new(Chess::default());
        play(&mut board, &["f2f3", "e7e5", "g2g4"]);
        assert_eq!(board.outcome(), None);
        play(&mut board, &["d8h4"]);
        assert_eq!(board.outcome(), Some(-1));
    }

    #[test]
    fn threefold_repetition_is_draw() {
        let mut board = GameBoard::new(Chess::default());
        play(&mut board, &["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6"]);
        assert!(!board.is_game_over());
        play(&mut board, &["f3g1", "f6g8"]);
        assert_eq!(board.outcome(), Some(0));
    }

    #[test]
    fn threefold_claim_when_a_move_repeats_the_position() {
        let mut board = GameBoard::new(Chess::default());
        play(&mut board, &["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1"]);
        // 初期局面はまだ2回だが、f6g8 で3回目になる
        assert_eq!(board.outcome(), Some(0));
    }

    #[test]
    fn fifty_move_rule_and_insufficient_material() {
        assert_eq!(board_from("4k3/8/8/8/8/8/8/R3K3 w - - 100 80").outcome(), Some(0));
        assert_eq!(board_from("4k3/8/8/8/8/8/8/R3K3 w - - 98 80").outcome(), None);
        assert_eq!(board_from("4k3/8/8/8/8/8/8/2B1K3 w - - 0 1").outcome(), Some(0));
    }

    #[test]
    fn fifty_move_claim_one_half_move_early() {
        // 塔の手で 100 に到達できる
        assert_eq!(board_from("4k3/8/8/8/8/8/8/R3K3 w - - 99 80").outcome(), Some(0));
        // g1 はナイトが利いていて、合法手はポーンの前進だけ
        assert_eq!(board_from("k7/8/8/8/8/8/4n1PP/7K w - - 99 80").outcome(), None);
    }

    #[test]
    fn quiet_excludes_captures_and_checks() {
        let mut board = GameBoard::new(Chess::default());
        play(&mut board, &["e2e4", "d7d5"]);
        let capture = board.parse_move("e4d5").unwrap();
        let push = board.parse_move("e4e5").unwrap();
        assert!(!board.is_quiet(&capture));
        assert!(board.is_quiet(&push));

        let checked = board_from("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1");
        let evade = checked.parse_move("e1d1").unwrap();
        assert!(!checked.is_quiet(&evade));
    }

    #[test]
    fn parse_move_rejects_illegal() {
        let board = GameBoard::new(Chess::default());
        assert!(board.parse_move("e2e5").is_err());
        assert!(board.parse_move("xyz").is_err());
    }
}
