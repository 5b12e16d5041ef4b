//! PackedSfenValue の符号化 / 復号
//!
//! # 局面ブロック (32バイト = 256bit)
//!
//! ビットストリームに下位ビットから以下の順序で格納し、残りは0で埋める:
//! 1. 手番 (1bit): 0=白, 1=黒
//! 2. 白玉位置 (6bit): 0-63 (a1=0, h8=63)
//! 3. 黒玉位置 (6bit)
//! 4. 盤上の駒 (ハフマン符号化): a8→h8, a7→h7, ..., a1→h1 の順。玉のマスはスキップ
//! 5. キャスリング権 (1bit x 4): 白K側, 白Q側, 黒K側, 黒Q側
//! 6. アンパッサン (1bit, 立っていれば +6bit でマス)
//! 7. 50手ルールカウンタ下位6bit
//! 8. 手数 下位8bit, 上位8bit
//! 9. 50手ルールカウンタの7bit目（古いパーサとの互換のため末尾に置く）
//!
//! 最大でも 229bit なので通常の局面は必ず 256bit に収まる。

use std::io::Read;
use std::num::NonZeroU32;

use shakmaty::{
    Bitboard, Board, CastlingMode, CastlingSide, Chess, Color, EnPassantMode, FromSetup, Move,
    Piece, Position, Role, Setup, Square,
};

use crate::bitstream::{BitStream, BitStreamWriter, POSITION_BITS};
use crate::error::{CodecError, CodecResult};
use crate::record::PositionRecord;

/// PackedSfenValue (40バイト)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedSfenValue {
    /// 局面 (32バイト)
    pub sfen: [u8; 32],
    /// 評価値
    pub score: i16,
    /// 最善手 (Move16形式)
    pub move16: u16,
    /// 手数
    pub game_ply: u16,
    /// 勝敗 (1=勝ち, 0=引分, -1=負け)
    pub game_result: i8,
    /// パディング
    pub padding: u8,
}

impl PackedSfenValue {
    /// サイズ (バイト)
    pub const SIZE: usize = 40;
    /// 書き出し時のパディング値
    pub const PADDING: u8 = 0xFF;

    /// バイト列からPackedSfenValueを読み込む
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }

        let mut sfen = [0u8; 32];
        sfen.copy_from_slice(&bytes[0..32]);

        Some(Self {
            sfen,
            score: i16::from_le_bytes([bytes[32], bytes[33]]),
            move16: u16::from_le_bytes([bytes[34], bytes[35]]),
            game_ply: u16::from_le_bytes([bytes[36], bytes[37]]),
            game_result: bytes[38] as i8,
            padding: bytes[39],
        })
    }

    /// PackedSfenValueをバイト列にシリアライズ
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..32].copy_from_slice(&self.sfen);
        bytes[32..34].copy_from_slice(&self.score.to_le_bytes());
        bytes[34..36].copy_from_slice(&self.move16.to_le_bytes());
        bytes[36..38].copy_from_slice(&self.game_ply.to_le_bytes());
        bytes[38] = self.game_result as u8;
        bytes[39] = self.padding;
        bytes
    }

    pub fn from_record(record: &PositionRecord) -> CodecResult<Self> {
        Ok(Self {
            sfen: pack_position(&record.position)?,
            score: record.score,
            move16: move_to_move16(&record.best_move),
            game_ply: record.ply,
            game_result: record.result,
            padding: Self::PADDING,
        })
    }

    /// 局面と指し手を復元する。指し手は復元した局面の合法手と突き合わせる。
    pub fn to_record(&self) -> CodecResult<PositionRecord> {
        let position = unpack_position(&self.sfen)?;
        let best_move = move16_to_move(&position, self.move16)?;
        Ok(PositionRecord {
            position,
            best_move,
            score: self.score,
            ply: self.game_ply,
            result: self.game_result,
        })
    }
}

/// ハフマン符号化テーブル（盤上の駒, 4bit）
///
/// | 駒種 | コード |
/// |------|--------|
/// | 空   | 0 (1bit) |
/// | P    | 0001   |
/// | N    | 0011   |
/// | B    | 0101   |
/// | R    | 0111   |
/// | Q    | 1001   |
///
/// 駒のコードは必ず最下位bitが1なので、先頭1bitで空きマスと区別できる。
const HUFFMAN_TABLE: [(Role, u32); 5] = [
    (Role::Pawn, 0b0001),
    (Role::Knight, 0b0011),
    (Role::Bishop, 0b0101),
    (Role::Rook, 0b0111),
    (Role::Queen, 0b1001),
];

const HUFFMAN_BITS: usize = 4;

/// キャスリング権の格納順と、Standard ルールでの対応する塔の初期位置
const CASTLING_ORDER: [(Color, CastlingSide, Square); 4] = [
    (Color::White, CastlingSide::KingSide, Square::H1),
    (Color::White, CastlingSide::QueenSide, Square::A1),
    (Color::Black, CastlingSide::KingSide, Square::H8),
    (Color::Black, CastlingSide::QueenSide, Square::A8),
];

const MOVE16_PROMOTION: u16 = 1 << 14;
const MOVE16_EN_PASSANT: u16 = 2 << 14;
const MOVE16_CASTLING: u16 = 3 << 14;

fn huffman_code(role: Role) -> Option<u32> {
    HUFFMAN_TABLE.iter().find(|(r, _)| *r == role).map(|(_, code)| *code)
}

/// 盤面のマスを格納順（8段目から1段目、各段 a→h）に列挙する
fn squares_in_pack_order() -> impl Iterator<Item = Square> {
    (0..8u32).rev().flat_map(|rank| (0..8u32).map(move |file| Square::new(rank * 8 + file)))
}

/// 局面を32バイトのビットストリームに符号化する
pub fn pack_position(pos: &Chess) -> CodecResult<[u8; 32]> {
    let board = pos.board();
    let mut stream = BitStreamWriter::new();

    // 1. 手番
    stream.write_one_bit(pos.turn() == Color::Black);

    // 2-3. 玉位置
    for color in [Color::White, Color::Black] {
        let king = board.king_of(color).ok_or(CodecError::KingNotFound(color))?;
        stream.write_n_bit(king as u32, 6);
    }

    // 4. 盤上の駒（玉はスキップ）
    for sq in squares_in_pack_order() {
        match board.piece_at(sq) {
            None => stream.write_one_bit(false),
            Some(piece) => {
                // 玉は huffman_code が None
                let Some(code) = huffman_code(piece.role) else {
                    continue;
                };
                stream.write_n_bit(code, HUFFMAN_BITS);
                stream.write_one_bit(piece.color == Color::Black);
            }
        }
    }

    // 5. キャスリング権
    let castles = pos.castles();
    for (color, side, _) in CASTLING_ORDER {
        stream.write_one_bit(castles.has(color, side));
    }

    // 6. アンパッサン
    match pos.ep_square(EnPassantMode::Legal) {
        Some(sq) => {
            stream.write_one_bit(true);
            stream.write_n_bit(sq as u32, 6);
        }
        None => stream.write_one_bit(false),
    }

    // 7-9. 50手カウンタと手数
    let halfmoves = pos.halfmoves();
    let fullmoves = pos.fullmoves().get();
    stream.write_n_bit(halfmoves & 0x3F, 6);
    stream.write_n_bit(fullmoves & 0xFF, 8);
    stream.write_n_bit((fullmoves >> 8) & 0xFF, 8);
    stream.write_one_bit((halfmoves >> 6) & 1 != 0);

    if stream.bit_position() > POSITION_BITS {
        return Err(CodecError::BitOverflow(stream.bit_position()));
    }
    Ok(stream.finish())
}

/// ハフマン符号から駒種を復号する。`Ok(None)` は空きマス。
fn decode_huffman_piece(stream: &mut BitStream) -> CodecResult<Option<Role>> {
    if stream.read_one_bit() == 0 {
        return Ok(None);
    }
    let code = 1 | (stream.read_n_bit(HUFFMAN_BITS - 1) << 1);
    HUFFMAN_TABLE
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(role, _)| Some(*role))
        .ok_or_else(|| CodecError::InvalidPosition(format!("invalid piece code {code:#06b}")))
}

/// 32バイトのビットストリームから局面を復元する
pub fn unpack_position(packed: &[u8; 32]) -> CodecResult<Chess> {
    let mut stream = BitStream::new(packed);

    let turn = if stream.read_one_bit() == 0 {
        Color::White
    } else {
        Color::Black
    };

    let mut board = Board::empty();
    let white_king = Square::new(stream.read_n_bit(6));
    let black_king = Square::new(stream.read_n_bit(6));
    if white_king == black_king {
        return Err(CodecError::InvalidPosition(format!(
            "both kings on {white_king}"
        )));
    }
    board.set_piece_at(white_king, Piece { color: Color::White, role: Role::King });
    board.set_piece_at(black_king, Piece { color: Color::Black, role: Role::King });

    for sq in squares_in_pack_order() {
        if sq == white_king || sq == black_king {
            continue;
        }
        if let Some(role) = decode_huffman_piece(&mut stream)? {
            let color = if stream.read_one_bit() == 0 {
                Color::White
            } else {
                Color::Black
            };
            board.set_piece_at(sq, Piece { color, role });
        }
        if stream.cursor() > POSITION_BITS {
            return Err(CodecError::BitOverflow(stream.cursor()));
        }
    }

    let mut castling_rights = Bitboard::EMPTY;
    for (_, _, rook) in CASTLING_ORDER {
        if stream.read_one_bit() != 0 {
            castling_rights.add(rook);
        }
    }

    let ep_square = if stream.read_one_bit() != 0 {
        Some(Square::new(stream.read_n_bit(6)))
    } else {
        None
    };

    let mut halfmoves = stream.read_n_bit(6);
    let mut fullmoves = stream.read_n_bit(8);
    fullmoves |= stream.read_n_bit(8) << 8;
    halfmoves |= stream.read_n_bit(1) << 6;

    if stream.cursor() > POSITION_BITS {
        return Err(CodecError::BitOverflow(stream.cursor()));
    }

    let mut setup = Setup::empty();
    setup.board = board;
    setup.turn = turn;
    setup.castling_rights = castling_rights;
    setup.ep_square = ep_square;
    setup.halfmoves = halfmoves;
    setup.fullmoves = NonZeroU32::new(fullmoves).unwrap_or(NonZeroU32::MIN);

    Chess::from_setup(setup, CastlingMode::Standard)
        .map_err(|e| CodecError::InvalidPosition(e.to_string()))
}

/// Move を Move16形式に変換
///
/// ## Move16形式
/// - bits 0-5:   移動先マス (to)
/// - bits 6-11:  移動元マス (from)
/// - bits 12-13: 成る駒種 - 2 (N=0, B=1, R=2, Q=3)。成りフラグがある時のみ有効
/// - bits 14-15: 0=通常, 1=成り, 2=アンパッサン, 3=キャスリング
///
/// キャスリングの移動先は玉の着地点ではなく塔の初期位置 (0/7/56/63)。
///
/// ## 例
/// ```text
/// // e2e4: from=12, to=28
/// // move16 = 28 | (12 << 6) = 0x031C
///
/// // 白の O-O: from=e1(4), to=h1(7)
/// // move16 = 7 | (4 << 6) | (3 << 14) = 0xC107
/// ```
pub fn move_to_move16(mv: &Move) -> u16 {
    match *mv {
        Move::Normal {
            from,
            to,
            promotion,
            ..
        } => {
            let base = to as u16 | ((from as u16) << 6);
            match promotion {
                Some(role) => base | ((role as u16 - Role::Knight as u16) << 12) | MOVE16_PROMOTION,
                None => base,
            }
        }
        Move::EnPassant { from, to } => to as u16 | ((from as u16) << 6) | MOVE16_EN_PASSANT,
        Move::Castle { king, rook } => rook as u16 | ((king as u16) << 6) | MOVE16_CASTLING,
        // チェスの局面には現れない
        Move::Put { .. } => 0,
    }
}

/// Move16形式を局面の合法手に戻す
pub fn move16_to_move(pos: &Chess, move16: u16) -> CodecResult<Move> {
    pos.legal_moves()
        .into_iter()
        .find(|mv| move_to_move16(mv) == move16)
        .ok_or(CodecError::IllegalMove(move16))
}

/// 固定長レコードの列をすべて読み込む。端数バイトが残ればエラー。
pub fn read_records<R: Read>(mut reader: R) -> CodecResult<Vec<PackedSfenValue>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let chunks = bytes.chunks_exact(PackedSfenValue::SIZE);
    let rest = chunks.remainder().len();
    if rest != 0 {
        return Err(CodecError::Truncated {
            expected: PackedSfenValue::SIZE,
            actual: rest,
        });
    }
    Ok(chunks.filter_map(PackedSfenValue::from_bytes).collect())
}
