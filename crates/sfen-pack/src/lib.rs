//! チェス局面の学習データ形式
//!
//! NNUE 学習器が読む PackedSfenValue 互換のバイナリレコード（40バイト/局面）と、
//! 人間が読めるプレーンテキストレコード（6行/局面）の両方を扱う。
//!
//! # 使用例
//!
//! ```rust,ignore
//! use sfen_pack::{PackedSfenValue, PositionRecord};
//!
//! let psv = PackedSfenValue::from_record(&record)?;
//! writer.write_all(&psv.to_bytes())?;
//!
//! let decoded = PackedSfenValue::from_bytes(&bytes).unwrap().to_record()?;
//! ```
//!
//! # データ形式
//!
//! ## PackedSfenValue (40バイト/レコード)
//!
//! | フィールド  | サイズ | 説明                                    |
//! |-------------|--------|-----------------------------------------|
//! | sfen        | 32     | 局面 (ビットストリーム, 256bit)         |
//! | score       | 2      | 評価値 (i16, 手番側から見た値)          |
//! | move        | 2      | 最善手 Move16形式 (u16)                 |
//! | game_ply    | 2      | 手数 (u16)                              |
//! | game_result | 1      | 勝敗 (i8: 1=勝ち, 0=引分, -1=負け)     |
//! | padding     | 1      | 0xFF                                    |
//!
//! 局面ビットストリームの詳細は [`packed`] を参照。

mod bitstream;
mod error;
pub mod packed;
pub mod plain;
mod record;

pub use error::CodecError;
pub use packed::{
    PackedSfenValue, move_to_move16, move16_to_move, pack_position, read_records, unpack_position,
};
pub use plain::{PlainReader, write_plain};
pub use record::{PositionRecord, RecordFormat, write_record};
