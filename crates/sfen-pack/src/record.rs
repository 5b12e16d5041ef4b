use std::io::Write;

use shakmaty::{Chess, Move};

use crate::error::CodecResult;
use crate::packed::PackedSfenValue;
use crate::plain::write_plain;

/// 学習データ1局面分。
///
/// `score` と `result` はどちらも `position` の手番側から見た値。
#[derive(Debug, Clone)]
pub struct PositionRecord {
    pub position: Chess,
    pub best_move: Move,
    /// 評価値 (centipawn)
    pub score: i16,
    /// 開始局面からの手数
    pub ply: u16,
    /// 勝敗 (1=勝ち, 0=引分, -1=負け)
    pub result: i8,
}

/// 出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    /// PackedSfenValue (40バイト固定長)
    #[default]
    Bin,
    /// 6行のテキストブロック
    Plain,
}

impl RecordFormat {
    pub fn label(self) -> &'static str {
        match self {
            RecordFormat::Bin => "bin",
            RecordFormat::Plain => "plain",
        }
    }
}

/// 1レコードを指定形式で書き出す。
pub fn write_record<W: Write>(
    writer: &mut W,
    format: RecordFormat,
    record: &PositionRecord,
) -> CodecResult<()> {
    match format {
        RecordFormat::Bin => {
            let psv = PackedSfenValue::from_record(record)?;
            writer.write_all(&psv.to_bytes())?;
        }
        RecordFormat::Plain => write_plain(writer, record)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::uci::UciMove;

    fn opening_record() -> PositionRecord {
        let position = Chess::default();
        let best_move = "e2e4".parse::<UciMove>().unwrap().to_move(&position).unwrap();
        PositionRecord {
            position,
            best_move,
            score: 25,
            ply: 0,
            result: 1,
        }
    }

    #[test]
    fn write_record_bin_is_fixed_size() {
        let mut out = Vec::new();
        let record = opening_record();
        write_record(&mut out, RecordFormat::Bin, &record).unwrap();
        write_record(&mut out, RecordFormat::Bin, &record).unwrap();
        assert_eq!(out.len(), 2 * PackedSfenValue::SIZE);
        assert_eq!(out[PackedSfenValue::SIZE - 1], 0xFF);
    }

    #[test]
    fn write_record_plain_is_six_lines() {
        let mut out = Vec::new();
        write_record(&mut out, RecordFormat::Plain, &opening_record()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 6);
        assert!(text.ends_with("e\n"));
    }
}
