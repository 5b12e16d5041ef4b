//! プレーンテキスト形式
//!
//! 1局面を6行で表す。`e` 行がレコードの終端なので、ファイルを連結しても
//! 境界が曖昧にならない。
//!
//! ```text
//! fen rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1
//! move e7e5
//! score -12
//! ply 1
//! result 0
//! e
//! ```

use std::io::{self, BufRead, Write};

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode};

use crate::error::{CodecError, CodecResult};
use crate::record::PositionRecord;

/// レコード終端行
const TERMINATOR: &str = "e";

/// 1レコードを6行で書き出す
pub fn write_plain<W: Write>(writer: &mut W, record: &PositionRecord) -> io::Result<()> {
    let fen = Fen::from_position(record.position.clone(), EnPassantMode::Legal);
    writeln!(writer, "fen {fen}")?;
    writeln!(writer, "move {}", record.best_move.to_uci(CastlingMode::Standard))?;
    writeln!(writer, "score {}", record.score)?;
    writeln!(writer, "ply {}", record.ply)?;
    writeln!(writer, "result {}", record.result)?;
    writeln!(writer, "{TERMINATOR}")
}

/// プレーンテキストのレコード列を読むイテレータ。
///
/// 空行はレコード間でのみ読み飛ばす。エラーには行番号（1始まり）が付く。
pub struct PlainReader<R> {
    lines: io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> PlainReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }

    fn next_line(&mut self) -> CodecResult<Option<String>> {
        match self.lines.next() {
            Some(line) => {
                self.line_no += 1;
                Ok(Some(line?))
            }
            None => Ok(None),
        }
    }

    fn error(&self, message: impl Into<String>) -> CodecError {
        CodecError::Plain {
            line: self.line_no,
            message: message.into(),
        }
    }

    /// `key value` 形式の行を読み、value を返す
    fn expect_field(&mut self, key: &str) -> CodecResult<String> {
        let Some(line) = self.next_line()? else {
            return Err(self.error(format!("unexpected end of input, expected '{key}'")));
        };
        match line.trim_end().split_once(' ') {
            Some((k, v)) if k == key => Ok(v.trim().to_string()),
            _ => Err(self.error(format!("expected '{key}', got '{line}'"))),
        }
    }

    fn parse_number<T: std::str::FromStr>(&self, key: &str, value: &str) -> CodecResult<T> {
        value
            .parse::<T>()
            .map_err(|_| self.error(format!("invalid {key} value '{value}'")))
    }

    fn read_record(&mut self, fen_line: String) -> CodecResult<PositionRecord> {
        let fen_str = match fen_line.trim_end().split_once(' ') {
            Some(("fen", v)) => v.trim().to_string(),
            _ => return Err(self.error(format!("expected 'fen', got '{fen_line}'"))),
        };
        let position: Chess = fen_str
            .parse::<Fen>()
            .map_err(|e| self.error(format!("invalid fen: {e}")))?
            .into_position(CastlingMode::Standard)
            .map_err(|e| self.error(format!("invalid position: {e}")))?;

        let move_str = self.expect_field("move")?;
        let best_move = move_str
            .parse::<UciMove>()
            .map_err(|e| self.error(format!("invalid move '{move_str}': {e}")))?
            .to_move(&position)
            .map_err(|e| self.error(format!("illegal move '{move_str}': {e}")))?;

        let score = self.expect_field("score")?;
        let score = self.parse_number::<i16>("score", &score)?;
        let ply = self.expect_field("ply")?;
        let ply = self.parse_number::<u16>("ply", &ply)?;
        let result = self.expect_field("result")?;
        let result = self.parse_number::<i8>("result", &result)?;

        match self.next_line()? {
            Some(line) if line.trim() == TERMINATOR => {}
            Some(line) => {
                return Err(self.error(format!("expected '{TERMINATOR}', got '{line}'")));
            }
            None => return Err(self.error("unexpected end of input, expected 'e'")),
        }

        Ok(PositionRecord {
            position,
            best_move,
            score,
            ply,
            result,
        })
    }
}

impl<R: BufRead> Iterator for PlainReader<R> {
    type Item = CodecResult<PositionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_line() {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some(self.read_record(line)),
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
