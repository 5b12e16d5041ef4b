//! 256bit 局面ブロック用のビットストリーム（下位ビットから詰める）

/// 局面ブロックのビット数
pub(crate) const POSITION_BITS: usize = 256;

/// ビットストリーム読み込み用構造体
pub(crate) struct BitStream<'a> {
    data: &'a [u8],
    bit_cursor: usize,
}

impl<'a> BitStream<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_cursor: 0,
        }
    }

    /// 1ビット読み込む
    ///
    /// 終端を超えた読み込みは 0 を返す。呼び出し側は `cursor()` で
    /// 256bit を超えていないかを確認する。
    pub(crate) fn read_one_bit(&mut self) -> u8 {
        let byte_idx = self.bit_cursor / 8;
        let bit_idx = self.bit_cursor & 7;
        self.bit_cursor += 1;
        if byte_idx >= self.data.len() {
            return 0;
        }
        (self.data[byte_idx] >> bit_idx) & 1
    }

    /// nビット読み込む (下位ビットから順に格納, n <= 32)
    pub(crate) fn read_n_bit(&mut self, n: usize) -> u32 {
        let mut result = 0u32;
        for i in 0..n.min(32) {
            result |= (self.read_one_bit() as u32) << i;
        }
        result
    }

    /// 現在のカーソル位置
    pub(crate) fn cursor(&self) -> usize {
        self.bit_cursor
    }
}

/// ビットストリーム書き込み用構造体
///
/// 256bit を超えた書き込みは捨てるが、カーソルは進めるので
/// `bit_position()` で溢れを検出できる。
pub(crate) struct BitStreamWriter {
    data: [u8; 32],
    bit_cursor: usize,
}

impl BitStreamWriter {
    pub(crate) fn new() -> Self {
        Self {
            data: [0u8; 32],
            bit_cursor: 0,
        }
    }

    /// 1ビット書き込む
    pub(crate) fn write_one_bit(&mut self, b: bool) {
        if self.bit_cursor < POSITION_BITS && b {
            self.data[self.bit_cursor / 8] |= 1 << (self.bit_cursor & 7);
        }
        self.bit_cursor += 1;
    }

    /// nビット書き込む（下位ビットから順に）。32bit を超える分は 0 を書く。
    pub(crate) fn write_n_bit(&mut self, d: u32, n: usize) {
        for i in 0..n {
            self.write_one_bit(i < 32 && (d >> i) & 1 != 0);
        }
    }

    pub(crate) fn bit_position(&self) -> usize {
        self.bit_cursor
    }

    pub(crate) fn finish(self) -> [u8; 32] {
        self.data
    }
}
