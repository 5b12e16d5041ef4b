//! UCI チェスエンジンの自己対局から NNUE 学習データを生成するツール群

pub mod datagen;
pub mod selfplay;
