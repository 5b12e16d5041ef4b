use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// 出力ファイルに並べて置く実行記録
#[derive(Serialize, Debug, Clone)]
pub struct RunManifest {
    pub generator: String,
    pub version: String,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_secs: f64,
    pub output: String,
    pub format: String,
    pub positions: usize,
    pub bytes: u64,
    pub games: usize,
    /// 終了理由ごとの対局数
    pub terminations: BTreeMap<String, usize>,
    pub settings: ManifestSettings,
}

#[derive(Serialize, Debug, Clone)]
pub struct ManifestSettings {
    pub engine: String,
    pub nthreads: usize,
    pub npositions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movetime_ms: Option<u64>,
    pub random_plies: u32,
    pub eval_limit: i32,
    pub resign_score: i32,
    pub resign_count: u32,
    pub draw_score: i32,
    pub draw_count: u32,
    pub min_draw_ply: u16,
    pub max_ply: u16,
    pub hash_mb: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syzygy_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nnue_file: Option<String>,
    pub use_nnue: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub use_frc: bool,
    pub frc_prob: f64,
    pub start_positions: usize,
    pub batch_size: usize,
}

/// `out.bin` に対して `out.manifest.json`
pub fn manifest_path(output: &Path) -> PathBuf {
    output.with_extension("manifest.json")
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, manifest)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
