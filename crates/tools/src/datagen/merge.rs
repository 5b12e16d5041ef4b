use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

/// ワーカー `index` の出力先: `<stem>_<index><.ext>`（出力と同じディレクトリ）
pub fn shard_path(output: &Path, index: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = output
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    output.with_file_name(format!("{stem}_{index}{ext}"))
}

pub fn shard_paths(output: &Path, count: usize) -> Vec<PathBuf> {
    (0..count).map(|i| shard_path(output, i)).collect()
}

/// シャードを順に連結して `output` に書き出し、シャードを削除する。
///
/// 戻り値は書き出したバイト数。
pub fn merge_shards(output: &Path, shards: &[PathBuf]) -> Result<u64> {
    let out = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(out);
    let mut total = 0u64;
    for shard in shards {
        let mut reader =
            File::open(shard).with_context(|| format!("failed to open {}", shard.display()))?;
        total += io::copy(&mut reader, &mut writer)
            .with_context(|| format!("failed to copy {}", shard.display()))?;
    }
    writer.flush().with_context(|| format!("failed to flush {}", output.display()))?;

    for shard in shards {
        std::fs::remove_file(shard)
            .with_context(|| format!("failed to remove {}", shard.display()))?;
    }
    info!("merged {} shards into {} ({} bytes)", shards.len(), output.display(), total);
    Ok(total)
}
