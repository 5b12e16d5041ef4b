//! gensfen をスタブエンジンで実行するスモークテスト
#![cfg(unix)]

use assert_cmd::prelude::*;
use predicates::str::contains;
use sfen_pack::{PackedSfenValue, PlainReader, read_records};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// 決め打ちの手順 (fool's mate) を順に返す UCI エンジン
const STUB_ENGINE: &str = r#"#!/bin/sh
set -- f2f3 e7e5 g2g4 d8h4
while read -r line; do
  case "$line" in
    uci)
      echo "id name stub"
      echo "option name Hash type spin default 16 min 1 max 1024"
      echo "uciok"
      ;;
    isready)
      echo "readyok"
      ;;
    go*)
      echo "info depth 1 score cp 20 pv $1"
      echo "bestmove $1"
      shift
      ;;
    quit)
      exit 0
      ;;
  esac
done
"#;

fn write_stub_engine(dir: &Path) -> PathBuf {
    let path = dir.join("stub_engine.sh");
    fs::write(&path, STUB_ENGINE).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn gensfen(engine: &Path, output: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gensfen").unwrap();
    cmd.arg("-e")
        .arg(engine)
        .arg("-o")
        .arg(output)
        .args(["-n", "2", "-t", "1", "-r", "0", "--depth", "1"])
        .args(["--progress-interval", "1"]);
    cmd
}

#[test]
fn binary_output_from_stub_engine() {
    let td = tempdir().unwrap();
    let engine = write_stub_engine(td.path());
    let output = td.path().join("out.bin");

    gensfen(&engine, &output)
        .assert()
        .success()
        .stdout(contains("Positions: 2"));

    let bytes = fs::read(&output).unwrap();
    assert_eq!(bytes.len(), 2 * PackedSfenValue::SIZE);
    let records: Vec<_> = read_records(bytes.as_slice())
        .unwrap()
        .iter()
        .map(|psv| psv.to_record().unwrap())
        .collect();

    // 白が詰まされたので白番の局面は -1、黒番は +1
    assert_eq!(records[0].ply, 2);
    assert_eq!(records[0].result, -1);
    assert_eq!(records[0].score, 20);
    assert_eq!(
        records[0].best_move.to_uci(shakmaty::CastlingMode::Standard).to_string(),
        "f2f3"
    );
    assert_eq!(records[1].ply, 3);
    assert_eq!(records[1].result, 1);
    assert_eq!(
        records[1].best_move.to_uci(shakmaty::CastlingMode::Standard).to_string(),
        "e7e5"
    );

    assert!(!td.path().join("out_0.bin").exists());
    let manifest = fs::read_to_string(td.path().join("out.manifest.json")).unwrap();
    assert!(manifest.contains("\"positions\": 2"), "{manifest}");
}

#[test]
fn plain_output_from_stub_engine() {
    let td = tempdir().unwrap();
    let engine = write_stub_engine(td.path());
    let output = td.path().join("out.txt");

    gensfen(&engine, &output)
        .args(["--format", "plain", "--no-manifest"])
        .assert()
        .success();

    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().count(), 12);
    assert!(text.starts_with("fen rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1\n"));
    assert!(text.contains("move e7e5\n"));
    let records: Vec<_> = PlainReader::new(text.as_bytes())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(!td.path().join("out.manifest.json").exists());
}

#[test]
fn missing_engine_fails_before_spawn() {
    let td = tempdir().unwrap();
    let output = td.path().join("out.bin");

    gensfen(&td.path().join("no_such_engine"), &output)
        .assert()
        .failure()
        .stderr(contains("engine not found"));
    assert!(!output.exists());
}

#[test]
fn unbounded_search_is_rejected() {
    let td = tempdir().unwrap();
    let engine = write_stub_engine(td.path());
    let output = td.path().join("out.bin");

    Command::cargo_bin("gensfen")
        .unwrap()
        .arg("-e")
        .arg(&engine)
        .arg("-o")
        .arg(&output)
        .args(["--movetime", "0", "-n", "1"])
        .assert()
        .failure()
        .stderr(contains("depth, nodes or movetime"));
}
