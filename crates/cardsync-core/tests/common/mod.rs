//! Shared fixtures for integration tests.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cardsync_core::CardSync;
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestEnv {
    pub temp: TempDir,
    pub data_dir: PathBuf,
    pub root: PathBuf,
}

/// A temp dir with an empty library root and a data dir path.
pub fn create_test_env() -> TestEnv {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let root = temp.path().join("cards");
    std::fs::create_dir_all(&root).unwrap();
    // Events report canonical paths.
    let root = std::fs::canonicalize(&root).unwrap();
    TestEnv {
        data_dir: temp.path().join("data"),
        root,
        temp,
    }
}

pub async fn open(env: &TestEnv) -> CardSync {
    CardSync::builder(&env.data_dir)
        .auto_create_dirs(true)
        .build()
        .await
        .expect("Failed to build CardSync")
}

/// A v2 card payload.
pub fn v2(name: &str, description: &str) -> Value {
    json!({
        "spec": "chara_card_v2",
        "spec_version": "2.0",
        "data": {
            "name": name,
            "description": description,
            "creator": "tester",
            "tags": ["fantasy", "test"]
        }
    })
}

/// A decodable 32x32 PNG carrying `payload` as a `chara` text chunk.
pub fn card_png(payload: &Value) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(32, 32, image::Rgba([90, 120, 200, 255]));
    let mut encoded = Cursor::new(Vec::new());
    image
        .write_to(&mut encoded, image::ImageFormat::Png)
        .unwrap();
    let png = encoded.into_inner();

    let mut text = b"chara\0".to_vec();
    text.extend_from_slice(STANDARD.encode(payload.to_string()).as_bytes());

    let iend = png.len() - 12;
    let mut out = png[..iend].to_vec();
    push_chunk(&mut out, b"tEXt", &text);
    out.extend_from_slice(&png[iend..]);
    out
}

fn push_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    let mut crc = flate2::Crc::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

pub fn write_card(dir: &Path, file: &str, payload: &Value) -> PathBuf {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, card_png(payload)).unwrap();
    path
}
