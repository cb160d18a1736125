//! Resource kinds.
//!
//! スケジューラが扱うリソース種別は固定の小さな集合です（task, image, file, context, qr）。
//! 各種別はマーカー型（uninhabited enum）と `Kind` trait で表現し、
//! ペイロードの型を関連型 `Payload` で静的に決めます（`Any` + 実行時キャストは使わない）。

use std::fmt;
use std::str::FromStr;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::errors::EaselError;
use super::payload::{ExecContext, FileHandle, QrMatrix};

/// Closed set of resource kinds, used where the kind is passed by value
/// (script-facing dispatch, barriers, reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Task,
    Image,
    File,
    Context,
    #[serde(rename = "qr")]
    QrCode,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Task,
        ResourceKind::Image,
        ResourceKind::File,
        ResourceKind::Context,
        ResourceKind::QrCode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Task => "task",
            ResourceKind::Image => "image",
            ResourceKind::File => "file",
            ResourceKind::Context => "context",
            ResourceKind::QrCode => "qr",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = EaselError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EaselError::misuse(format!("unknown resource kind '{s}'")))
    }
}

/// Kind は種別マーカーとペイロード型を対応付ける
///
/// # 使用例
/// ```ignore
/// enum Image {}
///
/// impl Kind for Image {
///     type Payload = RgbaImage;
///     const KIND: ResourceKind = ResourceKind::Image;
/// }
/// ```
pub trait Kind: Sized + Send + Sync + 'static {
    /// Value held in an item's slot. Moved between the worker and the blocking
    /// pool for every task, hence `Send`.
    type Payload: Send + 'static;

    const KIND: ResourceKind;
}

// ========================================
// マーカー型の定義
// ========================================

/// Background task results.
#[derive(Debug)]
pub enum BackgroundTask {}

impl Kind for BackgroundTask {
    type Payload = serde_json::Value;
    const KIND: ResourceKind = ResourceKind::Task;
}

/// In-flight images.
#[derive(Debug)]
pub enum Image {}

impl Kind for Image {
    type Payload = RgbaImage;
    const KIND: ResourceKind = ResourceKind::Image;
}

/// Open files.
#[derive(Debug)]
pub enum File {}

impl Kind for File {
    type Payload = FileHandle;
    const KIND: ResourceKind = ResourceKind::File;
}

/// Execution contexts.
#[derive(Debug)]
pub enum Context {}

impl Kind for Context {
    type Payload = ExecContext;
    const KIND: ResourceKind = ResourceKind::Context;
}

/// QR codes.
#[derive(Debug)]
pub enum QrCode {}

impl Kind for QrCode {
    type Payload = QrMatrix;
    const KIND: ResourceKind = ResourceKind::QrCode;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("task", ResourceKind::Task)]
    #[case("image", ResourceKind::Image)]
    #[case("file", ResourceKind::File)]
    #[case("context", ResourceKind::Context)]
    #[case("qr", ResourceKind::QrCode)]
    fn parses_script_names(#[case] name: &str, #[case] expected: ResourceKind) {
        let kind: ResourceKind = name.parse().unwrap();
        assert_eq!(kind, expected);
        assert_eq!(kind.to_string(), name);
    }

    #[test]
    fn unknown_kind_is_scheduler_misuse() {
        let err = "sprite".parse::<ResourceKind>().unwrap_err();
        assert!(matches!(err, EaselError::SchedulerMisuse(_)));
        assert!(err.to_string().contains("sprite"));
    }

    #[test]
    fn serde_names_match_display() {
        let json = serde_json::to_string(&ResourceKind::QrCode).unwrap();
        assert_eq!(json, "\"qr\"");
        let back: ResourceKind = serde_json::from_str("\"context\"").unwrap();
        assert_eq!(back, ResourceKind::Context);
    }
}
