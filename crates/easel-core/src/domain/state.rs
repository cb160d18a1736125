//! Item status.

use serde::Serialize;

/// ItemStatus はアイテムのライフサイクル状態
///
/// # 状態遷移
/// - Alive -> Failed（run が回復不能なエラーを報告）
/// - Alive -> Collected / Failed -> Collected（明示的な collect、または終了時の sweep）
///
/// Failed のアイテムもスケジュール可能です。以降のタスクは `on_failure` を実行
/// （無ければスキップ）し、完了シグナルは必ず発火します。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Alive,
    Failed { reason: String },
    Collected,
}

impl ItemStatus {
    pub fn is_alive(&self) -> bool {
        matches!(self, ItemStatus::Alive)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemStatus::Failed { .. })
    }

    pub fn is_collected(&self) -> bool {
        matches!(self, ItemStatus::Collected)
    }
}
