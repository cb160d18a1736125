//! Queue module: per-item serialized worker queues and completion signals.
//!
//! 各アイテムは専用のキューとワーカーを持ち、投入順にジョブを一つずつ実行します。
//! 異なるアイテムのワーカー同士は互いをブロックしません。

mod completion;
mod item;

pub use self::completion::{Completion, CompletionSet};
pub(crate) use self::item::{Item, panic_message};
