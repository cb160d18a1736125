//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **DropDisposer**: 既定の回収フック
//! - **FileDisposer**: file 種別の回収フック（ハンドルを閉じる）
//!
//! ID 生成器（SequentialIds）は ports::id_generator にあります。

pub mod disposers;

pub use self::disposers::{DropDisposer, FileDisposer};
