//! Ports - 抽象化レイヤー
//!
//! コアが外部の協力者から受け取るもの：
//! - ID 生成（IdGenerator）
//! - 種別ごとの回収フック（Disposer）
//!
//! 階層ロガーは `observability::ResourceLog`（tracing の span）で表現します。

pub mod disposer;
pub mod id_generator;

pub use self::disposer::Disposer;
pub use self::id_generator::{IdGenerator, SequentialIds};
