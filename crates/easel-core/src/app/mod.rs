//! App - アプリケーション層
//!
//! domain / ports / queue を組み合わせてスケジューラの表面を作ります。
//!
//! # 主要コンポーネント
//! - **Collection**: 同種アイテムの集合（allocate / schedule / collect）
//! - **Pipeline**: アイテム間の値の受け渡し（pipe / derive）
//! - **Barrier**: 投入済みタスクの完了待ち（wait / wait_all / wait_extensive）
//! - **Crate**: ワーカーを持たない ID→値 ストア
//! - **Runtime / RuntimeBuilder**: 実行コンテキストとその構築

pub mod barrier;
pub mod builder;
pub mod collection;
pub mod crate_store;
pub mod pipeline;
pub mod runtime;

// 主要な型を再エクスポート
pub use self::barrier::DynCollection;
pub use self::builder::{BuildError, Disposers, RuntimeBuilder};
pub use self::collection::Collection;
pub use self::crate_store::{Crate, CrateId};
pub use self::pipeline::{
    Consumer, Handoff, HandoffReceiver, PipeHandle, Producer, UpstreamPolicy, handoff,
};
pub use self::runtime::{Resident, Runtime};
