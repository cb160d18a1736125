//! easel-core
//!
//! Resource-collection scheduler for a scriptable image tool.
//!
//! スクリプト層からは二つの操作だけが見えます：
//! 「リソース X への排他アクセスでこの関数を実行する」と
//! 「新しいリソースを確保して ID を返す」。
//! 同じリソースへの作業は投入順に直列化され、異なるリソースの作業は並行に進みます。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, kind, task, slot, state, payload, errors）
//! - **ports**: 抽象化レイヤー（IdGenerator, Disposer）
//! - **queue**: アイテムごとの直列キューと完了シグナル
//! - **app**: Collection, Pipeline, Barrier, Crate, Runtime
//! - **impls**: ports の実装（DropDisposer, FileDisposer）
//! - **config**: RuntimeConfig（TOML / 環境変数）
//! - **observability**: 階層ログ（tracing span）と集計ビュー
//! - **imaging**: 参照用の画像処理ルーチン（solid, gray, blend）

pub mod app;
pub mod config;
pub mod domain;
pub mod imaging;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{
    BuildError, Collection, Consumer, Crate, CrateId, DynCollection, PipeHandle, Producer,
    Resident, Runtime, RuntimeBuilder, UpstreamPolicy,
};
pub use config::{LogFormat, RuntimeConfig};
pub use domain::{
    BackgroundTask, Context, EaselError, EaselResult, File, Image, ItemId, ItemStatus, Kind,
    QrCode, ResourceKind, SharedTask, Slot, Task, TaskOutcome,
};
pub use observability::{CollectionCounts, ResourceLog, RuntimeReport};
pub use queue::{Completion, CompletionSet};
