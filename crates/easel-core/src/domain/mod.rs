//! Domain model (kinds, IDs, tasks, slots, statuses, payloads, errors).

pub mod errors;
pub mod ids;
pub mod kind;
pub mod payload;
pub mod slot;
pub mod state;
pub mod task;

pub use self::errors::{EaselError, EaselResult};
pub use self::ids::{ContextId, FileId, ImageId, ItemId, QrCodeId, TaskId};
pub use self::kind::{BackgroundTask, Context, File, Image, Kind, QrCode, ResourceKind};
pub use self::payload::{ExecContext, FileHandle, GpuBuffer, QrMatrix, TextStyle};
pub use self::slot::Slot;
pub use self::state::ItemStatus;
pub use self::task::{SharedTask, Task, TaskOutcome};
