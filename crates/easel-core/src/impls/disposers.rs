//! Disposer implementations.
//!
//! - **DropDisposer**: ペイロードを手放すだけ（既定）
//! - **FileDisposer**: OS のファイルハンドルを閉じてから手放す

use crate::domain::{EaselResult, FileHandle, Slot};
use crate::ports::Disposer;

/// Releases the payload by dropping it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropDisposer;

impl<P> Disposer<P> for DropDisposer {
    fn dispose(&self, slot: &mut Slot<P>) -> EaselResult<()> {
        drop(slot.take());
        Ok(())
    }
}

/// Flushes and closes the underlying file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDisposer;

impl Disposer<FileHandle> for FileDisposer {
    fn dispose(&self, slot: &mut Slot<FileHandle>) -> EaselResult<()> {
        // an item whose init failed never opened anything
        let Some(mut handle) = slot.take() else {
            return Ok(());
        };
        handle.close()?;
        slot.log()
            .debug(format_args!("closed {}", handle.path().display()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::ResourceLog;

    #[test]
    fn file_disposer_closes_and_empties_slot() {
        let path = std::env::temp_dir().join(format!("easel-dispose-{}.bin", std::process::id()));
        let mut slot = Slot::new("file-1".into(), ResourceLog::root("test"));
        slot.set(FileHandle::create(&path).unwrap());

        FileDisposer.dispose(&mut slot).unwrap();
        assert!(!slot.is_populated());
        // again on the now-empty slot
        FileDisposer.dispose(&mut slot).unwrap();
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn drop_disposer_accepts_unpopulated_slot() {
        let mut slot: Slot<u32> = Slot::new("task-1".into(), ResourceLog::root("test"));
        DropDisposer.dispose(&mut slot).unwrap();
        slot.set(5);
        DropDisposer.dispose(&mut slot).unwrap();
        assert_eq!(slot.value(), None);
    }
}
