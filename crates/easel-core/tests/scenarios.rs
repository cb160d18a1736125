//! End-to-end scenarios through the public `Runtime` surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use easel_core::domain::{FileHandle, ImageId};
use easel_core::imaging::{self, BlendMode};
use easel_core::{
    Consumer, EaselError, File, Image, ItemStatus, Producer, Runtime, Slot, Task, TaskOutcome,
};
use image::RgbaImage;
use tokio::sync::oneshot;
use tokio::time::timeout;

async fn runtime(name: &str) -> Runtime {
    Runtime::builder().name(name).build().unwrap()
}

/// Read a copy of an image item's payload.
async fn snapshot(runtime: &Runtime, id: ImageId) -> Option<RgbaImage> {
    let (tx, rx) = oneshot::channel();
    runtime
        .schedule(
            id,
            Task::new("snapshot", move |slot: &mut Slot<RgbaImage>| {
                let _ = tx.send(slot.value().cloned());
                Ok(())
            })
            .on_failure(|_| {}),
        )
        .unwrap()
        .detach();
    rx.await.ok().flatten()
}

#[tokio::test]
async fn allocated_gray_image_has_requested_pixels() {
    let rt = runtime("gray").await;
    let id = rt
        .schedule_and_allocate::<Image>(Task::new("gray", |slot| {
            slot.set(imaging::gray(10, 10, 100));
            Ok(())
        }))
        .unwrap();

    assert_eq!(rt.wait(id).await.unwrap(), TaskOutcome::Completed);
    let img = snapshot(&rt, id).await.unwrap();
    assert_eq!(img.dimensions(), (10, 10));
    assert!(img.pixels().all(|p| p.0 == [100, 100, 100, 255]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blue_overlay_blend_creates_third_image() {
    let rt = runtime("overlay").await;
    let background = rt
        .schedule_and_allocate::<Image>(Task::new("gray", |slot| {
            slot.set(imaging::gray(10, 10, 100));
            Ok(())
        }))
        .unwrap();
    let foreground = rt
        .schedule_and_allocate::<Image>(Task::new("blue", |slot| {
            slot.set(imaging::solid(10, 10, [0, 0, 255, 255]));
            Ok(())
        }))
        .unwrap();

    let blended: ImageId = rt
        .derive(
            foreground,
            background,
            Producer::new("read", |slot: &mut Slot<RgbaImage>| Ok(slot.require()?.clone())),
            |slot: &Slot<RgbaImage>, fg: RgbaImage| {
                imaging::blend(slot.require()?, &fg, BlendMode::Overlay)
            },
        )
        .unwrap();
    assert_ne!(blended, background);
    assert_ne!(blended, foreground);

    let img = timeout(Duration::from_secs(5), snapshot(&rt, blended))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(img.get_pixel(0, 0).0, [0, 0, 200, 255]);
    // sources are untouched
    let bg = snapshot(&rt, background).await.unwrap();
    assert_eq!(bg.get_pixel(0, 0).0, [100, 100, 100, 255]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mismatched_blend_fails_only_the_derived_image() {
    let rt = runtime("mismatch").await;
    let background = rt
        .schedule_and_allocate::<Image>(Task::new("gray", |slot| {
            slot.set(imaging::gray(10, 10, 100));
            Ok(())
        }))
        .unwrap();
    let foreground = rt
        .schedule_and_allocate::<Image>(Task::new("small", |slot| {
            slot.set(imaging::solid(4, 4, [0, 0, 255, 255]));
            Ok(())
        }))
        .unwrap();

    let blended: ImageId = rt
        .derive(
            foreground,
            background,
            Producer::new("read", |slot: &mut Slot<RgbaImage>| Ok(slot.require()?.clone())),
            |slot: &Slot<RgbaImage>, fg: RgbaImage| {
                imaging::blend(slot.require()?, &fg, BlendMode::Overlay)
            },
        )
        .unwrap();
    timeout(Duration::from_secs(5), rt.wait(blended))
        .await
        .unwrap()
        .unwrap();

    let images = rt.items::<Image>();
    assert!(matches!(
        images.status(blended).unwrap(),
        ItemStatus::Failed { ref reason } if reason.contains("equal sizes")
    ));
    assert_eq!(images.status(background).unwrap(), ItemStatus::Alive);
    assert_eq!(images.status(foreground).unwrap(), ItemStatus::Alive);
    let bg = snapshot(&rt, background).await.unwrap();
    assert_eq!(bg.get_pixel(0, 0).0, [100, 100, 100, 255]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipe_blue_into_gray_blends_in_place() {
    let rt = runtime("pipe-overlay").await;
    let first = rt.allocate::<Image>();
    let second = rt
        .schedule_and_allocate::<Image>(Task::new("gray", |slot| {
            slot.set(imaging::gray(10, 10, 100));
            Ok(())
        }))
        .unwrap();

    let (set_blue, blend_overlay) = rt
        .pipe(
            first,
            second,
            Producer::new("set_color_blue", |slot: &mut Slot<RgbaImage>| {
                let blue = imaging::solid(10, 10, [0, 0, 255, 255]);
                slot.set(blue.clone());
                Ok(blue)
            }),
            Consumer::new("blend_overlay", |slot: &mut Slot<RgbaImage>, fg: RgbaImage| {
                let out = imaging::blend(slot.require()?, &fg, BlendMode::Overlay)?;
                slot.set(out);
                Ok(())
            }),
        )
        .unwrap()
        .wait()
        .await;
    assert_eq!(set_blue, TaskOutcome::Completed);
    assert_eq!(blend_overlay, TaskOutcome::Completed);

    let img = snapshot(&rt, second).await.unwrap();
    assert_eq!(img.get_pixel(0, 0).0, [0, 0, 200, 255]);
    assert_eq!(img.get_pixel(9, 9).0, [0, 0, 200, 255]);
}

#[tokio::test]
async fn failed_init_then_failure_only_task_resolves() {
    let rt = runtime("failing").await;
    let missing = std::env::temp_dir().join("easel-scenario-does-not-exist/nested/out.bin");
    let id = rt
        .schedule_and_allocate::<File>(Task::new("open", move |slot: &mut Slot<FileHandle>| {
            slot.set(FileHandle::open(&missing)?);
            Ok(())
        }))
        .unwrap();

    let saw_payload = Arc::new(AtomicBool::new(true));
    let probe = {
        let saw_payload = Arc::clone(&saw_payload);
        Task::failure_only("cleanup", move |slot: &mut Slot<FileHandle>| {
            saw_payload.store(slot.is_populated(), Ordering::SeqCst);
        })
    };
    let outcome = timeout(Duration::from_secs(2), rt.schedule(id, probe).unwrap().wait())
        .await
        .expect("failure branch should resolve promptly");

    assert_eq!(outcome, TaskOutcome::Recovered);
    assert!(!saw_payload.load(Ordering::SeqCst), "payload was never assigned");
    assert!(matches!(
        rt.items::<File>().status(id).unwrap(),
        ItemStatus::Failed { ref reason } if reason.starts_with("open:")
    ));
}

#[tokio::test]
async fn collected_ids_reject_new_work() {
    let rt = runtime("collected").await;
    let id = rt.allocate::<Image>();
    assert_eq!(rt.collect(id).unwrap().wait().await, TaskOutcome::Disposed);
    assert_eq!(rt.collect(id).unwrap().wait().await, TaskOutcome::Skipped);

    let err = rt.schedule(id, Task::noop("late")).unwrap_err();
    assert!(matches!(err, EaselError::SchedulerMisuse(_)));
    let report = rt.shutdown().await;
    assert_eq!(report.collections["image"].collected, 1);
}
