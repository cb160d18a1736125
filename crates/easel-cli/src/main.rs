//! easel: スクリプト層の代わりにコアを駆動する薄いドライバ
//!
//! - `blend`: 2 枚の画像をデコードして合成し、PNG としてファイルに書き出す
//! - `demo`: allocate / broadcast / pipe / crate / barrier を一通り使う合成ワークロード
//! - `kinds`: リソース種別の一覧

mod logging;

use std::io::{BufWriter, Write as _};
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use easel_core::domain::{FileHandle, GpuBuffer, ImageId, QrMatrix, TextStyle};
use easel_core::imaging::{self, BlendMode};
use easel_core::{
    BackgroundTask, Consumer, File, Image, ItemStatus, Producer, QrCode, ResourceKind, Runtime,
    RuntimeConfig, RuntimeReport, SharedTask, Slot, Task, TaskOutcome,
};
use image::{ImageFormat, RgbaImage};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Parser, Debug)]
#[command(name = "easel", version)]
struct Cli {
    /// TOML runtime configuration. Without it, `EASEL_*` environment variables apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Blend a foreground image onto a background and write a PNG.
    Blend(BlendArgs),
    /// Run a synthetic workload and print the report.
    Demo(DemoArgs),
    /// List resource kinds.
    Kinds,
}

#[derive(Parser, Debug)]
struct BlendArgs {
    #[arg(long)]
    background: PathBuf,

    #[arg(long)]
    foreground: PathBuf,

    /// normal, multiply, screen or overlay.
    #[arg(long, default_value = "normal")]
    mode: BlendMode,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct DemoArgs {
    /// Number of images.
    #[arg(long, default_value_t = 8)]
    count: u32,

    /// Edge length of each image.
    #[arg(long, default_value_t = 64)]
    size: u32,
}

#[derive(Debug, Serialize)]
struct DemoSummary {
    luma: Value,
    report: RuntimeReport,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::from_env()?,
    };
    logging::init(&config)?;

    match cli.cmd {
        Command::Blend(args) => {
            let report = cmd_blend(config, args).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Demo(args) => {
            let summary = cmd_demo(config, args).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Kinds => {
            for kind in ResourceKind::ALL {
                println!("{kind}");
            }
        }
    }
    Ok(())
}

fn decode(path: PathBuf) -> Task<RgbaImage> {
    Task::new("image.decode", move |slot: &mut Slot<RgbaImage>| {
        let decoded = image::open(&path)?.to_rgba8();
        slot.log().debug(format_args!(
            "decoded {} ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height()
        ));
        slot.set(decoded);
        Ok(())
    })
}

fn read_image() -> Producer<RgbaImage, RgbaImage> {
    Producer::new("image.read", |slot: &mut Slot<RgbaImage>| Ok(slot.require()?.clone()))
}

async fn cmd_blend(config: RuntimeConfig, args: BlendArgs) -> anyhow::Result<RuntimeReport> {
    let runtime = Runtime::builder()
        .config(config)
        .name("blend")
        .build()
        .context("build runtime")?;

    let background = runtime.schedule_and_allocate::<Image>(decode(args.background.clone()))?;
    let foreground = runtime.schedule_and_allocate::<Image>(decode(args.foreground.clone()))?;

    let mode = args.mode;
    let blended: ImageId = runtime.derive(
        foreground,
        background,
        read_image(),
        move |slot: &Slot<RgbaImage>, fg: RgbaImage| imaging::blend(slot.require()?, &fg, mode),
    )?;

    let out_path = args.out.clone();
    let out = runtime.schedule_and_allocate::<File>(Task::new(
        "file.create",
        move |slot: &mut Slot<FileHandle>| {
            slot.set(FileHandle::create(&out_path)?);
            Ok(())
        },
    ))?;

    let (_, written) = runtime
        .pipe(
            blended,
            out,
            read_image(),
            Consumer::new("file.write_png", |slot: &mut Slot<FileHandle>, img: RgbaImage| {
                let file = slot.require_mut()?.file_mut()?;
                let mut writer = BufWriter::new(file);
                img.write_to(&mut writer, ImageFormat::Png)?;
                writer.flush()?;
                Ok(())
            }),
        )?
        .wait()
        .await;

    // the first failed item names the root cause
    let images = runtime.items::<Image>();
    for id in [background, foreground, blended] {
        if let ItemStatus::Failed { reason } = images.status(id)? {
            anyhow::bail!("{id} failed: {reason}");
        }
    }
    if let TaskOutcome::Failed { reason } = written {
        anyhow::bail!("writing {} failed: {reason}", args.out.display());
    }

    let closed = runtime.collect(out)?.wait().await;
    if let TaskOutcome::Failed { reason } = closed {
        anyhow::bail!("closing {} failed: {reason}", args.out.display());
    }
    tracing::info!(mode = %args.mode, out = %args.out.display(), "blend written");

    Ok(runtime.shutdown().await)
}

async fn cmd_demo(config: RuntimeConfig, args: DemoArgs) -> anyhow::Result<DemoSummary> {
    anyhow::ensure!(args.size > 0, "--size must be positive");
    let mut runtime = Runtime::builder()
        .config(config)
        .name("demo")
        .build()
        .context("build runtime")?;

    // background task item collecting per-image luma
    let stats = runtime.schedule_and_allocate::<BackgroundTask>(Task::new(
        "stats.init",
        |slot: &mut Slot<Value>| {
            slot.set(json!([]));
            Ok(())
        },
    ))?;

    let size = args.size;
    let mut images = Vec::with_capacity(args.count as usize);
    for i in 0..args.count {
        let level = ((u64::from(i) * 255) / u64::from(args.count.max(1))) as u8;
        let id = runtime.schedule_and_allocate::<Image>(Task::new(
            "image.gray",
            move |slot: &mut Slot<RgbaImage>| {
                slot.set(imaging::gray(size, size, level));
                Ok(())
            },
        ))?;
        images.push(id);
    }

    // broadcast: invert every image
    runtime
        .schedule_all::<Image>(&SharedTask::new("image.invert", |slot: &mut Slot<RgbaImage>| {
            image::imageops::invert(slot.require_mut()?);
            Ok(())
        }))
        .detach();

    for &id in &images {
        let handle = runtime.pipe(
            id,
            stats,
            Producer::new("image.luma", |slot: &mut Slot<RgbaImage>| {
                let img = slot.require()?;
                let sum: u64 = img.pixels().map(|p| u64::from(p[0])).sum();
                Ok(sum / u64::from(img.width() * img.height()).max(1))
            }),
            Consumer::new("stats.push", move |slot: &mut Slot<Value>, luma: u64| {
                if let Some(list) = slot.require_mut()?.as_array_mut() {
                    list.push(json!({ "image": id.to_string(), "luma": luma }));
                }
                Ok(())
            }),
        )?;
        handle.detach();
    }

    let qr = runtime.schedule_and_allocate::<QrCode>(Task::new(
        "qr.encode",
        move |slot: &mut Slot<QrMatrix>| {
            let mut matrix = QrMatrix::new(21);
            for i in 0..matrix.size() {
                matrix.set(i, i, true)?;
            }
            slot.set(matrix);
            Ok(())
        },
    ))?;

    runtime.styles_mut().add(TextStyle {
        bold: true,
        ..Default::default()
    });
    let bytes = (size as usize) * (size as usize) * 4;
    runtime
        .gpu_buffers_mut()
        .add(GpuBuffer::zeroed("demo.frame", bytes));
    runtime.values_mut().add(json!({ "images": args.count }));

    runtime.wait_extensive().await;

    let (tx, rx) = tokio::sync::oneshot::channel();
    runtime
        .schedule(
            stats,
            Task::new("stats.read", move |slot: &mut Slot<Value>| {
                let _ = tx.send(slot.require()?.clone());
                Ok(())
            }),
        )?
        .detach();
    let luma = rx.await.context("stats item did not report")?;

    runtime.collect(qr)?.detach();
    let report = runtime.shutdown().await;
    Ok(DemoSummary { luma, report })
}
