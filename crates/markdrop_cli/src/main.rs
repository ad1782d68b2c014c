//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `markdrop_core` linkage (ping/version probe).
//! - Run one scripted drag against the in-memory store and print every
//!   engine event as a JSON line.
//!
//! Usage: `markdrop_cli [--config <file.json>] [--log-dir <absolute dir>]`

use markdrop_core::{
    BookmarkNode, DragDropEngine, DragSource, DropZone, ElementKey, EngineConfig, EngineEvent,
    HostCapabilities, HostEvent, MemoryStore, NodeId, Point, PointerButton, Rect, Store,
};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;

struct Args {
    config: Option<String>,
    log_dir: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        log_dir: None,
    };
    let mut raw = std::env::args().skip(1);
    while let Some(flag) = raw.next() {
        let slot = match flag.as_str() {
            "--config" => &mut args.config,
            "--log-dir" => &mut args.log_dir,
            other => return Err(format!("unknown argument `{other}`")),
        };
        *slot = Some(raw.next().ok_or_else(|| format!("missing value for `{flag}`"))?);
    }
    Ok(args)
}

fn main() -> ExitCode {
    println!("markdrop_core ping={}", markdrop_core::ping());
    println!("markdrop_core version={}", markdrop_core::core_version());

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to build runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn demo_tree() -> Vec<BookmarkNode> {
    vec![BookmarkNode::folder("0", "").with_children(vec![
        BookmarkNode::folder("1", "Bookmarks bar").with_children(vec![
            BookmarkNode::folder("10", "Work").with_children(vec![
                BookmarkNode::item("11", "Report", "https://report.example"),
                BookmarkNode::item("12", "Invoice", "https://invoice.example"),
                BookmarkNode::item("13", "Memo", "https://memo.example"),
            ]),
            BookmarkNode::folder("20", "Archive"),
        ]),
        BookmarkNode::folder("2", "Other bookmarks"),
    ])]
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    if let Some(log_dir) = args.log_dir.as_deref() {
        markdrop_core::init_logging(markdrop_core::default_log_level(), log_dir)?;
    }
    let config = match args.config.as_deref() {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    let store = Arc::new(MemoryStore::new(demo_tree()));
    let shared: Arc<dyn Store> = store.clone();
    let mut engine = DragDropEngine::start(shared, config, HostCapabilities::default()).await?;
    let mut events = engine.subscribe();

    engine.with_registry(|registry| {
        registry.register_source(
            ElementKey::from("memo"),
            DragSource::item("13", "Memo", "https://memo.example"),
            Some(Rect::new(0.0, 80.0, 240.0, 20.0)),
            1,
        );
        registry.register_zone(
            ElementKey::from("work-header"),
            DropZone::header("10", "Work"),
            Some(Rect::new(0.0, 0.0, 240.0, 20.0)),
            1,
        );
        registry.register_zone(
            ElementKey::from("archive-body"),
            DropZone::body("20", "Archive"),
            Some(Rect::new(300.0, 0.0, 240.0, 200.0)),
            0,
        );
    });

    // Press Memo, drag onto Work's header, release.
    let script = [
        HostEvent::PointerDown {
            position: Point::new(10.0, 90.0),
            button: PointerButton::Primary,
        },
        HostEvent::PointerMove {
            position: Point::new(10.0, 40.0),
        },
        HostEvent::PointerMove {
            position: Point::new(10.0, 10.0),
        },
        HostEvent::PointerUp {
            position: Point::new(10.0, 10.0),
        },
    ];
    let mut pending = Vec::new();
    for event in script {
        if let Some(move_future) = engine.handle_event(event)? {
            pending.push(move_future);
        }
    }
    for move_future in pending {
        let outcome = move_future.await?;
        log::info!(
            "event=demo_move module=cli status=ok item={} to={}",
            outcome.item_id,
            outcome.to
        );
    }

    loop {
        match events.try_recv() {
            Ok(event) => print_event(&event)?,
            Err(TryRecvError::Lagged(skipped)) => eprintln!("warning: skipped {skipped} events"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    let work: Vec<String> = store
        .child_ids(&NodeId::from("10"))
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("work children={}", work.join(","));
    engine.shutdown().await;
    Ok(())
}

fn print_event(event: &EngineEvent) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
