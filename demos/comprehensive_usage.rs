use std::io::Write;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use wail::{
    Delimiter, FollowMode, OutputGuard, PollingWatcher, Tailer, WailConfig, Window, follow_all,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== wail Comprehensive Example ===\n");

    let dir = tempfile::tempdir()?;

    println!("1. Windows - the same file read four ways:");
    windows(dir.path()).await?;

    println!("\n{}\n", "=".repeat(50));

    println!("2. NUL-delimited records:");
    nul_records(dir.path()).await?;

    println!("\n{}\n", "=".repeat(50));

    println!("3. Following two files through one shared output:");
    multi_follow(dir.path()).await?;

    println!("\n{}\n", "=".repeat(50));

    println!("4. Size events from the polling watcher:");
    size_events(dir.path()).await?;

    Ok(())
}

async fn windows(dir: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let path = dir.join("windows.log");
    std::fs::write(&path, "one\ntwo\nthree\nfour\nfive\n")?;

    for window in [
        Window::LastLines(2),
        Window::FromLine(4),
        Window::LastBytes(5),
        Window::FromByte(15),
    ] {
        let tailer = Tailer::new(WailConfig::new(&path).with_window(window));
        let mut out = Vec::new();
        tailer.tail(&mut out, &CancellationToken::new()).await?;
        println!("  {:?}: {:?}", window, String::from_utf8_lossy(&out));
    }

    Ok(())
}

async fn nul_records(dir: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let path = dir.join("records.bin");
    std::fs::write(&path, b"alpha\0beta\0gamma\0")?;

    let tailer = Tailer::new(
        WailConfig::new(&path)
            .with_window(Window::LastLines(2))
            .with_delimiter(Delimiter::Nul),
    );
    let mut out = Vec::new();
    tailer.tail(&mut out, &CancellationToken::new()).await?;

    for record in out.split(|b| *b == 0).filter(|r| !r.is_empty()) {
        println!("  record: {}", String::from_utf8_lossy(record));
    }

    Ok(())
}

async fn multi_follow(dir: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let web = dir.join("web.log");
    let db = dir.join("db.log");
    std::fs::write(&web, "GET /health 200\n")?;
    std::fs::write(&db, "checkpoint complete\n")?;

    let cancel = CancellationToken::new();
    let guard = OutputGuard::new(std::io::stdout());
    let tailers: Vec<Tailer> = [&web, &db]
        .into_iter()
        .map(|path| {
            Tailer::new(
                WailConfig::new(path)
                    .with_window(Window::LastLines(1))
                    .with_follow(FollowMode::Descriptor)
                    .with_poll_interval(Duration::from_millis(50)),
            )
        })
        .collect();

    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { follow_all(tailers, &guard, &cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    append(&db, "slow query: 1200ms\n")?;
    tokio::time::sleep(Duration::from_millis(150)).await;
    append(&web, "POST /orders 201\n")?;
    tokio::time::sleep(Duration::from_millis(150)).await;

    cancel.cancel();
    for (path, result) in run.await? {
        if let Err(e) = result {
            eprintln!("  ❌ {}: {}", path.display(), e);
        }
    }

    Ok(())
}

async fn size_events(dir: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let path = dir.join("sizes.log");
    std::fs::write(&path, "0123456789\n")?;

    let cancel = CancellationToken::new();
    let watcher = PollingWatcher::new(&path, Duration::from_millis(20));
    let mut events = watcher.watch(cancel.clone()).await?;

    append(&path, "more\n")?;
    if let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(1), events.next()).await {
        println!("  📈 size {} (truncated: {})", event.size, event.truncated);
    }

    std::fs::write(&path, "x\n")?;
    if let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(1), events.next()).await {
        println!("  📉 size {} (truncated: {})", event.size, event.truncated);
    }

    cancel.cancel();
    Ok(())
}

fn append(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    file.write_all(content.as_bytes())
}
