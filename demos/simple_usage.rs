use std::io::Write;
use std::time::Duration;
use tokio_stream::StreamExt;
use wail::{FollowMode, WailConfig, Window, watch_tail};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("app.log");
    std::fs::write(&path, "INFO starting\nINFO ready\nWARN slow request\n")?;

    // Last two lines, then follow by name
    let config = WailConfig::new(&path)
        .with_window(Window::LastLines(2))
        .with_follow(FollowMode::Name)
        .with_poll_interval(Duration::from_millis(50));
    let mut stream = watch_tail(config);

    println!("Tailing {} - printing the first four lines...", path.display());

    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut file = std::fs::OpenOptions::new().append(true).open(&path)?;
        file.write_all(b"ERROR upstream timeout\nINFO recovered\n")?;
        Ok::<_, std::io::Error>(())
    });

    let mut count = 0;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(line) => {
                count += 1;
                print!("[{}]: {}", count, String::from_utf8_lossy(&line));
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }

        if count >= 4 {
            break;
        }
    }

    writer.await??;
    Ok(())
}
