use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wail::{Delimiter, FollowMode, LabeledWriter, OutputGuard, Tailer, WailConfig, Window, follow_all};

#[derive(Parser, Debug)]
#[command(name = "wail", version)]
#[command(about = "Print the last part of files, optionally following them", long_about = None)]
struct Args {
    /// Files to read (use - for stdin)
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Number of lines to output
    #[arg(short = 'n', long, value_name = "NUM")]
    lines: Option<u64>,

    /// Number of bytes to output; wins over --lines
    #[arg(short = 'c', long, value_name = "NUM")]
    bytes: Option<u64>,

    /// Count lines or bytes from the start instead of the end
    #[arg(long)]
    from_start: bool,

    /// Output appended data as the file grows
    #[arg(
        short = 'f',
        long,
        value_name = "HOW",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "descriptor"
    )]
    follow: Option<FollowHow>,

    /// Same as --follow=name --retry
    #[arg(short = 'F')]
    follow_name_retry: bool,

    /// Seconds between polls while following
    #[arg(short = 's', long, value_name = "SECONDS", default_value_t = 0.1)]
    sleep_interval: f64,

    /// With -f, stop after this process exits
    #[arg(long, value_name = "PID")]
    pid: Option<u32>,

    /// Keep trying to open a file that is inaccessible
    #[arg(long)]
    retry: bool,

    /// Line delimiter is NUL, not newline
    #[arg(short = 'z', long)]
    zero_terminated: bool,

    /// With --follow=name, recheck the file's identity after N idle polls
    #[arg(long, value_name = "N")]
    max_unchanged_stats: Option<u32>,

    /// Never print headers giving file names
    #[arg(short, long)]
    quiet: bool,

    /// Always print headers giving file names
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FollowHow {
    Descriptor,
    Name,
}

enum Target {
    Stdin,
    File(PathBuf),
}

impl Target {
    fn label(&self) -> String {
        match self {
            Target::Stdin => "standard input".to_string(),
            Target::File(path) => path.display().to_string(),
        }
    }
}

impl Args {
    fn targets(&self) -> Result<Vec<Target>> {
        if self.files.is_empty() {
            if io::stdin().is_terminal() {
                bail!("no files specified");
            }
            return Ok(vec![Target::Stdin]);
        }

        Ok(self
            .files
            .iter()
            .map(|file| {
                if file.as_os_str() == "-" {
                    Target::Stdin
                } else {
                    Target::File(file.clone())
                }
            })
            .collect())
    }

    fn follow_mode(&self) -> FollowMode {
        if self.follow_name_retry {
            return FollowMode::Name;
        }
        match self.follow {
            None => FollowMode::Off,
            Some(FollowHow::Descriptor) => FollowMode::Descriptor,
            Some(FollowHow::Name) => FollowMode::Name,
        }
    }

    fn config(&self, path: PathBuf) -> Result<WailConfig> {
        let poll_interval = Duration::try_from_secs_f64(self.sleep_interval)
            .context("invalid sleep interval")?;
        let delimiter = if self.zero_terminated {
            Delimiter::Nul
        } else {
            Delimiter::Newline
        };

        let mut config = WailConfig::new(path)
            .with_window(Window::resolve(self.lines, self.bytes, self.from_start))
            .with_delimiter(delimiter)
            .with_follow(self.follow_mode())
            .with_retry(self.retry || self.follow_name_retry)
            .with_poll_interval(poll_interval);
        if let Some(pid) = self.pid {
            config = config.with_pid(pid);
        }
        if let Some(ticks) = self.max_unchanged_stats {
            config = config.with_max_unchanged_stats(ticks);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "wail=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let targets = args.targets()?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let show_headers = (targets.len() > 1 || args.verbose) && !args.quiet;
    let guard = OutputGuard::new(io::stdout()).with_headers(show_headers);
    let following = args.follow_mode() != FollowMode::Off;

    let ok = if following && targets.len() > 1 {
        run_concurrent(&args, targets, &guard, &cancel).await?
    } else {
        run_sequential(&args, targets, &guard, &cancel).await?
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Tails each target in turn, each under its own header.
async fn run_sequential(
    args: &Args,
    targets: Vec<Target>,
    guard: &OutputGuard,
    cancel: &CancellationToken,
) -> Result<bool> {
    let mut ok = true;
    for target in targets {
        if cancel.is_cancelled() {
            break;
        }
        let label = target.label();
        let mut writer = guard.labeled(label.as_str());
        writer.announce().context("failed to write output")?;

        let result = match target {
            Target::Stdin => tail_stdin(args, &mut writer, cancel).await,
            Target::File(path) => {
                let tailer = Tailer::new(args.config(path)?);
                tailer.tail(&mut writer, cancel).await.map_err(Into::into)
            }
        };
        if let Err(e) = result {
            eprintln!("wail: {label}: {e:#}");
            ok = false;
        }
    }
    Ok(ok)
}

/// Follows every file at once; stdin is read to the end first.
async fn run_concurrent(
    args: &Args,
    targets: Vec<Target>,
    guard: &OutputGuard,
    cancel: &CancellationToken,
) -> Result<bool> {
    let mut ok = true;
    let mut tailers = Vec::new();
    for target in targets {
        let label = target.label();
        match target {
            Target::Stdin => {
                let mut writer = guard.labeled(label.as_str());
                if let Err(e) = tail_stdin(args, &mut writer, cancel).await {
                    eprintln!("wail: {label}: {e:#}");
                    ok = false;
                }
            }
            Target::File(path) => tailers.push(Tailer::new(args.config(path)?)),
        }
    }

    for (path, result) in follow_all(tailers, guard, cancel).await {
        if let Err(e) = result {
            eprintln!("wail: {}: {e}", path.display());
            ok = false;
        }
    }
    Ok(ok)
}

async fn tail_stdin(
    args: &Args,
    writer: &mut LabeledWriter,
    cancel: &CancellationToken,
) -> Result<()> {
    let tailer = Tailer::new(args.config(PathBuf::from("-"))?);
    let mut stdin = tokio::io::stdin();
    tokio::select! {
        result = tailer.tail_reader(&mut stdin, writer) => result?,
        _ = cancel.cancelled() => {}
    }
    Ok(())
}
