#[cfg(not(feature = "std"))]
fn main() {}

#[cfg(feature = "std")]
use std::path::PathBuf;

#[cfg(feature = "std")]
use clap::{Args, Parser};
#[cfg(feature = "std")]
use serde_json::json;
#[cfg(feature = "std")]
use tokio::time::{timeout, Duration};
#[cfg(feature = "std")]
use vsp_transfer::{
    init_logging, transport::loopback::LoopbackConfig, EngineConfig, FileSource,
    LoopbackLink, Session, SessionHandle, TransferEvent,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[cfg(feature = "std")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
#[cfg(feature = "std")]
enum Commands {
    /// Upload a file to a simulated VSP device.
    Upload {
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Send a string to a simulated VSP device.
    Send {
        #[arg(long)]
        data: String,
        #[command(flatten)]
        link: LinkArgs,
    },
}

#[derive(Args, Clone, Debug)]
#[cfg(feature = "std")]
struct LinkArgs {
    #[arg(long, default_value_t = vsp_transfer::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    #[arg(long, default_value_t = vsp_transfer::DEFAULT_FIFO_DEPTH)]
    fifo_depth: usize,
    #[arg(long, default_value_t = 1)]
    pacing_ms: u64,
    #[arg(long, help = "Remote receive buffer in bytes; 0 never stalls")]
    remote_buffer: Option<usize>,
    #[arg(long, help = "Have the device echo every line back")]
    echo: bool,
    #[arg(long, help = "Make every write fail after this many succeed")]
    fail_after: Option<usize>,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 30, help = "Give up after this many seconds")]
    timeout_secs: u64,
}

#[cfg(feature = "std")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let (source, link_args) = match cli.command {
        Commands::Upload { file, link } => (Payload::File(file), link),
        Commands::Send { data, link } => (Payload::Data(data.into_bytes()), link),
    };

    let config = EngineConfig::default()
        .with_chunk_size(link_args.chunk_size)
        .with_fifo_depth(link_args.fifo_depth)
        .with_pacing_delay(Duration::from_millis(link_args.pacing_ms));
    let (link, link_events) = LoopbackLink::new(LoopbackConfig {
        remote_buffer: link_args.remote_buffer.unwrap_or(0),
        echo: link_args.echo,
        fail_after: link_args.fail_after,
        seed: link_args.seed,
        ..LoopbackConfig::default()
    });
    let (session, handle, mut events) = Session::new(config, link.clone(), link_events)?;
    let session_task = tokio::spawn(session.run());

    link.connect();
    wait_until_ready(&handle).await?;

    let outcome = match source {
        Payload::File(path) => {
            let file = FileSource::open(&path)?;
            log::info!("uploading {}", file.path().display());
            handle.choose_source(file).await?;
            handle.begin_transfer().await?
        }
        Payload::Data(data) => handle.send_data(data).await?,
    };
    if !outcome.is_applied() {
        anyhow::bail!("transfer could not start: {:?}", outcome);
    }

    let mut messages = Vec::new();
    let mut error = None;
    let wait = async {
        while let Some(event) = events.recv().await {
            match event {
                TransferEvent::MessageReceived(bytes) => {
                    messages.push(String::from_utf8_lossy(&bytes).into_owned())
                }
                TransferEvent::TransferCompleted { .. } => break,
                TransferEvent::TransferFailed { reason } => {
                    error = Some(reason.to_string());
                    break;
                }
                _ => {}
            }
        }
    };
    if timeout(Duration::from_secs(link_args.timeout_secs), wait)
        .await
        .is_err()
    {
        error = Some("timed out".to_string());
    }
    while let Ok(event) = events.try_recv() {
        if let TransferEvent::MessageReceived(bytes) = event {
            messages.push(String::from_utf8_lossy(&bytes).into_owned());
        }
    }

    drop(handle);
    let snapshot = session_task.await??;

    let result = json!({
        "state": snapshot.state,
        "bytes_sent": snapshot.bytes_sent,
        "device_received": link.received().len(),
        "messages": messages,
        "error": error,
    });
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

#[cfg(feature = "std")]
enum Payload {
    File(PathBuf),
    Data(Vec<u8>),
}

#[cfg(feature = "std")]
async fn wait_until_ready(handle: &SessionHandle) -> anyhow::Result<()> {
    let ready = async {
        loop {
            let snapshot = handle.snapshot().await?;
            if snapshot.connected && snapshot.channel_ready {
                return Ok::<(), anyhow::Error>(());
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    timeout(Duration::from_secs(5), ready)
        .await
        .map_err(|_| anyhow::anyhow!("device never became ready"))?
}
