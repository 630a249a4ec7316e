//! Aquareum CLI tools: WHEP playback, endpoint helpers.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::info;

use aquareum_whep::{
    HttpSignaling, IceServer, OutputStream, PlaybackSink, RtcConnector, WhepConfig, WhepSession,
};

#[derive(Parser, Debug)]
#[command(name = "aquareum")]
#[command(about = "Aquareum CLI tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct StreamTarget {
    /// Full WHEP endpoint URL (takes precedence over --node/--stream)
    #[arg(long)]
    endpoint: Option<String>,

    /// Aquareum node base URL
    #[arg(long, env = "AQUAREUM_URL")]
    node: Option<String>,

    /// Stream name on the node
    #[arg(long)]
    stream: Option<String>,
}

impl StreamTarget {
    fn resolve(&self) -> Result<String> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }
        match (&self.node, &self.stream) {
            (Some(node), Some(stream)) => {
                Ok(aquareum_common::whep_endpoint(node, stream)?.to_string())
            }
            (None, _) => Err(anyhow!("pass --endpoint, or --node (or AQUAREUM_URL) with --stream")),
            (Some(_), None) => Err(anyhow!("--stream is required with --node")),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a stream over WHEP until interrupted
    Play {
        #[command(flatten)]
        target: StreamTarget,

        /// STUN/TURN server URL (repeatable); none by default
        #[arg(long = "ice-server", value_name = "URL")]
        ice_servers: Vec<String>,

        /// Maximum wait for ICE gathering before the offer is sent
        #[arg(long, default_value_t = 1000)]
        gather_timeout_ms: u64,

        /// Pause between failed signaling attempts
        #[arg(long, default_value_t = 5000)]
        retry_backoff_ms: u64,

        /// Per-request timeout for the signaling POST
        #[arg(long, default_value_t = 10_000)]
        request_timeout_ms: u64,

        /// Keep retrying when the endpoint answers HTTP 405
        #[arg(long, default_value_t = false)]
        retry_on_405: bool,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Print the WHEP endpoint URL for a stream
    Endpoint {
        #[command(flatten)]
        target: StreamTarget,
    },

    /// Show version information
    Version,
}

/// Sink for a headless player: reports what would be rendered.
struct LogSink;

impl PlaybackSink for LogSink {
    fn attach(&self, stream: OutputStream) {
        info!("playback started with {} track(s)", stream.len());
        for track in stream.tracks() {
            info!("  {} track {}", track.kind(), track.id());
        }
    }
}

async fn play(endpoint: String, config: WhepConfig, duration: Option<Duration>) -> Result<()> {
    let signaling = Arc::new(HttpSignaling::new(config.request_timeout)?);
    let session = WhepSession::open(
        &RtcConnector,
        signaling,
        endpoint.clone(),
        Arc::new(LogSink),
        &config,
    )
    .await?;

    let mut changes = session.state_changes();
    let mut failures = session.failures();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut failure = None;
    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("interrupted");
                break;
            }
            _ = &mut deadline => {
                info!("duration elapsed");
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *changes.borrow_and_update();
                info!("{} is {}", endpoint, state);
                if state.is_closed() {
                    break;
                }
            }
            Ok(()) = failures.changed() => {
                failure = failures.borrow_and_update().clone();
                if failure.is_some() {
                    break;
                }
            }
        }
    }

    if let Some(url) = session
        .established()
        .and_then(|established| established.absolute_resource_url(&endpoint))
    {
        info!("session resource was {}", url);
    }
    let tracks = session.stream().len();
    session.close().await?;
    info!("closed after receiving {} track(s)", tracks);
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn main() -> Result<()> {
    aquareum_common::init_tracing();

    let args = Args::parse();

    match args.command {
        Command::Play {
            target,
            ice_servers,
            gather_timeout_ms,
            retry_backoff_ms,
            request_timeout_ms,
            retry_on_405,
            duration,
        } => {
            let endpoint = target.resolve()?;

            let mut config = WhepConfig::default();
            config.negotiation.gather_timeout = Duration::from_millis(gather_timeout_ms);
            config.negotiation.retry_backoff = Duration::from_millis(retry_backoff_ms);
            config.negotiation.retry_on_stale_endpoint = retry_on_405;
            config.request_timeout = Duration::from_millis(request_timeout_ms);
            for url in ice_servers {
                config = config.with_ice_server(IceServer::new(url));
            }

            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(play(endpoint, config, duration.map(Duration::from_secs)))?;
        }
        Command::Endpoint { target } => {
            println!("{}", target.resolve()?);
        }
        Command::Version => {
            println!("aquareum {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
