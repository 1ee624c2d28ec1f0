//! Receive-only call utility: dials a callee, records whatever RTP arrives
//! to a WAV file for up to a bounded duration (or until interrupted), then
//! hangs up. It never plays audio back toward the peer — playback and the
//! full control surface live in the WebSocket-driven orchestrator, not here.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use sipline_infra_common::{setup_logging, LoggingConfig};
use sipline_rtp_core::{spawn_receiver, ReceiverConfig};
use sipline_sip_core::{Credentials, SipSession};

/// Places one call and records the inbound audio to a WAV file.
#[derive(Parser, Debug)]
#[command(name = "sipline", version, about)]
struct Args {
    /// Number or extension to dial.
    #[arg(default_value = "1000")]
    callee: String,

    /// Output WAV path for the recorded call.
    #[arg(default_value = "call.wav")]
    output_wav: PathBuf,

    /// Maximum call duration in seconds before an automatic hangup.
    #[arg(default_value_t = 60)]
    max_seconds: u64,

    /// SIP server host (sent as the `To`/`From` domain).
    #[arg(long, env = "SIPLINE_SERVER_HOST", default_value = "127.0.0.1")]
    server_host: String,

    /// SIP server address:port to send requests to.
    #[arg(long, env = "SIPLINE_SERVER_ADDR", default_value = "127.0.0.1:5060")]
    server_addr: SocketAddr,

    /// Local IP to advertise in Via/Contact/SDP.
    #[arg(long, env = "SIPLINE_LOCAL_IP", default_value = "127.0.0.1")]
    local_ip: Ipv4Addr,

    /// Caller identity (the number this process calls from).
    #[arg(long, env = "SIPLINE_CALLER", default_value = "1000")]
    caller: String,

    /// Digest auth username, if the server challenges.
    #[arg(long, env = "SIPLINE_USERNAME", default_value = "")]
    username: String,

    /// Digest auth password, if the server challenges.
    #[arg(long, env = "SIPLINE_PASSWORD", default_value = "")]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(LoggingConfig::new(tracing::Level::INFO, "sipline"))
        .context("failed to install logging subscriber")?;

    if let Err(e) = run(args).await {
        error!(error = %e, "call failed");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    // Bind the RTP receiver first so its ephemeral port is known before the
    // SDP offer that advertises it goes out.
    let receiver = spawn_receiver(
        SocketAddr::new(args.local_ip.into(), 0),
        ReceiverConfig { wav_path: Some(args.output_wav.clone()), raw_dump_path: None, observer: None },
    )
    .await
    .context("failed to start RTP receiver")?;
    let local_rtp_port = receiver.local_addr().context("RTP receiver has no local address")?.port();

    let mut session = SipSession::init(
        args.caller.clone(),
        args.local_ip,
        0,
        args.server_host.clone(),
        args.server_addr,
        args.callee.clone(),
        local_rtp_port,
    )
    .await
    .context("failed to bind signalling socket")?;

    let creds = Credentials { username: args.username, password: args.password };

    if let Err(e) = session.invite(&creds).await {
        let _ = receiver.stop().await;
        return Err(e).context("INVITE failed");
    }
    info!(callee = %args.callee, "call established");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.max_seconds)) => {
            info!(max_seconds = args.max_seconds, "reached call duration cap");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, hanging up");
        }
    }

    let stats = receiver.stop().await.context("failed to stop RTP receiver")?;
    info!(packets = stats.packets, bytes = stats.bytes, "recording finished");

    session.bye().await.context("BYE failed")?;
    session.close();

    Ok(())
}
