//! The RTP receive worker: one bound socket, an optional output WAV file, an
//! optional raw-dump sink, and an optional event channel fanned out to
//! observers. Exactly one worker reads the socket for the worker's entire
//! lifetime; shutdown is cooperative via an atomic flag plus closing the
//! socket to unblock the pending receive.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sipline_media_io::{tone, WavWriter};
use sipline_udp_transport::{RecvOutcome, UdpEndpoint};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::events::RtpEvent;
use crate::header::RtpHeader;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_DATAGRAM: usize = 2048;
const CONSECUTIVE_TIMEOUT_WARNING: u32 = 3;
const SILENCE_DIAGNOSTIC: Duration = Duration::from_secs(30);

/// What the receive worker should do with each datagram's payload, set up
/// once at spawn time.
#[derive(Default)]
pub struct ReceiverConfig {
    pub wav_path: Option<PathBuf>,
    pub raw_dump_path: Option<PathBuf>,
    pub observer: Option<UnboundedSender<RtpEvent>>,
}

/// Final tally handed back when the worker exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverStats {
    pub packets: u64,
    pub bytes: u64,
    pub real_audio_seen: bool,
}

/// A handle to a running receive worker. Dropping this without calling
/// [`ReceiverHandle::stop`] leaves the worker running — callers that want
/// deterministic shutdown must call `stop`.
pub struct ReceiverHandle {
    running: Arc<AtomicBool>,
    endpoint: UdpEndpoint,
    join: JoinHandle<Result<ReceiverStats>>,
}

impl ReceiverHandle {
    pub fn local_addr(&self) -> std::result::Result<SocketAddr, sipline_udp_transport::Error> {
        self.endpoint.local_addr()
    }

    /// Clears `running`, closes the socket to unblock the worker's pending
    /// receive, and joins it. Per the shutdown contract, the worker patches
    /// the WAV header (synthesizing a tone first if no real audio arrived)
    /// before this returns.
    pub async fn stop(self) -> Result<ReceiverStats> {
        self.running.store(false, Ordering::SeqCst);
        self.endpoint.close();
        self.join.await.map_err(|_| crate::error::Error::WorkerJoin)?
    }
}

/// Binds `local_addr` and spawns the receive worker.
pub async fn spawn_receiver(local_addr: SocketAddr, config: ReceiverConfig) -> Result<ReceiverHandle> {
    let endpoint = UdpEndpoint::bind(local_addr).await?;
    let running = Arc::new(AtomicBool::new(true));

    let worker_endpoint = endpoint.clone();
    let worker_running = running.clone();
    let join = tokio::spawn(async move { run(worker_endpoint, worker_running, config).await });

    Ok(ReceiverHandle { running, endpoint, join })
}

async fn run(
    endpoint: UdpEndpoint,
    running: Arc<AtomicBool>,
    config: ReceiverConfig,
) -> Result<ReceiverStats> {
    let mut wav_writer = config
        .wav_path
        .as_ref()
        .map(WavWriter::create)
        .transpose()?;
    let mut raw_dump = config
        .raw_dump_path
        .as_ref()
        .map(std::fs::File::create)
        .transpose()
        .map_err(sipline_media_io::Error::from)?;

    let mut packets: u64 = 0;
    let mut bytes: u64 = 0;
    let mut real_audio_seen = false;
    let mut consecutive_timeouts: u32 = 0;
    let mut last_diagnostic_at = Instant::now();

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match endpoint.recv_timeout(RECV_TIMEOUT, MAX_DATAGRAM).await {
            RecvOutcome::Datagram { data, from } => {
                consecutive_timeouts = 0;
                last_diagnostic_at = Instant::now();
                packets += 1;
                bytes += data.len() as u64;
                real_audio_seen = true;

                log_datagram(packets, data.len(), from);

                if let Some((_, payload)) = RtpHeader::decode(&data) {
                    if let Some(writer) = wav_writer.as_mut() {
                        if let Err(e) = writer.append(payload) {
                            warn!(error = %e, "partial write to output WAV");
                        }
                    }
                    if let Some(sink) = raw_dump.as_mut() {
                        use std::io::Write as _;
                        let _ = sink.write_all(payload);
                        let _ = sink.flush();
                    }
                }

                if let Some(observer) = &config.observer {
                    let _ = observer.send(RtpEvent::DatagramReceived(data));
                }
            }
            RecvOutcome::Timeout => {
                consecutive_timeouts += 1;
                if consecutive_timeouts == CONSECUTIVE_TIMEOUT_WARNING {
                    warn!(consecutive_timeouts, "no RTP datagrams in the last few polls");
                }
                if last_diagnostic_at.elapsed() >= SILENCE_DIAGNOSTIC {
                    info!("no RTP packets received for 30s");
                    last_diagnostic_at = Instant::now();
                }
            }
            RecvOutcome::Closed => break,
        }
    }

    if let Some(mut writer) = wav_writer.take() {
        if !real_audio_seen {
            writer.append(&tone::one_second_tone())?;
        }
        writer.finalize()?;
    }

    if let Some(observer) = &config.observer {
        let _ = observer.send(RtpEvent::ReceiverStopped { packets, bytes, real_audio_seen });
    }

    Ok(ReceiverStats { packets, bytes, real_audio_seen })
}

fn log_datagram(packet_index: u64, len: usize, from: SocketAddr) {
    if packet_index <= 3 {
        debug!(packet_index, len, %from, "RTP datagram received");
    } else if packet_index <= 5 {
        trace!(packet_index, len, "RTP datagram received");
    } else if packet_index % 50 == 0 {
        debug!(packet_index, "RTP datagrams received (every 50th logged)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::RtpHeader;
    use std::net::Ipv4Addr;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn finalizes_wav_with_patched_lengths_after_ten_packets() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("out.wav");

        let local_addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
        let handle = spawn_receiver(
            local_addr,
            ReceiverConfig { wav_path: Some(wav_path.clone()), raw_dump_path: None, observer: None },
        )
        .await
        .unwrap();
        let server_addr = handle.local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for seq in 0..10u16 {
            let header = RtpHeader::new(seq, seq as u32 * 160, 0x1234);
            let datagram = header.pack(&[0xFFu8; 160]);
            client.send_to(&datagram, server_addr).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stats = handle.stop().await.unwrap();
        assert_eq!(stats.packets, 10);
        assert_eq!(stats.bytes, 1720); // 10 * (12 header + 160 payload)
        assert!(stats.real_audio_seen);

        let bytes = std::fs::read(&wav_path).unwrap();
        assert_eq!(bytes.len(), 58 + 1600);
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let sample_count = u32::from_le_bytes(bytes[46..50].try_into().unwrap());
        let data_size = u32::from_le_bytes(bytes[54..58].try_into().unwrap());
        assert_eq!(riff_size, 1650);
        assert_eq!(sample_count, 1600);
        assert_eq!(data_size, 1600);
    }

    #[tokio::test]
    async fn stop_before_any_rtp_synthesizes_one_second_tone() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("silent.wav");

        let local_addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
        let handle = spawn_receiver(
            local_addr,
            ReceiverConfig { wav_path: Some(wav_path.clone()), raw_dump_path: None, observer: None },
        )
        .await
        .unwrap();

        let stats = handle.stop().await.unwrap();
        assert_eq!(stats.packets, 0);
        assert!(!stats.real_audio_seen);

        let bytes = std::fs::read(&wav_path).unwrap();
        assert_eq!(bytes.len(), 58 + 8000);
        let data_size = u32::from_le_bytes(bytes[54..58].try_into().unwrap());
        assert_eq!(data_size, 8000);
    }
}
