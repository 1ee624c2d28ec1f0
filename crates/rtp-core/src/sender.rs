//! The RTP send worker: paces a WAV file out as 20ms μ-law frames toward
//! the negotiated remote RTP endpoint. Binds its own local port rather than
//! sharing the receiver's, so the two workers never contend for one socket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sipline_media_io::WavReader;
use sipline_udp_transport::UdpEndpoint;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Result;
use crate::header::RtpHeader;

const FRAME_BYTES: usize = 160;
const FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// Final tally handed back when the sender reaches end of stream or is
/// stopped early.
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderStats {
    pub packets_sent: u64,
}

/// A handle to a running send worker.
pub struct SenderHandle {
    running: Arc<AtomicBool>,
    join: JoinHandle<Result<SenderStats>>,
}

impl SenderHandle {
    /// Signals the worker to stop after its current frame and joins it.
    /// Reaching end of stream has the same effect without needing a call to
    /// this method; the call itself stays established either way.
    pub async fn stop(self) -> Result<SenderStats> {
        self.running.store(false, Ordering::SeqCst);
        self.join.await.map_err(|_| crate::error::Error::WorkerJoin)?
    }

    /// Waits for the stream to finish on its own (end of file).
    pub async fn join(self) -> Result<SenderStats> {
        self.join.await.map_err(|_| crate::error::Error::WorkerJoin)?
    }
}

/// Binds a dedicated send socket and spawns the worker feeding `wav_path`
/// toward `remote_addr`.
pub async fn spawn_sender(
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    wav_path: PathBuf,
) -> Result<SenderHandle> {
    let endpoint = UdpEndpoint::bind(local_addr).await?;
    let running = Arc::new(AtomicBool::new(true));
    let worker_running = running.clone();

    let join = tokio::spawn(async move {
        run(endpoint, remote_addr, wav_path, worker_running).await
    });

    Ok(SenderHandle { running, join })
}

async fn run(
    endpoint: UdpEndpoint,
    remote_addr: SocketAddr,
    wav_path: PathBuf,
    running: Arc<AtomicBool>,
) -> Result<SenderStats> {
    let mut reader = WavReader::open(&wav_path)?;

    // SSRC is chosen once per stream; sequence/timestamp start at 0 so a
    // single call's packetization is easy to reason about end to end.
    let ssrc: u32 = rand::random();
    let mut sequence_number: u16 = 0;
    let mut timestamp: u32 = 0;
    let mut packets_sent: u64 = 0;
    let mut buf = [0u8; FRAME_BYTES];

    debug!(%remote_addr, ssrc, "RTP sender starting");

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let n = reader.read_chunk(&mut buf)?;
        if n == 0 {
            break;
        }

        let header = RtpHeader::new(sequence_number, timestamp, ssrc);
        let datagram = header.pack(&buf[..n]);
        endpoint.send_to(&datagram, remote_addr).await?;

        sequence_number = sequence_number.wrapping_add(1);
        timestamp = timestamp.wrapping_add(n as u32);
        packets_sent += 1;

        tokio::time::sleep(FRAME_INTERVAL).await;
    }

    info!(packets_sent, "RTP sender finished");
    Ok(SenderStats { packets_sent })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipline_media_io::WavWriter;
    use std::net::Ipv4Addr;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn packetizes_480_bytes_into_three_160_byte_frames() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("source.wav");
        let mut writer = WavWriter::create(&wav_path).unwrap();
        writer.append(&[0x11u8; 480]).unwrap();
        writer.finalize().unwrap();

        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let receiver_addr = receiver.local_addr().unwrap();
        let local_addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);

        let handle = spawn_sender(local_addr, receiver_addr, wav_path).await.unwrap();

        let mut buf = [0u8; 2048];
        let mut packets = Vec::new();
        for _ in 0..3 {
            let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
            packets.push(buf[..n].to_vec());
        }

        let stats = handle.join().await.unwrap();
        assert_eq!(stats.packets_sent, 3);

        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(packet.len(), 12 + 160);
            let (header, payload) = RtpHeader::decode(packet).unwrap();
            assert_eq!(header.sequence_number, i as u16);
            assert_eq!(header.timestamp, (i as u32) * 160);
            assert_eq!(payload.len(), 160);
        }
    }
}
