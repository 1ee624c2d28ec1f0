//! Events the receive worker hands to whoever is watching the call, instead
//! of the raw function-pointer observer an older design used — a channel
//! can't race with the worker swapping it out from under a reader.

/// One message per notable thing the receiver observed. Consumed by the
/// orchestrator; must never block the worker that sends it, which is why
/// this rides an unbounded channel.
#[derive(Debug, Clone)]
pub enum RtpEvent {
    /// A full RTP datagram (header + payload) arrived.
    DatagramReceived(Vec<u8>),
    /// The receive worker has stopped and, if a WAV writer was attached,
    /// finalized it.
    ReceiverStopped { packets: u64, bytes: u64, real_audio_seen: bool },
}
