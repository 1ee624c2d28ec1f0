//! RTP header codec and the bidirectional G.711 media engine: a receive
//! worker that appends inbound audio to a WAV file and fans datagrams out
//! to observers, and a send worker that paces a WAV file out at 20ms
//! cadence. The two always bind distinct local ports — this stack never
//! attempts symmetric RTP.

pub mod error;
pub mod events;
pub mod header;
pub mod receiver;
pub mod sender;

pub use error::{Error, Result};
pub use events::RtpEvent;
pub use header::RtpHeader;
pub use receiver::{spawn_receiver, ReceiverConfig, ReceiverHandle, ReceiverStats};
pub use sender::{spawn_sender, SenderHandle, SenderStats};
