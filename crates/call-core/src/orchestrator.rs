//! The call orchestrator: the single task that owns the `SipSession`, the
//! RTP workers, and the call state machine, and drives them from control
//! messages arriving over the (opaque) external bus.
//!
//! Per the concurrency model, exactly one task ever touches an
//! `Orchestrator` — there is no locking here because there is no sharing.
//! A duration-cap watchdog and the RTP event fan-out are spawned as
//! separate tasks that talk back to this one over channels rather than
//! reaching into its state directly.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

use sipline_rtp_core::{self as rtp, ReceiverConfig, ReceiverHandle, RtpEvent, SenderHandle};
use sipline_sip_core::{Credentials, SipSession};

use crate::control::{ControlEvent, ControlMessage};
use crate::error::{Error, Result};
use crate::state::CallState;

/// Everything about local identity and policy that doesn't change call to
/// call.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub caller: String,
    pub local_ip: Ipv4Addr,
    pub local_sip_port: u16,
    pub server_host: String,
    pub server_addr: SocketAddr,
    pub local_rtp_port: u16,
    pub rtp_send_port: u16,
    pub credentials: Credentials,
    pub upload_dir: PathBuf,
    pub recordings_dir: PathBuf,
    pub max_call_duration: Duration,
}

/// The live call, when one is active.
struct ActiveCall {
    session: SipSession,
    receiver: ReceiverHandle,
    sender: Option<SenderHandle>,
}

/// Owns the single in-flight call (if any) and its workers.
pub struct Orchestrator {
    config: OrchestratorConfig,
    state: CallState,
    active: Option<ActiveCall>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config, state: CallState::Idle, active: None }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Dials `callee`, running the full INVITE transaction to completion.
    /// On success the receiver is already running and appending to
    /// `recordings_dir/<callee>.wav`; a duration-cap watchdog and an RTP
    /// event forwarder are spawned against `self_tx`/`control_tx`.
    pub async fn call(
        &mut self,
        callee: &str,
        control_tx: UnboundedSender<ControlEvent>,
        self_tx: UnboundedSender<ControlMessage>,
    ) -> Result<()> {
        if self.state.is_active() {
            return Err(Error::CallAlreadyActive);
        }
        self.state = CallState::Dialing;

        let mut session = SipSession::init(
            self.config.caller.clone(),
            self.config.local_ip,
            self.config.local_sip_port,
            self.config.server_host.clone(),
            self.config.server_addr,
            callee.to_string(),
            self.config.local_rtp_port,
        )
        .await?;

        if let Err(e) = session.invite(&self.config.credentials).await {
            session.close();
            self.state = CallState::Idle;
            return Err(e.into());
        }

        let remote_rtp_addr = session
            .remote_rtp_addr
            .expect("call_established implies remote_rtp_addr is set");

        let (rtp_tx, mut rtp_rx) = tokio::sync::mpsc::unbounded_channel::<RtpEvent>();
        let recording_path = self.config.recordings_dir.join(format!("{callee}.wav"));
        let receiver = rtp::spawn_receiver(
            SocketAddr::new(self.config.local_ip.into(), self.config.local_rtp_port),
            ReceiverConfig {
                wav_path: Some(recording_path),
                raw_dump_path: None,
                observer: Some(rtp_tx),
            },
        )
        .await?;

        tokio::spawn(async move {
            while let Some(event) = rtp_rx.recv().await {
                if let RtpEvent::DatagramReceived(datagram) = event {
                    let _ = control_tx.send(ControlEvent::Rtp(datagram));
                }
            }
        });

        let duration = self.config.max_call_duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = self_tx.send(ControlMessage::Hangup);
        });

        self.active = Some(ActiveCall { session, receiver, sender: None });
        self.state = CallState::Established;
        info!(callee, %remote_rtp_addr, "call established");
        Ok(())
    }

    /// Tears the call down: stops the sender (if one is running), stops the
    /// receiver (which patches its WAV), sends BYE, then releases the
    /// signalling socket. The receiver is stopped — and its WAV patched —
    /// before BYE goes out, per the ordering guarantee in §5.
    pub async fn hangup(&mut self) -> Result<()> {
        let Some(mut call) = self.active.take() else {
            return Err(Error::NoActiveCall);
        };
        self.state = CallState::Terminating;

        if let Some(sender) = call.sender.take() {
            if let Err(e) = sender.stop().await {
                warn!(error = %e, "RTP sender stop failed");
            }
        }
        if let Err(e) = call.receiver.stop().await {
            warn!(error = %e, "RTP receiver stop failed");
        }
        if let Err(e) = call.session.bye().await {
            warn!(error = %e, "BYE failed, tearing down locally anyway");
        }
        call.session.close();

        self.state = CallState::Idle;
        info!("call terminated");
        Ok(())
    }

    /// Feeds `upload_dir/<filename>` into the RTP sender for the active
    /// call. Replaces any sender already running.
    pub async fn play_wav(&mut self, filename: &str) -> Result<()> {
        let call = self.active.as_mut().ok_or(Error::NoActiveCall)?;
        let path = self.config.upload_dir.join(filename);
        if !path.is_file() {
            return Err(Error::FileNotFound(filename.to_string()));
        }
        let remote_rtp_addr = call
            .session
            .remote_rtp_addr
            .expect("active call implies remote_rtp_addr is set");

        if let Some(previous) = call.sender.take() {
            let _ = previous.stop().await;
        }

        let local_addr = SocketAddr::new(self.config.local_ip.into(), self.config.rtp_send_port);
        let sender = rtp::spawn_sender(local_addr, remote_rtp_addr, path).await?;
        call.sender = Some(sender);
        Ok(())
    }

    /// Stores an uploaded payload under the upload directory. Size limits
    /// are enforced at parse time by [`ControlMessage::parse`]; this only
    /// does the filesystem write.
    pub fn upload_wav(&self, filename: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.config.upload_dir)?;
        let path = self.config.upload_dir.join(filename);
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Drives the orchestrator from a stream of parsed control messages,
/// replying on `control_tx`. Returns when `messages` closes.
pub async fn run_control_loop(
    mut orchestrator: Orchestrator,
    mut messages: UnboundedReceiver<ControlMessage>,
    control_tx: UnboundedSender<ControlEvent>,
    self_tx: UnboundedSender<ControlMessage>,
) {
    while let Some(message) = messages.recv().await {
        match message {
            ControlMessage::Call(digits) => {
                match orchestrator.call(&digits, control_tx.clone(), self_tx.clone()).await {
                    Ok(()) => {
                        let _ = control_tx.send(ControlEvent::WavAck(format!("calling {digits}")));
                    }
                    Err(e) => {
                        error!(error = %e, "call setup failed");
                        let _ = control_tx.send(ControlEvent::WavAck(format!("call failed: {e}")));
                    }
                }
            }
            ControlMessage::Hangup => {
                if let Err(e) = orchestrator.hangup().await {
                    warn!(error = %e, "hangup requested with no active call");
                }
            }
            ControlMessage::UploadWav { filename, bytes } => {
                let len = bytes.len();
                match orchestrator.upload_wav(&filename, &bytes) {
                    Ok(()) => {
                        let _ = control_tx
                            .send(ControlEvent::WavAck(format!("stored {filename} ({len} bytes)")));
                    }
                    Err(e) => {
                        let _ = control_tx.send(ControlEvent::WavAck(format!("upload failed: {e}")));
                    }
                }
            }
            ControlMessage::PlayWav { filename } => match orchestrator.play_wav(&filename).await {
                Ok(()) => {
                    let _ = control_tx.send(ControlEvent::WavAck(format!("playing {filename}")));
                }
                Err(e) => {
                    let _ = control_tx.send(ControlEvent::WavAck(format!("play failed: {e}")));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(upload_dir: PathBuf) -> OrchestratorConfig {
        OrchestratorConfig {
            caller: "1000".into(),
            local_ip: Ipv4Addr::LOCALHOST,
            local_sip_port: 0,
            server_host: "example.test".into(),
            server_addr: SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 5060),
            local_rtp_port: 0,
            rtp_send_port: 0,
            credentials: Credentials { username: "1000".into(), password: "secret".into() },
            upload_dir: upload_dir.clone(),
            recordings_dir: upload_dir,
            max_call_duration: Duration::from_secs(120),
        }
    }

    #[test]
    fn starts_idle() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(test_config(dir.path().to_path_buf()));
        assert_eq!(orchestrator.state(), CallState::Idle);
    }

    #[tokio::test]
    async fn hangup_without_a_call_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(test_config(dir.path().to_path_buf()));
        assert!(orchestrator.hangup().await.is_err());
    }

    #[test]
    fn upload_writes_file_under_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(test_config(dir.path().to_path_buf()));
        orchestrator.upload_wav("greeting.wav", &[1, 2, 3, 4, 5]).unwrap();
        let stored = std::fs::read(dir.path().join("greeting.wav")).unwrap();
        assert_eq!(stored, vec![1, 2, 3, 4, 5]);
    }
}
