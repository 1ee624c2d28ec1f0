//! The client INVITE transaction and the dialog state it produces.
//!
//! One [`Dialog`] models exactly the single-call lifecycle this endpoint
//! supports: `invite()` drives INVITE through an optional digest challenge
//! up to ACK, `bye()` tears it down. Everything here runs on one task; the
//! `SipSession` it owns is never touched concurrently (§5).

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tracing::{debug, info, warn};

use sipline_udp_transport::{RecvOutcome, UdpEndpoint};

use crate::digest::{self, Challenge};
use crate::error::{Error, Result};
use crate::message::{self, RequestParams, Response};
use crate::sdp;

/// Poll cadence and give-up threshold for the signalling wait loop (§4.1).
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_POLLS_WITHOUT_PROGRESS: u32 = 30;
const BYE_POLLS: u32 = 5;
const INITIAL_CSEQ: u32 = 102;

/// Credentials used only to answer a digest challenge; never retained past
/// the INVITE that consumes them.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// The dialog identifiers and negotiated media state for the single call
/// this process manages (§3 `SipSession`).
pub struct SipSession {
    pub caller: String,
    pub local_ip: Ipv4Addr,
    pub local_sip_port: u16,

    pub server_host: String,
    pub server_addr: SocketAddr,
    pub callee: String,

    pub call_id: String,
    pub from_tag: String,
    pub to_tag: Option<String>,
    pub cseq: u32,

    pub local_rtp_port: u16,
    pub remote_rtp_addr: Option<SocketAddr>,

    pub call_established: bool,

    endpoint: UdpEndpoint,
}

impl SipSession {
    /// Binds the signalling socket and generates the identifiers that stay
    /// fixed for the life of the dialog (Call-ID, From-tag, initial CSeq).
    pub async fn init(
        caller: String,
        local_ip: Ipv4Addr,
        local_sip_port: u16,
        server_host: String,
        server_addr: SocketAddr,
        callee: String,
        local_rtp_port: u16,
    ) -> Result<Self> {
        let endpoint = UdpEndpoint::bind(SocketAddr::new(local_ip.into(), local_sip_port)).await?;
        let local_sip_port = endpoint.local_addr()?.port();

        Ok(Self {
            caller,
            local_ip,
            local_sip_port,
            call_id: format!("{}@{}", message::new_call_id_token(), server_host),
            server_host,
            server_addr,
            callee,
            from_tag: message::new_call_id_token(),
            to_tag: None,
            cseq: INITIAL_CSEQ,
            local_rtp_port,
            remote_rtp_addr: None,
            call_established: false,
            endpoint,
        })
    }

    fn from_uri(&self) -> String {
        format!("sip:{}@{}", self.caller, self.server_host)
    }

    fn to_uri(&self) -> String {
        format!("sip:{}@{}", self.callee, self.server_host)
    }

    fn request_uri(&self) -> String {
        format!("sip:{}@{}", self.callee, self.server_host)
    }

    fn contact(&self) -> String {
        format!("sip:{}@{}:{}", self.caller, self.local_ip, self.local_sip_port)
    }

    fn via_sent_by(&self) -> String {
        format!("{}:{}", self.local_ip, self.local_sip_port)
    }

    /// Drives the full INVITE transaction: optional one-shot digest retry,
    /// then ACK on 2xx. On return, `call_established` is true and
    /// `remote_rtp_addr` is populated. Any other outcome is an `Err` and the
    /// dialog is considered terminated locally (§4.1 "Failures").
    pub async fn invite(&mut self, creds: &Credentials) -> Result<()> {
        self.endpoint.drain();

        let invite_uri = self.request_uri();
        let offer = sdp::build_offer(self.local_ip, self.local_rtp_port, "sipline");

        let mut extra_headers: Vec<(String, String)> = Vec::new();
        let mut already_authenticated = false;

        loop {
            let branch = message::new_branch();
            let params = RequestParams {
                method: "INVITE",
                request_uri: &invite_uri,
                via_branch: &branch,
                via_sent_by: &self.via_sent_by(),
                max_forwards: 70,
                from_uri: &self.from_uri(),
                from_tag: &self.from_tag,
                to_uri: &self.to_uri(),
                to_tag: None,
                contact: Some(&self.contact()),
                call_id: &self.call_id,
                cseq: self.cseq,
                cseq_method: "INVITE",
                extra_headers: &extra_headers,
                body: Some(&offer),
            };
            let request = message::build_request(&params);
            info!(cseq = self.cseq, authenticated = already_authenticated, "sending INVITE");
            self.endpoint.send_to(request.as_bytes(), self.server_addr).await?;

            match self.wait_for_invite_outcome().await? {
                InviteOutcome::Established(resp) => {
                    self.apply_to_tag(&resp);
                    let answer = sdp::parse_answer(&resp.body)?;
                    self.remote_rtp_addr =
                        Some(SocketAddr::new(self.server_addr.ip(), answer.rtp_port));
                    self.send_ack(self.to_tag.clone()).await?;
                    self.call_established = true;
                    return Ok(());
                }
                InviteOutcome::Challenge(resp) => {
                    if already_authenticated {
                        return Err(Error::AuthFailure(
                            "received a second challenge after authenticated retry".into(),
                        ));
                    }
                    let header_name = if resp.status_code == 401 {
                        "WWW-Authenticate"
                    } else {
                        "Proxy-Authenticate"
                    };
                    let header = resp.header(header_name).ok_or_else(|| {
                        Error::AuthFailure(format!("missing {header_name} on challenge"))
                    })?;
                    let challenge = Challenge::parse(header).ok_or_else(|| {
                        Error::AuthFailure("challenge missing realm or nonce".into())
                    })?;

                    let response = digest::compute_response(
                        &creds.username,
                        &creds.password,
                        &challenge.realm,
                        &challenge.nonce,
                        "INVITE",
                        &invite_uri,
                    );
                    let auth_header = digest::authorization_header(
                        &creds.username,
                        &challenge.realm,
                        &challenge.nonce,
                        &invite_uri,
                        &response,
                    );
                    extra_headers = vec![("Authorization".to_string(), auth_header)];
                    already_authenticated = true;
                    self.endpoint.drain();
                    // Same CSeq on the authenticated retry, per RFC 3261 §22.2.
                }
                InviteOutcome::Rejected { code, reason } => {
                    return Err(Error::Rejected { code, reason });
                }
            }
        }
    }

    /// Uses the To-tag from the 2xx itself; the RFC-correct behavior (§9
    /// flags the source stack's "use the 183's To-tag" shortcut as a bug).
    fn apply_to_tag(&mut self, final_response: &Response) {
        if let Some(tag) = final_response.to_tag() {
            self.to_tag = Some(tag);
        }
    }

    async fn wait_for_invite_outcome(&mut self) -> Result<InviteOutcome> {
        let mut polls_without_progress = 0u32;
        loop {
            match self.endpoint.recv_timeout(POLL_INTERVAL, 4096).await {
                RecvOutcome::Datagram { data, .. } => {
                    polls_without_progress = 0;
                    let resp = match message::parse_response(&data) {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(error = %e, "dropping unparsable datagram while waiting on INVITE");
                            continue;
                        }
                    };
                    match resp.status_code {
                        100 => {
                            debug!("100 Trying");
                        }
                        180..=189 => {
                            debug!(code = resp.status_code, "provisional response");
                        }
                        200..=299 => return Ok(InviteOutcome::Established(resp)),
                        401 | 407 => return Ok(InviteOutcome::Challenge(resp)),
                        403 => {
                            return Ok(InviteOutcome::Rejected {
                                code: 403,
                                reason: resp.reason,
                            })
                        }
                        code if code >= 300 => {
                            return Ok(InviteOutcome::Rejected { code, reason: resp.reason })
                        }
                        _ => {}
                    }
                }
                RecvOutcome::Timeout => {
                    polls_without_progress += 1;
                    if polls_without_progress >= MAX_POLLS_WITHOUT_PROGRESS {
                        return Err(Error::Timeout("no response to INVITE".into()));
                    }
                }
                RecvOutcome::Closed => return Err(Error::Timeout("signalling socket closed".into())),
            }
        }
    }

    /// ACK for the 2xx: fresh branch, separate transaction, no response
    /// expected. Awaited in place — the caller relies on this having hit the
    /// wire before treating the call as established (§5).
    async fn send_ack(&self, to_tag: Option<String>) -> Result<()> {
        let branch = message::new_branch();
        let params = RequestParams {
            method: "ACK",
            request_uri: &self.request_uri(),
            via_branch: &branch,
            via_sent_by: &self.via_sent_by(),
            max_forwards: 70,
            from_uri: &self.from_uri(),
            from_tag: &self.from_tag,
            to_uri: &self.to_uri(),
            to_tag: to_tag.as_deref(),
            contact: None,
            call_id: &self.call_id,
            cseq: self.cseq,
            cseq_method: "ACK",
            extra_headers: &[],
            body: None,
        };
        let request = message::build_request(&params);
        self.endpoint.send_to(request.as_bytes(), self.server_addr).await?;
        info!("sent ACK");
        Ok(())
    }

    /// Sends BYE and waits briefly for a 200, logging but not requiring it.
    pub async fn bye(&mut self) -> Result<()> {
        self.endpoint.drain();
        let bye_cseq = self.cseq + 1;
        let branch = message::new_branch();
        let params = RequestParams {
            method: "BYE",
            request_uri: &self.request_uri(),
            via_branch: &branch,
            via_sent_by: &self.via_sent_by(),
            max_forwards: 70,
            from_uri: &self.from_uri(),
            from_tag: &self.from_tag,
            to_uri: &self.to_uri(),
            to_tag: self.to_tag.as_deref(),
            contact: None,
            call_id: &self.call_id,
            cseq: bye_cseq,
            cseq_method: "BYE",
            extra_headers: &[],
            body: None,
        };
        let request = message::build_request(&params);
        info!("sending BYE");
        self.endpoint.send_to(request.as_bytes(), self.server_addr).await?;

        for _ in 0..BYE_POLLS {
            match self.endpoint.recv_timeout(POLL_INTERVAL, 4096).await {
                RecvOutcome::Datagram { data, .. } => {
                    if let Ok(resp) = message::parse_response(&data) {
                        if resp.is_success() {
                            info!("BYE acknowledged with 200");
                        }
                        break;
                    }
                }
                RecvOutcome::Timeout => continue,
                RecvOutcome::Closed => break,
            }
        }
        Ok(())
    }

    /// Releases the signalling socket.
    pub fn close(&self) {
        self.endpoint.close();
    }
}

enum InviteOutcome {
    Established(Response),
    Challenge(Response),
    Rejected { code: u16, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    async fn peer_socket() -> (UdpSocket, SocketAddr) {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap();
        (sock, addr)
    }

    #[tokio::test]
    async fn happy_path_establishes_with_to_tag_and_rtp_port() {
        let (peer, peer_addr) = peer_socket().await;
        let mut session = SipSession::init(
            "0938220136".into(),
            "127.0.0.1".parse().unwrap(),
            0,
            "192.168.1.170".into(),
            peer_addr,
            "0938220136".into(),
            15000,
        )
        .await
        .unwrap();

        let creds = Credentials { username: "voip".into(), password: "qwER12#$".into() };

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            let (_, from) = peer.recv_from(&mut buf).await.unwrap();

            let trying = b"SIP/2.0 100 Trying\r\nTo: <sip:x@y>\r\nContent-Length: 0\r\n\r\n";
            peer.send_to(trying, from).await.unwrap();

            let ringing = b"SIP/2.0 183 Session Progress\r\nTo: <sip:x@y>;tag=abc\r\nContent-Length: 0\r\n\r\n";
            peer.send_to(ringing, from).await.unwrap();

            let body = "v=0\r\nm=audio 40000 RTP/AVP 0\r\n";
            let ok = format!(
                "SIP/2.0 200 OK\r\nTo: <sip:x@y>;tag=abc\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            peer.send_to(ok.as_bytes(), from).await.unwrap();

            // Absorb the ACK so the spawned sender doesn't see a send error.
            let _ = tokio::time::timeout(Duration::from_millis(200), peer.recv_from(&mut buf)).await;
        });

        session.invite(&creds).await.unwrap();
        responder.await.unwrap();

        assert!(session.call_established);
        assert_eq!(session.to_tag.as_deref(), Some("abc"));
        assert_eq!(session.remote_rtp_addr.unwrap().port(), 40000);
    }

    #[tokio::test]
    async fn second_challenge_after_retry_is_auth_failure() {
        let (peer, peer_addr) = peer_socket().await;
        let mut session = SipSession::init(
            "alice".into(),
            "127.0.0.1".parse().unwrap(),
            0,
            "example.com".into(),
            peer_addr,
            "bob".into(),
            15000,
        )
        .await
        .unwrap();
        let creds = Credentials { username: "alice".into(), password: "secret".into() };

        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            let challenge = b"SIP/2.0 401 Unauthorized\r\nTo: <sip:x@y>\r\nWWW-Authenticate: Digest realm=\"asterisk\", nonce=\"n1\"\r\nContent-Length: 0\r\n\r\n";
            for _ in 0..2 {
                let (_, from) = peer.recv_from(&mut buf).await.unwrap();
                peer.send_to(challenge, from).await.unwrap();
            }
        });

        let err = session.invite(&creds).await.unwrap_err();
        assert!(matches!(err, Error::AuthFailure(_)));
    }

    #[tokio::test]
    async fn terminal_rejection_is_surfaced() {
        let (peer, peer_addr) = peer_socket().await;
        let mut session = SipSession::init(
            "alice".into(),
            "127.0.0.1".parse().unwrap(),
            0,
            "example.com".into(),
            peer_addr,
            "bob".into(),
            15000,
        )
        .await
        .unwrap();
        let creds = Credentials { username: "alice".into(), password: "secret".into() };

        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            let (_, from) = peer.recv_from(&mut buf).await.unwrap();
            let busy = b"SIP/2.0 486 Busy Here\r\nTo: <sip:x@y>\r\nContent-Length: 0\r\n\r\n";
            peer.send_to(busy, from).await.unwrap();
        });

        let err = session.invite(&creds).await.unwrap_err();
        assert!(matches!(err, Error::Rejected { code: 486, .. }));
    }
}
