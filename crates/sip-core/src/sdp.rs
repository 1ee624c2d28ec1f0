//! Minimal SDP (RFC 4566) support: build the offer this stack sends, and
//! pull the one piece of the answer the call orchestrator actually needs —
//! the negotiated `m=audio` port.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Builds the fixed offer body described in §4.1 of the endpoint's design:
/// PCMU/PCMA/telephone-event, sendrecv, ptime 20. Field order matches the
/// spec bit-for-bit since some peers are picky about it.
pub fn build_offer(local_ip: Ipv4Addr, local_rtp_port: u16, session_name: &str) -> String {
    format!(
        "v=0\r\n\
         o=- 0 0 IN IP4 {local_ip}\r\n\
         s={session_name}\r\n\
         c=IN IP4 {local_ip}\r\n\
         t=0 0\r\n\
         m=audio {local_rtp_port} RTP/AVP 0 8 101\r\n\
         a=rtpmap:0 PCMU/8000\r\n\
         a=rtpmap:8 PCMA/8000\r\n\
         a=rtpmap:101 telephone-event/8000\r\n\
         a=fmtp:101 0-16\r\n\
         a=ptime:20\r\n\
         a=sendrecv\r\n"
    )
}

/// Extracts the port from the first `m=audio <port> ...` line, and the
/// connection address from `c=IN IP4 <addr>` if present.
pub fn parse_answer(body: &str) -> Result<ParsedAnswer> {
    let mut port = None;
    let mut addr = None;

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("m=audio ") {
            let port_str = rest.split_whitespace().next().ok_or_else(|| {
                Error::protocol("malformed m=audio line: missing port")
            })?;
            port = Some(port_str.parse::<u16>().map_err(|_| {
                Error::protocol(format!("malformed m=audio port: {port_str}"))
            })?);
        } else if let Some(rest) = line.strip_prefix("c=IN IP4 ") {
            addr = rest.trim().parse::<Ipv4Addr>().ok();
        }
    }

    let port = port.ok_or_else(|| Error::protocol("SDP answer has no m=audio line"))?;
    Ok(ParsedAnswer { rtp_port: port, connection_addr: addr })
}

/// Media details pulled out of an answer SDP.
#[derive(Debug, Clone, Copy)]
pub struct ParsedAnswer {
    pub rtp_port: u16,
    pub connection_addr: Option<Ipv4Addr>,
}

/// Extracts the payload type numbers advertised on the `m=audio` line, used
/// by the offer/parse round-trip test to confirm the set survives intact.
pub fn payload_types(body: &str) -> Option<Vec<u8>> {
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("m=audio ") {
            let mut parts = rest.split_whitespace();
            let _port = parts.next()?;
            let _proto = parts.next()?; // "RTP/AVP"
            return Some(parts.filter_map(|p| p.parse().ok()).collect());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_round_trips_port_and_payload_types() {
        let ip: Ipv4Addr = "192.168.1.50".parse().unwrap();
        let offer = build_offer(ip, 40000, "sipline");
        let parsed = parse_answer(&offer).unwrap();
        assert_eq!(parsed.rtp_port, 40000);
        assert_eq!(payload_types(&offer), Some(vec![0, 8, 101]));
    }

    #[test]
    fn answer_without_m_audio_is_protocol_error() {
        let body = "v=0\r\no=- 0 0 IN IP4 1.2.3.4\r\ns=-\r\nt=0 0\r\n";
        assert!(parse_answer(body).is_err());
    }

    #[test]
    fn answer_with_m_audio_only_sets_port() {
        let body = "v=0\r\nm=audio 40000 RTP/AVP 0\r\n";
        let parsed = parse_answer(body).unwrap();
        assert_eq!(parsed.rtp_port, 40000);
        assert!(parsed.connection_addr.is_none());
    }
}
