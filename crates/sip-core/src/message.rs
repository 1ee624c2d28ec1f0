//! SIP request/response wire format: bit-exact request construction for the
//! messages this stack sends (INVITE, ACK, BYE) and a tolerant parser for
//! whatever a peer sends back. Extra headers on receive are accepted and
//! ignored, per §6.

use std::fmt::Write as _;

use crate::error::{Error, Result};

/// Fields common to every request this stack builds.
pub struct RequestParams<'a> {
    pub method: &'a str,
    pub request_uri: &'a str,
    pub via_branch: &'a str,
    pub via_sent_by: &'a str,
    pub max_forwards: u32,
    pub from_uri: &'a str,
    pub from_tag: &'a str,
    pub to_uri: &'a str,
    pub to_tag: Option<&'a str>,
    pub contact: Option<&'a str>,
    pub call_id: &'a str,
    pub cseq: u32,
    pub cseq_method: &'a str,
    pub extra_headers: &'a [(String, String)],
    pub body: Option<&'a str>,
}

/// Serializes a request exactly per the field order in §4.1: Via,
/// Max-Forwards, From, To, Contact, Call-ID, CSeq, extra headers,
/// Content-Type/Content-Length, then the body.
pub fn build_request(params: &RequestParams) -> String {
    let mut out = String::new();
    let _ = write!(out, "{} {} SIP/2.0\r\n", params.method, params.request_uri);
    let _ = write!(
        out,
        "Via: SIP/2.0/UDP {};branch={}\r\n",
        params.via_sent_by, params.via_branch
    );
    let _ = write!(out, "Max-Forwards: {}\r\n", params.max_forwards);

    let _ = write!(out, "From: <{}>;tag={}\r\n", params.from_uri, params.from_tag);
    match params.to_tag {
        Some(tag) => {
            let _ = write!(out, "To: <{}>;tag={}\r\n", params.to_uri, tag);
        }
        None => {
            let _ = write!(out, "To: <{}>\r\n", params.to_uri);
        }
    }

    if let Some(contact) = params.contact {
        let _ = write!(out, "Contact: <{contact}>\r\n");
    }

    let _ = write!(out, "Call-ID: {}\r\n", params.call_id);
    let _ = write!(out, "CSeq: {} {}\r\n", params.cseq, params.cseq_method);

    for (name, value) in params.extra_headers {
        let _ = write!(out, "{name}: {value}\r\n");
    }

    match params.body {
        Some(body) => {
            out.push_str("Content-Type: application/sdp\r\n");
            let _ = write!(out, "Content-Length: {}\r\n\r\n", body.len());
            out.push_str(body);
        }
        None => {
            out.push_str("Content-Length: 0\r\n\r\n");
        }
    }

    out
}

/// A response parsed off the wire. Headers preserve the order received;
/// lookups are case-insensitive per RFC 3261 §7.3.1.
#[derive(Debug, Clone)]
pub struct Response {
    pub status_code: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `tag=` parameter off the To header, if any.
    pub fn to_tag(&self) -> Option<String> {
        self.header("To").and_then(extract_tag)
    }

    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.status_code)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_auth_challenge(&self) -> bool {
        self.status_code == 401 || self.status_code == 407
    }
}

/// Extracts `;tag=...` from a To/From header value.
fn extract_tag(header_value: &str) -> Option<String> {
    header_value.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("tag=").map(|t| t.trim_matches('"').to_string())
    })
}

/// Parses a raw UDP datagram into a status line + headers + body. Tolerant
/// of extra/unknown headers; only the status line is required to be
/// well-formed.
pub fn parse_response(raw: &[u8]) -> Result<Response> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| Error::protocol("response is not valid UTF-8"))?;

    let (head, body) = match text.split_once("\r\n\r\n") {
        Some((h, b)) => (h, b),
        None => (text, ""),
    };

    let mut lines = head.lines();
    let status_line = lines
        .next()
        .ok_or_else(|| Error::protocol("empty response"))?;

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("SIP/2.0") {
        return Err(Error::protocol(format!("not a SIP response: {status_line}")));
    }
    let status_code: u16 = parts
        .next()
        .ok_or_else(|| Error::protocol("missing status code"))?
        .parse()
        .map_err(|_| Error::protocol("non-numeric status code"))?;
    let reason = parts.next().unwrap_or("").to_string();

    let mut headers = Vec::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(Response {
        status_code,
        reason,
        headers,
        body: body.to_string(),
    })
}

/// Generates a fresh `z9hG4bK`-prefixed branch parameter, unique per
/// client transaction as required by RFC 3261 §8.1.1.7.
pub fn new_branch() -> String {
    format!("z9hG4bK{}", hex_random(16))
}

/// Generates a Call-ID local part.
pub fn new_call_id_token() -> String {
    hex_random(16)
}

fn hex_random(bytes: usize) -> String {
    use rand::RngCore;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_line_and_to_tag() {
        let raw = b"SIP/2.0 200 OK\r\nTo: <sip:bob@h>;tag=abc\r\nContent-Length: 0\r\n\r\n";
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.reason, "OK");
        assert_eq!(resp.to_tag().as_deref(), Some("abc"));
        assert!(resp.is_success());
    }

    #[test]
    fn tolerates_unknown_extra_headers() {
        let raw = b"SIP/2.0 180 Ringing\r\nX-Custom: whatever\r\nTo: <sip:bob@h>\r\n\r\n";
        let resp = parse_response(raw).unwrap();
        assert!(resp.is_provisional());
        assert!(resp.to_tag().is_none());
    }

    #[test]
    fn non_sip_datagram_is_protocol_error() {
        assert!(parse_response(b"garbage").is_err());
    }

    #[test]
    fn branch_has_magic_cookie_prefix() {
        assert!(new_branch().starts_with("z9hG4bK"));
    }
}
