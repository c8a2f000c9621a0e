//! Packet driver: turns request packets into engine events and renders the
//! session's response after each one.
//!
//! ```text
//! first packet        -> RequestHint
//! Body / EndOfBody    -> StreamAvailable (one per header)
//! final packet        -> Request
//! GET response body   -> StreamEmpty (one per response packet)
//! response written    -> RequestComplete
//! ABORT               -> bare Abort, answered Success
//! undecodable packet  -> ParseError, answered BadRequest
//! EOF / I/O failure   -> LinkError
//! ```

use std::io::{Read, Write};

use obexbox_engine::{Event, Object, Session, dispatch};
use obexbox_protocol::{
    Command, ConnectInfo, Header, HeaderSet, ProtocolError, RequestPacket, ResponseCode,
    ResponsePacket, read_packet,
};

use crate::TransportError;

/// Response code byte plus the 2-byte packet length.
const PACKET_PREFIX: usize = 3;

/// Header id plus the 2-byte header length of Body/EndOfBody.
const BODY_PREFIX: usize = 3;

/// A request spread over one or more packets.
struct Pending {
    command: Command,
    nonheader: Vec<u8>,
    /// Non-body headers gathered so far.
    headers: HeaderSet,
    /// The final request packet arrived and the response body is streaming.
    sending: bool,
    /// Response headers still to go out; `None` before the first chunk.
    unsent: Option<HeaderSet>,
}

impl Pending {
    fn new(command: Command, nonheader: Vec<u8>) -> Self {
        Self {
            command,
            nonheader,
            headers: HeaderSet::new(),
            sending: false,
            unsent: None,
        }
    }
}

/// One peer's link, driving a [`Session`].
pub struct Connection<S> {
    stream: S,
    session: Session,
    pending: Option<Pending>,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, session: Session) -> Self {
        Self {
            stream,
            session,
            pending: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_parts(self) -> (S, Session) {
        (self.stream, self.session)
    }

    /// Serves requests until the peer disconnects or the link fails.
    ///
    /// A clean end of stream returns `Ok`. The session is torn down on every
    /// exit path.
    pub fn serve(&mut self) -> Result<(), TransportError> {
        let result = self.pump();
        if !self.session.is_closed() {
            self.pending = None;
            dispatch(&mut self.session, Event::LinkError, None, &Object::new());
        }
        result
    }

    fn pump(&mut self) -> Result<(), TransportError> {
        loop {
            let raw = match read_packet(&mut self.stream) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    tracing::debug!(session = self.session.id(), "peer closed the link");
                    return Ok(());
                }
                Err(ProtocolError::Io(e)) => return Err(e.into()),
                Err(e) => {
                    // Framing is lost; nothing after this packet can be trusted.
                    tracing::warn!(session = self.session.id(), error = %e, "unreadable packet");
                    self.parse_error()?;
                    return Err(e.into());
                }
            };

            match RequestPacket::decode(&raw) {
                Ok(packet) => self.handle(packet)?,
                Err(e) => {
                    tracing::warn!(session = self.session.id(), error = %e, "malformed packet");
                    self.parse_error()?;
                }
            }

            if self.session.is_closed() {
                return Ok(());
            }
        }
    }

    fn handle(&mut self, packet: RequestPacket) -> Result<(), TransportError> {
        if packet.command == Command::Abort {
            return self.abort();
        }

        let mut pending = match self.pending.take() {
            Some(pending) if pending.command == packet.command => pending,
            stale => {
                if let Some(stale) = stale {
                    tracing::debug!(
                        session = self.session.id(),
                        command = %stale.command,
                        "request abandoned by the peer"
                    );
                    dispatch(&mut self.session, Event::Abort, None, &Object::new());
                }
                let hint = Object::with_headers(packet.headers.without_body())
                    .nonheader(packet.nonheader.clone());
                dispatch(&mut self.session, Event::RequestHint, Some(packet.command), &hint);
                Pending::new(packet.command, packet.nonheader.clone())
            }
        };

        if pending.sending {
            // Continuation of a GET: the peer asks for the next chunk.
            return self.send_chunk(pending);
        }

        for header in packet.headers.iter() {
            match header {
                Header::Body(data) | Header::EndOfBody(data) => {
                    let chunk = Object::with_headers(pending.headers.clone()).body(data.clone());
                    dispatch(&mut self.session, Event::StreamAvailable, None, &chunk);
                }
                other => pending.headers.push(other.clone()),
            }
        }

        if !packet.is_final {
            if !self.session.response().code.is_success() {
                return self.complete(pending.command);
            }
            self.send(&ResponsePacket::new(ResponseCode::Continue))?;
            self.pending = Some(pending);
            return Ok(());
        }

        let request =
            Object::with_headers(pending.headers.clone()).nonheader(pending.nonheader.clone());
        dispatch(&mut self.session, Event::Request, Some(pending.command), &request);

        if pending.command == Command::Get && self.session.response().code.is_success() {
            pending.sending = true;
            return self.send_chunk(pending);
        }
        self.complete(pending.command)
    }

    /// Sends the session's response as the final answer and closes the request.
    fn complete(&mut self, command: Command) -> Result<(), TransportError> {
        let response = self.session.response();
        let mut packet = ResponsePacket::new(response.code);
        packet.nonheader = response.nonheader.clone();
        packet.headers = response.headers.clone();
        if command == Command::Connect && packet.nonheader.is_empty() {
            packet.nonheader = ConnectInfo::new(self.session.max_packet()).encode();
        }
        self.send(&packet)?;
        dispatch(&mut self.session, Event::RequestComplete, Some(command), &Object::new());
        Ok(())
    }

    /// Sends one GET response packet carrying the next body chunk.
    ///
    /// Response headers too large to leave room for body go out first, in
    /// bodiless Continue packets that each fit the negotiated packet size.
    fn send_chunk(&mut self, mut pending: Pending) -> Result<(), TransportError> {
        let mut headers = match pending.unsent.take() {
            Some(headers) => headers,
            None => self.session.response().headers.clone(),
        };
        let limit = usize::from(self.session.max_packet()).saturating_sub(PACKET_PREFIX);
        let room = limit.saturating_sub(headers.encoded_len() + BODY_PREFIX);

        if room == 0 && !headers.is_empty() {
            let (now, later) = split_headers(headers, limit);
            tracing::debug!(
                session = self.session.id(),
                sent = now.len(),
                left = later.len(),
                "response headers sent ahead of the body"
            );
            let mut packet = ResponsePacket::new(ResponseCode::Continue);
            packet.headers = now;
            self.send(&packet)?;
            pending.unsent = Some(later);
            self.pending = Some(pending);
            return Ok(());
        }

        self.session.set_chunk_size(room);
        dispatch(&mut self.session, Event::StreamEmpty, None, &Object::new());

        if !self.session.response().code.is_success() {
            return self.complete(pending.command);
        }

        let body = std::mem::take(&mut self.session.response_mut().body);
        if self.session.response().last_chunk {
            headers.push(Header::EndOfBody(body));
            let mut packet = ResponsePacket::new(ResponseCode::Success);
            packet.headers = headers;
            self.send(&packet)?;
            dispatch(
                &mut self.session,
                Event::RequestComplete,
                Some(pending.command),
                &Object::new(),
            );
            return Ok(());
        }

        headers.push(Header::Body(body));
        let mut packet = ResponsePacket::new(ResponseCode::Continue);
        packet.headers = headers;
        self.send(&packet)?;
        pending.unsent = Some(HeaderSet::new());
        self.pending = Some(pending);
        Ok(())
    }

    fn abort(&mut self) -> Result<(), TransportError> {
        if let Some(pending) = self.pending.take() {
            tracing::info!(
                session = self.session.id(),
                command = %pending.command,
                "request aborted by the peer"
            );
        }
        dispatch(&mut self.session, Event::Request, Some(Command::Abort), &Object::new());
        self.send(&ResponsePacket::new(ResponseCode::Success))
    }

    fn parse_error(&mut self) -> Result<(), TransportError> {
        if self.pending.take().is_some() {
            dispatch(&mut self.session, Event::ParseError, None, &Object::new());
        }
        self.send(&ResponsePacket::new(ResponseCode::BadRequest))
    }

    fn send(&mut self, packet: &ResponsePacket) -> Result<(), TransportError> {
        let bytes = packet.encode()?;
        self.stream.write_all(&bytes)?;
        self.stream.flush()?;
        tracing::debug!(
            session = self.session.id(),
            code = ?packet.code,
            len = bytes.len(),
            "response sent"
        );
        Ok(())
    }
}

/// Splits `headers` into the leading run that fits in `limit` bytes and the
/// rest. The first header always goes, so every packet makes progress.
fn split_headers(headers: HeaderSet, limit: usize) -> (HeaderSet, HeaderSet) {
    let mut now = HeaderSet::new();
    let mut later = HeaderSet::new();
    let mut used = 0;
    for header in headers {
        let len = header.encoded_len();
        if later.is_empty() && (now.is_empty() || used + len <= limit) {
            used += len;
            now.push(header);
        } else {
            later.push(header);
        }
    }
    (now, later)
}
