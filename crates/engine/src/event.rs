use obexbox_protocol::HeaderSet;

/// Protocol event delivered by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// First packet of a new request arrived.
    RequestHint,
    /// The final packet of the request arrived.
    Request,
    /// Response to the final packet was sent.
    RequestComplete,
    /// An incoming body chunk is available.
    StreamAvailable,
    /// The outgoing body needs another chunk.
    StreamEmpty,
    Abort,
    LinkError,
    ParseError,
}

impl Event {
    /// Events that end a request without a clean completion.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Abort | Self::LinkError | Self::ParseError)
    }
}

/// Data accompanying an event.
#[derive(Debug, Clone, Default)]
pub struct Object {
    /// Fixed non-header data of the request (CONNECT, SETPATH).
    pub nonheader: Vec<u8>,
    /// Non-body headers received so far in this request.
    pub headers: HeaderSet,
    /// Body chunk for `StreamAvailable`.
    pub body: Vec<u8>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(headers: HeaderSet) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    pub fn nonheader(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.nonheader = data.into();
        self
    }

    pub fn body(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.body = data.into();
        self
    }
}
