//! Command state handlers, one per implemented OBEX command.

mod connect;
mod disconnect;
mod get;
mod put;
mod setpath;

use obexbox_protocol::{Command, HeaderSet, ResponseCode};
use obexbox_storage::{StorageError, TransferContext};

use crate::event::{Event, Object};
use crate::session::Session;

/// Reacts to the events of one command.
///
/// Handlers report back only through the session: its response, its
/// transfer context and its error slot.
pub(crate) trait CommandHandler: Sync {
    fn handle(&self, session: &mut Session, event: Event, object: &Object);
}

static CONNECT: connect::ConnectHandler = connect::ConnectHandler;
static DISCONNECT: disconnect::DisconnectHandler = disconnect::DisconnectHandler;
static PUT: put::PutHandler = put::PutHandler;
static GET: get::GetHandler = get::GetHandler;
static SETPATH: setpath::SetPathHandler = setpath::SetPathHandler;

pub(crate) fn for_command(command: Command) -> Option<&'static dyn CommandHandler> {
    match command {
        Command::Connect => Some(&CONNECT),
        Command::Disconnect => Some(&DISCONNECT),
        Command::Put => Some(&PUT),
        Command::Get => Some(&GET),
        Command::SetPath => Some(&SETPATH),
        Command::Abort | Command::Other(_) => None,
    }
}

/// Copies Name, Type, Length and Time into `transfer`, validating as it
/// goes. Any violation is a `BadRequest`.
pub(crate) fn apply_headers(
    transfer: &mut TransferContext,
    headers: &HeaderSet,
) -> Result<(), ResponseCode> {
    if let Some(name) = headers.name() {
        transfer.set_name(name).map_err(rejected)?;
    }
    if let Some(mime) = headers.mime_type() {
        transfer.set_type(mime).map_err(rejected)?;
    }
    if let Some(length) = headers
        .length()
        .map(u64::from)
        .or_else(|| http_content_length(headers))
    {
        transfer.length = Some(length);
    }
    match headers.time() {
        Ok(Some(time)) => transfer.time = Some(time),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "rejected time header");
            return Err(ResponseCode::BadRequest);
        }
    }
    Ok(())
}

fn rejected(e: StorageError) -> ResponseCode {
    tracing::warn!(error = %e, "rejected header");
    ResponseCode::BadRequest
}

/// Length carried as `Content-Length` in an HTTP header, used for objects
/// too large for the 4-byte Length header.
fn http_content_length(headers: &HeaderSet) -> Option<u64> {
    headers
        .http()
        .filter_map(|raw| std::str::from_utf8(raw).ok())
        .flat_map(str::lines)
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if !key.trim().eq_ignore_ascii_case("Content-Length") {
                return None;
            }
            value.trim().parse().ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use obexbox_protocol::Header;

    #[test]
    fn applies_valid_headers() {
        let headers: HeaderSet = [
            Header::Name("a.txt".into()),
            Header::Type("text/plain".into()),
            Header::Length(3),
            Header::TimeIso("20240131T235958Z".into()),
        ]
        .into_iter()
        .collect();
        let mut t = TransferContext::new();
        apply_headers(&mut t, &headers).unwrap();
        assert_eq!(t.name(), Some("a.txt"));
        assert_eq!(t.mime_type(), Some("text/plain"));
        assert_eq!(t.length, Some(3));
        assert!(t.time.is_some());
    }

    #[test]
    fn rejects_bad_name_and_type() {
        let mut t = TransferContext::new();
        let bad_name: HeaderSet = [Header::Name("../x".into())].into_iter().collect();
        assert_eq!(apply_headers(&mut t, &bad_name), Err(ResponseCode::BadRequest));
        let bad_type: HeaderSet = [Header::Type("nope".into())].into_iter().collect();
        assert_eq!(apply_headers(&mut t, &bad_type), Err(ResponseCode::BadRequest));
        let bad_time: HeaderSet = [Header::TimeIso("yesterday".into())].into_iter().collect();
        assert_eq!(apply_headers(&mut t, &bad_time), Err(ResponseCode::BadRequest));
    }

    #[test]
    fn large_length_from_http_header() {
        let headers: HeaderSet = [Header::Http(
            b"X-Other: 1\r\nContent-Length: 5000000000\r\n".to_vec(),
        )]
        .into_iter()
        .collect();
        let mut t = TransferContext::new();
        apply_headers(&mut t, &headers).unwrap();
        assert_eq!(t.length, Some(5_000_000_000));
    }

    #[test]
    fn handler_table() {
        assert!(for_command(Command::Put).is_some());
        assert!(for_command(Command::Abort).is_none());
        assert!(for_command(Command::Other(0x06)).is_none());
    }
}
