//! GET: serves stored objects and generated documents in MTU-sized chunks.

use obexbox_protocol::time::format_iso8601;
use obexbox_protocol::{Header, ResponseCode};
use obexbox_storage::{CAPABILITY_TYPE, FOLDER_LISTING_TYPE, OpenKind, StorageError};

use super::{CommandHandler, apply_headers};
use crate::event::{Event, Object};
use crate::session::{Session, Target};

pub(crate) struct GetHandler;

impl CommandHandler for GetHandler {
    fn handle(&self, session: &mut Session, event: Event, object: &Object) {
        match event {
            Event::RequestHint => {
                session.begin_transfer();
                session.response.code = ResponseCode::Success;
            }
            Event::Request => open(session, object),
            Event::StreamEmpty => fill(session),
            Event::RequestComplete | Event::Abort | Event::LinkError | Event::ParseError => {
                session.end_transfer(false);
                if event == Event::Abort {
                    session.response.code = ResponseCode::Success;
                }
            }
            Event::StreamAvailable => {}
        }
    }
}

fn open(session: &mut Session, object: &Object) {
    if let Err(code) = apply_headers(&mut session.transfer, &object.headers) {
        fail(session, code);
        return;
    }

    let kind = match (session.transfer.mime_type(), session.transfer.object_name()) {
        (Some(FOLDER_LISTING_TYPE), _) => {
            if session.target != Target::FileTransfer {
                tracing::warn!(session = session.id(), "folder listing outside file transfer");
                fail(session, ResponseCode::Forbidden);
                return;
            }
            OpenKind::ListDirectory
        }
        (Some(CAPABILITY_TYPE), _) => OpenKind::Capability,
        (_, Some(_)) => OpenKind::Get,
        _ => {
            tracing::warn!(session = session.id(), "GET names neither object nor document");
            fail(session, ResponseCode::Forbidden);
            return;
        }
    };

    if let Err(e) = session.storage.open(&mut session.transfer, kind) {
        tracing::warn!(
            session = session.id(),
            name = session.transfer.name().unwrap_or_default(),
            path = %session.transfer.path,
            ?kind,
            error = %e,
            "cannot open object"
        );
        let code = match e {
            StorageError::InvalidName(_) | StorageError::InvalidSegment(_) => {
                ResponseCode::BadRequest
            }
            _ => ResponseCode::InternalServerError,
        };
        fail(session, code);
        return;
    }

    let transfer = &session.transfer;
    let headers = &mut session.response.headers;
    // Lengths beyond the 4-byte header are left unannounced.
    if let Some(length) = transfer.length.and_then(|len| u32::try_from(len).ok()) {
        headers.push(Header::Length(length));
    }
    if let Some(time) = &transfer.time {
        headers.push(Header::TimeIso(format_iso8601(time)));
    }
    if kind == OpenKind::Get {
        if let Some(mime) = transfer.mime_type() {
            headers.push(Header::Type(mime.to_string()));
        }
    }
    session.stream.remaining = session.transfer.length;
    session.response.code = ResponseCode::Success;
    tracing::debug!(
        session = session.id(),
        ?kind,
        length = ?session.transfer.length,
        "get started"
    );
}

fn fill(session: &mut Session) {
    session.response.body.clear();
    if !session.storage.is_open() {
        session.response.last_chunk = true;
        return;
    }

    if session.stream.remaining == Some(0) {
        session.response.last_chunk = true;
        return;
    }
    let want = match session.stream.remaining {
        Some(remaining) => usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(session.chunk_size()),
        None => session.chunk_size(),
    };
    if want == 0 {
        // No room in this packet; the body continues on the next round.
        return;
    }

    let mut buf = vec![0u8; want];
    match session.storage.read(&mut buf) {
        Ok(0) => {
            if let Some(missing) = session.stream.remaining {
                tracing::warn!(session = session.id(), missing, "object ended short");
                fail(session, ResponseCode::InternalServerError);
            }
            session.response.last_chunk = true;
        }
        Ok(n) => {
            buf.truncate(n);
            if let Some(remaining) = session.stream.remaining.as_mut() {
                *remaining = remaining.saturating_sub(n as u64);
            }
            session.response.last_chunk = session.stream.remaining == Some(0);
            session.response.body = buf;
        }
        Err(e) => {
            tracing::warn!(session = session.id(), error = %e, "read failed");
            fail(session, ResponseCode::InternalServerError);
            session.response.last_chunk = true;
        }
    }
}

fn fail(session: &mut Session, code: ResponseCode) {
    session.error = Some(code);
    session.response.code = code;
}
