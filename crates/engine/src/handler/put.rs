//! PUT: streams incoming objects into storage.
//!
//! The object is created on the first body chunk so even a zero-byte PUT
//! materializes. Creation and write failures are remembered and the rest of
//! the body is drained; the final response carries the failure and the
//! partial object is discarded. A PUT without any body is a delete request,
//! honoured only under File Transfer.

use obexbox_protocol::ResponseCode;
use obexbox_storage::{OpenKind, StorageError};

use super::{CommandHandler, apply_headers};
use crate::event::{Event, Object};
use crate::session::{Session, Target};

pub(crate) struct PutHandler;

impl CommandHandler for PutHandler {
    fn handle(&self, session: &mut Session, event: Event, object: &Object) {
        match event {
            Event::RequestHint => {
                session.begin_transfer();
                session.response.code = ResponseCode::Success;
            }
            Event::StreamAvailable => stream(session, object),
            Event::Request => finish(session, object),
            Event::RequestComplete => session.end_transfer(false),
            Event::Abort | Event::LinkError | Event::ParseError => {
                if session.storage.is_open() {
                    tracing::info!(
                        session = session.id(),
                        name = session.transfer.name().unwrap_or_default(),
                        ?event,
                        "put cancelled"
                    );
                }
                session.end_transfer(false);
                if event == Event::Abort {
                    session.response.code = ResponseCode::Success;
                }
            }
            Event::StreamEmpty => {}
        }
    }
}

fn stream(session: &mut Session, object: &Object) {
    session.stream.body_seen = true;
    if session.error.is_some() {
        return;
    }

    if !session.storage.is_open() {
        if let Err(code) = apply_headers(&mut session.transfer, &object.headers) {
            session.error = Some(code);
            session.response.code = code;
            return;
        }
        if let Err(e) = session.storage.open(&mut session.transfer, OpenKind::Put) {
            tracing::warn!(
                session = session.id(),
                name = session.transfer.name().unwrap_or_default(),
                path = %session.transfer.path,
                error = %e,
                "cannot create object"
            );
            session.error = Some(open_failure(&e));
            return;
        }
        tracing::debug!(
            session = session.id(),
            name = session.transfer.name().unwrap_or_default(),
            length = ?session.transfer.length,
            "put started"
        );
    }

    if object.body.is_empty() {
        return;
    }
    if let Err(e) = session.storage.write(&object.body) {
        tracing::warn!(session = session.id(), error = %e, "write failed, draining");
        session.error = Some(ResponseCode::Forbidden);
    }
}

fn finish(session: &mut Session, object: &Object) {
    if session.error.is_none() && !session.storage.is_open() {
        if let Err(code) = apply_headers(&mut session.transfer, &object.headers) {
            session.error = Some(code);
        } else if !session.stream.body_seen {
            delete(session);
            return;
        }
    }

    if let Some(code) = session.error {
        session.end_transfer(false);
        session.response.code = code;
        return;
    }

    match session.storage.close(&session.transfer, true) {
        Ok(()) => {
            tracing::info!(
                session = session.id(),
                name = session.transfer.name().unwrap_or_default(),
                path = %session.transfer.path,
                "object stored"
            );
            session.response.code = ResponseCode::Success;
        }
        Err(e) => {
            tracing::warn!(session = session.id(), error = %e, "commit failed");
            session.error = Some(ResponseCode::InternalServerError);
            session.response.code = ResponseCode::InternalServerError;
        }
    }
}

fn delete(session: &mut Session) {
    if session.target != Target::FileTransfer {
        tracing::warn!(session = session.id(), "delete outside file transfer");
        session.response.code = ResponseCode::Forbidden;
        return;
    }
    if session.transfer.object_name().is_none() {
        session.response.code = ResponseCode::BadRequest;
        return;
    }

    session.response.code = match session.storage.delete(&session.transfer) {
        Ok(()) => {
            tracing::info!(
                session = session.id(),
                name = session.transfer.name().unwrap_or_default(),
                path = %session.transfer.path,
                "object deleted"
            );
            ResponseCode::Success
        }
        Err(e) => {
            tracing::warn!(session = session.id(), error = %e, "delete failed");
            ResponseCode::Forbidden
        }
    };
}

fn open_failure(e: &StorageError) -> ResponseCode {
    match e {
        StorageError::MissingName => ResponseCode::BadRequest,
        _ => ResponseCode::Forbidden,
    }
}
