//! SETPATH: navigates the virtual path of a File Transfer session.

use obexbox_protocol::{ResponseCode, SetPathFlags};

use super::CommandHandler;
use crate::event::{Event, Object};
use crate::session::Session;

pub(crate) struct SetPathHandler;

impl CommandHandler for SetPathHandler {
    fn handle(&self, session: &mut Session, event: Event, object: &Object) {
        match event {
            Event::RequestHint => {
                session.begin_transfer();
                session.response.code = ResponseCode::Success;
            }
            Event::Request => {
                session.response.code = match set_path(session, object) {
                    Ok(()) => ResponseCode::Success,
                    Err(()) => ResponseCode::BadRequest,
                };
            }
            _ => {}
        }
    }
}

fn set_path(session: &mut Session, object: &Object) -> Result<(), ()> {
    let flags = SetPathFlags::from_nonheader(&object.nonheader).map_err(|e| {
        tracing::warn!(session = session.id(), error = %e, "malformed SETPATH");
    })?;

    if flags.contains(SetPathFlags::LEVEL_UP) {
        session.transfer.path.pop();
    }

    let name = match object.headers.name() {
        None => return Ok(()),
        Some("") => {
            session.transfer.path.clear();
            return Ok(());
        }
        Some(name) => name,
    };

    session.transfer.path.push(name).map_err(|e| {
        tracing::warn!(session = session.id(), error = %e, "rejected folder name");
    })?;

    let path = session.transfer.path.clone();
    let ready = match session.storage.check_directory(&path) {
        Ok(true) => Ok(()),
        Ok(false) if flags.contains(SetPathFlags::NO_CREATE) => Err(None),
        Ok(false) => session.storage.create_directory(&path).map_err(Some),
        Err(e) => Err(Some(e)),
    };

    match ready {
        Ok(()) => {
            tracing::debug!(session = session.id(), path = %path, "path changed");
            Ok(())
        }
        Err(e) => {
            match e {
                Some(e) => tracing::warn!(session = session.id(), path = %path, error = %e, "folder unavailable"),
                None => tracing::debug!(session = session.id(), path = %path, "folder missing, not created"),
            }
            session.transfer.path.pop();
            Err(())
        }
    }
}
