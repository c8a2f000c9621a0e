//! CONNECT: target negotiation and the authentication exchange.

use obexbox_protocol::{ConnectInfo, FTP_TARGET, Header, ResponseCode};

use super::CommandHandler;
use crate::config::Services;
use crate::event::{Event, Object};
use crate::session::{Session, Target};

pub(crate) struct ConnectHandler;

impl CommandHandler for ConnectHandler {
    fn handle(&self, session: &mut Session, event: Event, object: &Object) {
        match event {
            Event::RequestHint => session.response.code = ResponseCode::Success,
            Event::Request => connect(session, object),
            _ => {}
        }
    }
}

fn connect(session: &mut Session, object: &Object) {
    let info = match ConnectInfo::decode(&object.nonheader) {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(session = session.id(), error = %e, "malformed CONNECT");
            reject(session, ResponseCode::BadRequest);
            return;
        }
    };
    session.negotiate_packet_size(info.max_packet);
    session.response.nonheader = ConnectInfo::new(session.max_packet()).encode();

    // A response is checked against the challenge still outstanding; a
    // CONNECT without one starts the exchange over.
    match object.headers.auth_response() {
        Some(payload) => {
            if let Err(e) = session.auth.verify(payload) {
                tracing::warn!(session = session.id(), error = %e, "authentication failed");
                reject(session, ResponseCode::BadRequest);
                return;
            }
        }
        None => session.auth.reset(),
    }

    let Some(target) = negotiate(session.config().services, object.headers.target()) else {
        tracing::warn!(session = session.id(), "CONNECT names an unknown or disabled target");
        reject(session, ResponseCode::BadRequest);
        return;
    };

    if target == Target::FileTransfer {
        let cid = session.connection_id();
        session.response.headers.push(Header::ConnectionId(cid));
        session
            .response
            .headers
            .push(Header::Who(FTP_TARGET.as_bytes().to_vec()));
    }
    session.transfer.path.clear();
    session.target = target;

    match session.auth.challenge() {
        Ok(challenges) if challenges.is_empty() => {
            session.response.code = ResponseCode::Success;
            tracing::info!(
                session = session.id(),
                ?target,
                max_packet = session.max_packet(),
                "connected"
            );
        }
        Ok(challenges) => {
            for challenge in challenges {
                session.response.headers.push(Header::AuthChallenge(challenge));
            }
            tracing::info!(session = session.id(), ?target, "credentials requested");
            reject(session, ResponseCode::Unauthorized);
        }
        Err(e) => {
            tracing::warn!(session = session.id(), error = %e, "cannot issue challenge");
            reject(session, ResponseCode::ServiceUnavailable);
        }
    }
}

/// Matches the Target header against the enabled services.
fn negotiate(services: Services, target: Option<&[u8]>) -> Option<Target> {
    match target {
        None if services.contains(Services::OBJECT_PUSH) => Some(Target::ObjectPush),
        Some(uuid) if uuid == FTP_TARGET.as_bytes() && services.contains(Services::FILE_TRANSFER) => {
            Some(Target::FileTransfer)
        }
        _ => None,
    }
}

fn reject(session: &mut Session, code: ResponseCode) {
    session.target = Target::None;
    session.response.code = code;
}
