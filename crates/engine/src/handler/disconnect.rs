use obexbox_protocol::ResponseCode;

use super::CommandHandler;
use crate::event::{Event, Object};
use crate::session::{Session, Target};

pub(crate) struct DisconnectHandler;

impl CommandHandler for DisconnectHandler {
    fn handle(&self, session: &mut Session, event: Event, _object: &Object) {
        match event {
            Event::RequestHint => session.response.code = ResponseCode::Success,
            Event::Request => {
                session.target = Target::None;
                session.transfer.path.clear();
                session.response.code = ResponseCode::Success;
                tracing::info!(session = session.id(), "disconnect requested");
            }
            Event::RequestComplete => session.teardown(),
            _ => {}
        }
    }
}
