//! Transaction dispatcher: authorizes `(event, command)` pairs and routes
//! them to the command handlers.

use obexbox_protocol::{Command, ResponseCode};

use crate::event::{Event, Object};
use crate::handler;
use crate::session::{Session, Target};

/// Routes one transport event to the handler of its command.
///
/// `command` may be `None` for stream and abort events on link layers that
/// do not repeat the command code; the last dispatched command is used. A
/// bare `ABORT` command is re-routed as an [`Event::Abort`] for that same
/// command. A [`Event::LinkError`] tears the session down after the handler
/// has run its close phase.
pub fn dispatch(session: &mut Session, event: Event, command: Option<Command>, object: &Object) {
    let Some((event, command)) = resolve(session, event, command) else {
        tracing::debug!(session = session.id(), ?event, "event without a command, ignored");
        if event == Event::LinkError {
            session.teardown();
        }
        return;
    };

    if event == Event::RequestHint {
        session.reset_response();
    }
    session.last_command = Some(command);
    tracing::debug!(session = session.id(), %command, ?event, "dispatch");

    route(session, event, command, object);

    if event == Event::LinkError {
        session.teardown();
    }
}

fn resolve(session: &Session, event: Event, command: Option<Command>) -> Option<(Event, Command)> {
    match command {
        Some(Command::Abort) => session.last_command.map(|last| (Event::Abort, last)),
        Some(command) => Some((event, command)),
        None => session.last_command.map(|last| (event, last)),
    }
}

fn route(session: &mut Session, event: Event, command: Command, object: &Object) {
    let Some(handler) = handler::for_command(command) else {
        if event == Event::RequestHint {
            session.response.code = ResponseCode::NotImplemented;
        }
        return;
    };

    if matches!(command, Command::Put | Command::Get | Command::SetPath) {
        if !session.is_admitted() {
            // Unauthorized peers get no answer at all.
            tracing::debug!(session = session.id(), %command, "peer not admitted, dropped");
            return;
        }

        let target_ok = match session.target {
            Target::None => false,
            Target::ObjectPush => command != Command::SetPath,
            Target::FileTransfer => true,
        };
        if !target_ok {
            if matches!(event, Event::RequestHint | Event::Request) {
                tracing::warn!(
                    session = session.id(),
                    %command,
                    target = ?session.target,
                    "command not allowed for target"
                );
                session.response.code = ResponseCode::Forbidden;
            }
            return;
        }
    }

    handler.handle(session, event, object);
}
