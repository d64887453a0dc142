//! The HTTP/1.x flow controller.
//!
//! [`Flow`] is the per-session state machine at the heart of the engine: it
//! looks at what just happened on the wire (a read or a write finished, or
//! the connection just opened), advances the session state, and tells the
//! transport what to do next as a list of [`Action`]s. It never blocks and
//! never touches the transport itself, which keeps it both
//! transport-agnostic and testable without any IO.

use std::io;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::processor::Processor;
use crate::reply::ErrorReply;
use crate::request::RequestLine;
use crate::session::{Session, Status};
use crate::status::StatusLine;
use crate::version::{Version, LIM_VERSION};

/// What the transport should do next on a connection.
///
/// Emitted by the flow controller; the transport executes the actions in
/// order and feeds each completion back in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Tear the session down and release the transport.
    Recycle,
    /// Re-run the start logic, e.g. after a completed exchange.
    Start,
    /// Read until at least one full line is buffered.
    ReadLine,
    /// Read until the rest of the announced message body is buffered.
    ReadRemainingContent,
    /// Hand the next queued message to the transport, if any.
    Send,
}

/// The result of resolving a [`Action::Send`].
#[derive(Debug)]
pub enum SendOutcome {
    /// Write this message; exactly one may be in flight at a time.
    Write(Bytes),
    /// Nothing left to send, and the session wants closing.
    Recycle,
    /// Nothing to do.
    Idle,
}

/// The HTTP/1.x control flow for one session.
///
/// Owns the session data and the processor for one connection and makes all
/// the decisions about when to read, write, process, or shut down.
#[derive(Debug)]
pub struct Flow<P> {
    processor: P,
    session: Session,
}

impl<P: Processor> Flow<P> {
    /// Creates a flow over a session and the processor that supplies the
    /// protocol logic.
    pub fn new(processor: P, session: Session) -> Flow<P> {
        Flow { processor, session }
    }

    /// A view of the session data.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access to the session data.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Consumes the flow, handing the session back.
    pub fn into_session(self) -> Session {
        self.session
    }

    /// Decides what to do on connection start, or when re-entering after a
    /// completed exchange.
    ///
    /// Only the initial call runs the processor's `start`; the re-entry
    /// path ([`Action::Start`]) skips it.
    pub fn start(&mut self, initial: bool) -> Vec<Action> {
        let mut emit = Vec::new();

        if initial {
            self.processor.start(&mut self.session);
        }

        match self.session.status {
            Status::Request | Status::Status => emit.push(Action::ReadLine),
            Status::Shutdown => emit.push(Action::Recycle),
            _ => {}
        }
        emit.push(Action::Send);

        emit
    }

    /// Decides what to do after a read completed.
    ///
    /// Classifies the newly buffered bytes by the current status: a request
    /// line, a status line, a header line, or body content. Malformed
    /// request lines and unsupported protocol versions produce an error
    /// reply here.
    pub fn on_read(&mut self, result: io::Result<()>) -> Vec<Action> {
        let mut emit = Vec::new();

        if self.session.status == Status::Shutdown {
            return emit;
        }

        if let Err(e) = result {
            trace!("read error: {}", e);
            self.session.status = Status::Error;
        }

        let was_request = self.session.status == Status::Request;
        let was_start = was_request || self.session.status == Status::Status;
        let mut version = Version::default();

        if self.session.status == Status::Request {
            let line = self.session.buffer_line();
            let request = RequestLine::parse(&line);
            debug!("request line: {:?}", line);
            self.session.status = if request.valid() {
                Status::Header
            } else {
                Status::Error
            };
            version = request.version;
            self.session.inbound_request = request;
        } else if self.session.status == Status::Status {
            let line = self.session.buffer_line();
            let status = StatusLine::parse(&line);
            debug!("status line: {:?}", line);
            self.session.status = if status.valid() {
                Status::Header
            } else {
                Status::Error
            };
            version = status.version;
            self.session.inbound_status = status;
        } else if self.session.status == Status::Header {
            let line = self.session.buffer_line();
            self.session.inbound.absorb(&line);
            if self.session.inbound.complete {
                // done parsing headers, switch over to streaming in the body
                self.session.status = self.processor.after_headers(&mut self.session);
                emit.push(Action::Send);
                self.session.content.clear();
            }
        }

        if was_start && self.session.status != Status::Error && version >= LIM_VERSION {
            // only 1.x and below is spoken here
            self.session.status = Status::Error;
        }

        if was_start && self.session.status == Status::Header {
            self.session.inbound = Default::default();
        } else if was_request && self.session.status == Status::Error {
            // we just failed to read a request line, so tell the other end:
            // a 505 if the framing is from the future, a 400 otherwise
            ErrorReply::new().reply(
                &mut self.session,
                if version >= LIM_VERSION { 505 } else { 400 },
            );
            emit.push(Action::Send);
            self.session.status = Status::Processing;
        }

        if self.session.status == Status::Header {
            emit.push(Action::ReadLine);
        } else if self.session.status == Status::Content {
            let chunk = self.session.buffer_content();
            self.session.content.extend_from_slice(&chunk);
            if self.session.remaining_bytes() == 0 {
                self.session.status = Status::Processing;

                // processing the request takes place here
                self.processor.handle(&mut self.session);

                self.session.status = self.processor.after_processing(&mut self.session);
                emit.push(Action::Start);
            } else {
                emit.push(Action::ReadRemainingContent);
            }
        }

        if self.session.status == Status::Error {
            emit.push(Action::Recycle);
        }

        emit
    }

    /// Decides what to do after a write completed.
    ///
    /// Clears the write-pending flag, runs `after_processing` if the
    /// session was waiting on this write, and keeps the queue draining.
    /// Errors, and sessions that have decided to shut down, recycle.
    pub fn on_write(&mut self, result: io::Result<()>) -> Vec<Action> {
        let mut emit = Vec::new();

        self.session.write_pending = false;

        match result {
            Ok(()) => {
                if self.session.status == Status::Processing {
                    self.session.status = self.processor.after_processing(&mut self.session);
                }
                emit.push(Action::Send);
                if self.session.status == Status::Shutdown {
                    emit.push(Action::Recycle);
                }
            }
            Err(e) => {
                trace!("write error: {}", e);
                emit.push(Action::Recycle);
            }
        }

        emit
    }

    /// Resolves a [`Action::Send`]: pops the next queued message, if one
    /// may go out now.
    ///
    /// At most one message is in flight at any time; the completion has to
    /// come back through [`on_write`][Flow::on_write] before the next one
    /// leaves the queue. With the queue drained, a session marked
    /// close-after-send recycles.
    pub fn send(&mut self) -> SendOutcome {
        if self.session.status == Status::Shutdown || self.session.write_pending {
            return SendOutcome::Idle;
        }

        if let Some(message) = self.session.outbound_queue.pop_front() {
            self.session.write_pending = true;
            trace!("sending {} bytes", message.len());
            return SendOutcome::Write(message);
        }

        if self.session.close_after_send {
            return SendOutcome::Recycle;
        }

        SendOutcome::Idle
    }

    /// Makes the session reusable.
    ///
    /// Destroys all pending data that needs cleaning up and tags the
    /// session as free. The transport is expected to close its endpoints
    /// when this is done.
    pub fn recycle(&mut self) {
        if self.session.free {
            return;
        }

        trace!(
            "recycling session: {} requests, {} replies, {} errors",
            self.session.requests(),
            self.session.replies(),
            self.session.errors
        );

        self.processor.recycle(&mut self.session);

        self.session.status = Status::Shutdown;
        self.session.write_pending = false;

        self.session.close_after_send = false;
        self.session.outbound_queue.clear();
        self.session.input.clear();

        self.session.free = true;
    }
}
