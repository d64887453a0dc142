//! The processor interface.
//!
//! A processor supplies the protocol logic that sits on top of the flow
//! controller: servers dispatch parsed requests to servlets, clients feed
//! queued requests out and classify the responses. The flow controller only
//! ever talks to this trait.

use crate::session::{Session, Status};

/// Protocol logic driven by the flow controller.
///
/// One processor instance serves one session for the lifetime of a
/// connection. All methods run on the connection's task; none of them may
/// block.
pub trait Processor {
    /// Called once when a session and its connection have been established.
    ///
    /// Expected to put the session into its initial state, and may already
    /// queue outbound messages (a client emits its first request here).
    fn start(&mut self, session: &mut Session);

    /// Called when the header block of an inbound message is complete.
    ///
    /// Decides whether a body is expected and how long it is, and returns
    /// the status to continue with: usually [`Status::Content`], or
    /// [`Status::Error`] to abort the message.
    fn after_headers(&mut self, session: &mut Session) -> Status;

    /// Called when an inbound message is complete, to act on it.
    ///
    /// Servers dispatch to a servlet here; clients run their response
    /// callbacks.
    fn handle(&mut self, session: &mut Session);

    /// Called after a message has been handled, or after a queued message
    /// has been written out while the session was processing.
    ///
    /// Returns the status to continue with: [`Status::Request`] or
    /// [`Status::Status`] to keep the connection going, or
    /// [`Status::Shutdown`] to wind it down.
    fn after_processing(&mut self, session: &mut Session) -> Status;

    /// Called right before the session is recycled.
    fn recycle(&mut self, session: &mut Session);
}
