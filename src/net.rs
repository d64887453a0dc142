//! Transport adapters: running a flow over actual byte streams.
//!
//! [`Conn`] bridges the transport-agnostic [`Flow`] to anything that reads
//! and writes bytes: a TCP stream, a UNIX-domain stream, or the process's
//! standard IO. It executes the controller's actions with at most one read
//! and one write in flight, racing the two so that an interim reply can go
//! out while a body is still streaming in.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tracing::{debug, trace};

use crate::client::Client;
use crate::error::Error;
use crate::processor::Processor;
use crate::proto::{Action, Flow, SendOutcome};
use crate::server::{Engine, Server};
use crate::session::Session;

/// What kind of read the flow controller asked for.
#[derive(Debug)]
enum ReadOp {
    /// Read until a full line is buffered.
    Line,
    /// Read until this many bytes are buffered.
    AtLeast(usize),
}

/// One connection: a reader, a writer, and the flow driving them.
///
/// The reader and writer are separate so that paired descriptors (like
/// stdin/stdout) work the same way as a split socket.
#[derive(Debug)]
pub struct Conn<R, W, P> {
    reader: R,
    writer: W,
    flow: Flow<P>,
}

impl<R, W, P> Conn<R, W, P>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    P: Processor,
{
    /// Creates a connection over a read half, a write half and a
    /// processor.
    pub fn new(reader: R, writer: W, processor: P) -> Conn<R, W, P> {
        Conn {
            reader,
            writer,
            flow: Flow::new(processor, Session::new()),
        }
    }

    /// Drives the connection until the session shuts down.
    ///
    /// All transport-level errors are routed through the flow controller,
    /// which recovers or recycles as appropriate, so this doesn't fail;
    /// the finished session is returned for inspection.
    pub async fn run(mut self) -> Session {
        let mut actions: VecDeque<Action> = self.flow.start(true).into_iter().collect();
        let mut read_op: Option<ReadOp> = None;
        let mut write_buf: Option<(Bytes, usize)> = None;

        loop {
            while let Some(action) = actions.pop_front() {
                match action {
                    Action::Start => {
                        let more = self.flow.start(false);
                        actions.extend(more);
                    }
                    Action::ReadLine => {
                        read_op = Some(ReadOp::Line);
                    }
                    Action::ReadRemainingContent => {
                        read_op = Some(ReadOp::AtLeast(self.flow.session().remaining_bytes()));
                    }
                    Action::Send => match self.flow.send() {
                        SendOutcome::Write(message) => {
                            write_buf = Some((message, 0));
                        }
                        SendOutcome::Recycle => actions.push_back(Action::Recycle),
                        SendOutcome::Idle => {}
                    },
                    Action::Recycle => {
                        if let Some((message, offset)) = write_buf.take() {
                            // let the queued farewell drain before closing
                            let _ = self.writer.write_all(&message[offset..]).await;
                            let _ = self.writer.flush().await;
                        }
                        return self.recycle().await;
                    }
                }
            }

            let reading = read_op.is_some();
            let writing = write_buf.is_some();

            if !reading && !writing {
                trace!("connection has nothing pending, recycling");
                actions.push_back(Action::Recycle);
                continue;
            }

            tokio::select! {
                result = fill(&mut self.reader, self.flow.session_mut(), read_op.as_ref()),
                    if reading =>
                {
                    read_op = None;
                    let more = self.flow.on_read(result);
                    actions.extend(more);
                }
                result = write_some(&mut self.writer, write_buf.as_mut()),
                    if writing =>
                {
                    match result {
                        Ok(true) => {
                            write_buf = None;
                            let more = self.flow.on_write(Ok(()));
                            actions.extend(more);
                        }
                        Ok(false) => {
                            // partial progress; keep the same message armed
                        }
                        Err(e) => {
                            write_buf = None;
                            let more = self.flow.on_write(Err(e));
                            actions.extend(more);
                        }
                    }
                }
            }
        }
    }

    /// Final teardown: recycle the session and close the transport.
    async fn recycle(mut self) -> Session {
        self.flow.recycle();

        if let Err(e) = self.writer.shutdown().await {
            trace!("error shutting down the writer: {}", e);
            self.flow.session_mut().errors += 1;
        }

        let session = self.flow.into_session();
        debug!(
            "connection recycled: {} requests, {} replies, {} errors",
            session.requests(),
            session.replies(),
            session.errors
        );
        session
    }
}

/// Reads into the session's input buffer until the requested condition
/// holds.
///
/// One buffer fill per await, so dropping this mid-read loses nothing; the
/// next call picks up where the buffer left off.
async fn fill<R>(reader: &mut R, session: &mut Session, op: Option<&ReadOp>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let op = op.expect("read arm enabled without a read op");

    loop {
        let done = match op {
            ReadOp::Line => session.input.iter().any(|&b| b == b'\n'),
            ReadOp::AtLeast(n) => session.input.len() >= *n,
        };
        if done {
            return Ok(());
        }

        let n = reader.read_buf(&mut session.input).await?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        trace!("read {} bytes", n);
    }
}

/// Makes one unit of progress on the in-flight message.
///
/// Returns `Ok(true)` once the whole message has been written and flushed.
/// A single write per await keeps this safe to race against the read side.
async fn write_some<W>(writer: &mut W, buf: Option<&mut (Bytes, usize)>) -> io::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let (message, offset) = buf.expect("write arm enabled without a message");

    if *offset < message.len() {
        let n = writer.write(&message[*offset..]).await?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        *offset += n;
        trace!("wrote {} bytes", n);
    }

    if *offset == message.len() {
        writer.flush().await?;
        return Ok(true);
    }

    Ok(false)
}

/// Serves an engine on a TCP listener, one task per connection.
///
/// Runs until accepting fails; individual connections live and die on
/// their own tasks.
pub async fn serve(engine: Arc<Engine>, listener: TcpListener) -> Result<(), Error> {
    loop {
        let (stream, peer) = listener.accept().await.map_err(Error::new_accept)?;
        debug!("accepted connection from {}", peer);

        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let _guard = engine.track();
            let (reader, writer) = stream.into_split();
            Conn::new(reader, writer, Server::new(engine)).run().await;
        });
    }
}

/// Serves an engine on a UNIX-domain listener, one task per connection.
#[cfg(unix)]
pub async fn serve_unix(engine: Arc<Engine>, listener: UnixListener) -> Result<(), Error> {
    loop {
        let (stream, _) = listener.accept().await.map_err(Error::new_accept)?;
        debug!("accepted connection on unix socket");

        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let _guard = engine.track();
            let (reader, writer) = stream.into_split();
            Conn::new(reader, writer, Server::new(engine)).run().await;
        });
    }
}

/// Serves a single session over the process's standard input and output.
///
/// Useful for testing, and for running a server under inetd-style
/// supervision. Resolves to the finished session.
pub async fn serve_stdio(engine: Arc<Engine>) -> Session {
    let _guard = engine.track();
    let processor = Server::new(Arc::clone(&engine));
    Conn::new(tokio::io::stdin(), tokio::io::stdout(), processor)
        .run()
        .await
}

/// Runs a client over an established TCP stream.
///
/// The client's queued requests go out one at a time; the connection winds
/// down once the queue is empty. Resolves to the finished session.
pub async fn fetch(stream: tokio::net::TcpStream, client: Client) -> Session {
    let (reader, writer) = stream.into_split();
    Conn::new(reader, writer, client).run().await
}

/// Runs a client over a connected UNIX-domain stream.
#[cfg(unix)]
pub async fn fetch_unix(stream: tokio::net::UnixStream, client: Client) -> Session {
    let (reader, writer) = stream.into_split();
    Conn::new(reader, writer, client).run().await
}
