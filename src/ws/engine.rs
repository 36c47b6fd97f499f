use std::any::Any;
use std::io;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::thread::{JoinHandle, Thread, ThreadId};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::stream::mtu::{guess_mtu, MtuStream};
use crate::stream::pushback::PushbackStream;
use crate::stream::{ConnectionInfo, Socket, SocketFactory};
use crate::thread::ThreadFactory;
use crate::util::{current_time_millis, lock, try_lock};
use crate::ws::config::Config;
use crate::ws::decoder::Decoder;
use crate::ws::encoder::FrameWriter;
use crate::ws::handshake::{read_response, HandshakeRequest};
use crate::ws::listener::{Listener, ListenerResult, Session};
use crate::ws::message::{FragmentAccumulator, Message};
use crate::ws::protocol::OpCode;
use crate::ws::{ConnectionState, Error, WebsocketClient};

type Attachment = Arc<dyn Any + Send + Sync>;

/// Lifecycle of the reader worker, used by `wait_for`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Running,
    Finished,
}

struct ReaderWorker {
    state: WorkerState,
    thread: Option<ThreadId>,
    handle: Option<JoinHandle<()>>,
}

/// Shared state of one websocket connection.
///
/// Lock order is `writer` then `state`. The state lock is only held to read or flip the state
/// and never across socket I/O.
pub(crate) struct Engine {
    config: Config,
    connection_info: ConnectionInfo,
    request: HandshakeRequest,
    listener: Box<dyn Listener>,
    socket_factory: Box<dyn SocketFactory>,
    thread_factory: Box<dyn ThreadFactory>,
    state: Mutex<ConnectionState>,
    writer: Mutex<Option<FrameWriter<Box<dyn Socket>>>>,
    // handle used to shut the socket down, interrupts the blocked reader
    closer: Mutex<Option<Box<dyn Socket>>>,
    reader: Mutex<ReaderWorker>,
    reader_finished: Condvar,
    keepalive: Mutex<Option<Thread>>,
    session: Mutex<Option<Arc<Session>>>,
    attachment: Mutex<Option<Attachment>>,
}

impl Engine {
    pub fn new(
        config: Config,
        connection_info: ConnectionInfo,
        request: HandshakeRequest,
        listener: Box<dyn Listener>,
        socket_factory: Box<dyn SocketFactory>,
        thread_factory: Box<dyn ThreadFactory>,
    ) -> Self {
        Self {
            config,
            connection_info,
            request,
            listener,
            socket_factory,
            thread_factory,
            state: Mutex::new(ConnectionState::NeverConnected),
            writer: Mutex::new(None),
            closer: Mutex::new(None),
            reader: Mutex::new(ReaderWorker {
                state: WorkerState::Idle,
                thread: None,
                handle: None,
            }),
            reader_finished: Condvar::new(),
            keepalive: Mutex::new(None),
            session: Mutex::new(None),
            attachment: Mutex::new(None),
        }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        lock(&self.session).clone()
    }

    pub fn set_attachment(&self, attachment: Attachment) {
        *lock(&self.attachment) = Some(attachment);
    }

    pub fn attachment(&self) -> Option<Attachment> {
        lock(&self.attachment).clone()
    }

    pub fn connect(&self, client: &WebsocketClient) -> Result<(), Error> {
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::NeverConnected {
                return Err(Error::IllegalState(*state));
            }
            *state = ConnectionState::Connecting;
        }

        debug!("connecting to {}", self.connection_info);
        let (reader, session) = match self.open() {
            Ok(opened) => opened,
            Err(err) => return Err(self.abort_connect(err)),
        };

        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::Connecting {
                drop(state);
                return Err(self.abort_connect(Error::Closed));
            }
            *state = ConnectionState::Connected;
        }
        info!(
            "connected to {} (protocol: {})",
            self.connection_info,
            session.accepted_protocol().unwrap_or("none")
        );

        self.notify(client, || {
            self.listener.on_open(client, &session);
            Ok(())
        });

        // closed from within on_open
        if !self.is_connected() {
            return Ok(());
        }

        if let Err(err) = self.start_workers(client, reader) {
            warn!("unable to start workers for {}: {}", self.connection_info, err);
            self.close(client);
            return Err(err.into());
        }
        Ok(())
    }

    /// Opens the socket and performs the handshake, returns the read half with any bytes that
    /// arrived after the handshake response.
    fn open(&self) -> Result<(PushbackStream<Box<dyn Socket>>, Arc<Session>), Error> {
        let socket = self.socket_factory.connect(&self.connection_info, self.config.timeout())?;
        *lock(&self.closer) = Some(socket.try_clone_socket()?);
        if self.state() != ConnectionState::Connecting {
            return Err(Error::Closed);
        }

        let mtu = match self.config.mtu() {
            Some(mtu) => mtu.max(1),
            None => guess_mtu(&socket.peer_addr()?),
        };
        debug!("using mtu of {} bytes for {}", mtu, self.connection_info);

        let mut reader = PushbackStream::new(socket.try_clone_socket()?);
        let mut stream = MtuStream::new(socket, mtu);
        self.request.write_to(&mut stream)?;
        let session = Arc::new(read_response(&mut reader, mtu)?);

        *lock(&self.writer) = Some(FrameWriter::new(stream, self.config.mask_frames()));
        *lock(&self.session) = Some(session.clone());
        Ok((reader, session))
    }

    /// Marks the engine closed after a failed connect. A concurrent `close` wins over the
    /// error that its socket shutdown caused.
    fn abort_connect(&self, err: Error) -> Error {
        let interrupted = {
            let mut state = lock(&self.state);
            let interrupted = *state == ConnectionState::Closed;
            *state = ConnectionState::Closed;
            interrupted
        };
        debug!("connection to {} failed: {}", self.connection_info, err);
        self.shutdown_socket();
        lock(&self.writer).take();
        if interrupted { Error::Closed } else { err }
    }

    fn start_workers(&self, client: &WebsocketClient, reader: PushbackStream<Box<dyn Socket>>) -> io::Result<()> {
        let keepalive_interval = self.config.keepalive_interval().filter(|interval| !interval.is_zero());
        if let Some(interval) = keepalive_interval {
            let worker = client.clone();
            let handle = self.thread_factory.spawn(
                format!("framelink-keepalive-{}", self.connection_info),
                Box::new(move || worker.engine.keepalive_loop(&worker, interval)),
            )?;
            *lock(&self.keepalive) = Some(handle.thread().clone());
        }

        lock(&self.reader).state = WorkerState::Running;
        let worker = client.clone();
        let spawned = self.thread_factory.spawn(
            format!("framelink-reader-{}", self.connection_info),
            Box::new(move || worker.engine.read_loop(&worker, reader)),
        );
        match spawned {
            Ok(handle) => {
                lock(&self.reader).handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.finish_reader();
                Err(err)
            }
        }
    }

    /// Sends a data message, fragmenting it when it exceeds the mtu. Does nothing unless the
    /// connection is open; a write failure closes the connection.
    pub fn send(&self, client: &WebsocketClient, op_code: OpCode, payload: &[u8]) -> Result<(), Error> {
        match self.write_frame(op_code, payload) {
            Ok(()) => Ok(()),
            Err(err) if !self.is_connected() => {
                debug!("send to {} interrupted by close: {}", self.connection_info, err);
                Ok(())
            }
            Err(err) => {
                debug!("send to {} failed: {}", self.connection_info, err);
                self.close(client);
                Err(err)
            }
        }
    }

    fn write_frame(&self, op_code: OpCode, payload: &[u8]) -> Result<(), Error> {
        let mut writer = lock(&self.writer);
        if !self.is_connected() {
            return Ok(());
        }
        let Some(writer) = writer.as_mut() else {
            return Ok(());
        };
        if op_code.is_control() {
            writer.send_frame(true, op_code, payload)?;
        } else {
            writer.send_or_fragment_while(op_code, payload, || self.is_connected())?;
        }
        Ok(())
    }

    /// Closes the connection once; later and concurrent calls return immediately.
    pub fn close(&self, client: &WebsocketClient) {
        let previous = {
            let mut state = lock(&self.state);
            let previous = *state;
            match previous {
                ConnectionState::Connecting | ConnectionState::Connected => *state = ConnectionState::Closed,
                ConnectionState::NeverConnected | ConnectionState::Closed => return,
            }
            previous
        };

        debug!("closing connection to {}", self.connection_info);
        // a busy writer is blocked in a send, the shutdown below interrupts it
        if previous == ConnectionState::Connected {
            match try_lock(&self.writer) {
                Some(mut writer) => {
                    if let Some(writer) = writer.as_mut() {
                        let _ = writer.send_frame(true, OpCode::Close, &[]);
                    }
                }
                None => debug!("writer to {} busy, skipping close frame", self.connection_info),
            }
        }
        self.shutdown_socket();
        if let Some(keepalive) = lock(&self.keepalive).as_ref() {
            keepalive.unpark();
        }

        if previous == ConnectionState::Connected {
            self.notify(client, || {
                self.listener.on_closed(client);
                Ok(())
            });
        }
    }

    /// Blocks until the reader worker has finished.
    pub fn wait_for(&self) {
        let mut reader = lock(&self.reader);
        if reader.thread == Some(thread::current().id()) {
            return;
        }
        while reader.state == WorkerState::Running {
            reader = self.reader_finished.wait(reader).unwrap_or_else(PoisonError::into_inner);
        }
        let handle = reader.handle.take();
        drop(reader);
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn shutdown_socket(&self) {
        if let Some(socket) = lock(&self.closer).as_ref() {
            let _ = socket.shutdown();
        }
    }

    fn read_loop(&self, client: &WebsocketClient, mut stream: PushbackStream<Box<dyn Socket>>) {
        lock(&self.reader).thread = Some(thread::current().id());
        debug!("reader started for {}", self.connection_info);
        if let Err(err) = self.read_messages(client, &mut stream) {
            self.fail(client, err);
        }
        debug!("reader finished for {}", self.connection_info);
        self.finish_reader();
    }

    fn finish_reader(&self) {
        lock(&self.reader).state = WorkerState::Finished;
        self.reader_finished.notify_all();
    }

    fn read_messages(&self, client: &WebsocketClient, stream: &mut PushbackStream<Box<dyn Socket>>) -> Result<(), Error> {
        let max_payload_length = self.config.max_payload_length();
        let mut decoder = Decoder::new(max_payload_length);
        let mut accumulator = FragmentAccumulator::new(max_payload_length);
        loop {
            match decoder.decode_next()? {
                Some(frame) => match accumulator.accept(frame)? {
                    Some(Message::Text(payload)) => match std::str::from_utf8(&payload) {
                        Ok(text) => self.notify(client, || self.listener.on_text(client, text)),
                        Err(err) => self.report(client, &Error::Utf8(err)),
                    },
                    Some(Message::Binary(payload)) => self.notify(client, || self.listener.on_binary(client, &payload)),
                    Some(Message::Ping(payload)) => self.write_frame(OpCode::Pong, payload)?,
                    Some(Message::Pong(_)) => {}
                    Some(Message::Close(_)) => {
                        debug!("close frame received from {}", self.connection_info);
                        self.close(client);
                        return Ok(());
                    }
                    None => {}
                },
                None => decoder.read(stream)?,
            }
            if !self.is_connected() {
                return Ok(());
            }
        }
    }

    fn keepalive_loop(&self, client: &WebsocketClient, interval: Duration) {
        loop {
            let deadline = Instant::now() + interval;
            loop {
                if !self.is_connected() {
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::park_timeout(deadline - now);
            }
            if let Err(err) = self.write_frame(OpCode::Ping, &current_time_millis().to_be_bytes()) {
                self.fail(client, err);
                return;
            }
        }
    }

    /// Reports an error that ends the connection, unless it was already closed locally.
    fn fail(&self, client: &WebsocketClient, err: Error) {
        if !self.is_connected() {
            debug!("ignoring error after close of {}: {}", self.connection_info, err);
            return;
        }
        warn!("connection to {} failed: {}", self.connection_info, err);
        self.report(client, &err);
        self.close(client);
    }

    fn notify<F: FnOnce() -> ListenerResult>(&self, client: &WebsocketClient, callback: F) {
        match panic::catch_unwind(AssertUnwindSafe(callback)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.report(client, &Error::Listener(err)),
            Err(panic) => self.report(client, &Error::ListenerPanic(panic_message(panic))),
        }
    }

    fn report(&self, client: &WebsocketClient, err: &Error) {
        let reported = panic::catch_unwind(AssertUnwindSafe(|| self.listener.on_exception(client, err)));
        if reported.is_err() {
            warn!("listener panicked while handling error: {}", err);
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "unknown panic".to_owned(),
        },
    }
}
