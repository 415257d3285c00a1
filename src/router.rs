//! Dispatches incoming messages: a reply goes to whichever call is waiting
//! on its serial, everything else is offered to the registered
//! [`MatchRule`] filters. The matching logic is shared; what differs
//! between adapters is how messages get pulled off the wire and handed
//! back to a caller:
//!
//! * [`BlockingRouter`] drives the connection directly on the calling
//!   thread -- the same shape as [`crate::connection::rpc_conn::RpcConn`],
//!   generalized from one predicate plus three queues to any number of
//!   `MatchRule` filters.
//! * [`ThreadedRouter`] owns the connection's receive half on a dedicated
//!   background thread and answers through `futures` channels, so callers
//!   on other threads can wait for their own reply without taking turns
//!   pumping the socket.
//!
//! There's no separate cooperative-async adapter: a [`ThreadedRouter`]
//! waiter is a [`futures::channel::oneshot::Receiver`], which already
//! implements `Future`, so an `async fn` awaits exactly the handle a
//! blocking caller would pass to [`ThreadedRouter::recv_reply_blocking`].
//! The background thread still does its own blocking reads (this crate's
//! transport is a blocking UNIX socket, not an async one); what's
//! cooperative is the caller's side of the handoff.

use std::collections::{HashMap, VecDeque};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver as StdReceiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use futures::channel::oneshot;

use crate::connection::ll_conn::{force_finish_on_error, DuplexConn, RecvConn, SendConn};
use crate::connection::{calc_timeout_left, Error as ConnError, Timeout};
use crate::match_rule::MatchRule;
use crate::message_builder::{MarshalledMessage, MessageType};

/// Identifies a filter subscription to the router that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(u64);

/// Why a reply never showed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NoReplyError {
    #[error("router shut down while a reply was outstanding")]
    RouterClosed,
}

/// Bound on a filter's backlog when none is given explicitly: enough to
/// hold one unread message. A subscriber that falls behind loses the
/// newest arrivals rather than the router growing its backlog without
/// limit.
pub const DEFAULT_FILTER_CAPACITY: usize = 1;

struct Filter {
    rule: MatchRule,
    queue: VecDeque<MarshalledMessage>,
    capacity: usize,
}

impl Filter {
    /// Offers `msg` if it matches. A full queue drops the new message,
    /// not the oldest one: a subscriber that isn't keeping up sees gaps
    /// in what it reads, not a queue that silently rewrites history out
    /// from under an in-progress read.
    fn offer(&mut self, msg: &MarshalledMessage) {
        if !self.rule.matches(msg) {
            return;
        }
        if self.queue.len() < self.capacity {
            self.queue.push_back(msg.clone());
        } else {
            log::debug!("filter queue full at capacity {}, dropping message", self.capacity);
        }
    }
}

/// Single-threaded router. Every method takes `&mut self` and does its own
/// I/O inline, exactly like `RpcConn`: there is nothing running in the
/// background, so a blocked `recv`/`send_and_get_reply` is the only way
/// messages get read.
pub struct BlockingRouter {
    conn: DuplexConn,
    next_filter_id: u64,
    filters: HashMap<FilterId, Filter>,
}

impl BlockingRouter {
    pub fn new(conn: DuplexConn) -> Self {
        BlockingRouter {
            conn,
            next_filter_id: 0,
            filters: HashMap::new(),
        }
    }

    pub fn conn(&self) -> &DuplexConn {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut DuplexConn {
        &mut self.conn
    }

    pub fn add_filter(&mut self, rule: MatchRule, capacity: usize) -> FilterId {
        let id = FilterId(self.next_filter_id);
        self.next_filter_id += 1;
        self.filters.insert(
            id,
            Filter {
                rule,
                queue: VecDeque::new(),
                capacity,
            },
        );
        id
    }

    pub fn remove_filter(&mut self, id: FilterId) {
        self.filters.remove(&id);
    }

    /// Whatever's already queued for `id`, without blocking.
    pub fn try_recv(&mut self, id: FilterId) -> Option<MarshalledMessage> {
        self.filters.get_mut(&id)?.queue.pop_front()
    }

    /// Blocks (pumping the socket as needed) until a message matching
    /// `id`'s rule arrives, or `timeout` elapses.
    pub fn recv(&mut self, id: FilterId, timeout: Timeout) -> Result<MarshalledMessage, ConnError> {
        let start = Instant::now();
        loop {
            if let Some(msg) = self.try_recv(id) {
                return Ok(msg);
            }
            self.pump(calc_timeout_left(&start, timeout)?)?;
        }
    }

    /// Reads exactly one message off the wire and offers it to every
    /// filter. Useful for an event loop that wants to service filters
    /// without itself being in the middle of a call.
    pub fn pump(&mut self, timeout: Timeout) -> Result<(), ConnError> {
        let msg = self.conn.recv.get_next_message(timeout)?;
        self.dispatch(msg);
        Ok(())
    }

    fn dispatch(&mut self, msg: MarshalledMessage) {
        for filter in self.filters.values_mut() {
            filter.offer(&msg);
        }
    }

    /// Sends `msg`, which must be a method call, and blocks until its
    /// reply or error comes back. Every other message read along the way
    /// is offered to the registered filters instead of being dropped.
    pub fn send_and_get_reply(
        &mut self,
        msg: &mut MarshalledMessage,
        timeout: Timeout,
    ) -> Result<MarshalledMessage, ConnError> {
        if !matches!(msg.typ, MessageType::Call) {
            return Err(ConnError::UnexpectedTypeReceived);
        }
        let start = Instant::now();
        let serial = self
            .conn
            .send
            .send_message(msg)?
            .write(calc_timeout_left(&start, timeout)?)
            .map_err(force_finish_on_error)?;

        loop {
            let incoming = self
                .conn
                .recv
                .get_next_message(calc_timeout_left(&start, timeout)?)?;
            let is_our_reply = matches!(incoming.typ, MessageType::Reply | MessageType::Error)
                && incoming.dynheader.response_serial == std::num::NonZeroU32::new(serial);
            if is_our_reply {
                return Ok(incoming);
            }
            self.dispatch(incoming);
        }
    }
}

type PendingMap = HashMap<u32, oneshot::Sender<MarshalledMessage>>;
type FilterMap = HashMap<FilterId, (MatchRule, SyncSender<MarshalledMessage>)>;

struct Shared {
    pending: Mutex<PendingMap>,
    filters: Mutex<FilterMap>,
}

fn dispatch_shared(shared: &Shared, msg: MarshalledMessage) {
    if matches!(msg.typ, MessageType::Reply | MessageType::Error) {
        if let Some(serial) = msg.dynheader.response_serial {
            if let Some(tx) = shared.pending.lock().unwrap().remove(&serial.get()) {
                // Err means the caller dropped its receiver; the reply is
                // simply discarded, matching a cancelled waiter's contract.
                let _ = tx.send(msg);
                return;
            }
        }
    }
    let filters = shared.filters.lock().unwrap();
    for (rule, tx) in filters.values() {
        if rule.matches(&msg) {
            // try_send: a full channel drops the message rather than
            // blocking the receiver loop on a slow subscriber.
            if tx.try_send(msg.clone()).is_err() {
                log::debug!("threaded router filter channel full, dropping message");
            }
        }
    }
}

/// Reads from `recv` on its own thread until the connection closes or the
/// router is dropped, dispatching each message to `shared`. Woken early by
/// a byte on `wake_fd`, which the owning `ThreadedRouter` writes to on
/// shutdown so this thread isn't stuck in a blocking read forever.
fn receiver_loop(mut recv: RecvConn, wake_fd: RawFd, shared: Arc<Shared>) {
    loop {
        let mut fdset = nix::sys::select::FdSet::new();
        let recv_fd = recv.as_raw_fd();
        fdset.insert(recv_fd);
        fdset.insert(wake_fd);

        if nix::sys::select::select(None, Some(&mut fdset), None, None, None).is_err() {
            break;
        }

        if fdset.contains(wake_fd) {
            break;
        }

        if fdset.contains(recv_fd) {
            match recv.get_next_message(Timeout::Nonblock) {
                Ok(msg) => dispatch_shared(&shared, msg),
                Err(ConnError::TimedOut) => continue,
                Err(_) => break,
            }
        }
    }

    nix::unistd::close(wake_fd).ok();
    // Every waiter still outstanding gets its sender dropped, which
    // resolves the paired receiver to `Canceled` instead of hanging.
    let mut pending = shared.pending.lock().unwrap();
    if !pending.is_empty() {
        log::debug!("receiver loop shutting down with {} waiter(s) still pending", pending.len());
    }
    pending.clear();
    shared.filters.lock().unwrap().clear();
}

/// Router that owns the connection's receive half on a background thread.
/// `send_and_get_reply` registers a waiter and returns immediately; the
/// caller decides whether to block on it ([`Self::recv_reply_blocking`])
/// or `.await` it from an async context.
pub struct ThreadedRouter {
    send: Mutex<SendConn>,
    shared: Arc<Shared>,
    next_filter_id: AtomicU64,
    wake_write: RawFd,
    receiver: Option<thread::JoinHandle<()>>,
}

impl ThreadedRouter {
    pub fn new(conn: DuplexConn) -> Result<Self, ConnError> {
        let (wake_read, wake_write) = nix::unistd::pipe().map_err(ConnError::NixError)?;
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            filters: Mutex::new(HashMap::new()),
        });
        let shared_for_thread = Arc::clone(&shared);
        let receiver = thread::spawn(move || receiver_loop(conn.recv, wake_read, shared_for_thread));

        Ok(ThreadedRouter {
            send: Mutex::new(conn.send),
            shared,
            next_filter_id: AtomicU64::new(0),
            wake_write,
            receiver: Some(receiver),
        })
    }

    /// Registers a filter and returns the receiving end of its channel
    /// directly: there's no `try_recv`/`recv` pair on the router itself,
    /// since the `std::sync::mpsc::Receiver` already provides both.
    pub fn add_filter(
        &self,
        rule: MatchRule,
        capacity: usize,
    ) -> (FilterId, StdReceiver<MarshalledMessage>) {
        let id = FilterId(self.next_filter_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = std::sync::mpsc::sync_channel(capacity.max(1));
        self.shared.filters.lock().unwrap().insert(id, (rule, tx));
        (id, rx)
    }

    pub fn remove_filter(&self, id: FilterId) {
        self.shared.filters.lock().unwrap().remove(&id);
    }

    /// Sends `msg`, which must be a method call, and returns a future that
    /// resolves with its reply. The waiter is registered before the write
    /// happens, so a reply racing in on the receiver thread can never be
    /// missed.
    pub fn send_and_get_reply(
        &self,
        msg: &mut MarshalledMessage,
        timeout: Timeout,
    ) -> Result<oneshot::Receiver<MarshalledMessage>, ConnError> {
        if !matches!(msg.typ, MessageType::Call) {
            return Err(ConnError::UnexpectedTypeReceived);
        }

        let mut send = self.send.lock().unwrap();
        let serial = send.alloc_serial();
        msg.dynheader.serial = Some(serial);

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().unwrap().insert(serial, tx);

        let ctx = match send.send_message(msg) {
            Ok(ctx) => ctx,
            Err(e) => {
                self.shared.pending.lock().unwrap().remove(&serial);
                return Err(e);
            }
        };
        match ctx.write(timeout) {
            Ok(_) => Ok(rx),
            Err(e) => {
                self.shared.pending.lock().unwrap().remove(&serial);
                Err(force_finish_on_error(e))
            }
        }
    }

    /// Blocks the calling thread on a waiter from [`Self::send_and_get_reply`].
    /// For callers not already inside an async runtime; an async caller
    /// should just `.await` the receiver instead.
    pub fn recv_reply_blocking(
        rx: oneshot::Receiver<MarshalledMessage>,
    ) -> Result<MarshalledMessage, NoReplyError> {
        futures::executor::block_on(rx).map_err(|_| NoReplyError::RouterClosed)
    }

    fn shutdown(&mut self) {
        // Write is best-effort: if the receiver thread already exited
        // (e.g. the peer closed the connection) the pipe may be gone.
        nix::unistd::write(self.wake_write, &[0u8]).ok();
        if let Some(handle) = self.receiver.take() {
            handle.join().ok();
        }
        nix::unistd::close(self.wake_write).ok();
    }
}

impl Drop for ThreadedRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_builder::MessageBuilder;

    fn ping() -> MarshalledMessage {
        MessageBuilder::new()
            .call("Ping".to_owned())
            .on("/org/freedesktop/DBus".to_owned())
            .with_interface("org.freedesktop.DBus.Peer".to_owned())
            .at("org.freedesktop.DBus".to_owned())
            .build()
    }

    #[test]
    fn filter_offer_drops_new_message_once_full() {
        let rule = MatchRule::default().with_member("Ping".to_owned());
        let mut filter = Filter {
            rule,
            queue: VecDeque::new(),
            capacity: 2,
        };
        for _ in 0..3 {
            filter.offer(&ping());
        }
        assert_eq!(filter.queue.len(), 2);
    }

    #[test]
    fn filter_with_zero_capacity_drops_everything() {
        let rule = MatchRule::default().with_member("Ping".to_owned());
        let mut filter = Filter {
            rule,
            queue: VecDeque::new(),
            capacity: 0,
        };
        filter.offer(&ping());
        assert!(filter.queue.is_empty());
    }

    #[test]
    fn blocking_router_add_remove_filter_roundtrips_ids() {
        // add_filter/remove_filter don't need a live socket; exercise them
        // against the bookkeeping directly via the same HashMap shape the
        // router uses internally (no unconnected DuplexConn constructor
        // exists to build a BlockingRouter in isolation here).
        let mut filters: HashMap<FilterId, Filter> = HashMap::new();
        let id = FilterId(0);
        filters.insert(
            id,
            Filter {
                rule: MatchRule::default(),
                queue: VecDeque::new(),
                capacity: DEFAULT_FILTER_CAPACITY,
            },
        );
        assert!(filters.remove(&id).is_some());
        assert!(filters.get(&id).is_none());
    }
}
