//! Request/response work queue
//!
//! Requests are posted to named channels and handled either on a single
//! background thread (`worker_count == 1`) or inline on the main thread
//! during [`WorkQueue::process_responses`] (`worker_count == 0`).
//! Responses are always dispatched on the thread calling
//! `process_responses`, in submission order.
//!
//! Aborted requests still travel through the queue but their handlers are
//! skipped; the response reports success with no payload.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use crossbeam_channel::{Receiver, Sender};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::{engine_bail, engine_info, engine_warn};

pub type RequestId = u64;
pub type ChannelId = u16;

/// Payload carried by requests and responses
pub type RequestData = Box<dyn Any + Send>;

/// A unit of work posted to a channel
pub struct Request {
    pub id: RequestId,
    pub channel: ChannelId,
    pub request_type: u16,
    pub data: Option<RequestData>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("request_type", &self.request_type)
            .finish()
    }
}

/// Result of handling a request
pub struct Response {
    pub request_id: RequestId,
    pub channel: ChannelId,
    pub request_type: u16,
    pub success: bool,
    pub messages: String,
    pub data: Option<RequestData>,
    /// The request was aborted before its side effects ran
    pub aborted: bool,
}

impl Response {
    pub fn success(request: &Request, data: Option<RequestData>) -> Self {
        Self {
            request_id: request.id,
            channel: request.channel,
            request_type: request.request_type,
            success: true,
            messages: String::new(),
            data,
            aborted: false,
        }
    }

    pub fn failure(request: &Request, messages: impl Into<String>) -> Self {
        Self {
            request_id: request.id,
            channel: request.channel,
            request_type: request.request_type,
            success: false,
            messages: messages.into(),
            data: None,
            aborted: false,
        }
    }

    fn aborted(request: &Request) -> Self {
        Self { aborted: true, ..Self::success(request, None) }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("request_id", &self.request_id)
            .field("channel", &self.channel)
            .field("success", &self.success)
            .field("aborted", &self.aborted)
            .field("messages", &self.messages)
            .finish()
    }
}

/// Handles requests (on the worker thread when there is one)
pub trait RequestHandler: Send + Sync {
    fn can_handle_request(&self, _request: &Request) -> bool {
        true
    }

    fn handle_request(&self, request: &mut Request) -> Response;
}

/// Handles responses on the main thread
pub trait ResponseHandler: Send {
    fn can_handle_response(&self, _response: &Response) -> bool {
        true
    }

    fn handle_response(&mut self, response: &Response);
}

type RequestHandlers = Arc<RwLock<FxHashMap<ChannelId, Vec<Arc<dyn RequestHandler>>>>>;

#[derive(Default)]
struct Tracking {
    /// Posted and not yet dispatched, with their channel
    outstanding: FxHashMap<RequestId, ChannelId>,
    aborted: FxHashSet<RequestId>,
}

struct Shared {
    request_handlers: RequestHandlers,
    tracking: Mutex<Tracking>,
}

impl Shared {
    fn is_aborted(&self, id: RequestId) -> bool {
        self.tracking.lock().map(|t| t.aborted.contains(&id)).unwrap_or(false)
    }

    fn abort_where(&self, predicate: impl Fn(ChannelId) -> bool) {
        if let Ok(mut tracking) = self.tracking.lock() {
            let ids: Vec<RequestId> = tracking
                .outstanding
                .iter()
                .filter(|(_, channel)| predicate(**channel))
                .map(|(id, _)| *id)
                .collect();
            tracking.aborted.extend(ids);
        }
    }

    fn process(&self, mut request: Request) -> Response {
        if self.is_aborted(request.id) {
            return Response::aborted(&request);
        }
        let handlers = match self.request_handlers.read() {
            Ok(handlers) => handlers.get(&request.channel).cloned().unwrap_or_default(),
            Err(_) => return Response::failure(&request, "request handler registry poisoned"),
        };
        match handlers.iter().find(|h| h.can_handle_request(&request)) {
            Some(handler) => handler.handle_request(&mut request),
            None => Response::failure(
                &request,
                format!("No request handler for channel {}", request.channel),
            ),
        }
    }
}

pub struct WorkQueue {
    name: String,
    worker_count: usize,
    shared: Arc<Shared>,
    response_handlers: FxHashMap<ChannelId, Vec<Box<dyn ResponseHandler>>>,
    channels: FxHashMap<String, ChannelId>,
    next_request_id: AtomicU64,
    /// Inline mode: requests waiting for `process_responses`
    pending: VecDeque<Request>,
    request_tx: Option<Sender<Request>>,
    response_rx: Option<Receiver<Response>>,
    worker: Option<JoinHandle<()>>,
    paused: bool,
    shut_down: bool,
}

impl WorkQueue {
    /// Create a queue with 0 (inline) or 1 background worker
    pub fn new(name: &str, worker_count: usize) -> Result<Self> {
        if worker_count > 1 {
            engine_bail!("ogre::WorkQueue", InvalidParams,
                "WorkQueue '{}' supports at most one worker thread, {} requested", name, worker_count);
        }

        let shared = Arc::new(Shared {
            request_handlers: Arc::new(RwLock::new(FxHashMap::default())),
            tracking: Mutex::new(Tracking::default()),
        });

        let mut queue = Self {
            name: name.to_string(),
            worker_count,
            shared,
            response_handlers: FxHashMap::default(),
            channels: FxHashMap::default(),
            next_request_id: AtomicU64::new(1),
            pending: VecDeque::new(),
            request_tx: None,
            response_rx: None,
            worker: None,
            paused: false,
            shut_down: false,
        };
        if worker_count == 1 {
            queue.start_worker()?;
        }
        Ok(queue)
    }

    fn start_worker(&mut self) -> Result<()> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<Request>();
        let (response_tx, response_rx) = crossbeam_channel::unbounded::<Response>();
        let shared = self.shared.clone();

        let handle = thread::Builder::new()
            .name(format!("{}-worker", self.name))
            .spawn(move || {
                for request in request_rx.iter() {
                    let response = shared.process(request);
                    if response_tx.send(response).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| Error::InternalError(format!("failed to spawn worker thread: {}", e)))?;

        self.request_tx = Some(request_tx);
        self.response_rx = Some(response_rx);
        self.worker = Some(handle);
        engine_info!("ogre::WorkQueue", "WorkQueue '{}' started with 1 worker thread", self.name);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Id for a named channel, allocated on first use
    pub fn channel_id(&mut self, name: &str) -> ChannelId {
        let next = self.channels.len() as ChannelId;
        *self.channels.entry(name.to_string()).or_insert(next)
    }

    pub fn add_request_handler(&mut self, channel: ChannelId, handler: Arc<dyn RequestHandler>) {
        match self.shared.request_handlers.write() {
            Ok(mut handlers) => handlers.entry(channel).or_default().push(handler),
            Err(_) => engine_warn!("ogre::WorkQueue", "Request handler registry poisoned"),
        }
    }

    pub fn add_response_handler(&mut self, channel: ChannelId, handler: Box<dyn ResponseHandler>) {
        self.response_handlers.entry(channel).or_default().push(handler);
    }

    /// Post a request; returns its id
    pub fn add_request(&mut self, channel: ChannelId, request_type: u16, data: Option<RequestData>) -> Result<RequestId> {
        if self.shut_down {
            engine_bail!("ogre::WorkQueue", InvalidState,
                "WorkQueue '{}' has shut down", self.name);
        }
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = Request { id, channel, request_type, data };
        if let Ok(mut tracking) = self.shared.tracking.lock() {
            tracking.outstanding.insert(id, channel);
        }

        match &self.request_tx {
            Some(tx) => {
                if tx.send(request).is_err() {
                    if let Ok(mut tracking) = self.shared.tracking.lock() {
                        tracking.outstanding.remove(&id);
                    }
                    engine_bail!("ogre::WorkQueue", InvalidState,
                        "WorkQueue '{}' worker has shut down", self.name);
                }
            }
            None => self.pending.push_back(request),
        }
        Ok(id)
    }

    pub fn abort_request(&self, id: RequestId) {
        if let Ok(mut tracking) = self.shared.tracking.lock() {
            if tracking.outstanding.contains_key(&id) {
                tracking.aborted.insert(id);
            }
        }
    }

    /// Abort every outstanding request of `channel`
    pub fn abort_requests_by_channel(&self, channel: ChannelId) {
        self.shared.abort_where(|c| c == channel);
    }

    pub fn abort_all_requests(&self) {
        self.shared.abort_where(|_| true);
    }

    /// Hold responses back; they are dispatched once unpaused
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Number of requests posted and not yet dispatched as responses
    pub fn outstanding_request_count(&self) -> usize {
        self.shared.tracking.lock().map(|t| t.outstanding.len()).unwrap_or(0)
    }

    /// Dispatch completed responses to their handlers, in submission order.
    /// Returns the number of responses dispatched.
    pub fn process_responses(&mut self) -> usize {
        if self.paused {
            return 0;
        }
        let mut responses = Vec::new();
        while let Some(request) = self.pending.pop_front() {
            responses.push(self.shared.process(request));
        }
        if let Some(rx) = &self.response_rx {
            responses.extend(rx.try_iter());
        }

        let count = responses.len();
        for mut response in responses {
            if let Ok(mut tracking) = self.shared.tracking.lock() {
                tracking.outstanding.remove(&response.request_id);
                if tracking.aborted.remove(&response.request_id) && !response.aborted {
                    response.aborted = true;
                    response.success = true;
                    response.data = None;
                }
            }
            self.dispatch(&response);
        }
        count
    }

    fn dispatch(&mut self, response: &Response) {
        if !response.success && !response.aborted {
            engine_warn!("ogre::WorkQueue", "Request {} on channel {} failed: {}",
                response.request_id, response.channel, response.messages);
        }
        let Some(handlers) = self.response_handlers.get_mut(&response.channel) else {
            return;
        };
        if let Some(handler) = handlers.iter_mut().find(|h| h.can_handle_response(response)) {
            handler.handle_response(response);
        }
    }

    /// Block until every posted request has a response ready (or timeout),
    /// then dispatch them. Returns false on timeout.
    pub fn wait_for_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_responses();
            if self.outstanding_request_count() == 0 {
                return true;
            }
            if self.paused || Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stop the worker after it drains its queue
    pub fn shutdown(&mut self) {
        self.shut_down = true;
        self.request_tx = None;
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                engine_warn!("ogre::WorkQueue", "WorkQueue '{}' worker panicked", self.name);
            }
            engine_info!("ogre::WorkQueue", "WorkQueue '{}' shut down", self.name);
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "work_queue_tests.rs"]
mod tests;
