//! Background resource operations
//!
//! Requests go through a [`WorkQueue`] channel. File reading and decoding
//! (prepare) run on the worker thread; anything touching the GPU (load,
//! unload) runs while the main thread dispatches responses. Each request
//! gets a ticket, and its listener is told on the main thread, in
//! submission order.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::resource::ResourceGroupManager;
use crate::work_queue::{
    ChannelId, Request, RequestHandler, RequestId, Response, ResponseHandler, WorkQueue,
};
use crate::{engine_error, engine_trivial};

const SOURCE: &str = "ogre::ResourceBackgroundQueue";
const CHANNEL_NAME: &str = "Resource";

/// Identifies one background request
pub type BackgroundProcessTicket = RequestId;

/// Outcome handed to a listener
#[derive(Debug, Clone, Default)]
pub struct BackgroundProcessResult {
    /// Error raised by the operation; the resource stays unloaded
    pub error: Option<Error>,
}

impl BackgroundProcessResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Told on the main thread when a request completes
pub trait ResourceBackgroundListener: Send {
    fn operation_completed(&mut self, ticket: BackgroundProcessTicket, result: &BackgroundProcessResult);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    InitialiseGroup,
    PrepareGroup,
    LoadGroup,
    UnloadGroup,
    PrepareResource,
    LoadResource,
    UnloadResource,
}

#[derive(Debug, Clone)]
struct ResourceRequest {
    kind: RequestKind,
    resource_type: String,
    name: String,
    group: String,
}

/// Worker-side outcome carried to the main thread
struct WorkerOutcome {
    request: ResourceRequest,
    error: Option<Error>,
}

#[derive(Default)]
struct Tickets {
    outstanding: FxHashSet<BackgroundProcessTicket>,
    listeners: FxHashMap<BackgroundProcessTicket, Box<dyn ResourceBackgroundListener>>,
}

// ===== WORKER SIDE =====

struct PrepareHandler {
    groups: Arc<ResourceGroupManager>,
}

impl PrepareHandler {
    fn run(&self, request: &ResourceRequest) -> Result<()> {
        match request.kind {
            RequestKind::InitialiseGroup => self.groups.initialise_resource_group(&request.group),
            // Prepare here; the GPU part runs on the main thread
            RequestKind::PrepareGroup | RequestKind::LoadGroup => {
                self.groups.prepare_resource_group(&request.group)
            }
            RequestKind::PrepareResource | RequestKind::LoadResource => {
                match self.groups.resource_manager(&request.resource_type) {
                    Some(manager) => manager.prepare_by_name(&request.name, &request.group),
                    None => Err(crate::engine_err!(SOURCE, ItemNotFound,
                        "No ResourceManager registered for type '{}'", request.resource_type)),
                }
            }
            RequestKind::UnloadGroup | RequestKind::UnloadResource => Ok(()),
        }
    }
}

impl RequestHandler for PrepareHandler {
    fn handle_request(&self, request: &mut Request) -> Response {
        let Some(resource_request) = request
            .data
            .take()
            .and_then(|d| d.downcast::<ResourceRequest>().ok())
        else {
            return Response::failure(request, "resource request without payload");
        };
        let error = self.run(&resource_request).err();
        Response::success(
            request,
            Some(Box::new(WorkerOutcome {
                request: *resource_request,
                error,
            })),
        )
    }
}

// ===== MAIN-THREAD SIDE =====

struct CompletionHandler {
    groups: Arc<ResourceGroupManager>,
    tickets: Arc<Mutex<Tickets>>,
}

impl CompletionHandler {
    fn finish(&self, request: &ResourceRequest) -> Result<()> {
        match request.kind {
            RequestKind::LoadGroup => self.groups.load_resource_group(&request.group),
            RequestKind::UnloadGroup => self.groups.unload_resource_group(&request.group, false),
            RequestKind::LoadResource | RequestKind::UnloadResource => {
                let Some(manager) = self.groups.resource_manager(&request.resource_type) else {
                    return Err(crate::engine_err!(SOURCE, ItemNotFound,
                        "No ResourceManager registered for type '{}'", request.resource_type));
                };
                if request.kind == RequestKind::LoadResource {
                    manager.load_by_name(&request.name, &request.group)
                } else {
                    manager.unload_by_name(&request.name, &request.group)
                }
            }
            _ => Ok(()),
        }
    }
}

impl ResponseHandler for CompletionHandler {
    fn handle_response(&mut self, response: &Response) {
        let mut result = BackgroundProcessResult::default();
        if !response.aborted {
            let outcome = response
                .data
                .as_ref()
                .and_then(|d| d.downcast_ref::<WorkerOutcome>());
            result.error = match outcome {
                Some(WorkerOutcome { error: Some(error), .. }) => Some(error.clone()),
                Some(WorkerOutcome { request, error: None }) => self.finish(request).err(),
                None => Some(Error::InternalError(response.messages.clone())),
            };
        }
        if let Some(error) = &result.error {
            engine_error!(SOURCE, "Background request {} failed: {}", response.request_id, error);
        }

        let listener = match self.tickets.lock() {
            Ok(mut tickets) => {
                tickets.outstanding.remove(&response.request_id);
                tickets.listeners.remove(&response.request_id)
            }
            Err(_) => None,
        };
        if let Some(mut listener) = listener {
            listener.operation_completed(response.request_id, &result);
        }
    }
}

// ===== QUEUE =====

pub struct ResourceBackgroundQueue {
    work_queue: WorkQueue,
    channel: ChannelId,
    tickets: Arc<Mutex<Tickets>>,
}

impl ResourceBackgroundQueue {
    /// `worker_count` 1 runs prepares on a background thread, 0 runs
    /// everything inside [`process_responses`](Self::process_responses)
    pub fn new(groups: Arc<ResourceGroupManager>, worker_count: usize) -> Result<Self> {
        let mut work_queue = WorkQueue::new("ResourceBackgroundQueue", worker_count)?;
        let channel = work_queue.channel_id(CHANNEL_NAME);
        let tickets = Arc::new(Mutex::new(Tickets::default()));
        work_queue.add_request_handler(channel, Arc::new(PrepareHandler { groups: groups.clone() }));
        work_queue.add_response_handler(
            channel,
            Box::new(CompletionHandler { groups, tickets: tickets.clone() }),
        );
        Ok(Self { work_queue, channel, tickets })
    }

    /// Underlying queue, for other subsystems' channels
    pub fn work_queue_mut(&mut self) -> &mut WorkQueue {
        &mut self.work_queue
    }

    fn submit(
        &mut self,
        kind: RequestKind,
        resource_type: &str,
        name: &str,
        group: &str,
        listener: Option<Box<dyn ResourceBackgroundListener>>,
    ) -> Result<BackgroundProcessTicket> {
        let request = ResourceRequest {
            kind,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            group: group.to_string(),
        };
        // Registered before posting so an inline or fast worker response finds it
        let mut tickets = self
            .tickets
            .lock()
            .map_err(|_| Error::InternalError("background ticket table poisoned".to_string()))?;
        let ticket = self.work_queue.add_request(self.channel, 0, Some(Box::new(request)))?;
        tickets.outstanding.insert(ticket);
        if let Some(listener) = listener {
            tickets.listeners.insert(ticket, listener);
        }
        drop(tickets);
        engine_trivial!(SOURCE, "Queued {:?} '{}' in group '{}' as ticket {}", kind, name, group, ticket);
        Ok(ticket)
    }

    pub fn initialise_resource_group(
        &mut self,
        group: &str,
        listener: Option<Box<dyn ResourceBackgroundListener>>,
    ) -> Result<BackgroundProcessTicket> {
        self.submit(RequestKind::InitialiseGroup, "", "", group, listener)
    }

    pub fn prepare_resource_group(
        &mut self,
        group: &str,
        listener: Option<Box<dyn ResourceBackgroundListener>>,
    ) -> Result<BackgroundProcessTicket> {
        self.submit(RequestKind::PrepareGroup, "", "", group, listener)
    }

    pub fn load_resource_group(
        &mut self,
        group: &str,
        listener: Option<Box<dyn ResourceBackgroundListener>>,
    ) -> Result<BackgroundProcessTicket> {
        self.submit(RequestKind::LoadGroup, "", "", group, listener)
    }

    pub fn unload_resource_group(
        &mut self,
        group: &str,
        listener: Option<Box<dyn ResourceBackgroundListener>>,
    ) -> Result<BackgroundProcessTicket> {
        self.submit(RequestKind::UnloadGroup, "", "", group, listener)
    }

    pub fn prepare(
        &mut self,
        resource_type: &str,
        name: &str,
        group: &str,
        listener: Option<Box<dyn ResourceBackgroundListener>>,
    ) -> Result<BackgroundProcessTicket> {
        self.submit(RequestKind::PrepareResource, resource_type, name, group, listener)
    }

    pub fn load(
        &mut self,
        resource_type: &str,
        name: &str,
        group: &str,
        listener: Option<Box<dyn ResourceBackgroundListener>>,
    ) -> Result<BackgroundProcessTicket> {
        self.submit(RequestKind::LoadResource, resource_type, name, group, listener)
    }

    pub fn unload(
        &mut self,
        resource_type: &str,
        name: &str,
        group: &str,
        listener: Option<Box<dyn ResourceBackgroundListener>>,
    ) -> Result<BackgroundProcessTicket> {
        self.submit(RequestKind::UnloadResource, resource_type, name, group, listener)
    }

    /// The ticket's listener has been called (or it never existed)
    pub fn is_process_complete(&self, ticket: BackgroundProcessTicket) -> bool {
        self.tickets
            .lock()
            .map(|t| !t.outstanding.contains(&ticket))
            .unwrap_or(true)
    }

    /// Skip the request's side effects; its listener still reports success
    pub fn abort(&self, ticket: BackgroundProcessTicket) {
        self.work_queue.abort_request(ticket);
    }

    /// Dispatch completions to listeners (main thread, once per frame)
    pub fn process_responses(&mut self) -> usize {
        self.work_queue.process_responses()
    }

    /// Block until every request has completed, or the timeout passes
    pub fn wait_for_idle(&mut self, timeout: Duration) -> bool {
        self.work_queue.wait_for_idle(timeout)
    }

    pub fn shutdown(&mut self) {
        self.work_queue.shutdown();
    }
}

#[cfg(test)]
#[path = "background_queue_tests.rs"]
mod tests;
