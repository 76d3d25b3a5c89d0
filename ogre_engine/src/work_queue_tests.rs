use super::*;
use std::sync::atomic::AtomicUsize;

// ============================================================================
// Helpers
// ============================================================================

/// Doubles a u32 payload and counts invocations
struct Doubler {
    calls: Arc<AtomicUsize>,
}

impl RequestHandler for Doubler {
    fn handle_request(&self, request: &mut Request) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = request
            .data
            .take()
            .and_then(|d| d.downcast::<u32>().ok())
            .map(|v| *v)
            .unwrap_or(0);
        if value == 13 {
            return Response::failure(request, "unlucky");
        }
        Response::success(request, Some(Box::new(value * 2)))
    }
}

/// Records (request id, payload, success, aborted) of each response
struct Collector {
    seen: Arc<Mutex<Vec<(RequestId, Option<u32>, bool, bool)>>>,
}

impl ResponseHandler for Collector {
    fn handle_response(&mut self, response: &Response) {
        let value = response.data.as_ref().and_then(|d| d.downcast_ref::<u32>()).copied();
        self.seen
            .lock()
            .unwrap()
            .push((response.request_id, value, response.success, response.aborted));
    }
}

struct Fixture {
    queue: WorkQueue,
    channel: ChannelId,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<(RequestId, Option<u32>, bool, bool)>>>,
}

fn fixture(worker_count: usize) -> Fixture {
    let mut queue = WorkQueue::new("Test", worker_count).unwrap();
    let channel = queue.channel_id("Doubler");
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    queue.add_request_handler(channel, Arc::new(Doubler { calls: calls.clone() }));
    queue.add_response_handler(channel, Box::new(Collector { seen: seen.clone() }));
    Fixture { queue, channel, calls, seen }
}

fn post(f: &mut Fixture, value: u32) -> RequestId {
    f.queue.add_request(f.channel, 0, Some(Box::new(value))).unwrap()
}

// ============================================================================
// Channels
// ============================================================================

#[test]
fn test_channel_ids_are_stable() {
    let mut queue = WorkQueue::new("Channels", 0).unwrap();
    let a = queue.channel_id("Resource");
    let b = queue.channel_id("Terrain");
    assert_ne!(a, b);
    assert_eq!(queue.channel_id("Resource"), a);
}

#[test]
fn test_more_than_one_worker_rejected() {
    assert!(WorkQueue::new("Pool", 4).is_err());
}

// ============================================================================
// Inline mode
// ============================================================================

#[test]
fn test_inline_requests_run_in_process_responses() {
    let mut f = fixture(0);
    let a = post(&mut f, 1);
    let b = post(&mut f, 2);
    assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.queue.outstanding_request_count(), 2);

    assert_eq!(f.queue.process_responses(), 2);
    assert_eq!(
        *f.seen.lock().unwrap(),
        vec![(a, Some(2), true, false), (b, Some(4), true, false)]
    );
    assert_eq!(f.queue.outstanding_request_count(), 0);
}

#[test]
fn test_failed_request_reported() {
    let mut f = fixture(0);
    let id = post(&mut f, 13);
    f.queue.process_responses();
    assert_eq!(*f.seen.lock().unwrap(), vec![(id, None, false, false)]);
}

#[test]
fn test_abort_skips_handler() {
    let mut f = fixture(0);
    let a = post(&mut f, 1);
    let b = post(&mut f, 2);
    f.queue.abort_request(a);
    f.queue.process_responses();

    assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *f.seen.lock().unwrap(),
        vec![(a, None, true, true), (b, Some(4), true, false)]
    );
}

#[test]
fn test_abort_by_channel() {
    let mut f = fixture(0);
    let other = f.queue.channel_id("Other");
    f.queue.add_request_handler(other, Arc::new(Doubler { calls: f.calls.clone() }));
    post(&mut f, 1);
    post(&mut f, 2);
    f.queue.add_request(other, 0, Some(Box::new(5u32))).unwrap();

    f.queue.abort_requests_by_channel(f.channel);
    f.queue.process_responses();
    assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    assert!(f.seen.lock().unwrap().iter().all(|(_, _, _, aborted)| *aborted));
}

#[test]
fn test_paused_queue_holds_responses() {
    let mut f = fixture(0);
    post(&mut f, 1);
    f.queue.set_paused(true);
    assert_eq!(f.queue.process_responses(), 0);
    f.queue.set_paused(false);
    assert_eq!(f.queue.process_responses(), 1);
}

#[test]
fn test_missing_request_handler_fails() {
    let mut queue = WorkQueue::new("Empty", 0).unwrap();
    let channel = queue.channel_id("Nobody");
    let seen = Arc::new(Mutex::new(Vec::new()));
    queue.add_response_handler(channel, Box::new(Collector { seen: seen.clone() }));
    queue.add_request(channel, 0, None).unwrap();
    queue.process_responses();
    assert!(!seen.lock().unwrap()[0].2);
}

// ============================================================================
// Worker thread
// ============================================================================

#[test]
fn test_worker_preserves_submission_order() {
    let mut f = fixture(1);
    let ids: Vec<RequestId> = (0..50).map(|i| post(&mut f, i)).collect();
    assert!(f.queue.wait_for_idle(Duration::from_secs(10)));

    let seen = f.seen.lock().unwrap();
    let order: Vec<RequestId> = seen.iter().map(|(id, ..)| *id).collect();
    assert_eq!(order, ids);
    assert_eq!(seen[10].1, Some(20));
}

#[test]
fn test_worker_responses_dispatched_on_caller_thread() {
    struct ThreadCheck {
        main: thread::ThreadId,
        ok: Arc<AtomicUsize>,
    }
    impl ResponseHandler for ThreadCheck {
        fn handle_response(&mut self, _response: &Response) {
            if thread::current().id() == self.main {
                self.ok.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    let mut queue = WorkQueue::new("Threads", 1).unwrap();
    let channel = queue.channel_id("Doubler");
    let ok = Arc::new(AtomicUsize::new(0));
    queue.add_request_handler(channel, Arc::new(Doubler { calls: Arc::new(AtomicUsize::new(0)) }));
    queue.add_response_handler(channel, Box::new(ThreadCheck { main: thread::current().id(), ok: ok.clone() }));
    queue.add_request(channel, 0, Some(Box::new(3u32))).unwrap();
    assert!(queue.wait_for_idle(Duration::from_secs(10)));
    assert_eq!(ok.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shutdown_joins_worker() {
    let mut f = fixture(1);
    post(&mut f, 1);
    f.queue.shutdown();
    assert!(f.queue.add_request(f.channel, 0, None).is_err());
}
