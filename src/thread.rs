//! Policies for creating the websocket worker threads.

use std::io;
use std::thread::JoinHandle;

use core_affinity::CoreId;
use log::warn;

/// Work executed by a worker thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Spawns the reader and keepalive workers of a websocket client.
pub trait ThreadFactory: Send + Sync {
    fn spawn(&self, name: String, task: Task) -> io::Result<JoinHandle<()>>;
}

/// Spawns plain named threads.
#[derive(Debug, Default, Copy, Clone)]
pub struct DefaultThreadFactory;

impl ThreadFactory for DefaultThreadFactory {
    fn spawn(&self, name: String, task: Task) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new().name(name).spawn(task)
    }
}

/// Spawns named threads pinned to a single cpu core.
///
/// ```no_run
/// use framelink::thread::PinnedThreadFactory;
/// use framelink::ws::WebsocketClient;
///
/// let client = WebsocketClient::builder("ws://127.0.0.1:9001/")
///     .unwrap()
///     .with_thread_factory(PinnedThreadFactory::new(2))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Copy, Clone)]
pub struct PinnedThreadFactory {
    cpu: usize,
}

impl PinnedThreadFactory {
    pub fn new(cpu: usize) -> Self {
        Self { cpu }
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }
}

impl ThreadFactory for PinnedThreadFactory {
    fn spawn(&self, name: String, task: Task) -> io::Result<JoinHandle<()>> {
        let cpu = self.cpu;
        std::thread::Builder::new().name(name).spawn(move || {
            if !core_affinity::set_for_current(CoreId { id: cpu }) {
                warn!("unable to pin thread {:?} to cpu {}", std::thread::current().name(), cpu);
            }
            task()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn should_spawn_named_thread() {
        let (tx, rx) = mpsc::channel();
        let handle = DefaultThreadFactory
            .spawn(
                "framelink-test".to_owned(),
                Box::new(move || {
                    tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
                }),
            )
            .unwrap();
        handle.join().unwrap();
        assert_eq!(Some("framelink-test".to_owned()), rx.recv().unwrap());
    }

    #[test]
    fn should_run_task_on_pinned_thread() {
        let (tx, rx) = mpsc::channel();
        let handle = PinnedThreadFactory::new(0)
            .spawn("framelink-pinned".to_owned(), Box::new(move || tx.send(42).unwrap()))
            .unwrap();
        handle.join().unwrap();
        assert_eq!(42, rx.recv().unwrap());
    }
}
