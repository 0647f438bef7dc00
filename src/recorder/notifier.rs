// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


// Recording status notifier
//
// Listeners get the current snapshot on registration and a fresh one on
// every state change. Listeners run while the registry is read, so they
// must not register or unregister from inside the callback.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;

use super::state::RecorderState;
use crate::protocol::RecordingStatus;

pub type StatusListener = Box<dyn Fn(&RecordingStatus) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub struct StatusNotifier {
    state: Arc<RecorderState>,
    listeners: DashMap<u64, StatusListener>,
    next_id: AtomicU64,
}

impl StatusNotifier {
    pub fn new(state: Arc<RecorderState>) -> Self {
        Self {
            state,
            listeners: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn current_status(&self) -> RecordingStatus {
        self.state.current_status()
    }

    pub fn register(&self, listener: StatusListener) -> ListenerId {
        listener(&self.current_status());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, listener);
        ListenerId(id)
    }

    pub fn unregister(&self, id: ListenerId) {
        self.listeners.remove(&id.0);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn notify_all(&self) {
        let status = self.current_status();
        debug!(
            "Recording status changed: directory set = {}, recording = {:?}",
            status.directory_is_set, status.recording_channel_names
        );
        for listener in self.listeners.iter() {
            (listener.value())(&status);
        }
    }

    /// Register a listener that feeds a stream. Dropping or cancelling the
    /// stream unregisters it.
    pub fn subscribe(self: &Arc<Self>) -> StatusStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.register(Box::new(move |status| {
            let _ = tx.send(status.clone());
        }));
        StatusStream {
            id: Some(id),
            rx,
            notifier: Arc::downgrade(self),
        }
    }
}

pub struct StatusStream {
    id: Option<ListenerId>,
    rx: mpsc::UnboundedReceiver<RecordingStatus>,
    notifier: Weak<StatusNotifier>,
}

impl StatusStream {
    pub async fn recv(&mut self) -> Option<RecordingStatus> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RecordingStatus> {
        self.rx.try_recv().ok()
    }

    pub fn cancel(&mut self) {
        if let Some(id) = self.id.take() {
            if let Some(notifier) = self.notifier.upgrade() {
                notifier.unregister(id);
            }
            self.rx.close();
        }
    }
}

impl Drop for StatusStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for StatusStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusStream").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_register_delivers_current_status_immediately() {
        let notifier = StatusNotifier::new(Arc::new(RecorderState::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = notifier.register(Box::new(move |s| sink.lock().unwrap().push(s.clone())));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(!seen.lock().unwrap()[0].directory_is_set);

        notifier.notify_all();
        assert_eq!(seen.lock().unwrap().len(), 2);

        notifier.unregister(id);
        notifier.notify_all();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stream_unregisters_on_drop() {
        let notifier = Arc::new(StatusNotifier::new(Arc::new(RecorderState::default())));
        let mut stream = notifier.subscribe();
        assert_eq!(notifier.listener_count(), 1);
        assert!(stream.recv().await.is_some());

        drop(stream);
        assert_eq!(notifier.listener_count(), 0);
    }
}
