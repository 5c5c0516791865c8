use std::sync::{Arc, Mutex};

use crate::ws::{OpenRequest, Transport};

/// Transport that records open requests so tests can play the peer.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    requests: Arc<Mutex<Vec<OpenRequest>>>,
}

impl Transport for MockTransport {
    fn open(&self, request: OpenRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

impl MockTransport {
    pub fn opened(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn with<R>(&self, index: usize, f: impl FnOnce(&mut OpenRequest) -> R) -> R {
        let mut requests = self.requests.lock().unwrap();
        f(&mut requests[index])
    }

    pub fn with_last<R>(&self, f: impl FnOnce(&mut OpenRequest) -> R) -> R {
        let mut requests = self.requests.lock().unwrap();
        let last = requests.last_mut().expect("no connection opened");
        f(last)
    }

    /// Drop both channel ends of every connection, as a crashed transport would.
    pub fn drop_all(&self) {
        self.requests.lock().unwrap().clear();
    }
}
