//! Driver-wide event notifications.

use alloc::{sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicUsize, Ordering};

use bitflags::bitflags;
use spin::Mutex;
use utils::debug_ex;

use crate::error::Rmi4Error;

bitflags! {
    /// Events delivered through the notification list.
    pub struct NotificationEvent: u32 {
        /// The device was reset and its function set must be rediscovered.
        const DRIVER_RESET = 0x01;
    }
}

pub trait NotificationHandler: Send + Sync {
    fn on_notification(&self, event: NotificationEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NotifyToken(usize);

struct Subscription {
    token: NotifyToken,
    events: NotificationEvent,
    handler: Arc<dyn NotificationHandler>,
}

/// Subscribers to [NotificationEvent]s, independent of any function.
pub struct NotifyList {
    entries: Mutex<Vec<Subscription>>,
    next_token: AtomicUsize,
}

impl NotifyList {
    pub const fn new() -> NotifyList {
        NotifyList {
            entries: Mutex::new(Vec::new()),
            next_token: AtomicUsize::new(0),
        }
    }

    pub fn request(
        &self,
        events: NotificationEvent,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<NotifyToken, Rmi4Error> {
        let mut entries = self.entries.lock();
        entries.try_reserve(1)?;
        let token = NotifyToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        entries.push(Subscription {
            token,
            events,
            handler,
        });
        debug_ex!("Notification {:?} requested for {:?}", token, events);
        Ok(token)
    }

    /// Drop the subscription `token`. Return `false` if it was not present.
    pub fn release(&self, token: NotifyToken) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|s| s.token != token);
        entries.len() != before
    }

    /// Deliver `event` to every subscriber whose mask intersects it.
    ///
    /// Handlers run after the list lock is released, so they may subscribe or
    /// release from within the callback. Return the number of handlers invoked.
    pub fn notify(&self, event: NotificationEvent) -> usize {
        let due: Vec<Arc<dyn NotificationHandler>> = self
            .entries
            .lock()
            .iter()
            .filter(|s| s.events.intersects(event))
            .map(|s| s.handler.clone())
            .collect();

        for handler in due.iter() {
            handler.on_notification(event);
        }
        due.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotifyList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Recorder(StdMutex<Vec<NotificationEvent>>);

    impl NotificationHandler for Recorder {
        fn on_notification(&self, event: NotificationEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    /// Releases its own subscription from inside the callback.
    struct OneShot {
        list: Arc<NotifyList>,
        token: Mutex<Option<NotifyToken>>,
    }

    impl NotificationHandler for OneShot {
        fn on_notification(&self, _event: NotificationEvent) {
            if let Some(token) = self.token.lock().take() {
                self.list.release(token);
            }
        }
    }

    #[test]
    fn masks_select_subscribers() {
        let list = NotifyList::new();
        let hit = Arc::new(Recorder(StdMutex::new(Vec::new())));
        let miss = Arc::new(Recorder(StdMutex::new(Vec::new())));
        list.request(NotificationEvent::DRIVER_RESET, hit.clone()).unwrap();
        list.request(NotificationEvent::empty(), miss.clone()).unwrap();

        assert_eq!(list.notify(NotificationEvent::DRIVER_RESET), 1);
        assert_eq!(*hit.0.lock().unwrap(), vec![NotificationEvent::DRIVER_RESET]);
        assert!(miss.0.lock().unwrap().is_empty());
    }

    #[test]
    fn release_by_token() {
        let list = NotifyList::new();
        let rec = Arc::new(Recorder(StdMutex::new(Vec::new())));
        let a = list.request(NotificationEvent::DRIVER_RESET, rec.clone()).unwrap();
        let b = list.request(NotificationEvent::DRIVER_RESET, rec.clone()).unwrap();

        assert!(list.release(a));
        assert!(!list.release(a));
        assert_eq!(list.notify(NotificationEvent::DRIVER_RESET), 1);
        assert!(list.release(b));
        assert!(list.is_empty());
    }

    #[test]
    fn handler_may_release_itself() {
        let list = Arc::new(NotifyList::new());
        let once = Arc::new(OneShot {
            list: list.clone(),
            token: Mutex::new(None),
        });
        let token = list.request(NotificationEvent::DRIVER_RESET, once.clone()).unwrap();
        *once.token.lock() = Some(token);

        assert_eq!(list.notify(NotificationEvent::DRIVER_RESET), 1);
        assert_eq!(list.notify(NotificationEvent::DRIVER_RESET), 0);
    }
}
