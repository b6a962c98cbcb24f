use std::fmt::{Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, warn};


/// Callback interface for everything that fans events out to listeners: connection state
///  changes, application events, session events.
///
/// Observers are called synchronously on the notifying task. They should return quickly and
///  offload real work (e.g. by spawning a task or forwarding to a channel).
pub trait Observer<E>: Send + Sync {
    fn on_event(&self, event: &E) -> anyhow::Result<()>;
}

impl <E, F> Observer<E> for F
where F: Fn(&E) -> anyhow::Result<()> + Send + Sync
{
    fn on_event(&self, event: &E) -> anyhow::Result<()> {
        self(event)
    }
}


/// A de-duplicating set of observers with copy-on-write semantics: [Observers::notify] iterates
///  over a snapshot, so an observer can add or remove observers (including itself) from inside
///  its own callback without affecting the delivery that is in progress.
///
/// Each observer invocation is isolated: an error or a panic is logged, and delivery continues
///  with the remaining observers.
pub struct Observers<E> {
    name: &'static str,
    list: Mutex<Arc<Vec<Arc<dyn Observer<E>>>>>,
}
impl <E> Debug for Observers<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Observers{{{}: {}}}", self.name, self.len())
    }
}

impl <E> Observers<E> {
    pub fn new(name: &'static str) -> Observers<E> {
        Observers {
            name,
            list: Mutex::new(Arc::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<Arc<dyn Observer<E>>>>> {
        // the guarded data is replaced atomically, so it is consistent even after a panic
        self.list.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// returns `false` if the observer was registered already
    pub fn add(&self, observer: Arc<dyn Observer<E>>) -> bool {
        let mut lock = self.lock();
        if lock.iter().any(|o| same_observer(o, &observer)) {
            return false;
        }

        let mut new_list = lock.as_ref().clone();
        new_list.push(observer);
        *lock = Arc::new(new_list);
        true
    }

    /// returns `false` if the observer was not registered
    pub fn remove(&self, observer: &Arc<dyn Observer<E>>) -> bool {
        let mut lock = self.lock();
        let new_list = lock.iter()
            .filter(|o| !same_observer(o, observer))
            .cloned()
            .collect::<Vec<_>>();

        if new_list.len() == lock.len() {
            return false;
        }
        *lock = Arc::new(new_list);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, event: &E) {
        let snapshot = self.lock().clone();

        for observer in snapshot.iter() {
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(observers = self.name, "observer failed to handle event - continuing: {}", e);
                }
                Err(_) => {
                    error!(observers = self.name, "observer panicked while handling event - continuing");
                }
            }
        }
    }
}

fn same_observer<E>(a: &Arc<dyn Observer<E>>, b: &Arc<dyn Observer<E>>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}


#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;

    use super::*;

    fn counting_observer(counter: Arc<AtomicUsize>) -> Arc<dyn Observer<u32>> {
        Arc::new(move |_: &u32| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_add_is_deduplicating() {
        let observers = Observers::new("test");
        let counter = Arc::new(AtomicUsize::new(0));
        let observer = counting_observer(counter.clone());

        assert!(observers.add(observer.clone()));
        assert!(!observers.add(observer.clone()));
        assert_eq!(observers.len(), 1);

        observers.notify(&1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove() {
        let observers = Observers::new("test");
        let counter = Arc::new(AtomicUsize::new(0));
        let observer = counting_observer(counter.clone());

        assert!(!observers.remove(&observer));
        observers.add(observer.clone());
        assert!(observers.remove(&observer));
        assert!(observers.is_empty());

        observers.notify(&1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failing_observers_do_not_block_delivery() {
        let observers = Observers::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        observers.add(Arc::new(|_: &u32| -> anyhow::Result<()> { Err(anyhow!("broken")) }));
        observers.add(Arc::new(|_: &u32| -> anyhow::Result<()> { panic!("very broken") }));
        observers.add(counting_observer(counter.clone()));

        observers.notify(&1);
        observers.notify(&2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_observer_can_remove_itself_during_callback() {
        let observers = Arc::new(Observers::<u32>::new("test"));
        let counter = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Arc<dyn Observer<u32>>>>> = Default::default();

        let self_removing: Arc<dyn Observer<u32>> = {
            let observers = observers.clone();
            let slot = slot.clone();
            let counter = counter.clone();
            Arc::new(move |_: &u32| -> anyhow::Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(me) = slot.lock().unwrap().take() {
                    observers.remove(&me);
                }
                Ok(())
            })
        };
        *slot.lock().unwrap() = Some(self_removing.clone());
        observers.add(self_removing);

        let other_counter = Arc::new(AtomicUsize::new(0));
        observers.add(counting_observer(other_counter.clone()));

        observers.notify(&1);
        observers.notify(&2);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(other_counter.load(Ordering::SeqCst), 2);
    }
}
