use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::session::rendezvous::RendezvousProposal;
use crate::util::normalize::normalize;
use crate::util::observers::{Observer, Observers};
use crate::util::random::{Random, RngRandom};


pub type SessionId = u64;

/// Sessions are identified by session id *and* peer: the same id used by two different peers
///  denotes two different sessions.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionKey {
    pub session_id: SessionId,
    /// normalized
    pub peer: String,
}
impl SessionKey {
    pub fn new(session_id: SessionId, peer: &str) -> SessionKey {
        SessionKey {
            session_id,
            peer: normalize(peer),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionOrigin {
    /// created locally, the peer has not necessarily heard of it yet
    Outgoing,
    /// created because a peer referred to it
    Incoming,
}


#[derive(Clone, Debug)]
pub enum SessionEvent {
    Proposal(RendezvousProposal),
    /// the local side declined or aborted the session
    Cancelled,
}

pub struct Session {
    key: SessionKey,
    origin: SessionOrigin,
    listeners: Observers<SessionEvent>,
}
impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session{{{:?}, {:?}}}", self.key, self.origin)
    }
}
impl Session {
    fn new(key: SessionKey, origin: SessionOrigin) -> Session {
        Session {
            key,
            origin,
            listeners: Observers::new("session"),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn session_id(&self) -> SessionId {
        self.key.session_id
    }

    pub fn peer(&self) -> &str {
        &self.key.peer
    }

    pub fn origin(&self) -> SessionOrigin {
        self.origin
    }

    pub fn subscribe(&self, listener: Arc<dyn Observer<SessionEvent>>) -> bool {
        self.listeners.add(listener)
    }

    pub fn unsubscribe(&self, listener: &Arc<dyn Observer<SessionEvent>>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn deliver(&self, event: &SessionEvent) {
        trace!(session = ?self.key, "delivering {:?}", event);
        self.listeners.notify(event);
    }
}


#[derive(Clone, Debug)]
pub enum RegistryEvent {
    NewSession(Arc<Session>),
}


/// Registry of all sessions of an engine. Sessions are created on first reference and live until
///  an application removes them explicitly.
///
/// The registry's lock protects the map only. Events (registry events as well as per-session
///  events) are delivered after it was released, so listeners may call back into the registry.
pub struct SessionRegistry {
    sessions: Mutex<FxHashMap<SessionKey, Arc<Session>>>,
    observers: Observers<RegistryEvent>,
}
impl Debug for SessionRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionRegistry{{sessions:{}}}", self.len())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        SessionRegistry {
            sessions: Default::default(),
            observers: Observers::new("session registry"),
        }
    }
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        Default::default()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<SessionKey, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<RegistryEvent>>) -> bool {
        self.observers.add(observer)
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<RegistryEvent>>) -> bool {
        self.observers.remove(observer)
    }

    /// Creates a session with a fresh local session id. This does not emit a registry event: the
    ///  caller knows about the session already.
    pub fn create_session(&self, peer: &str) -> Arc<Session> {
        let mut sessions = self.lock();
        loop {
            let key = SessionKey::new(RngRandom::next_u64(), peer);
            if sessions.contains_key(&key) {
                continue;
            }

            debug!(?key, "creating outgoing session");
            let session = Arc::new(Session::new(key.clone(), SessionOrigin::Outgoing));
            sessions.insert(key, session.clone());
            return session;
        }
    }

    /// Returns the existing session, or creates a new one and announces it to registry observers
    ///  before returning it
    pub fn get_or_create(&self, session_id: SessionId, peer: &str) -> Arc<Session> {
        let key = SessionKey::new(session_id, peer);

        let session = {
            let mut sessions = self.lock();
            if let Some(existing) = sessions.get(&key) {
                return existing.clone();
            }

            debug!(?key, "creating incoming session");
            let session = Arc::new(Session::new(key.clone(), SessionOrigin::Incoming));
            sessions.insert(key, session.clone());
            session
        };

        self.observers.notify(&RegistryEvent::NewSession(session.clone()));
        session
    }

    pub fn get(&self, session_id: SessionId, peer: &str) -> Option<Arc<Session>> {
        self.lock().get(&SessionKey::new(session_id, peer)).cloned()
    }

    /// Delivers an event to the listeners of an existing session. Returns `false` if there is no
    ///  such session.
    pub fn route(&self, session_id: SessionId, peer: &str, event: &SessionEvent) -> bool {
        match self.get(session_id, peer) {
            Some(session) => {
                session.deliver(event);
                true
            }
            None => {
                debug!(session_id, peer, "no session to route {:?} to", event);
                false
            }
        }
    }

    pub fn remove(&self, session_id: SessionId, peer: &str) -> Option<Arc<Session>> {
        self.lock().remove(&SessionKey::new(session_id, peer))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
