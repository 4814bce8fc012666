use log::debug;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use super::{ReqwestTransport, Transport};
use crate::error::ConfigError;

/// Builds the transport behind a [`SharedSession`].
pub type TransportFactory = Box<dyn Fn() -> Result<Arc<dyn Transport>, ConfigError> + Send + Sync>;

/// Lazily created transport shared by every client holding the handle.
///
/// The factory runs at most once successfully, no matter how many threads
/// race on the first [`get`](Self::get). After that, reads are lock-free.
pub struct SharedSession {
    transport: OnceLock<Arc<dyn Transport>>,
    init: Mutex<()>,
    factory: TransportFactory,
}

impl SharedSession {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Transport>, ConfigError> + Send + Sync + 'static,
    {
        Self {
            transport: OnceLock::new(),
            init: Mutex::new(()),
            factory: Box::new(factory),
        }
    }

    /// A session backed by [`ReqwestTransport`].
    pub fn reqwest() -> Self {
        Self::new(|| Ok(Arc::new(ReqwestTransport::new()?) as Arc<dyn Transport>))
    }

    /// A session that is already initialized with `transport`.
    pub fn from_transport(transport: Arc<dyn Transport>) -> Self {
        let session =
            Self::new(|| Err(ConfigError::Session("session already initialized".to_string())));
        let _ = session.transport.set(transport);
        session
    }

    /// Returns the transport, creating it on first use.
    pub fn get(&self) -> Result<Arc<dyn Transport>, ConfigError> {
        if let Some(transport) = self.transport.get() {
            return Ok(Arc::clone(transport));
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(transport) = self.transport.get() {
            return Ok(Arc::clone(transport));
        }

        debug!("Creating shared HTTP session");
        let transport = (self.factory)()?;
        let _ = self.transport.set(Arc::clone(&transport));
        Ok(transport)
    }

    pub fn is_initialized(&self) -> bool {
        self.transport.get().is_some()
    }
}

impl Default for SharedSession {
    fn default() -> Self {
        Self::reqwest()
    }
}

impl fmt::Debug for SharedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSession")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
