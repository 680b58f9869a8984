use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::factory::{Bus, BusFactory, Connect};
use crate::uri::Cursor;

/// Ordered set of backends able to produce one kind of bus.
///
/// New entries go to the head, so probing tries the most recently
/// registered backend first. Names are unique; a duplicate registration is
/// rejected and the existing entry stays in place.
///
/// Registration takes `&mut self` and is meant to happen during start-up,
/// before any [`create_bus`](Self::create_bus) call.
pub struct Registry<B: Bus> {
    /// Probe order: index 0 is the head.
    entries: Vec<Arc<dyn BusFactory<B>>>,
    /// Backend used for explicit selection when a request names none.
    preferred: Option<String>,
}

impl<B: Bus> Default for Registry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Bus> Registry<B> {
    pub fn new() -> Self {
        Self { entries: Vec::new(), preferred: None }
    }

    /// Fall back to `name` whenever a request carries neither a backend
    /// name nor a URI.
    pub fn set_preferred(&mut self, name: Option<String>) {
        self.preferred = name;
    }

    pub fn preferred(&self) -> Option<&str> {
        self.preferred.as_deref()
    }

    /// Register a backend. See [`register_shared`](Self::register_shared).
    pub fn register<F>(&mut self, factory: F) -> Result<()>
    where
        F: BusFactory<B> + 'static,
    {
        self.register_shared(Arc::new(factory))
    }

    /// Register a backend that may also be held elsewhere.
    ///
    /// Fails with [`Error::InvalidName`] if the name is empty or already
    /// taken, or if this very instance is already registered.
    pub fn register_shared(
        &mut self,
        factory: Arc<dyn BusFactory<B>>,
    ) -> Result<()> {
        let name = factory.name();
        if name.is_empty() {
            error!(kind = B::KIND, "refusing to register an unnamed backend");
            return Err(Error::InvalidName);
        }
        let duplicate = self.entries.iter().any(|entry| {
            core::ptr::addr_eq(Arc::as_ptr(entry), Arc::as_ptr(&factory))
                || entry.name() == name
        });
        if duplicate {
            error!(kind = B::KIND, name, "backend is already registered");
            return Err(Error::InvalidName);
        }

        debug!(kind = B::KIND, name, "backend registered");
        self.entries.insert(0, factory);
        Ok(())
    }

    /// Registered backend names in probe order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.name())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Create a bus for `params`.
    ///
    /// If the request names a backend (its `backend` field, else its URI,
    /// else the preferred backend) only the first entry whose name prefixes
    /// that request, followed by end-of-string or `:`, is asked. Otherwise
    /// every backend is tried in probe order and the first success wins; if
    /// all fail, the last failure is returned.
    pub fn create_bus(&self, params: &B::Params) -> Result<B> {
        let requested = params
            .backend()
            .or_else(|| params.uri())
            .or(self.preferred.as_deref());

        match requested {
            Some(requested) => self.create_named(requested, params),
            None => self.probe(params),
        }
    }

    fn create_named(&self, requested: &str, params: &B::Params) -> Result<B> {
        let Some(factory) = self.find(requested) else {
            warn!(kind = B::KIND, requested, "no backend matches");
            return Err(Error::InvalidName);
        };

        debug!(kind = B::KIND, backend = factory.name(), "explicit selection");
        factory.create(params).inspect_err(|err| {
            warn!(
                kind = B::KIND,
                backend = factory.name(),
                uri = ?params.uri(),
                %err,
                "can't create instance"
            );
        })
    }

    fn probe(&self, params: &B::Params) -> Result<B> {
        let mut result = Err(Error::NoDevice);
        for factory in &self.entries {
            match factory.create(params) {
                Ok(bus) => {
                    debug!(kind = B::KIND, backend = factory.name(), "probed");
                    return Ok(bus);
                }
                Err(err) => {
                    debug!(
                        kind = B::KIND,
                        backend = factory.name(),
                        %err,
                        "backend declined"
                    );
                    result = Err(err);
                }
            }
        }

        warn!(kind = B::KIND, uri = ?params.uri(), "can't create instance");
        result
    }

    fn find(&self, requested: &str) -> Option<&Arc<dyn BusFactory<B>>> {
        self.entries.iter().find(|entry| selects(entry.name(), requested))
    }
}

/// Whether backend `name` is selected by `requested`: `name` must be a
/// prefix of `requested` ending at end-of-string or a `:`.
fn selects(name: &str, requested: &str) -> bool {
    let mut cursor = Cursor::from(requested);
    match cursor.match_literal(name) {
        Ok(n) if n > 0 => cursor.is_at_end() || cursor.rest().starts_with(':'),
        _ => false,
    }
}

impl<B: Bus> core::fmt::Debug for Registry<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &B::KIND)
            .field("entries", &self.names().collect::<Vec<_>>())
            .field("preferred", &self.preferred)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::selects;

    #[test]
    fn name_selects_exact_or_scheme_prefix() {
        assert!(selects("mpsse", "mpsse"));
        assert!(selects("mpsse", "mpsse://0403:6014/"));
        assert!(selects("mpsse", "mpsse:"));
    }

    #[test]
    fn name_does_not_select_longer_tokens() {
        assert!(!selects("mpsse", "mpsse2"));
        assert!(!selects("mpsse", "libmpsse://"));
        assert!(!selects("pigpiod", "pig"));
    }
}
