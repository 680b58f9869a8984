use crate::error::Result;

/// Connection request fields the registry needs to pick a backend.
pub trait Connect {
    /// Full connection string, e.g. `mpsse://0403:6014/`.
    fn uri(&self) -> Option<&str>;
    /// Backend requested by name, independent of any URI.
    fn backend(&self) -> Option<&str>;
}

/// A kind of bus handle that backends can produce (I2C, SPI, GPIO).
pub trait Bus: Sized {
    /// Short tag used in diagnostics.
    const KIND: &'static str;
    /// Connection parameters accepted by this kind's factories.
    type Params: Connect;
}

/// Abstracts bus creation for one transport.
///
/// A factory must decide on its own whether a request applies to it
/// (typically by matching its scheme against the URI) and either hand back
/// a fully constructed bus or fail without leaving anything allocated.
/// It must also fail cleanly when its transport is absent altogether.
pub trait BusFactory<B: Bus>: Send + Sync {
    /// Unique name, also the URI scheme that selects this backend.
    fn name(&self) -> &str;

    /// Build a bus for `params`.
    fn create(&self, params: &B::Params) -> Result<B>;
}

type CreateFn<B> = dyn Fn(&<B as Bus>::Params) -> Result<B> + Send + Sync;

/// A named factory function, the usual way backends describe themselves.
pub struct BackendDescriptor<B: Bus> {
    name: &'static str,
    create: Box<CreateFn<B>>,
}

impl<B: Bus> BackendDescriptor<B> {
    pub fn new<F>(name: &'static str, create: F) -> Self
    where
        F: Fn(&B::Params) -> Result<B> + Send + Sync + 'static,
    {
        Self { name, create: Box::new(create) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<B: Bus> BusFactory<B> for BackendDescriptor<B> {
    fn name(&self) -> &str {
        self.name
    }

    fn create(&self, params: &B::Params) -> Result<B> {
        (self.create)(params)
    }
}

impl<B: Bus> core::fmt::Debug for BackendDescriptor<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("kind", &B::KIND)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
