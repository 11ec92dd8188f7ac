//! Provider registry and dependency-injection container
//!
//! Providers are named capabilities (services and page objects) available to
//! test code and to other providers. A [`ProviderCollection`] instantiates
//! each provider lazily on first reference, resolving nested dependencies
//! through the [`ProviderContext`] handed to every factory, caching the
//! result so a given `(kind, name)` resolves to exactly one instance for the
//! lifetime of the collection.
//!
//! Because factories may suspend, concurrent resolution requests for the same
//! provider while resolution is in flight share the same pending future
//! rather than triggering a second factory invocation. Cycle detection rides
//! on the depth-first resolution chain carried by each context, so
//! independent concurrent callers are never mistaken for cycles.
//!
//! Factories are supplied by a [`ProviderRegistry`], an explicit registry
//! object the embedder assembles and passes by reference: config files name
//! providers, the registry maps those names to factory functions.

use crate::errors::{ProctorError, ProviderError, Result};
use crate::logging::Log;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use indexmap::IndexMap;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

/// A resolved provider instance, shared for the lifetime of the collection
pub type ProviderInstance = Arc<dyn Any + Send + Sync>;

/// Provider factory: receives the DI context, produces an instance
pub type ProviderFn =
    Arc<dyn Fn(ProviderContext) -> BoxFuture<'static, Result<ProviderInstance>> + Send + Sync>;

/// Custom test runner factory: receives the DI context, returns a failure count
pub type RunnerFn = Arc<dyn Fn(ProviderContext) -> BoxFuture<'static, Result<u64>> + Send + Sync>;

/// Capability kind; name uniqueness is scoped per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Shared service (datastore client, browser driver, ...)
    Service,
    /// Page-object capability layered over services
    PageObject,
}

impl ProviderKind {
    /// Get the kind as string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Service => "Service",
            ProviderKind::PageObject => "PageObject",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a provider within a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderKey {
    pub kind: ProviderKind,
    pub name: String,
}

/// Static descriptor of one provider: name, kind, factory
#[derive(Clone)]
pub struct ProviderSpec {
    pub name: String,
    pub kind: ProviderKind,
    factory: ProviderFn,
}

impl ProviderSpec {
    /// Create a spec from an already-boxed factory
    pub fn new(kind: ProviderKind, name: impl Into<String>, factory: ProviderFn) -> Self {
        Self {
            name: name.into(),
            kind,
            factory,
        }
    }

    /// Create a spec from a typed factory function
    pub fn from_factory<T, F, Fut>(kind: ProviderKind, name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ProviderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::new(kind, name, boxed_factory(factory))
    }

    /// Create a spec that resolves to an already-built value
    ///
    /// Used for the core providers the runner binds to its own state.
    pub fn from_value<T: Send + Sync + 'static>(
        kind: ProviderKind,
        name: impl Into<String>,
        value: Arc<T>,
    ) -> Self {
        Self::new(
            kind,
            name,
            Arc::new(move |_ctx| {
                let value = value.clone();
                async move { Ok(value as ProviderInstance) }.boxed()
            }),
        )
    }

    fn key(&self) -> ProviderKey {
        ProviderKey {
            kind: self.kind,
            name: self.name.clone(),
        }
    }

    /// Replace the factory with one that never completes
    ///
    /// Used during test analysis so that code which merely registers hooks
    /// against the provider never observes a resolved value.
    pub fn stubbed(self) -> Self {
        Self {
            factory: Arc::new(|_ctx| futures::future::pending::<Result<ProviderInstance>>().boxed()),
            ..self
        }
    }

    /// Wrap the factory so a pending (asynchronous) result is rejected
    ///
    /// Providers marked as required for test analysis must produce their
    /// value without suspending, since analysis never drives pending work.
    pub fn sync_checked(self) -> Self {
        let name = self.name.clone();
        let factory = self.factory.clone();
        Self {
            factory: Arc::new(move |ctx| {
                let name = name.clone();
                match factory(ctx).now_or_never() {
                    Some(result) => async move { result }.boxed(),
                    None => {
                        async move { Err(ProviderError::AnalysisRequiresSync { name }.into()) }
                            .boxed()
                    }
                }
            }),
            ..self
        }
    }
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

fn boxed_factory<T, F, Fut>(factory: F) -> ProviderFn
where
    T: Send + Sync + 'static,
    F: Fn(ProviderContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move |ctx| {
        let fut = factory(ctx);
        async move { fut.await.map(|value| Arc::new(value) as ProviderInstance) }.boxed()
    })
}

/// Explicit name-to-factory registry assembled by the embedder
///
/// Config files declare which providers a run uses by name; this registry
/// supplies the factories for those names. It is passed by reference to the
/// runner rather than living in process-wide static state, so each run's
/// provider universe is explicit and independently testable.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    services: HashMap<String, ProviderFn>,
    page_objects: HashMap<String, ProviderFn>,
    runners: HashMap<String, RunnerFn>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service factory under a name
    pub fn register_service<T, F, Fut>(&mut self, name: impl Into<String>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(ProviderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.services.insert(name.into(), boxed_factory(factory));
    }

    /// Register a page-object factory under a name
    pub fn register_page_object<T, F, Fut>(&mut self, name: impl Into<String>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(ProviderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.page_objects.insert(name.into(), boxed_factory(factory));
    }

    /// Register a custom test runner under a name
    pub fn register_runner<F, Fut>(&mut self, name: impl Into<String>, runner: F)
    where
        F: Fn(ProviderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<u64>> + Send + 'static,
    {
        self.runners
            .insert(name.into(), Arc::new(move |ctx| runner(ctx).boxed()));
    }

    /// Look up a registered custom test runner
    pub fn runner(&self, name: &str) -> Option<RunnerFn> {
        self.runners.get(name).cloned()
    }

    /// Build specs for the named providers of one kind
    ///
    /// ## Errors
    ///
    /// `ProviderError::NotRegistered` if a name has no registered factory.
    pub fn specs(&self, kind: ProviderKind, names: &[String]) -> Result<Vec<ProviderSpec>> {
        let table = match kind {
            ProviderKind::Service => &self.services,
            ProviderKind::PageObject => &self.page_objects,
        };
        names
            .iter()
            .map(|name| {
                let factory =
                    table
                        .get(name)
                        .cloned()
                        .ok_or_else(|| ProviderError::NotRegistered {
                            name: name.clone(),
                        })?;
                Ok(ProviderSpec::new(kind, name.clone(), factory))
            })
            .collect()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("page_objects", &self.page_objects.keys().collect::<Vec<_>>())
            .field("runners", &self.runners.keys().collect::<Vec<_>>())
            .finish()
    }
}

type ResolveFuture =
    Shared<BoxFuture<'static, std::result::Result<ProviderInstance, ProviderError>>>;

struct CollectionInner {
    specs: IndexMap<ProviderKey, ProviderSpec>,
    instances: Mutex<HashMap<ProviderKey, ResolveFuture>>,
}

/// Dependency-injection context handed to provider factories
///
/// Exposes `get_service` / `get_page_object` callbacks that recursively
/// resolve other providers on demand. The context carries the chain of
/// providers currently being resolved on this call path; requesting a
/// provider already on the chain is a cycle.
#[derive(Clone)]
pub struct ProviderContext {
    shared: Arc<CollectionInner>,
    chain: Vec<ProviderKey>,
}

impl ProviderContext {
    /// Resolve a service by name
    pub async fn get_service(&self, name: &str) -> Result<ProviderInstance> {
        self.resolve(ProviderKind::Service, name).await
    }

    /// Resolve a page object by name
    pub async fn get_page_object(&self, name: &str) -> Result<ProviderInstance> {
        self.resolve(ProviderKind::PageObject, name).await
    }

    /// Resolve a service and downcast it to a concrete type
    pub async fn get_service_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        downcast(name, self.get_service(name).await?)
    }

    /// Resolve a page object and downcast it to a concrete type
    pub async fn get_page_object_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        downcast(name, self.get_page_object(name).await?)
    }

    async fn resolve(&self, kind: ProviderKind, name: &str) -> Result<ProviderInstance> {
        let key = ProviderKey {
            kind,
            name: name.to_string(),
        };

        // A provider that is an ancestor of this resolution chain can never
        // complete before us; awaiting it would deadlock
        if self.chain.contains(&key) {
            let mut names: Vec<&str> = self.chain.iter().map(|k| k.name.as_str()).collect();
            names.push(key.name.as_str());
            return Err(ProviderError::Cycle {
                chain: names.join(" -> "),
            }
            .into());
        }

        let pending = {
            let mut instances = self.shared.instances.lock().unwrap();
            if let Some(existing) = instances.get(&key) {
                existing.clone()
            } else {
                let spec =
                    self.shared
                        .specs
                        .get(&key)
                        .ok_or_else(|| ProviderError::Unknown {
                            kind: kind.as_str().to_string(),
                            name: name.to_string(),
                        })?;
                debug!(kind = %kind, name = %key.name, "resolving provider");

                let factory = spec.factory.clone();
                let mut chain = self.chain.clone();
                chain.push(key.clone());
                let child = ProviderContext {
                    shared: self.shared.clone(),
                    chain,
                };
                let failing = key.name.clone();
                let fut: ResolveFuture = async move {
                    factory(child).await.map_err(|error| match error {
                        // A cycle already names its full chain; keep it intact
                        ProctorError::Provider(cycle @ ProviderError::Cycle { .. }) => cycle,
                        other => ProviderError::Resolution {
                            name: failing,
                            message: other.to_string(),
                        },
                    })
                }
                .boxed()
                .shared();
                instances.insert(key.clone(), fut.clone());
                fut
            }
        };

        pending.await.map_err(ProctorError::Provider)
    }
}

fn downcast<T: Any + Send + Sync>(name: &str, instance: ProviderInstance) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| {
        ProviderError::TypeMismatch {
            name: name.to_string(),
        }
        .into()
    })
}

/// Run-scoped dependency-injection container
///
/// Constructed from an ordered list of specs; insertion order is resolution
/// order for [`ProviderCollection::load_all`] so core providers resolve
/// before config-declared ones.
pub struct ProviderCollection {
    log: Log,
    inner: Arc<CollectionInner>,
}

impl ProviderCollection {
    /// Build a collection, rejecting duplicate `(kind, name)` registrations
    pub fn new(log: Log, specs: Vec<ProviderSpec>) -> Result<Self> {
        let mut map = IndexMap::with_capacity(specs.len());
        for spec in specs {
            let key = spec.key();
            if map.insert(key.clone(), spec).is_some() {
                return Err(ProviderError::Duplicate {
                    kind: key.kind.as_str().to_string(),
                    name: key.name,
                }
                .into());
            }
        }
        Ok(Self {
            log,
            inner: Arc::new(CollectionInner {
                specs: map,
                instances: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Whether a Service-kind spec with this name was registered
    ///
    /// Never triggers instantiation.
    pub fn has_service(&self, name: &str) -> bool {
        self.inner.specs.contains_key(&ProviderKey {
            kind: ProviderKind::Service,
            name: name.to_string(),
        })
    }

    /// A fresh root DI context (empty resolution chain)
    pub fn context(&self) -> ProviderContext {
        ProviderContext {
            shared: self.inner.clone(),
            chain: Vec::new(),
        }
    }

    /// Eagerly resolve every registered provider in registration order
    ///
    /// Fails fast on the first resolution error, which identifies the failing
    /// provider and the underlying cause.
    #[instrument(skip_all)]
    pub async fn load_all(&self) -> Result<()> {
        let keys: Vec<ProviderKey> = self.inner.specs.keys().cloned().collect();
        let ctx = self.context();
        for key in keys {
            self.log
                .verbose(format!("loading {} [{}]", key.kind, key.name));
            ctx.resolve(key.kind, &key.name).await?;
        }
        Ok(())
    }

    /// Invoke an arbitrary factory with the same DI context used for providers
    ///
    /// Used for the custom test runner escape hatch; the function's result or
    /// failure is forwarded unchanged.
    pub async fn invoke_provider_fn<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(ProviderContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        f(self.context()).await
    }
}

impl fmt::Debug for ProviderCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCollection")
            .field("specs", &self.inner.specs.keys().collect::<Vec<_>>())
            .finish()
    }
}
