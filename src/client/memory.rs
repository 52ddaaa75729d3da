use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use super::{ApiError, ClusterApi, Propagation, Selectors};
use crate::document::{ResourceDocument, ResourceList};
use crate::registry::Gvr;

/// Client operations, for call counting and error injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    gvr: String,
    namespace: String,
    name: String,
}

impl Key {
    fn new(gvr: &Gvr, namespace: Option<&str>, name: &str) -> Self {
        Self {
            gvr: gvr.to_string(),
            namespace: namespace.unwrap_or_default().to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<Key, ResourceDocument>,
    version: u64,
    failures: HashMap<Operation, VecDeque<ApiError>>,
    calls: HashMap<Operation, usize>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    /// Count the call and pop an injected failure, if any
    fn enter(&mut self, op: Operation) -> Result<(), ApiError> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-process [`ClusterApi`] with API-server-like write semantics
///
/// - `create` fails with `AlreadyExists` when the name is taken
/// - `update` fails with `NotFound` for missing objects and `Conflict` when
///   the supplied `resourceVersion` is stale
/// - a no-op `update` keeps the stored `resourceVersion`
/// - label selectors support `k=v`, `k==v`, `k!=v`, `k` and `!k`; field
///   selectors support `=`, `==` and `!=` over dotted paths
///
/// Errors can be injected per operation with [`MemoryCluster::fail_next`].
///
/// # Example
///
/// ```
/// use weaver::client::{ClusterApi, MemoryCluster};
/// use weaver::registry::Gvr;
/// use serde_json::json;
///
/// # tokio_test_block(async {
/// let cluster = MemoryCluster::new();
/// let gvr = Gvr::new("", "v1", "configmaps");
/// cluster.insert(&gvr, json!({
///     "apiVersion": "v1",
///     "kind": "ConfigMap",
///     "metadata": { "name": "settings", "namespace": "default" }
/// }));
/// let doc = cluster.get(&gvr, Some("default"), "settings").await.unwrap();
/// assert_eq!(doc.name(), Some("settings"));
/// # });
/// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Mutex<State>,
}

impl MemoryCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object directly, bypassing create semantics
    ///
    /// The namespace is taken from `metadata.namespace`. A fresh
    /// `resourceVersion` is assigned.
    pub fn insert(&self, gvr: &Gvr, value: Value) -> ResourceDocument {
        let mut doc = ResourceDocument::new(value);
        let mut state = self.state();
        let version = state.next_version();
        doc.set_resource_version(Some(&version));
        let key = Key::new(gvr, doc.namespace(), doc.name().unwrap_or_default());
        state.objects.insert(key, doc.clone());
        doc
    }

    /// Stored copy of an object
    #[must_use]
    pub fn object(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<ResourceDocument> {
        self.state()
            .objects
            .get(&Key::new(gvr, namespace, name))
            .cloned()
    }

    /// Mutate a stored object in place, as a controller would
    ///
    /// Returns `false` when the object does not exist. The `resourceVersion`
    /// is bumped.
    pub fn modify(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        name: &str,
        f: impl FnOnce(&mut ResourceDocument),
    ) -> bool {
        let mut state = self.state();
        let version = state.next_version();
        match state.objects.get_mut(&Key::new(gvr, namespace, name)) {
            Some(doc) => {
                f(doc);
                doc.set_resource_version(Some(&version));
                true
            }
            None => false,
        }
    }

    /// Remove an object without going through `delete`
    pub fn remove(&self, gvr: &Gvr, namespace: Option<&str>, name: &str) -> bool {
        self.state()
            .objects
            .remove(&Key::new(gvr, namespace, name))
            .is_some()
    }

    /// Make the next call of `op` fail with `err`
    ///
    /// Injected failures queue up and are consumed one per call.
    pub fn fail_next(&self, op: Operation, err: ApiError) {
        self.state().failures.entry(op).or_default().push_back(err);
    }

    /// Number of calls made for `op`, including failed ones
    #[must_use]
    pub fn calls(&self, op: Operation) -> usize {
        self.state().calls.get(&op).copied().unwrap_or_default()
    }

    /// Number of objects stored under `gvr`
    #[must_use]
    pub fn count(&self, gvr: &Gvr) -> usize {
        let gvr = gvr.to_string();
        self.state()
            .objects
            .keys()
            .filter(|key| key.gvr == gvr)
            .count()
    }
}

#[async_trait]
impl ClusterApi for MemoryCluster {
    async fn get(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<ResourceDocument, ApiError> {
        let mut state = self.state();
        state.enter(Operation::Get)?;
        state
            .objects
            .get(&Key::new(gvr, namespace, name))
            .cloned()
            .ok_or_else(|| not_found(gvr, name))
    }

    async fn list(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        selectors: Selectors<'_>,
    ) -> Result<ResourceList, ApiError> {
        let mut state = self.state();
        state.enter(Operation::List)?;

        let labels = selectors.labels.map(parse_label_selector).transpose()?;
        let fields = selectors.fields.map(parse_field_selector).transpose()?;
        let gvr_key = gvr.to_string();

        let items = state
            .objects
            .iter()
            .filter(|(key, _)| key.gvr == gvr_key)
            .filter(|(key, _)| namespace.map_or(true, |ns| key.namespace == ns))
            .map(|(_, doc)| doc)
            .filter(|doc| labels.as_ref().map_or(true, |reqs| matches_labels(doc, reqs)))
            .filter(|doc| fields.as_ref().map_or(true, |reqs| matches_fields(doc, reqs)))
            .cloned()
            .collect();

        trace!(gvr = %gvr, namespace = ?namespace, "Listed objects");

        Ok(ResourceList {
            items,
            resource_version: Some(state.version.to_string()),
            continue_token: None,
        })
    }

    async fn create(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        doc: &ResourceDocument,
    ) -> Result<ResourceDocument, ApiError> {
        let mut state = self.state();
        state.enter(Operation::Create)?;

        let name = doc
            .name()
            .ok_or_else(|| ApiError::invalid("metadata.name: Required value"))?;
        let key = Key::new(gvr, namespace, name);
        if state.objects.contains_key(&key) {
            return Err(ApiError::already_exists(format!(
                "{} \"{name}\" already exists",
                gvr.resource
            )));
        }

        let mut stored = doc.clone();
        if let Some(ns) = namespace {
            stored.set_namespace(ns);
        }
        let version = state.next_version();
        stored.set_resource_version(Some(&version));
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        doc: &ResourceDocument,
    ) -> Result<ResourceDocument, ApiError> {
        let mut state = self.state();
        state.enter(Operation::Update)?;

        let name = doc
            .name()
            .ok_or_else(|| ApiError::invalid("metadata.name: Required value"))?;
        let key = Key::new(gvr, namespace, name);
        let current = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(gvr, name))?;

        if let Some(version) = doc.resource_version() {
            if current.resource_version() != Some(version) {
                return Err(ApiError::conflict(format!(
                    "the object has been modified; please apply your changes \
                     to the latest version of {} \"{name}\"",
                    gvr.resource
                )));
            }
        }

        let mut stored = doc.clone();
        if let Some(ns) = namespace {
            stored.set_namespace(ns);
        }
        stored.set_resource_version(current.resource_version());
        if stored == current {
            return Ok(current);
        }

        let version = state.next_version();
        stored.set_resource_version(Some(&version));
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        name: &str,
        _propagation: Propagation,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        state.enter(Operation::Delete)?;
        state
            .objects
            .remove(&Key::new(gvr, namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found(gvr, name))
    }
}

fn not_found(gvr: &Gvr, name: &str) -> ApiError {
    ApiError::not_found(format!("{} \"{name}\" not found", gvr.resource))
}

#[derive(Debug, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    NotExists(String),
}

fn parse_label_selector(selector: &str) -> Result<Vec<Requirement>, ApiError> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            if term.contains('(') || term.contains(' ') {
                return Err(ApiError::bad_request(format!(
                    "unsupported label selector term '{term}'"
                )));
            }
            Ok(parse_term(term).unwrap_or_else(|| match term.strip_prefix('!') {
                Some(key) => Requirement::NotExists(key.to_string()),
                None => Requirement::Exists(term.to_string()),
            }))
        })
        .collect()
}

fn parse_field_selector(selector: &str) -> Result<Vec<Requirement>, ApiError> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            parse_term(term).ok_or_else(|| {
                ApiError::bad_request(format!("invalid field selector term '{term}'"))
            })
        })
        .collect()
}

/// Parse `k!=v`, `k==v` or `k=v`
fn parse_term(term: &str) -> Option<Requirement> {
    if let Some((k, v)) = term.split_once("!=") {
        return Some(Requirement::NotEquals(k.trim().to_string(), v.trim().to_string()));
    }
    if let Some((k, v)) = term.split_once("==") {
        return Some(Requirement::Equals(k.trim().to_string(), v.trim().to_string()));
    }
    term.split_once('=')
        .map(|(k, v)| Requirement::Equals(k.trim().to_string(), v.trim().to_string()))
}

fn matches_labels(doc: &ResourceDocument, requirements: &[Requirement]) -> bool {
    let labels = doc.labels();
    requirements.iter().all(|req| match req {
        Requirement::Equals(k, v) => labels.get(k) == Some(v),
        Requirement::NotEquals(k, v) => labels.get(k) != Some(v),
        Requirement::Exists(k) => labels.contains_key(k),
        Requirement::NotExists(k) => !labels.contains_key(k),
    })
}

fn matches_fields(doc: &ResourceDocument, requirements: &[Requirement]) -> bool {
    let field = |path: &str| -> String {
        let pointer = format!("/{}", path.replace('.', "/"));
        match doc.pointer(&pointer) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    };
    requirements.iter().all(|req| match req {
        Requirement::Equals(k, v) => field(k) == *v,
        Requirement::NotEquals(k, v) => field(k) != *v,
        Requirement::Exists(_) | Requirement::NotExists(_) => false,
    })
}
