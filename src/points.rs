//! Point identity resolution.
//!
//! Two tables live here:
//!
//! - [`PointLookup`]: built by one decode worker for one archive pair, indexed by
//!   the logger's internal tag id and name. Owned by that worker until the batch
//!   is handed off, so it needs no locking.
//! - [`PointResolver`]: shared by every worker for the whole run, memoizing
//!   `external name -> point number/type` answers from the historian, failures
//!   included, so each name costs at most one remote lookup per run.
//!
//! Concurrent resolutions of the same uncached name are coalesced on a per-name
//! `OnceCell`; resolutions of different names only contend on the historian
//! connection lock.

use crate::error::{ConvertError, HistorianError};
use crate::historian::{HistorianConnection, PointKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Mapping of one logger tag to a historian point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointIdentity {
    /// Tag id in the logger's archives.
    pub internal_id: i32,
    /// Tag name in the logger's archives.
    pub internal_name: String,
    /// Name used for the historian lookup (renamed or the internal name).
    pub external_name: String,
    /// Historian point number, if resolved.
    pub external_id: Option<i32>,
    /// Historian point type, if resolved.
    pub external_kind: Option<PointKind>,
    /// `false` when the historian has no matching point; values for this tag are
    /// not forwarded.
    pub resolvable: bool,
}

/// Per-pair table of point identities.
#[derive(Debug, Clone, Default)]
pub struct PointLookup {
    by_id: HashMap<i32, PointIdentity>,
    by_name: HashMap<String, i32>,
}

impl PointLookup {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `identity`. Returns `false` (leaving the table unchanged) if its
    /// internal id or name is already present.
    pub fn add(&mut self, identity: PointIdentity) -> bool {
        if self.by_id.contains_key(&identity.internal_id)
            || self.by_name.contains_key(&identity.internal_name)
        {
            return false;
        }
        self.by_name
            .insert(identity.internal_name.clone(), identity.internal_id);
        self.by_id.insert(identity.internal_id, identity);
        true
    }

    /// Identity for a logger tag id.
    pub fn get_by_internal_id(&self, internal_id: i32) -> Option<&PointIdentity> {
        self.by_id.get(&internal_id)
    }

    /// Identity for a logger tag name.
    pub fn get_by_internal_name(&self, name: &str) -> Option<&PointIdentity> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Historian point number for a tag, only if it resolved.
    pub fn external_id_for(&self, internal_id: i32) -> Option<i32> {
        self.by_id
            .get(&internal_id)
            .filter(|p| p.resolvable)
            .and_then(|p| p.external_id)
    }

    /// Number of identities.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Number of identities that resolved.
    pub fn resolvable_count(&self) -> usize {
        self.by_id.values().filter(|p| p.resolvable).count()
    }

    /// Identities in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &PointIdentity> {
        self.by_id.values()
    }

    /// Logs every identity at debug level, ordered by internal id.
    pub fn log_all(&self) {
        let mut ids: Vec<_> = self.by_id.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(p) = self.by_id.get(&id) {
                debug!(
                    internal_id = p.internal_id,
                    internal_name = %p.internal_name,
                    external_name = %p.external_name,
                    external_id = ?p.external_id,
                    kind = ?p.external_kind,
                    resolvable = p.resolvable,
                    "point"
                );
            }
        }
    }
}

/// Cached answer for one external name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Resolution {
    external_id: Option<i32>,
    external_kind: Option<PointKind>,
}

impl Resolution {
    const UNRESOLVED: Resolution = Resolution {
        external_id: None,
        external_kind: None,
    };
}

/// Counters for [`PointResolver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Calls to [`PointResolver::resolve`].
    pub requests: usize,
    /// Names looked up remotely (cache misses).
    pub remote_lookups: usize,
    /// Names that could not be resolved, whether rejected locally or remotely.
    pub failures: usize,
}

impl ResolverStats {
    /// Requests that needed no remote lookup of their own.
    pub fn hits(&self) -> usize {
        self.requests.saturating_sub(self.remote_lookups)
    }
}

/// Run-wide memoizing resolver from external names to historian points.
pub struct PointResolver {
    connection: HistorianConnection,
    cache: Mutex<HashMap<String, Arc<OnceCell<Resolution>>>>,
    max_name_len: usize,
    requests: AtomicUsize,
    remote_lookups: AtomicUsize,
    failures: AtomicUsize,
}

impl PointResolver {
    /// Resolver over `connection`. Names longer than `max_name_len` are
    /// rejected without a remote call.
    pub fn new(connection: HistorianConnection, max_name_len: usize) -> Self {
        Self {
            connection,
            cache: Mutex::new(HashMap::new()),
            max_name_len,
            requests: AtomicUsize::new(0),
            remote_lookups: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Resolves a logger tag. `override_name` (from the rename table) replaces
    /// `internal_name` for the historian lookup.
    ///
    /// A point-number failure yields `resolvable == false`; a type failure
    /// still resolves, with kind [`PointKind::Unknown`].
    pub async fn resolve(
        &self,
        internal_id: i32,
        internal_name: &str,
        override_name: Option<&str>,
    ) -> PointIdentity {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let external_name = override_name.unwrap_or(internal_name);

        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.entry(external_name.to_string()).or_default().clone()
        };
        let resolution = *cell.get_or_init(|| self.lookup(external_name)).await;

        PointIdentity {
            internal_id,
            internal_name: internal_name.to_string(),
            external_name: external_name.to_string(),
            external_id: resolution.external_id,
            external_kind: resolution.external_kind,
            resolvable: resolution.external_id.is_some(),
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            requests: self.requests.load(Ordering::Relaxed),
            remote_lookups: self.remote_lookups.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    async fn lookup(&self, name: &str) -> Resolution {
        if name.len() > self.max_name_len {
            return self.unresolved(
                name,
                HistorianError::NameTooLong {
                    name: name.to_string(),
                    limit: self.max_name_len,
                },
            );
        }

        self.remote_lookups.fetch_add(1, Ordering::Relaxed);

        let external_id = match self.connection.find_point(name).await {
            Ok(id) => id,
            Err(source) => return self.unresolved(name, source),
        };

        let kind = self
            .connection
            .point_type(external_id)
            .await
            .unwrap_or_else(|e| {
                warn!(point = name, error = %e, "historian type lookup failed");
                PointKind::Unknown
            });

        debug!(point = name, id = external_id, ?kind, "resolved historian point");
        Resolution {
            external_id: Some(external_id),
            external_kind: Some(kind),
        }
    }

    fn unresolved(&self, name: &str, source: HistorianError) -> Resolution {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let error = ConvertError::Resolution {
            name: name.to_string(),
            source,
        };
        warn!(%error, "point not resolvable, its values will not be forwarded");
        Resolution::UNRESOLVED
    }
}
