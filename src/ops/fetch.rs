//! Fetch coordination.
//!
//! The coordinator is the one entry point callers use to turn a
//! [`PackageReference`] into a ready-to-use directory. It guarantees that at
//! most one fetch per request key is in flight: concurrent requests for the
//! same key attach to the running fetch and all observe its outcome.
//!
//! A fetch goes through these steps:
//!
//! 1. Pin the reference to its cache key (git branches are re-resolved here)
//! 2. Serve a published cache entry if there is one
//! 3. Otherwise fetch into a private staging directory
//! 4. Publish the staged tree atomically and release any waiters
//!
//! Failures are never remembered. The in-flight slot is removed before its
//! waiters are woken, so the next request for the key starts over.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use anyhow::Result;
use rayon::prelude::*;

use crate::core::{FetchKey, PackageReference};
use crate::sources::cache::{CacheEntry, CacheStore, Lookup};
use crate::sources::{
    Dispatcher, FetchContext, FetchError, FetchResult, Fetcher, Git2Client, HttpClient, Pinned,
    QuayResult, ReqwestClient, VcsClient,
};
use crate::util::Config;

/// What every party to one fetch observes.
pub type Outcome = QuayResult<Arc<FetchResult>>;

/// Counters describing the work a coordinator has done.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    /// Requests that ran a fetch themselves
    pub driven: usize,
    /// Requests that waited on another request's fetch
    pub attached: usize,
    /// Driven requests served from a published cache entry
    pub cache_hits: usize,
}

#[derive(Debug, Default)]
struct Counters {
    driven: AtomicUsize,
    attached: AtomicUsize,
    cache_hits: AtomicUsize,
}

/// One in-flight fetch and the outcome its waiters block on.
#[derive(Debug, Default)]
struct InFlight {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl InFlight {
    fn complete(&self, outcome: Outcome) {
        *lock(&self.outcome) = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut outcome = lock(&self.outcome);
        loop {
            if let Some(outcome) = outcome.as_ref() {
                return outcome.clone();
            }
            outcome = self.done.wait(outcome).unwrap_or_else(|e| e.into_inner());
        }
    }
}

type InFlightMap = Mutex<HashMap<FetchKey, Arc<InFlight>>>;

/// Completes a slot on every exit path of the driving request.
///
/// If the driver unwinds before finishing, waiters are released with a
/// transient error instead of blocking forever.
struct DriverGuard<'a> {
    in_flight: &'a InFlightMap,
    key: FetchKey,
    slot: Arc<InFlight>,
    reference: &'a PackageReference,
    finished: bool,
}

impl DriverGuard<'_> {
    fn finish(&mut self, outcome: Outcome) {
        lock(self.in_flight).remove(&self.key);
        self.slot.complete(outcome);
        self.finished = true;
    }
}

impl Drop for DriverGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let err = FetchError::transient(self.reference, "fetch was abandoned");
            self.finish(Err(err));
        }
    }
}

/// A panicking fetcher must not wedge every later request.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Deduplicating front end over the fetchers and the cache store.
pub struct FetchCoordinator {
    cache: CacheStore,
    config: Config,
    http: Arc<dyn HttpClient>,
    vcs: Arc<dyn VcsClient>,
    dispatcher: Dispatcher,
    in_flight: InFlightMap,
    counters: Counters,
}

impl FetchCoordinator {
    pub fn new(
        cache: CacheStore,
        config: Config,
        http: Arc<dyn HttpClient>,
        vcs: Arc<dyn VcsClient>,
    ) -> Self {
        FetchCoordinator {
            cache,
            config,
            http,
            vcs,
            dispatcher: Dispatcher::new(),
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Open the cache at `cache_dir` with the production network clients.
    pub fn open(cache_dir: &Path, config: Config) -> Result<Self> {
        let cache =
            CacheStore::open(cache_dir)?.with_verify_on_lookup(config.cache.verify_on_lookup);
        let http = Arc::new(ReqwestClient::from_config(&config)?);
        Ok(FetchCoordinator::new(cache, config, http, Arc::new(Git2Client::new())))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            driven: self.counters.driven.load(Ordering::SeqCst),
            attached: self.counters.attached.load(Ordering::SeqCst),
            cache_hits: self.counters.cache_hits.load(Ordering::SeqCst),
        }
    }

    fn context(&self) -> FetchContext<'_> {
        FetchContext::new(&self.config, self.http.as_ref(), self.vcs.as_ref())
    }

    /// Fetch one package, joining an in-flight fetch of the same key.
    pub fn request(&self, reference: &PackageReference) -> Outcome {
        let key = FetchKey::for_reference(reference);

        let (slot, is_driver) = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(InFlight::default());
                    in_flight.insert(key.clone(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !is_driver {
            self.counters.attached.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("Waiting for in-flight fetch of {}", reference);
            return slot.wait();
        }

        self.counters.driven.fetch_add(1, Ordering::SeqCst);
        let mut guard = DriverGuard {
            in_flight: &self.in_flight,
            key,
            slot,
            reference,
            finished: false,
        };

        let outcome = self.drive(reference).map(Arc::new);
        if let Err(err) = &outcome {
            tracing::debug!("Fetch of {} failed: {}", reference, err);
        }
        guard.finish(outcome.clone());
        outcome
    }

    /// Fetch many packages in parallel. Results are in input order.
    pub fn fetch_all(&self, references: &[PackageReference]) -> Vec<Outcome> {
        let run = || {
            references
                .par_iter()
                .map(|reference| self.request(reference))
                .collect()
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs())
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                tracing::warn!("Failed to build fetch pool ({}), using the global pool", e);
                run()
            }
        }
    }

    fn drive(&self, reference: &PackageReference) -> QuayResult<FetchResult> {
        let fetcher = self.dispatcher.for_source(reference.source());
        let ctx = self.context();
        let pinned = fetcher.pin(reference, &ctx)?;

        if !fetcher.should_be_cached() {
            let dest = match reference.source().local_path() {
                Some(origin) if fetcher.in_place() => origin.to_path_buf(),
                _ => self
                    .cache
                    .scratch_dir(&pinned.key)
                    .map_err(|e| FetchError::io(reference, e))?,
            };
            return fetcher.fetch(reference, &pinned, &dest, &ctx);
        }

        match self
            .cache
            .lookup(&pinned.key)
            .map_err(|e| FetchError::io(reference, e))?
        {
            Lookup::Present(entry) => {
                self.counters.cache_hits.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("Using cached {}", reference);
                return Ok(from_entry(reference, &pinned, &entry));
            }
            Lookup::Corrupt { reason } => {
                return Err(FetchError::corrupt_cache(reference, pinned.key, reason));
            }
            Lookup::Absent => {}
        }

        self.fetch_and_publish(fetcher, reference, &pinned, &ctx)
    }

    fn fetch_and_publish(
        &self,
        fetcher: &dyn Fetcher,
        reference: &PackageReference,
        pinned: &Pinned,
        ctx: &FetchContext<'_>,
    ) -> QuayResult<FetchResult> {
        let staging = self
            .cache
            .begin_publish(&pinned.key)
            .map_err(|e| FetchError::io(reference, e))?;

        let fetched = match fetcher.fetch(reference, pinned, &staging.package_dir(), ctx) {
            Ok(fetched) => fetched,
            Err(err) => {
                self.cache.abort_publish(staging);
                return Err(err);
            }
        };

        let entry = self
            .cache
            .commit_publish(
                staging,
                reference,
                &fetched.integrity,
                fetched.revision.as_deref(),
            )
            .map_err(|e| FetchError::io(reference, e))?;

        tracing::debug!("Cached {} as {}", reference, entry.key());

        Ok(FetchResult {
            cached_path: entry.path().to_path_buf(),
            integrity: entry.integrity().clone(),
            ..fetched
        })
    }
}

fn from_entry(reference: &PackageReference, pinned: &Pinned, entry: &CacheEntry) -> FetchResult {
    FetchResult {
        key: pinned.key.clone(),
        resolved_version: reference.version().clone(),
        cached_path: entry.path().to_path_buf(),
        integrity: entry.integrity().clone(),
        should_be_cached: true,
        revision: entry.revision().map(str::to_string),
    }
}
