use std::time::Duration;

use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::listing::describe_collection;
use super::{collection_namespace, identity, Engine, EngineError};
use crate::client::ErrorClass;
use crate::document::{ResourceDocument, WaitOptions};
use crate::predicates::{self, ReadinessCheck};
use crate::registry::{Gvr, ResourceKind};
use crate::wait::{describe_list, describe_lookup, WaitError};

/// What one poll tick is looking at
enum Target<'a> {
    Collection {
        kind: &'a ResourceKind,
        gvr: &'a Gvr,
        namespace: Option<&'a str>,
        opts: &'a WaitOptions,
    },
    Single {
        kind: &'a ResourceKind,
        gvr: &'a Gvr,
        namespace: Option<&'a str>,
        name: &'a str,
    },
}

/// Result of a single tick
enum Probe {
    Ready,
    Pending(String),
    Failed(EngineError),
}

impl Engine {
    /// Wait until every listed resource satisfies `check`
    ///
    /// Lists on every tick of the poll interval. The wait succeeds only when
    /// the listing is non-empty and all items pass `check` in the same tick.
    /// A not-found listing or an empty one keeps waiting, as do transient
    /// listing errors. A fatal listing error or a check error ends the wait
    /// at once.
    ///
    /// # Example
    ///
    /// ```ignore
    /// engine
    ///     .wait_for_resources(
    ///         &cancel,
    ///         &ResourceKind::pod(),
    ///         "ledger",
    ///         &predicates::pod_ready,
    ///         Duration::from_secs(300),
    ///         &WaitOptions::new().label_selector("solo.hedera.com/type=network-node"),
    ///     )
    ///     .await?;
    /// ```
    pub async fn wait_for_resources(
        &self,
        cancel: &CancellationToken,
        kind: &ResourceKind,
        namespace: &str,
        check: &dyn ReadinessCheck,
        timeout: Duration,
        opts: &WaitOptions,
    ) -> Result<(), EngineError> {
        let (gvr, scope) = self.resolve(kind)?;
        let target = Target::Collection {
            kind,
            gvr: &gvr,
            namespace: collection_namespace(scope, namespace),
            opts,
        };
        self.poll_until(cancel, &target, check, timeout).await
    }

    /// Wait until a single named resource satisfies `check`
    ///
    /// Each tick hands the raw lookup result to `check`, so deciding what a
    /// missing object or a failed lookup means is up to the check.
    pub async fn wait_for_resource(
        &self,
        cancel: &CancellationToken,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        check: &dyn ReadinessCheck,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let (gvr, scope) = self.resolve(kind)?;
        let namespace = self.object_namespace(scope, Some(namespace));
        let target = Target::Single {
            kind,
            gvr: &gvr,
            namespace: namespace.as_deref(),
            name,
        };
        self.poll_until(cancel, &target, check, timeout).await
    }

    /// [`wait_for_resources`](Self::wait_for_resources) over Pods
    ///
    /// Meant for the container checks, e.g.
    /// [`container_terminated`](crate::predicates::container_terminated).
    pub async fn wait_for_container(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
        check: &dyn ReadinessCheck,
        timeout: Duration,
        opts: &WaitOptions,
    ) -> Result<(), EngineError> {
        self.wait_for_resources(cancel, &ResourceKind::pod(), namespace, check, timeout, opts)
            .await
    }

    /// Wait until a named resource no longer exists
    pub async fn wait_for_deleted(
        &self,
        cancel: &CancellationToken,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        self.wait_for_resource(cancel, kind, namespace, name, &predicates::absent, timeout)
            .await
    }

    /// Probe `target` on every tick until ready, failed, cancelled or out of time
    ///
    /// The first probe happens one poll interval after entry. Both the tick
    /// and the probe itself race the deadline and the cancellation token.
    async fn poll_until(
        &self,
        cancel: &CancellationToken,
        target: &Target<'_>,
        check: &dyn ReadinessCheck,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let resource = target.describe();
        let poll_interval = self.config.poll_interval.max(Duration::from_millis(1));
        let start = Instant::now();
        let deadline = sleep(timeout);
        tokio::pin!(deadline);

        let mut ticker = interval_at(start + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_state: Option<String> = None;
        let timed_out = |last_state: Option<String>| {
            let err = WaitError::new(resource.clone(), timeout, start.elapsed());
            EngineError::WaitTimeout(match last_state {
                Some(state) => err.with_state(state),
                None => err,
            })
        };
        let cancelled = || EngineError::Cancelled {
            operation: "wait",
            resource: resource.clone(),
        };

        debug!(
            resource = %resource,
            timeout = ?timeout,
            poll_interval = ?poll_interval,
            "Starting wait"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                () = &mut deadline => return Err(timed_out(last_state)),
                _ = ticker.tick() => {}
            }

            let probe = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                () = &mut deadline => return Err(timed_out(last_state)),
                probe = self.probe(target, check) => probe,
            };

            match probe {
                Probe::Ready => {
                    debug!(resource = %resource, elapsed = ?start.elapsed(), "Condition met");
                    return Ok(());
                }
                Probe::Pending(state) => {
                    debug!(
                        resource = %resource,
                        elapsed = ?start.elapsed(),
                        state = %state,
                        "Condition not met, waiting..."
                    );
                    last_state = Some(state);
                }
                Probe::Failed(err) => return Err(err),
            }
        }
    }

    async fn probe(&self, target: &Target<'_>, check: &dyn ReadinessCheck) -> Probe {
        match *target {
            Target::Collection {
                kind,
                gvr,
                namespace,
                opts,
            } => {
                let list = match self.list_filtered(gvr, namespace, opts).await {
                    Ok(list) => list,
                    Err(err) => {
                        return match err.class() {
                            ErrorClass::NotFound => Probe::Pending("not found".to_string()),
                            ErrorClass::Fatal => Probe::Failed(EngineError::api(
                                "list",
                                target.describe(),
                                err,
                            )),
                            ErrorClass::Other => {
                                warn!(
                                    resource = %target.describe(),
                                    error = %err,
                                    "Listing failed, will retry on next tick"
                                );
                                Probe::Pending(format!("listing failed: {err}"))
                            }
                        };
                    }
                };

                let mut not_ready: Vec<&ResourceDocument> = Vec::new();
                for item in &list.items {
                    match check.evaluate(Some(item), None) {
                        Ok(true) => {}
                        Ok(false) => not_ready.push(item),
                        Err(source) => {
                            return Probe::Failed(EngineError::CheckFailed {
                                resource: identity(
                                    kind,
                                    item.namespace(),
                                    item.name().unwrap_or("<unnamed>"),
                                ),
                                source,
                            });
                        }
                    }
                }

                if list.is_empty() || !not_ready.is_empty() {
                    Probe::Pending(describe_list(&list, &not_ready))
                } else {
                    Probe::Ready
                }
            }
            Target::Single {
                gvr,
                namespace,
                name,
                ..
            } => {
                let lookup = self.client.get(gvr, namespace, name).await;
                let (doc, err) = match &lookup {
                    Ok(doc) => (Some(doc), None),
                    Err(err) => (None, Some(err)),
                };

                match check.evaluate(doc, err) {
                    Ok(true) => Probe::Ready,
                    Ok(false) => Probe::Pending(describe_lookup(doc, err)),
                    Err(source) => Probe::Failed(EngineError::CheckFailed {
                        resource: target.describe(),
                        source,
                    }),
                }
            }
        }
    }
}

impl Target<'_> {
    fn describe(&self) -> String {
        match *self {
            Target::Collection {
                kind,
                namespace,
                opts,
                ..
            } => describe_collection(kind, namespace, opts),
            Target::Single {
                kind,
                namespace,
                name,
                ..
            } => identity(kind, namespace, name),
        }
    }
}
