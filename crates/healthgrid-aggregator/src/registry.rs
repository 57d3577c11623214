//! Health check registry and global health transition logic.
//!
//! The registry holds two maps: the checks configured per application
//! version, and the latest result per check for every instance that has
//! reported at least once. It is owned by a single aggregator task and is
//! never shared, so no locking is involved.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use healthgrid_core::{
    ApplicationKey, GlobalHealth, HealthCheck, HealthResult, InstanceKey, RemovalPurge,
};

/// Latest result per check for one instance; `None` means not yet reported.
pub type CheckStatuses = HashMap<HealthCheck, Option<HealthResult>>;

/// Outcome of a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The check is not configured for the application; nothing changed.
    Discarded,
    /// The result was stored.
    Applied {
        previous: GlobalHealth,
        current: GlobalHealth,
    },
}

impl UpdateOutcome {
    /// Whether the update changed the instance's global health.
    pub fn is_transition(&self) -> bool {
        matches!(self, Self::Applied { previous, current } if previous != current)
    }
}

/// Counters describing the registry contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub applications: usize,
    pub checks: usize,
    pub instances: usize,
    /// Status updates dropped because their check was not configured.
    pub discarded_updates: u64,
}

#[derive(Debug, Default)]
pub struct Registry {
    definitions: HashMap<ApplicationKey, HashSet<HealthCheck>>,
    states: HashMap<InstanceKey, CheckStatuses>,
    removal_purge: RemovalPurge,
    discarded_updates: u64,
}

impl Registry {
    pub fn new(removal_purge: RemovalPurge) -> Self {
        Self {
            removal_purge,
            ..Self::default()
        }
    }

    /// Register `check` for `app`. Adding a known check is a no-op.
    pub fn add_health_check(&mut self, app: &ApplicationKey, check: HealthCheck) {
        let checks = self.definitions.entry(app.clone()).or_default();
        if checks.insert(check) {
            debug!(%app, checks = checks.len(), "health check added");
        }
    }

    /// Unregister `check` for `app` and purge instance state per the
    /// configured [`RemovalPurge`] mode.
    pub fn remove_health_check(&mut self, app: &ApplicationKey, check: &HealthCheck) {
        if let Some(checks) = self.definitions.get_mut(app) {
            checks.remove(check);
            if checks.is_empty() {
                self.definitions.remove(app);
            }
        }

        let before = self.states.len();
        match self.removal_purge {
            RemovalPurge::TrackedOnly => {
                self.states.retain(|key, statuses| {
                    !(key.app == *app
                        && statuses.len() == 1
                        && statuses.contains_key(check))
                });
            }
            RemovalPurge::ExactKey => {
                self.states.retain(|key, statuses| {
                    if key.app == *app {
                        statuses.remove(check);
                    }
                    !statuses.is_empty()
                });
            }
        }

        debug!(
            %app,
            %check,
            purged_instances = before - self.states.len(),
            "health check removed"
        );
    }

    /// Drop the status of each `(instance, check)` pair, removing instances
    /// left without any tracked check.
    pub fn purge_health_check_statuses(&mut self, statuses: &[(InstanceKey, HealthCheck)]) {
        for (instance, check) in statuses {
            let Some(tracked) = self.states.get_mut(instance) else {
                continue;
            };
            tracked.remove(check);
            if tracked.is_empty() {
                self.states.remove(instance);
                debug!(%instance, "instance health state purged");
            }
        }
    }

    /// Store `result` for `check` and recompute the instance's global health.
    ///
    /// `on_transition` is invoked with the new value, before the result is
    /// committed, only when the global health changes.
    pub fn update_health_check_status<F>(
        &mut self,
        app: &ApplicationKey,
        check: &HealthCheck,
        result: HealthResult,
        on_transition: F,
    ) -> UpdateOutcome
    where
        F: FnOnce(GlobalHealth),
    {
        let Some(checks) = self.definitions.get(app).filter(|c| c.contains(check)) else {
            self.discarded_updates += 1;
            warn!(
                %app,
                %check,
                instance_id = %result.instance_id,
                "discarding status update for unknown health check"
            );
            return UpdateOutcome::Discarded;
        };

        let instance = app.instance(result.instance_id.clone());
        let mut statuses = match self.states.get(&instance) {
            Some(statuses) => statuses.clone(),
            None => checks.iter().map(|c| (c.clone(), None)).collect(),
        };

        let previous = global_health(&statuses);
        statuses.insert(check.clone(), Some(result));
        let current = global_health(&statuses);

        if previous != current {
            on_transition(current);
        }
        debug!(%instance, %check, %previous, %current, "health check status updated");

        self.states.insert(instance, statuses);
        UpdateOutcome::Applied { previous, current }
    }

    pub fn definitions(&self, app: &ApplicationKey) -> Option<&HashSet<HealthCheck>> {
        self.definitions.get(app)
    }

    pub fn instance_statuses(&self, instance: &InstanceKey) -> Option<&CheckStatuses> {
        self.states.get(instance)
    }

    /// Global health of a tracked instance, `None` if it never reported.
    ///
    /// An untracked instance is implicitly [`GlobalHealth::Unknown`]: it has
    /// no results yet, and its first report is compared against `Unknown`.
    pub fn instance_health(&self, instance: &InstanceKey) -> Option<GlobalHealth> {
        self.states.get(instance).map(global_health)
    }

    /// Tracked instances of `app`, sorted by instance id.
    pub fn tracked_instances(&self, app: &ApplicationKey) -> Vec<InstanceKey> {
        let mut keys: Vec<_> = self
            .states
            .keys()
            .filter(|key| key.app == *app)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            applications: self.definitions.len(),
            checks: self.definitions.values().map(HashSet::len).sum(),
            instances: self.states.len(),
            discarded_updates: self.discarded_updates,
        }
    }
}

/// Fold per-check results into one value.
///
/// All checks alive wins over any missing result, so an instance with no
/// checks at all is healthy.
pub fn global_health(statuses: &CheckStatuses) -> GlobalHealth {
    if statuses
        .values()
        .all(|status| status.as_ref().is_some_and(|r| r.alive))
    {
        GlobalHealth::Healthy
    } else if statuses.values().any(Option::is_none) {
        GlobalHealth::Unknown
    } else {
        GlobalHealth::Unhealthy
    }
}
