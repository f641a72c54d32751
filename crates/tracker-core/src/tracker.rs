// tracker.rs — The audit orchestrator.
//
// Tracker wraps a session's commit. One call is one cycle:
//
//   1. AuditingModifications: every changed entry of a tracked entity type
//      is classified. Modified/soft-deleted/un-deleted/deleted entries get a
//      header queued on the session right away; added entries are only
//      remembered by handle, because their keys may not exist yet.
//   2. CommittingPrimary: the real commit (domain rows + queued audit rows).
//   3. AuditingAdditions: each remembered addition is re-read, now carrying
//      its generated key, and gets an Added header.
//   4. CommittingAuditOnly: a second commit for the addition headers, only
//      if there are any.
//
// A failed commit ends the cycle there: the headers the tracker queued are
// withdrawn from the session, no addition audit or second commit follows,
// and the session's error is returned unchanged.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracker_audit::{record_id_from_keys, AuditLog, EventType, Metadata};
use tracker_policy::{TrackerSettings, TrackingConfig, TrackingPolicy};

use crate::accessor::EntryValues;
use crate::comparator::ComparatorRegistry;
use crate::cycle::{CommitCycle, CommitPhase};
use crate::details::{DetailContext, DetailGenerator};
use crate::error::TrackerError;
use crate::events::{AuditLogGenerated, EventDispatcher, JsonlSink, NotificationSink, SinkId};
use crate::identity::IdentityConfig;
use crate::error::SessionError;
use crate::session::{
    AsyncPersistenceSession, EntityEntry, EntityState, EntryHandle, PersistenceSession,
};
use crate::value::Value;

/// Username and metadata stamped on every header of one cycle.
struct Stamp {
    username: Option<String>,
    metadata: Metadata,
}

/// State carried from the pre-commit phase to the post-commit phase.
struct Staged {
    cycle: CommitCycle,
    stamp: Stamp,
    config: TrackingConfig,
    logs: Vec<AuditLog>,
    additions: Vec<EntryHandle>,
}

/// Audits the changes a persistence session is about to commit.
pub struct Tracker {
    policy: Arc<TrackingPolicy>,
    comparators: Arc<ComparatorRegistry>,
    identity: IdentityConfig,
    dispatcher: EventDispatcher,
    tracking_enabled: bool,
}

impl Tracker {
    pub fn new(policy: Arc<TrackingPolicy>) -> Self {
        Self {
            policy,
            comparators: Arc::new(ComparatorRegistry::new()),
            identity: IdentityConfig::new(),
            dispatcher: EventDispatcher::new(),
            tracking_enabled: true,
        }
    }

    /// Build a tracker from loaded settings: the tracking flags are applied
    /// to the policy, the default username is configured, and an events log
    /// sink is subscribed when a path is set.
    pub fn from_settings(policy: Arc<TrackingPolicy>, settings: &TrackerSettings) -> Self {
        settings.apply_to(&policy);
        let mut tracker = Self::new(policy);
        tracker.identity.default_username = settings.identity.default_username.clone();
        if let Some(path) = &settings.events_log {
            tracker.subscribe(Box::new(JsonlSink::new(path)));
        }
        tracker
    }

    pub fn with_comparators(mut self, comparators: Arc<ComparatorRegistry>) -> Self {
        self.comparators = comparators;
        self
    }

    pub fn policy(&self) -> &Arc<TrackingPolicy> {
        &self.policy
    }

    pub fn comparators(&self) -> &ComparatorRegistry {
        &self.comparators
    }

    pub fn identity(&self) -> &IdentityConfig {
        &self.identity
    }

    pub fn configure_username_factory(
        &mut self,
        factory: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) {
        self.identity.username_factory = Some(Arc::new(factory));
    }

    pub fn configure_default_username(&mut self, username: impl Into<String>) {
        self.identity.default_username = Some(username.into());
    }

    pub fn configure_metadata(&mut self, fill: impl Fn(&mut Metadata) + Send + Sync + 'static) {
        self.identity.metadata = Some(Arc::new(fill));
    }

    pub fn subscribe(&mut self, sink: Box<dyn NotificationSink>) -> SinkId {
        self.dispatcher.subscribe(sink)
    }

    pub fn unsubscribe(&mut self, id: SinkId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Per-instance switch; the policy's global flag still applies.
    pub fn set_tracking_enabled(&mut self, enabled: bool) {
        self.tracking_enabled = enabled;
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    fn is_active(&self) -> bool {
        self.tracking_enabled && self.policy.is_enabled()
    }

    /// Commit with auditing, using the configured username.
    pub fn save_changes<S: PersistenceSession>(
        &self,
        session: &mut S,
    ) -> Result<usize, TrackerError> {
        self.save_changes_as(session, None)
    }

    /// Commit with auditing, attributing the changes to `username` when
    /// given. Returns the primary commit's row count.
    pub fn save_changes_as<S: PersistenceSession>(
        &self,
        session: &mut S,
        username: Option<&str>,
    ) -> Result<usize, TrackerError> {
        if !self.is_active() {
            tracing::debug!("tracking disabled, committing without audit");
            return Ok(session.save_changes()?);
        }

        let mut staged = self.stage_modifications(session, username)?;
        let committed = session.save_changes();
        let rows = withdraw_on_failure(session, committed)?;

        let additions = self.stage_additions(session, &mut staged)?;
        if !additions.is_empty() {
            staged.cycle.advance(CommitPhase::CommittingAuditOnly)?;
            let committed = session.save_changes();
            withdraw_on_failure(session, committed)?;
        }

        self.finish(staged, additions, rows)
    }

    /// Non-blocking form of [`Tracker::save_changes`].
    pub async fn save_changes_async<S: AsyncPersistenceSession>(
        &self,
        session: &mut S,
        cancel: &CancellationToken,
    ) -> Result<usize, TrackerError> {
        self.save_changes_as_async(session, None, cancel).await
    }

    /// Non-blocking form of [`Tracker::save_changes_as`]. Cancellation is
    /// checked before any work; once the cycle starts, only the commits
    /// themselves observe the token.
    pub async fn save_changes_as_async<S: AsyncPersistenceSession>(
        &self,
        session: &mut S,
        username: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<usize, TrackerError> {
        if cancel.is_cancelled() {
            return Err(TrackerError::Cancelled);
        }

        if !self.is_active() {
            tracing::debug!("tracking disabled, committing without audit");
            return Ok(session.save_changes_async(cancel).await?);
        }

        let mut staged = self.stage_modifications(session, username)?;
        let committed = session.save_changes_async(cancel).await;
        let rows = withdraw_on_failure(session, committed)?;

        let additions = self.stage_additions(session, &mut staged)?;
        if !additions.is_empty() {
            staged.cycle.advance(CommitPhase::CommittingAuditOnly)?;
            let committed = session.save_changes_async(cancel).await;
            withdraw_on_failure(session, committed)?;
        }

        self.finish(staged, additions, rows)
    }

    /// Phase one: audit everything but additions and queue it on the
    /// session. Nothing is queued if any entry fails to audit.
    fn stage_modifications<S: PersistenceSession>(
        &self,
        session: &mut S,
        username: Option<&str>,
    ) -> Result<Staged, TrackerError> {
        let mut cycle = CommitCycle::new();
        cycle.advance(CommitPhase::AuditingModifications)?;

        let stamp = Stamp {
            username: self.identity.resolve_username(username),
            metadata: self.identity.build_metadata(),
        };
        let config = self.policy.config();
        let mut logs = Vec::new();
        let mut additions = Vec::new();

        for entry in session.changed_entries() {
            if !self.policy.is_entity_tracked(&entry.entity_type) {
                tracing::debug!(entity_type = %entry.entity_type, "entity type not tracked");
                continue;
            }
            let event_type = match entry.state {
                EntityState::Added => {
                    additions.push(entry.handle);
                    continue;
                }
                EntityState::Deleted => EventType::Deleted,
                EntityState::Modified => EventType::Modified,
                EntityState::Unchanged => continue,
            };
            if let Some(log) = self.audit_entry(&*session, &entry, event_type, config, &stamp)? {
                logs.push(log);
            }
        }

        if !logs.is_empty() {
            session.add_audit_logs(logs.clone());
        }
        cycle.advance(CommitPhase::CommittingPrimary)?;

        Ok(Staged {
            cycle,
            stamp,
            config,
            logs,
            additions,
        })
    }

    /// Phase two: audit the committed additions and queue their headers.
    fn stage_additions<S: PersistenceSession>(
        &self,
        session: &mut S,
        staged: &mut Staged,
    ) -> Result<Vec<AuditLog>, TrackerError> {
        staged.cycle.advance(CommitPhase::AuditingAdditions)?;

        let mut logs = Vec::new();
        for handle in &staged.additions {
            let entry = session
                .entry(*handle)
                .ok_or(TrackerError::MissingEntry(*handle))?;
            // Committed by now, so the entry reads as unchanged.
            let log = self.audit_entry(
                &*session,
                &entry,
                EventType::Added,
                staged.config,
                &staged.stamp,
            )?;
            if let Some(log) = log {
                logs.push(log);
            }
        }

        if !logs.is_empty() {
            session.add_audit_logs(logs.clone());
        }
        Ok(logs)
    }

    fn finish(
        &self,
        mut staged: Staged,
        additions: Vec<AuditLog>,
        rows: usize,
    ) -> Result<usize, TrackerError> {
        staged.cycle.advance(CommitPhase::Idle)?;

        let mut logs = staged.logs;
        logs.extend(additions);
        tracing::info!(audit_logs = logs.len(), rows_affected = rows, "audited save completed");

        self.dispatcher.dispatch(&AuditLogGenerated::new(logs, rows));
        Ok(rows)
    }

    /// Build the header for one entry, or `None` when it has nothing worth
    /// recording. A `Modified` event is refined into a soft delete or
    /// un-delete when the entity's flag moved.
    fn audit_entry(
        &self,
        session: &dyn PersistenceSession,
        entry: &EntityEntry,
        event_type: EventType,
        config: TrackingConfig,
        stamp: &Stamp,
    ) -> Result<Option<AuditLog>, TrackerError> {
        let values = EntryValues::new(entry, session, config.disconnected_context);
        let event_type = match event_type {
            EventType::Modified => self.classify_modification(&values)?,
            other => other,
        };

        let ctx = DetailContext {
            policy: &self.policy,
            comparators: &self.comparators,
            config,
        };
        let details = DetailGenerator::new(values, event_type, ctx).collect::<Result<Vec<_>, _>>()?;

        if details.is_empty()
            && (event_type.is_change_detected() || !config.track_empty_properties_on_add_and_delete)
        {
            tracing::debug!(
                entity_type = %entry.entity_type,
                event_type = %event_type,
                "no details, header skipped"
            );
            return Ok(None);
        }

        let record_id = record_id_from_keys(&entry.entity_type, &entry.key_values())?;
        tracing::debug!(
            entity_type = %entry.entity_type,
            event_type = %event_type,
            record_id = %record_id,
            details = details.len(),
            "audited entry"
        );

        let mut log = AuditLog::new(entry.entity_type.clone(), event_type, record_id)
            .with_metadata(stamp.metadata.clone())
            .with_details(details);
        log.username = stamp.username.clone();
        Ok(Some(log))
    }

    /// Modified, or a soft delete / un-delete when the annotated flag moved.
    fn classify_modification(&self, values: &EntryValues<'_>) -> Result<EventType, TrackerError> {
        let entry = values.entry();
        let Some(flag) = self.policy.soft_delete_property(&entry.entity_type) else {
            return Ok(EventType::Modified);
        };

        let was_deleted = flag_set(values.original_value(&flag)?.as_ref());
        let is_deleted = flag_set(values.current_value(&flag).as_ref());
        Ok(match (was_deleted, is_deleted) {
            (false, true) => EventType::SoftDeleted,
            (true, false) => EventType::UnDeleted,
            _ => EventType::Modified,
        })
    }
}

/// A failed commit must not leave this cycle's headers queued for the
/// next one.
fn withdraw_on_failure<S: PersistenceSession>(
    session: &mut S,
    committed: Result<usize, SessionError>,
) -> Result<usize, TrackerError> {
    committed.map_err(|e| {
        let withdrawn = session.discard_audit_logs();
        tracing::warn!(error = %e, withdrawn = withdrawn.len(), "commit failed");
        TrackerError::from(e)
    })
}

/// A null flag counts as not deleted.
fn flag_set(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}
