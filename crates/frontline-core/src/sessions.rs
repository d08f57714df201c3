//! Session tracker: at most one open session per (character, world).
//!
//! Sessions open on login and close on logout. Missing logouts are repaired
//! three ways: a second login force-closes the previous session at the new
//! login's timestamp, reconciliation force-closes sessions whose character
//! has been absent from the online snapshot for longer than the grace
//! period, and shutdown force-closes everything. Every closed session is
//! handed to persistence exactly once, at the moment it closes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use frontline_types::{CharacterId, PresenceEvent, Session, SessionCloseReason, WorldId};
use tracing::{debug, info, warn};

use crate::persist::{PersistHandle, PersistRecord};

/// An open session plus reconciliation bookkeeping.
#[derive(Debug, Clone)]
struct OpenSession {
    session: Session,
    /// First poll at which the character was missing from the online set.
    absent_since: Option<DateTime<Utc>>,
}

type WorldSessions = BTreeMap<CharacterId, OpenSession>;

/// Result of a login event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// A new session was opened.
    Opened,
    /// A session was already open; it was force-closed and a new one opened.
    Reopened {
        /// The force-closed session.
        previous: Session,
    },
    /// Redelivery of the login that opened the current session.
    Duplicate,
    /// Login older than the current session's start; ignored.
    Stale,
}

/// Result of a logout event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The open session was closed.
    Closed(Session),
    /// No open session matched; the event was dropped.
    Unmatched,
    /// Logout older than the open session's start; the session stays open.
    Stale,
}

/// Counts from one reconciliation pass over a world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReconcileSummary {
    /// Sessions opened for online characters without a session.
    pub inferred: usize,
    /// Sessions force-closed after the grace period.
    pub timed_out: usize,
}

/// Open sessions for every world.
#[derive(Debug)]
pub struct SessionTracker {
    worlds: RwLock<BTreeMap<WorldId, Arc<Mutex<WorldSessions>>>>,
    persist: PersistHandle,
    grace: TimeDelta,
}

fn lock(world: &Mutex<WorldSessions>) -> MutexGuard<'_, WorldSessions> {
    // Session maps hold plain data; a panicked writer leaves them usable.
    world.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionTracker {
    /// Create an empty tracker.
    pub fn new(persist: PersistHandle, grace: TimeDelta) -> Self {
        Self {
            worlds: RwLock::new(BTreeMap::new()),
            persist,
            grace,
        }
    }

    fn world(&self, world: WorldId) -> Arc<Mutex<WorldSessions>> {
        if let Some(existing) = self
            .worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&world)
        {
            return Arc::clone(existing);
        }
        let mut worlds = self.worlds.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(worlds.entry(world).or_default())
    }

    fn existing_world(&self, world: WorldId) -> Option<Arc<Mutex<WorldSessions>>> {
        self.worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&world)
            .cloned()
    }

    /// Worlds with tracked sessions.
    pub fn worlds(&self) -> Vec<WorldId> {
        self.worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn close(&self, mut session: Session, at: DateTime<Utc>, reason: SessionCloseReason) -> Session {
        // Never end before the start.
        session.end = Some(at.max(session.start));
        if reason.is_forced() {
            info!(
                character = %session.character_id,
                world = %session.world_id,
                reason = ?reason,
                "session force-closed"
            );
        }
        self.persist.send(PersistRecord::Session(session.clone()));
        session
    }

    // -------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------

    /// Handle a login.
    pub fn on_login(&self, event: &PresenceEvent) -> LoginOutcome {
        let world = self.world(event.world_id);
        let mut sessions = lock(&world);

        let previous = match sessions.get(&event.character_id) {
            Some(open) if event.timestamp == open.session.start => return LoginOutcome::Duplicate,
            Some(open) if event.timestamp < open.session.start => {
                debug!(
                    character = %event.character_id,
                    world = %event.world_id,
                    "login older than open session ignored"
                );
                return LoginOutcome::Stale;
            }
            Some(_) => sessions
                .remove(&event.character_id)
                .map(|open| open.session),
            None => None,
        };

        let previous = previous.map(|session| {
            warn!(
                anomaly = "relogin_without_logout",
                character = %event.character_id,
                world = %event.world_id,
                "second login while a session is open"
            );
            self.close(session, event.timestamp, SessionCloseReason::Relogin)
        });

        sessions.insert(
            event.character_id,
            OpenSession {
                session: Session::open(event.character_id, event.world_id, event.timestamp),
                absent_since: None,
            },
        );

        match previous {
            Some(previous) => LoginOutcome::Reopened { previous },
            None => LoginOutcome::Opened,
        }
    }

    /// Handle a logout.
    pub fn on_logout(&self, event: &PresenceEvent) -> LogoutOutcome {
        let Some(world) = self.existing_world(event.world_id) else {
            return Self::unmatched(event);
        };
        let mut sessions = lock(&world);
        match sessions.get(&event.character_id) {
            None => {
                drop(sessions);
                return Self::unmatched(event);
            }
            Some(open) if event.timestamp < open.session.start => {
                warn!(
                    anomaly = "stale_logout",
                    character = %event.character_id,
                    world = %event.world_id,
                    "logout older than open session ignored"
                );
                return LogoutOutcome::Stale;
            }
            Some(_) => {}
        }
        let Some(open) = sessions.remove(&event.character_id) else {
            drop(sessions);
            return Self::unmatched(event);
        };
        let closed = self.close(open.session, event.timestamp, SessionCloseReason::Logout);
        LogoutOutcome::Closed(closed)
    }

    fn unmatched(event: &PresenceEvent) -> LogoutOutcome {
        warn!(
            anomaly = "logout_without_session",
            character = %event.character_id,
            world = %event.world_id,
            "logout with no open session dropped"
        );
        LogoutOutcome::Unmatched
    }

    // -------------------------------------------------------------------
    // Reconciliation and shutdown
    // -------------------------------------------------------------------

    /// Align one world with the authoritative online set.
    ///
    /// Online characters without a session get one starting at `now`,
    /// flagged as inferred. Open sessions whose character has been missing
    /// for longer than the grace period are closed at `now`.
    pub fn reconcile(
        &self,
        world_id: WorldId,
        online: &BTreeSet<CharacterId>,
        now: DateTime<Utc>,
    ) -> SessionReconcileSummary {
        let world = self.world(world_id);
        let mut sessions = lock(&world);
        let mut summary = SessionReconcileSummary::default();

        for character in online {
            if let Some(open) = sessions.get_mut(character) {
                open.absent_since = None;
                continue;
            }
            warn!(
                anomaly = "session_without_login",
                character = %character,
                world = %world_id,
                "online character had no session; opened at poll time"
            );
            let mut session = Session::open(*character, world_id, now);
            session.start_inferred = true;
            sessions.insert(
                *character,
                OpenSession {
                    session,
                    absent_since: None,
                },
            );
            summary.inferred = summary.inferred.saturating_add(1);
        }

        let mut expired = Vec::new();
        for (character, open) in sessions.iter_mut() {
            if online.contains(character) {
                continue;
            }
            let since = *open.absent_since.get_or_insert(now);
            if now.signed_duration_since(since) > self.grace {
                expired.push(*character);
            }
        }
        for character in expired {
            if let Some(open) = sessions.remove(&character) {
                self.close(open.session, now, SessionCloseReason::Timeout);
                summary.timed_out = summary.timed_out.saturating_add(1);
            }
        }
        summary
    }

    /// Force-close every open session at `now`. Returns how many closed.
    pub fn close_all(&self, now: DateTime<Utc>) -> usize {
        let worlds: Vec<_> = self
            .worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut closed = 0_usize;
        for world in worlds {
            let drained = std::mem::take(&mut *lock(&world));
            for (_, open) in drained {
                self.close(open.session, now, SessionCloseReason::Shutdown);
                closed = closed.saturating_add(1);
            }
        }
        closed
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// The character's open session in `world`, if any.
    pub fn open_session(&self, character: CharacterId, world: WorldId) -> Option<Session> {
        let world = self.existing_world(world)?;
        let sessions = lock(&world);
        sessions.get(&character).map(|open| open.session.clone())
    }

    /// Every open session in `world`.
    pub fn open_sessions(&self, world: WorldId) -> Vec<Session> {
        self.existing_world(world).map_or_else(Vec::new, |world| {
            lock(&world)
                .values()
                .map(|open| open.session.clone())
                .collect()
        })
    }

    /// Number of open sessions in `world`.
    pub fn open_count(&self, world: WorldId) -> usize {
        self.existing_world(world).map_or(0, |world| lock(&world).len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::persist;

    const W: WorldId = WorldId::new(1);
    const C1: CharacterId = CharacterId::new(1);

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn presence(character: CharacterId, secs: i64) -> PresenceEvent {
        PresenceEvent {
            character_id: character,
            world_id: W,
            timestamp: at(secs),
        }
    }

    fn tracker() -> (SessionTracker, UnboundedReceiver<PersistRecord>) {
        let (handle, rx) = persist::channel();
        (SessionTracker::new(handle, TimeDelta::seconds(60)), rx)
    }

    fn persisted(rx: &mut UnboundedReceiver<PersistRecord>) -> Vec<Session> {
        let mut out = Vec::new();
        while let Ok(record) = rx.try_recv() {
            if let PersistRecord::Session(s) = record {
                out.push(s);
            }
        }
        out
    }

    #[test]
    fn relogin_closes_previous_at_new_login() {
        let (sessions, mut rx) = tracker();
        assert_eq!(sessions.on_login(&presence(C1, 1)), LoginOutcome::Opened);
        let LoginOutcome::Reopened { previous } = sessions.on_login(&presence(C1, 3)) else {
            panic!("expected a forced close");
        };
        assert_eq!(previous.start, at(1));
        assert_eq!(previous.end, Some(at(3)));

        let open = sessions.open_session(C1, W).unwrap();
        assert_eq!(open.start, at(3));
        assert!(open.is_open());
        assert_eq!(persisted(&mut rx), vec![previous]);
    }

    #[test]
    fn logout_closes_and_persists_once() {
        let (sessions, mut rx) = tracker();
        sessions.on_login(&presence(C1, 1));
        let LogoutOutcome::Closed(closed) = sessions.on_logout(&presence(C1, 5)) else {
            panic!("expected close");
        };
        assert_eq!(closed.end, Some(at(5)));
        assert_eq!(sessions.on_logout(&presence(C1, 6)), LogoutOutcome::Unmatched);
        assert!(sessions.open_session(C1, W).is_none());
        assert_eq!(persisted(&mut rx).len(), 1);
    }

    #[test]
    fn logout_before_start_leaves_session_open() {
        let (sessions, mut rx) = tracker();
        sessions.on_login(&presence(C1, 10));
        assert_eq!(sessions.on_logout(&presence(C1, 4)), LogoutOutcome::Stale);
        assert_eq!(sessions.open_session(C1, W).unwrap().start, at(10));
        assert!(persisted(&mut rx).is_empty());
    }

    #[test]
    fn redelivered_logout_keeps_newer_session() {
        let (sessions, mut rx) = tracker();
        sessions.on_login(&presence(C1, 1));
        sessions.on_logout(&presence(C1, 2));
        sessions.on_login(&presence(C1, 3));

        assert_eq!(sessions.on_logout(&presence(C1, 2)), LogoutOutcome::Stale);
        let open = sessions.open_session(C1, W).unwrap();
        assert_eq!(open.start, at(3));
        assert!(open.is_open());

        let closed = persisted(&mut rx);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].end, Some(at(2)));
    }

    #[test]
    fn repeated_and_stale_logins_are_ignored() {
        let (sessions, mut rx) = tracker();
        sessions.on_login(&presence(C1, 10));
        assert_eq!(sessions.on_login(&presence(C1, 10)), LoginOutcome::Duplicate);
        assert_eq!(sessions.on_login(&presence(C1, 9)), LoginOutcome::Stale);
        assert_eq!(sessions.open_session(C1, W).unwrap().start, at(10));
        assert!(persisted(&mut rx).is_empty());
    }

    #[test]
    fn unknown_world_logout_is_unmatched() {
        let (sessions, _rx) = tracker();
        assert_eq!(sessions.on_logout(&presence(C1, 1)), LogoutOutcome::Unmatched);
    }

    #[test]
    fn reconcile_infers_and_times_out() {
        let (sessions, mut rx) = tracker();
        let c2 = CharacterId::new(2);
        sessions.on_login(&presence(C1, 0));

        // C2 online without a login; C1 missing.
        let online: BTreeSet<_> = [c2].into_iter().collect();
        let first = sessions.reconcile(W, &online, at(100));
        assert_eq!(first, SessionReconcileSummary { inferred: 1, timed_out: 0 });
        let inferred = sessions.open_session(c2, W).unwrap();
        assert!(inferred.start_inferred);
        assert_eq!(inferred.start, at(100));

        // Still within the grace period.
        let second = sessions.reconcile(W, &online, at(160));
        assert_eq!(second.timed_out, 0);

        let third = sessions.reconcile(W, &online, at(161));
        assert_eq!(third.timed_out, 1);
        assert!(sessions.open_session(C1, W).is_none());
        let closed = persisted(&mut rx);
        assert_eq!(closed.first().and_then(|s| s.end), Some(at(161)));
    }

    #[test]
    fn reappearing_character_resets_absence() {
        let (sessions, _rx) = tracker();
        sessions.on_login(&presence(C1, 0));
        let none = BTreeSet::new();
        let with_c1: BTreeSet<_> = [C1].into_iter().collect();

        sessions.reconcile(W, &none, at(100));
        sessions.reconcile(W, &with_c1, at(150));
        let summary = sessions.reconcile(W, &none, at(200));
        assert_eq!(summary.timed_out, 0);
        assert!(sessions.open_session(C1, W).is_some());
    }

    #[test]
    fn close_all_flushes_everything() {
        let (sessions, mut rx) = tracker();
        sessions.on_login(&presence(C1, 0));
        sessions.on_login(&PresenceEvent {
            character_id: CharacterId::new(2),
            world_id: WorldId::new(17),
            timestamp: at(0),
        });
        assert_eq!(sessions.close_all(at(50)), 2);
        assert_eq!(sessions.open_count(W), 0);
        let closed = persisted(&mut rx);
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|s| s.end == Some(at(50))));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

        #[test]
        fn at_most_one_open_session_per_character(
            ops in proptest::collection::vec((0_u64..4, any::<bool>(), 0_i64..100), 1..80),
        ) {
            let (sessions, mut rx) = tracker();
            let mut logins = 0_usize;
            for (character, login, secs) in ops {
                let event = presence(CharacterId::new(character), secs);
                if login {
                    if matches!(
                        sessions.on_login(&event),
                        LoginOutcome::Opened | LoginOutcome::Reopened { .. }
                    ) {
                        logins += 1;
                    }
                } else {
                    sessions.on_logout(&event);
                }
                let open = sessions.open_sessions(W);
                let distinct: BTreeSet<_> = open.iter().map(|s| s.character_id).collect();
                prop_assert_eq!(distinct.len(), open.len());
            }
            // Every opened session is either still open or persisted once.
            let closed = persisted(&mut rx).len();
            prop_assert_eq!(closed + sessions.open_count(W), logins);
        }
    }
}
