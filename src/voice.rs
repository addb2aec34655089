use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One in-progress voice session.
#[derive(Debug, Clone, Copy)]
struct Session {
    guild_id: u64,
    channel_id: u64,
    joined_at: DateTime<Utc>,
}

/// A finished voice session, ready to be logged.
#[derive(Debug, Clone, Copy)]
pub struct ClosedSession {
    pub guild_id: u64,
    pub channel_id: u64,
    pub seconds: i64,
}

/// In-memory start-time map for users currently in voice channels.
/// Written by the gateway listener, read by the sampler; keyed per user.
#[derive(Clone, Default)]
pub struct VoiceTracker {
    sessions: Arc<Mutex<HashMap<u64, Session>>>,
}

impl VoiceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a voice-channel join. A second join without a leave (missed
    /// gateway event) restarts the session.
    pub fn begin(&self, user_id: u64, guild_id: u64, channel_id: u64, now: DateTime<Utc>) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(
            user_id,
            Session {
                guild_id,
                channel_id,
                joined_at: now,
            },
        );
    }

    /// Closes the user's session, if one is tracked. Durations are clamped
    /// to zero so clock skew can never produce a negative duration.
    pub fn end(&self, user_id: u64, now: DateTime<Utc>) -> Option<ClosedSession> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.remove(&user_id)?;
        Some(ClosedSession {
            guild_id: session.guild_id,
            channel_id: session.channel_id,
            seconds: (now - session.joined_at).num_seconds().max(0),
        })
    }

    /// Summed minutes of all in-progress sessions in a guild.
    pub fn active_minutes(&self, guild_id: u64, now: DateTime<Utc>) -> i64 {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .values()
            .filter(|s| s.guild_id == guild_id)
            .map(|s| (now - s.joined_at).num_minutes().max(0))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_join_leave_duration() {
        let tracker = VoiceTracker::new();
        let t0 = Utc::now();

        tracker.begin(1, 10, 100, t0);
        let closed = tracker.end(1, t0 + Duration::seconds(90)).unwrap();
        assert_eq!(closed.guild_id, 10);
        assert_eq!(closed.channel_id, 100);
        assert_eq!(closed.seconds, 90);

        // Session is gone after the leave.
        assert!(tracker.end(1, t0).is_none());
    }

    #[test]
    fn test_duration_never_negative() {
        let tracker = VoiceTracker::new();
        let t0 = Utc::now();

        tracker.begin(1, 10, 100, t0);
        let closed = tracker.end(1, t0 - Duration::seconds(30)).unwrap();
        assert_eq!(closed.seconds, 0);
    }

    #[test]
    fn test_leave_without_join_is_ignored() {
        let tracker = VoiceTracker::new();
        assert!(tracker.end(42, Utc::now()).is_none());
    }

    #[test]
    fn test_rejoin_restarts_session() {
        let tracker = VoiceTracker::new();
        let t0 = Utc::now();

        tracker.begin(1, 10, 100, t0);
        tracker.begin(1, 10, 200, t0 + Duration::seconds(60));
        let closed = tracker.end(1, t0 + Duration::seconds(90)).unwrap();
        assert_eq!(closed.channel_id, 200);
        assert_eq!(closed.seconds, 30);
    }

    #[test]
    fn test_active_minutes_per_guild() {
        let tracker = VoiceTracker::new();
        let t0 = Utc::now();

        tracker.begin(1, 10, 100, t0);
        tracker.begin(2, 10, 100, t0 - Duration::minutes(5));
        tracker.begin(3, 20, 300, t0 - Duration::minutes(30));

        let now = t0 + Duration::minutes(10);
        assert_eq!(tracker.active_minutes(10, now), 10 + 15);
        assert_eq!(tracker.active_minutes(20, now), 40);
        assert_eq!(tracker.active_minutes(99, now), 0);
    }
}
