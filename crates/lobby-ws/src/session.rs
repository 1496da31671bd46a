use std::collections::HashSet;

/// Per-connection state. A session becomes ready once the client completes
/// `setup`; until then nothing is joined, broadcast, or delivered.
pub struct Session {
    pub user_id: i64,
    pub display_name: String,
    pub session_id: String,
    pub rooms: HashSet<i64>,
    pub ready: bool,
}

impl Session {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            display_name: String::new(),
            session_id: uuid::Uuid::new_v4().to_string(),
            rooms: HashSet::new(),
            ready: false,
        }
    }

    pub fn should_receive_event(
        &self,
        room_id: Option<i64>,
        target_user_ids: Option<&[i64]>,
        except_user_id: Option<i64>,
    ) -> bool {
        if !self.ready {
            return false;
        }
        if except_user_id == Some(self.user_id) {
            return false;
        }
        // Personal-channel events are delivered wherever the user is, joined
        // rooms notwithstanding.
        if let Some(targets) = target_user_ids {
            return targets.contains(&self.user_id);
        }
        match room_id {
            None => true,
            Some(rid) => self.rooms.contains(&rid),
        }
    }
}
