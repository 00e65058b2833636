use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Author,
    Moderator,
}

/// Who is calling an operation. Authors act on their own links; moderators
/// also publish links and work the action queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Uuid,
    pub role: Role,
}

impl Requester {
    pub fn author(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Author,
        }
    }

    pub fn moderator(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Moderator,
        }
    }

    pub fn is_moderator(&self) -> bool {
        self.role == Role::Moderator
    }
}
