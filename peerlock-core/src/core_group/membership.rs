use crate::types::{GroupId, PeerId};

/// Local view of one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembership {
    pub group_id: GroupId,
    pub name: String,
    pub creator_id: PeerId,
    members: Vec<PeerId>,
}

impl GroupMembership {
    /// Duplicate member ids are collapsed, keeping first-seen order
    pub fn new(
        group_id: GroupId,
        name: impl Into<String>,
        creator_id: PeerId,
        members: impl IntoIterator<Item = PeerId>,
    ) -> Self {
        let mut membership =
            Self { group_id, name: name.into(), creator_id, members: Vec::new() };
        for member in members {
            membership.add_member(member);
        }
        membership
    }

    /// Returns false if `peer` was already a member
    pub fn add_member(&mut self, peer: PeerId) -> bool {
        if self.contains(&peer) {
            return false;
        }
        self.members.push(peer);
        true
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.members.contains(peer)
    }

    pub fn members(&self) -> &[PeerId] {
        &self.members
    }

    /// Every member except `local`
    pub fn others(&self, local: &PeerId) -> Vec<PeerId> {
        self.members.iter().filter(|m| *m != local).cloned().collect()
    }
}
