use super::errors::{GroupError, GroupResult};
use super::membership::GroupMembership;
use crate::core_crypto::CryptoEngine;
use crate::core_protocol::{Envelope, GroupInvitePayload, GroupMessagePayload};
use crate::types::{GroupId, PeerId};
use std::collections::HashMap;
use tracing::{debug, info};

/// A sealed group message and the members it should go to
#[derive(Debug, Clone)]
pub struct GroupBroadcast {
    pub envelope: Envelope,
    pub recipients: Vec<PeerId>,
}

/// Groups known to the local node. Key material stays in the crypto engine.
pub struct GroupManager {
    local_id: PeerId,
    groups: HashMap<GroupId, GroupMembership>,
}

impl GroupManager {
    pub fn new(local_id: PeerId) -> Self {
        Self { local_id, groups: HashMap::new() }
    }

    /// Create a group with the local node as creator.
    ///
    /// Returns the new membership and one GROUP_INVITE per invitee. An
    /// existing group with the same id is replaced, key included.
    pub fn create_group(
        &mut self,
        crypto: &CryptoEngine,
        group_id: GroupId,
        name: &str,
        member_ids: &[PeerId],
    ) -> GroupResult<(GroupMembership, Vec<(PeerId, Envelope)>)> {
        let membership = GroupMembership::new(
            group_id.clone(),
            name,
            self.local_id.clone(),
            std::iter::once(self.local_id.clone()).chain(member_ids.iter().cloned()),
        );

        crypto.create_group_key(&group_id);
        let group_key = crypto.export_group_key_base64(&group_id)?;

        let invites = membership
            .others(&self.local_id)
            .into_iter()
            .map(|member| {
                let invite = Envelope::group_invite(
                    group_id.clone(),
                    name,
                    self.local_id.clone(),
                    group_key.clone(),
                    membership.members().to_vec(),
                );
                (member, invite)
            })
            .collect();

        info!(group_id = %group_id, name = %name, members = membership.members().len(), "Created group");
        self.groups.insert(group_id, membership.clone());
        Ok((membership, invites))
    }

    /// Import the key and member list from a GROUP_INVITE
    pub fn handle_invite(
        &mut self,
        crypto: &CryptoEngine,
        invite: GroupInvitePayload,
    ) -> GroupResult<GroupMembership> {
        crypto.import_group_key(&invite.group_id, invite.group_key.as_bytes())?;

        let members = std::iter::once(invite.creator_id.clone())
            .chain(invite.members)
            .chain(std::iter::once(self.local_id.clone()));
        let membership =
            GroupMembership::new(invite.group_id.clone(), invite.group_name, invite.creator_id, members);

        info!(group_id = %membership.group_id, creator = %membership.creator_id, "Joined group by invite");
        self.groups.insert(invite.group_id, membership.clone());
        Ok(membership)
    }

    /// Seal `plaintext` once for every member other than ourselves
    pub fn seal_broadcast(
        &self,
        crypto: &CryptoEngine,
        group_id: &GroupId,
        plaintext: &[u8],
        sender_name: &str,
    ) -> GroupResult<GroupBroadcast> {
        let membership = self
            .groups
            .get(group_id)
            .ok_or_else(|| GroupError::GroupNotFound(group_id.clone()))?;

        let sealed = crypto.encrypt_for_group(group_id, plaintext)?;
        Ok(GroupBroadcast {
            envelope: Envelope::group_message(group_id.clone(), sender_name, &sealed),
            recipients: membership.others(&self.local_id),
        })
    }

    /// Decrypt a GROUP_MESSAGE with the stored group key
    pub fn open_message(
        &self,
        crypto: &CryptoEngine,
        message: &GroupMessagePayload,
    ) -> GroupResult<Vec<u8>> {
        let (nonce, ciphertext) = message.body.decode()?;
        Ok(crypto.decrypt_for_group(&message.group_id, &nonce, &ciphertext)?)
    }

    /// Record a GROUP_JOIN; returns true if `peer` was new to the group
    pub fn handle_join(&mut self, group_id: &GroupId, peer: &PeerId) -> GroupResult<bool> {
        let membership = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| GroupError::GroupNotFound(group_id.clone()))?;
        let added = membership.add_member(peer.clone());
        if added {
            debug!(group_id = %group_id, peer_id = %peer, "Member joined group");
        }
        Ok(added)
    }

    /// Members to notify when announcing our own presence
    pub fn join_recipients(&self, group_id: &GroupId) -> GroupResult<Vec<PeerId>> {
        self.groups
            .get(group_id)
            .map(|membership| membership.others(&self.local_id))
            .ok_or_else(|| GroupError::GroupNotFound(group_id.clone()))
    }

    pub fn get(&self, group_id: &GroupId) -> Option<&GroupMembership> {
        self.groups.get(group_id)
    }

    pub fn groups(&self) -> Vec<GroupMembership> {
        let mut groups: Vec<_> = self.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        groups
    }
}
