//! Group handle for accessing player groups
//!
//! A group is identified by the pid of its leader. Players that are not
//! grouped do not appear in `group/get_groups`.

use heos_api::types::Group as GroupInfo;
use heos_api::{GroupId, GroupMember, GroupRole, OnOff, PlayerId};

use crate::{HeosSystem, Player, SdkError};

/// Group handle with access to leader and members
///
/// # Example
///
/// ```rust,ignore
/// for group in system.groups()? {
///     println!("Group: {} ({} members)", group.name, group.member_count());
///
///     for member in &group.members {
///         let role = if group.is_leader(member.pid) { "leader" } else { "member" };
///         println!("  - {} ({})", member.name, role);
///     }
/// }
/// ```
#[derive(Clone)]
pub struct Group {
    /// Group identifier (pid of the leader)
    pub gid: GroupId,
    pub name: String,
    /// All members including the leader
    pub members: Vec<GroupMember>,

    system: HeosSystem,
}

impl Group {
    pub(crate) fn from_info(info: GroupInfo, system: HeosSystem) -> Self {
        Self {
            gid: info.gid,
            name: info.name,
            members: info.players,
            system,
        }
    }

    /// Pid of the leader, falling back to the group id
    pub fn leader_id(&self) -> PlayerId {
        self.members
            .iter()
            .find(|m| m.role == GroupRole::Leader)
            .map(|m| m.pid)
            .unwrap_or(self.gid)
    }

    pub fn is_leader(&self, pid: PlayerId) -> bool {
        self.leader_id() == pid
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Player handle for the leader
    pub fn leader(&self) -> Result<Player, SdkError> {
        self.system.get_player_by_id(self.leader_id())
    }

    /// Player handles for all members
    pub fn players(&self) -> Result<Vec<Player>, SdkError> {
        self.members
            .iter()
            .map(|m| self.system.get_player_by_id(m.pid))
            .collect()
    }

    /// Group volume level (0-100)
    pub fn volume(&self) -> Result<u8, SdkError> {
        let response = self.system.get_group_volume(self.gid)?.into_result()?;
        Ok(response.parsed_attribute("level")?)
    }

    pub fn set_volume(&self, level: u8) -> Result<(), SdkError> {
        self.system.set_group_volume(self.gid, level)?.into_result()?;
        Ok(())
    }

    pub fn volume_up(&self, step: u8) -> Result<(), SdkError> {
        self.system.group_volume_up(self.gid, step)?.into_result()?;
        Ok(())
    }

    pub fn volume_down(&self, step: u8) -> Result<(), SdkError> {
        self.system.group_volume_down(self.gid, step)?.into_result()?;
        Ok(())
    }

    pub fn is_muted(&self) -> Result<bool, SdkError> {
        let response = self.system.get_group_mute(self.gid)?.into_result()?;
        Ok(response.parsed_attribute::<OnOff>("state")?.is_on())
    }

    pub fn set_mute(&self, mute: bool) -> Result<(), SdkError> {
        self.system.set_group_mute(self.gid, mute)?.into_result()?;
        Ok(())
    }

    pub fn toggle_mute(&self) -> Result<(), SdkError> {
        self.system.toggle_group_mute(self.gid)?.into_result()?;
        Ok(())
    }

    /// Dissolve the group
    pub fn ungroup(&self) -> Result<(), SdkError> {
        self.system.ungroup(self.leader_id())?.into_result()?;
        Ok(())
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("gid", &self.gid)
            .field("name", &self.name)
            .field("members", &self.members)
            .finish()
    }
}
