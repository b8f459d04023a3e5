//! `group/...` commands

use super::{check_step, check_volume};
use crate::command::{CommandGroup, HeosCommand};
use crate::error::{ApiError, Result};
use crate::types::{GroupId, OnOff, PlayerId};

fn group(name: &'static str) -> HeosCommand {
    HeosCommand::new(CommandGroup::Group, name)
}

fn for_group(name: &'static str, gid: GroupId) -> HeosCommand {
    group(name).with_attribute("gid", gid)
}

pub fn get_groups() -> HeosCommand {
    group("get_groups")
}

pub fn get_group_info(gid: GroupId) -> HeosCommand {
    for_group("get_group_info", gid)
}

/// Create or modify a group; the first pid becomes the leader
pub fn set_group(pids: &[PlayerId]) -> Result<HeosCommand> {
    if pids.is_empty() {
        return Err(ApiError::InvalidParameter(
            "set_group needs at least one player".to_string(),
        ));
    }
    let list = pids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    Ok(group("set_group").with_attribute("pid", list))
}

/// Dissolve the group led by `leader`
pub fn ungroup(leader: PlayerId) -> HeosCommand {
    group("set_group").with_attribute("pid", leader)
}

pub fn get_volume(gid: GroupId) -> HeosCommand {
    for_group("get_volume", gid)
}

pub fn set_volume(gid: GroupId, level: u8) -> Result<HeosCommand> {
    Ok(for_group("set_volume", gid).with_attribute("level", check_volume(level)?))
}

pub fn volume_up(gid: GroupId, step: u8) -> Result<HeosCommand> {
    Ok(for_group("volume_up", gid).with_attribute("step", check_step(step)?))
}

pub fn volume_down(gid: GroupId, step: u8) -> Result<HeosCommand> {
    Ok(for_group("volume_down", gid).with_attribute("step", check_step(step)?))
}

pub fn get_mute(gid: GroupId) -> HeosCommand {
    for_group("get_mute", gid)
}

pub fn set_mute(gid: GroupId, mute: bool) -> HeosCommand {
    for_group("set_mute", gid).with_attribute("state", OnOff::from(mute))
}

pub fn toggle_mute(gid: GroupId) -> HeosCommand {
    for_group("toggle_mute", gid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_group() {
        assert_eq!(
            set_group(&[5, -7, 9]).unwrap().to_line(),
            "heos://group/set_group?pid=5,-7,9"
        );
        assert!(set_group(&[]).is_err());
        assert_eq!(ungroup(5).to_line(), "heos://group/set_group?pid=5");
    }

    #[test]
    fn test_group_volume() {
        assert_eq!(
            set_volume(5, 10).unwrap().to_line(),
            "heos://group/set_volume?gid=5&level=10"
        );
        assert!(set_volume(5, 200).is_err());
        assert_eq!(
            toggle_mute(5).to_line(),
            "heos://group/toggle_mute?gid=5"
        );
    }
}
