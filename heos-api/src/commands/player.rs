//! `player/...` commands

use std::ops::Range;

use super::{check_step, check_volume};
use crate::command::{CommandGroup, HeosCommand};
use crate::error::{ApiError, Result};
use crate::types::{OnOff, PlayState, PlayerId, RepeatMode};

fn player(name: &'static str) -> HeosCommand {
    HeosCommand::new(CommandGroup::Player, name)
}

fn for_player(name: &'static str, pid: PlayerId) -> HeosCommand {
    player(name).with_attribute("pid", pid)
}

pub fn get_players() -> HeosCommand {
    player("get_players")
}

pub fn get_player_info(pid: PlayerId) -> HeosCommand {
    for_player("get_player_info", pid)
}

pub fn get_play_state(pid: PlayerId) -> HeosCommand {
    for_player("get_play_state", pid)
}

pub fn set_play_state(pid: PlayerId, state: PlayState) -> HeosCommand {
    for_player("set_play_state", pid).with_attribute("state", state)
}

pub fn get_now_playing_media(pid: PlayerId) -> HeosCommand {
    for_player("get_now_playing_media", pid)
}

pub fn get_volume(pid: PlayerId) -> HeosCommand {
    for_player("get_volume", pid)
}

pub fn set_volume(pid: PlayerId, level: u8) -> Result<HeosCommand> {
    Ok(for_player("set_volume", pid).with_attribute("level", check_volume(level)?))
}

pub fn volume_up(pid: PlayerId, step: u8) -> Result<HeosCommand> {
    Ok(for_player("volume_up", pid).with_attribute("step", check_step(step)?))
}

pub fn volume_down(pid: PlayerId, step: u8) -> Result<HeosCommand> {
    Ok(for_player("volume_down", pid).with_attribute("step", check_step(step)?))
}

pub fn get_mute(pid: PlayerId) -> HeosCommand {
    for_player("get_mute", pid)
}

pub fn set_mute(pid: PlayerId, mute: bool) -> HeosCommand {
    for_player("set_mute", pid).with_attribute("state", OnOff::from(mute))
}

pub fn toggle_mute(pid: PlayerId) -> HeosCommand {
    for_player("toggle_mute", pid)
}

pub fn get_play_mode(pid: PlayerId) -> HeosCommand {
    for_player("get_play_mode", pid)
}

pub fn set_play_mode(pid: PlayerId, repeat: RepeatMode, shuffle: bool) -> HeosCommand {
    for_player("set_play_mode", pid)
        .with_attribute("repeat", repeat)
        .with_attribute("shuffle", OnOff::from(shuffle))
}

/// Fetch queue entries in the half-open index range `range`
pub fn get_queue(pid: PlayerId, range: Range<u32>) -> Result<HeosCommand> {
    if range.is_empty() {
        return Err(ApiError::InvalidParameter(format!(
            "queue range {}..{} is empty",
            range.start, range.end
        )));
    }
    // The device takes an inclusive "start,end" pair.
    Ok(for_player("get_queue", pid)
        .with_attribute("range", format!("{},{}", range.start, range.end - 1)))
}

pub fn play_queue_item(pid: PlayerId, qid: i64) -> HeosCommand {
    for_player("play_queue", pid).with_attribute("qid", qid)
}

pub fn clear_queue(pid: PlayerId) -> HeosCommand {
    for_player("clear_queue", pid)
}

pub fn play_next(pid: PlayerId) -> HeosCommand {
    for_player("play_next", pid)
}

pub fn play_previous(pid: PlayerId) -> HeosCommand {
    for_player("play_previous", pid)
}
