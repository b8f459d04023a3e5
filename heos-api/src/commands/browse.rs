//! `browse/...` commands

use crate::command::{CommandGroup, HeosCommand};
use crate::error::{ApiError, Result};
use crate::types::{PlayerId, SourceId};

fn browse_command(name: &'static str) -> HeosCommand {
    HeosCommand::new(CommandGroup::Browse, name)
}

pub fn get_music_sources() -> HeosCommand {
    browse_command("get_music_sources")
}

/// Browse a source, or a container inside it when `cid` is given
pub fn browse(sid: SourceId, cid: Option<&str>) -> HeosCommand {
    let cmd = browse_command("browse").with_attribute("sid", sid);
    match cid {
        Some(cid) => cmd.with_attribute("cid", cid),
        None => cmd,
    }
}

/// Play one of the HEOS favourites, numbered from 1
pub fn play_preset(pid: PlayerId, preset: u32) -> Result<HeosCommand> {
    if preset == 0 {
        return Err(ApiError::InvalidParameter(
            "presets are numbered from 1".to_string(),
        ));
    }
    Ok(browse_command("play_preset")
        .with_attribute("pid", pid)
        .with_attribute("preset", preset))
}

/// Switch a player to a physical input such as `inputs/aux_in_1`
pub fn play_input(pid: PlayerId, input: &str) -> HeosCommand {
    browse_command("play_input")
        .with_attribute("pid", pid)
        .with_attribute("input", input)
}

pub fn play_stream(pid: PlayerId, sid: SourceId, cid: &str, mid: &str) -> HeosCommand {
    browse_command("play_stream")
        .with_attribute("pid", pid)
        .with_attribute("sid", sid)
        .with_attribute("cid", cid)
        .with_attribute("mid", mid)
}
