//! `system/...` commands

use crate::command::{CommandGroup, HeosCommand};
use crate::types::OnOff;

fn system(name: &'static str) -> HeosCommand {
    HeosCommand::new(CommandGroup::System, name)
}

/// Lightweight round-trip used for liveness checks
pub fn heart_beat() -> HeosCommand {
    system("heart_beat")
}

/// Turn push notifications on or off for the connection the line is sent on
pub fn register_for_change_events(enable: bool) -> HeosCommand {
    system("register_for_change_events").with_attribute("enable", OnOff::from(enable))
}

pub fn check_account() -> HeosCommand {
    system("check_account")
}

pub fn sign_in(username: &str, password: &str) -> HeosCommand {
    system("sign_in")
        .with_attribute("un", username)
        .with_attribute("pw", password)
}

pub fn sign_out() -> HeosCommand {
    system("sign_out")
}

pub fn reboot() -> HeosCommand {
    system("reboot")
}

pub fn prettify_json_response(enable: bool) -> HeosCommand {
    system("prettify_json_response").with_attribute("enable", OnOff::from(enable))
}
