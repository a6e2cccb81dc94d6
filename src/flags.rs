//! Ad-hoc boolean flags written directly to the store, not through a
//! repository: member activation and whether the coach has listened to a
//! member's recording.

use crate::bus::{EventBus, Topic};
use crate::error::Result;
use crate::store::Store;

/// UI signal published whenever a flag changes
pub const MEMBER_STATUS_SIGNAL: &str = "member_status";

fn flag(store: &Store, key: &str) -> bool {
    store.get_raw(key).as_deref() == Some("true")
}

fn set_flag(store: &Store, bus: &EventBus, key: &str, value: bool) -> Result<()> {
    store.set_raw(key, if value { "true" } else { "false" })?;
    bus.publish(&Topic::signal(MEMBER_STATUS_SIGNAL));
    Ok(())
}

/// Whether the coach has activated this member's account
pub fn member_active(store: &Store, npm: &str) -> bool {
    flag(store, &format!("member_{npm}_active"))
}

pub fn set_member_active(store: &Store, bus: &EventBus, npm: &str, active: bool) -> Result<()> {
    set_flag(store, bus, &format!("member_{npm}_active"), active)
}

/// Per-username activation flag kept alongside the npm-keyed one
pub fn user_active(store: &Store, username: &str) -> bool {
    flag(store, &format!("user_{username}_active"))
}

pub fn set_user_active(store: &Store, bus: &EventBus, username: &str, active: bool) -> Result<()> {
    set_flag(store, bus, &format!("user_{username}_active"), active)
}

/// Whether the coach has played back one of this member's recordings
pub fn recording_listened(store: &Store, npm: &str) -> bool {
    flag(store, &format!("recording_listened_{npm}"))
}

pub fn mark_recording_listened(store: &Store, bus: &EventBus, npm: &str) -> Result<()> {
    set_flag(store, bus, &format!("recording_listened_{npm}"), true)
}
