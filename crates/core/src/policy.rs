//! Expiry sweep, device-count ceiling, and credential-change reset
//!
//! These run inside the lifecycle operations; persisted state therefore
//! never contains already-expired records and never exceeds the device
//! ceiling.

use time::OffsetDateTime;

use crate::record::TokenSet;

/// Remove every session whose expiry is strictly in the past.
///
/// Runs at the start of every mutating operation so stale devices never
/// count toward the device ceiling and never pass validation.
pub fn sweep_at(tokens: &mut TokenSet, now: OffsetDateTime) -> usize {
    let before = tokens.len();
    tokens.retain(|_, record| record.expiry >= now);
    let removed = before - tokens.len();
    if removed > 0 {
        tracing::debug!(removed, "swept expired device sessions");
    }
    removed
}

pub fn sweep(tokens: &mut TokenSet) -> usize {
    sweep_at(tokens, OffsetDateTime::now_utc())
}

/// Enforce the per-account device ceiling.
///
/// While over the ceiling, the oldest-expiring session is removed. Among
/// sessions sharing the minimum expiry the lexicographically smallest
/// device id goes first (`min_by_key` keeps the first minimum and the
/// backing map iterates in device-id order). Returns the evicted ids.
pub fn enforce_device_limit(tokens: &mut TokenSet, max_devices: usize) -> Vec<String> {
    let mut evicted = Vec::new();
    while tokens.len() > max_devices {
        let oldest = tokens
            .iter()
            .min_by_key(|(_, record)| record.expiry)
            .map(|(device_id, _)| device_id.clone());
        let Some(device_id) = oldest else { break };
        tokens.remove(&device_id);
        tracing::info!(
            device_id = %device_id,
            max_devices,
            "evicted oldest device session over ceiling"
        );
        evicted.push(device_id);
    }
    evicted
}

/// Collapse the token set to the single most recently rotated session.
///
/// No-op unless the feature is enabled, a credential actually changed, and
/// more than one session exists. The surviving record is the one with the
/// greatest `updated_at` (`max_by_key` keeps the last maximum, so equal
/// timestamps resolve to the greatest device id; never-rotated records sort
/// lowest). Returns the removed ids, or `None` for the no-op case.
pub fn reset_after_credential_change(
    tokens: &mut TokenSet,
    enabled: bool,
    credential_changed: bool,
) -> Option<Vec<String>> {
    if !enabled || !credential_changed || tokens.len() <= 1 {
        return None;
    }

    let keep = tokens
        .iter()
        .max_by_key(|(_, record)| record.updated_at)
        .map(|(device_id, _)| device_id.clone())?;

    let mut removed = Vec::new();
    tokens.retain(|device_id, _| {
        if *device_id == keep {
            true
        } else {
            removed.push(device_id.clone());
            false
        }
    });

    tracing::info!(
        kept = %keep,
        removed = removed.len(),
        "credential change collapsed device sessions"
    );
    Some(removed)
}
