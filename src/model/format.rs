//! Helpers for the comma-separated `key=value` strings Proxmox uses to encode
//! drives, network devices and cloud-init settings.

use crate::prelude::{Error, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::collections::HashMap;

/// Characters left as-is when escaping SSH keys, everything else is
/// percent-encoded (`+` and `=` included, Proxmox rejects them otherwise).
const SSH_KEYS: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Proxmox expects booleans as `1` and `0`.
///
pub fn bool_flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Splits a config string into its `key=value` pairs.
///
/// Segments without a `=` (such as the leading volume of a drive string) are
/// skipped.
///
pub fn key_value_pairs(value: &str) -> HashMap<&str, &str> {
    value
        .split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            let split = pair.split_once('=');
            if split.is_none() && !pair.is_empty() {
                tracing::trace!(target: "model", %pair, "Segment without '=' skipped");
            }
            split
        })
        .collect()
}

const KIB_PER_GIB: u64 = 1024 * 1024;

/// Converts a size such as `512M`, `32G` or `2T` to kibibytes.
///
/// A bare number counts as gibibytes.
///
pub fn size_to_kib(size: &str) -> Result<u64> {
    let size = size.trim();
    let invalid = || Error::Validation("size".to_owned(), format!("'{size}' is not a valid disk size"));

    let unit = size.chars().last().ok_or_else(invalid)?;
    let (amount, per_unit) = match unit {
        '0'..='9' => (size, KIB_PER_GIB),
        'K' => (&size[..size.len() - 1], 1),
        'M' => (&size[..size.len() - 1], 1024),
        'G' => (&size[..size.len() - 1], KIB_PER_GIB),
        'T' => (&size[..size.len() - 1], KIB_PER_GIB * 1024),
        'P' => (&size[..size.len() - 1], KIB_PER_GIB * 1024 * 1024),
        _ => return Err(invalid()),
    };

    amount
        .parse::<u64>()
        .map_err(|_| invalid())?
        .checked_mul(per_unit)
        .ok_or_else(invalid)
}

/// Converts a size to whole gibibytes, the unit Proxmox allocates new volumes
/// in. Partial gibibytes round up, so `512M` allocates 1.
///
pub fn size_to_gib(size: &str) -> Result<u64> {
    Ok(size_to_kib(size)?.div_ceil(KIB_PER_GIB))
}

/// Joins the keys with newlines and percent-encodes the result the way the
/// `sshkeys` parameter expects.
///
pub fn encode_ssh_keys(keys: &[String]) -> String {
    utf8_percent_encode(&keys.join("\n"), SSH_KEYS).to_string()
}

pub fn decode_ssh_keys(value: &str) -> Vec<String> {
    percent_decode_str(value)
        .decode_utf8_lossy()
        .lines()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .collect()
}

/// A well-formed key is exactly `algorithm key`, without a trailing label.
///
pub fn validate_ssh_keys(keys: &[String]) -> Result<()> {
    for key in keys {
        if key.split(' ').count() != 2 {
            return Err(Error::Validation(
                "ssh_keys".to_owned(),
                "Multiple areas of whitespace detected, a properly formed key should only contain one space \
                 between the algorithm declaration and the actual key"
                    .to_owned(),
            ));
        }
    }
    Ok(())
}
