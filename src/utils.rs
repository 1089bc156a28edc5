//! Identifier helpers shared across the workflow modules

use bech32::Bech32m;
use uuid7::uuid7;

// construct a fresh uuid7 then encode it under the given hrp. The hrp doubles
// as the key namespace in the record store ("bkg_", "claim_", "user_", ...).
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Human-readable reference derived from the tail of a record id, e.g.
/// shown to guests on booking confirmations.
pub fn short_code(id: &str) -> String {
    let tail: Vec<char> = id.chars().rev().take(6).collect();
    tail.into_iter().rev().collect::<String>().to_uppercase()
}
