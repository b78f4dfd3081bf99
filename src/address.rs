// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Content addressing for remote identifiers.
//!
//! Every cached file in an archive is named after the SHA-256 digest of the
//! remote identifier it was derived from: the episode GUID for enclosures and
//! the remote URL for images. Recomputing the address from the same input
//! always yields the same local name, which is what keeps repeated syncs from
//! downloading anything twice.
//!
//! Changing the digest algorithm renames every cached file and therefore
//! invalidates existing archives.

use std::collections::BTreeSet;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::AddressError;

/// Length of an address in hexadecimal characters
pub const ADDRESS_LEN: usize = 64;

/// A stable local identity derived from an unstable remote identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentAddress(String);

impl ContentAddress {
    /// Derive the address of `input`.
    ///
    /// `what` names the input in the error, e.g. `guid of 'Episode 4'`.
    pub fn of(what: &str, input: &str) -> Result<Self, AddressError> {
        if input.trim().is_empty() {
            return Err(AddressError::EmptyIdentifier {
                what: what.to_string(),
            });
        }
        Ok(Self(hex_digest(input.as_bytes())))
    }

    /// Interpret a cached file stem as an address, if it looks like one
    pub fn from_stem(stem: &str) -> Option<Self> {
        (stem.len() == ADDRESS_LEN && stem.bytes().all(|b| b.is_ascii_hexdigit()))
            .then(|| Self(stem.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order-independent signature over a set of addresses.
///
/// Duplicates and ordering do not affect the result. Two snapshots with the
/// same set of episode GUIDs share a signature even if other fields differ.
pub fn episode_set_signature<'a, I>(addresses: I) -> String
where
    I: IntoIterator<Item = &'a ContentAddress>,
{
    let sorted: BTreeSet<&str> = addresses.into_iter().map(ContentAddress::as_str).collect();
    let mut hasher = Sha256::new();
    for address in sorted {
        hasher.update(address.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn hex_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
