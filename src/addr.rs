//! Memory addresses and pointer chains.
//!
//! An [`Address`] is either a direct location or a pointer chain: the server
//! reads a pointer at element 0, adds element 1 to it, dereferences again,
//! and so on. A bare address is the one-element chain, and that is the only
//! form that goes on the wire.

use serde::Serialize;
use thiserror::Error;

/// Address validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// A pointer chain needs at least a base address.
    #[error("Address chain must contain at least one element")]
    Empty,
}

/// A memory location, possibly expressed as a pointer-dereference chain.
///
/// Offsets are `u32` like the target's address space; negative offsets are
/// written as their two's complement (`-4` is `0xFFFF_FFFC`), which the
/// server applies with wrapping arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Address(Vec<u32>);

impl Address {
    /// A direct address, normalized to a one-element chain.
    pub fn direct(addr: u32) -> Self {
        Address(vec![addr])
    }

    /// A pointer chain starting at `base` and following `offsets`.
    pub fn chain(base: u32, offsets: &[u32]) -> Self {
        let mut elems = Vec::with_capacity(offsets.len() + 1);
        elems.push(base);
        elems.extend_from_slice(offsets);
        Address(elems)
    }

    /// The normalized element sequence, rejecting an empty chain.
    pub fn normalized(&self) -> Result<&[u32], AddressError> {
        if self.0.is_empty() {
            Err(AddressError::Empty)
        } else {
            Ok(&self.0)
        }
    }

    /// First element of the chain, if any.
    pub fn base(&self) -> Option<u32> {
        self.0.first().copied()
    }

    /// Whether this is a direct (single-element) address.
    pub fn is_direct(&self) -> bool {
        self.0.len() == 1
    }
}

impl From<u32> for Address {
    fn from(addr: u32) -> Self {
        Address::direct(addr)
    }
}

impl From<Vec<u32>> for Address {
    fn from(elems: Vec<u32>) -> Self {
        Address(elems)
    }
}

impl From<&[u32]> for Address {
    fn from(elems: &[u32]) -> Self {
        Address(elems.to_vec())
    }
}

impl<const N: usize> From<[u32; N]> for Address {
    fn from(elems: [u32; N]) -> Self {
        Address(elems.to_vec())
    }
}

impl From<&Address> for Address {
    fn from(addr: &Address) -> Self {
        addr.clone()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut elems = self.0.iter();
        match elems.next() {
            Some(base) => write!(f, "{:X}", base)?,
            None => return write!(f, "<empty>"),
        }
        for off in elems {
            write!(f, "->+{:X}", off)?;
        }
        Ok(())
    }
}
