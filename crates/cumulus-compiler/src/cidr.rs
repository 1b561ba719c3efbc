//! IPv4 blocks and the per-network subnet allocator.

use crate::CompileError;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Cidr {
    base: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Fails if `prefix > 32` or any host bit of `addr` is set.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, CompileError> {
        let base = u32::from(addr);
        if prefix > 32 || base & !mask(prefix) != 0 {
            return Err(CompileError::InvalidCidr(format!("{addr}/{prefix}")));
        }
        Ok(Self { base, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    fn last(&self) -> u64 {
        u64::from(self.base) + self.size() - 1
    }

    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix
            && u64::from(other.base) >= u64::from(self.base)
            && other.last() <= self.last()
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        u64::from(self.base) <= other.last() && u64::from(other.base) <= self.last()
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix.min(32)))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CompileError::InvalidCidr(s.to_owned());
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        Self::new(addr, prefix).map_err(|_| invalid())
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

/// Lazily carves equally sized sub-blocks out of a parent block, lowest
/// address first. Never repeats a block and yields `None` once the parent is
/// used up instead of wrapping.
#[derive(Debug, Clone)]
pub struct CidrAllocator {
    parent: Ipv4Cidr,
    prefix: u8,
    next: u64,
    count: u64,
}

impl CidrAllocator {
    /// `host_bits` is the size of each sub-block: 8 carves /24s.
    pub fn new(parent: Ipv4Cidr, host_bits: u8) -> Self {
        let (prefix, count) = match 32u8.checked_sub(host_bits) {
            Some(prefix) if prefix >= parent.prefix => {
                (prefix, 1u64 << u32::from(prefix - parent.prefix))
            }
            _ => (32u8.saturating_sub(host_bits), 0),
        };
        Self {
            parent,
            prefix,
            next: 0,
            count,
        }
    }

    pub fn parent(&self) -> Ipv4Cidr {
        self.parent
    }

    /// Prefix length of the blocks this allocator hands out.
    pub fn block_prefix(&self) -> u8 {
        self.prefix
    }

    pub fn remaining(&self) -> u64 {
        self.count - self.next
    }
}

impl Iterator for CidrAllocator {
    type Item = Ipv4Cidr;

    fn next(&mut self) -> Option<Ipv4Cidr> {
        if self.next >= self.count {
            return None;
        }
        let step = 1u64 << (32 - u32::from(self.prefix));
        let base = u64::from(self.parent.base) + self.next * step;
        self.next += 1;
        Some(Ipv4Cidr {
            base: u32::try_from(base).ok()?,
            prefix: self.prefix,
        })
    }
}
