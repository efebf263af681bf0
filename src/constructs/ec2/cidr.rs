//! IPv4 CIDR blocks and sequential subnet allocation.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Smallest subnet the VPC service accepts.
pub const MAX_SUBNET_MASK: u8 = 28;
/// Largest VPC block the VPC service accepts.
pub const MIN_VPC_MASK: u8 = 16;

/// An IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Create a block; host bits of `addr` must be zero.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::InvalidCidr {
                cidr: format!("{}/{}", addr, prefix),
                message: "prefix length must be at most 32".to_string(),
            });
        }
        let network = u32::from(addr);
        let block = Self { network, prefix };
        if network & !block.netmask() != 0 {
            return Err(Error::InvalidCidr {
                cidr: format!("{}/{}", addr, prefix),
                message: "address has host bits set".to_string(),
            });
        }
        Ok(block)
    }

    /// Prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Network address.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    fn netmask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    fn first(&self) -> u64 {
        u64::from(self.network)
    }

    fn end(&self) -> u64 {
        self.first() + self.size()
    }

    /// Whether `other` lies entirely inside this block.
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.first() >= self.first() && other.end() <= self.end()
    }

    /// Whether the two blocks share any address.
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.first() < other.end() && other.first() < self.end()
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidCidr {
            cidr: s.to_string(),
            message: message.to_string(),
        };
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("expected <address>/<prefix>"))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| invalid("address is not a valid IPv4 address"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| invalid("prefix length is not a number"))?;
        Ipv4Cidr::new(addr, prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

/// Hands out non-overlapping, aligned sub-blocks of a VPC block in order.
#[derive(Debug, Clone)]
pub struct CidrAllocator {
    block: Ipv4Cidr,
    next: u64,
}

impl CidrAllocator {
    /// Start allocating at the beginning of `block`.
    pub fn new(block: Ipv4Cidr) -> Self {
        Self {
            next: block.first(),
            block,
        }
    }

    /// Addresses not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.block.end().saturating_sub(self.next)
    }

    /// Allocate the next block with the given prefix length.
    pub fn allocate(&mut self, prefix: u8) -> Result<Ipv4Cidr> {
        if prefix < self.block.prefix || prefix > 32 {
            return Err(Error::InvalidCidr {
                cidr: format!("/{}", prefix),
                message: format!("does not fit inside {}", self.block),
            });
        }
        let size = 1u64 << (32 - u32::from(prefix));
        let start = self.next.div_ceil(size) * size;
        if start + size > self.block.end() {
            return Err(Error::InvalidCidr {
                cidr: format!("/{}", prefix),
                message: format!("{} has no room left for another /{}", self.block, prefix),
            });
        }
        self.next = start + size;
        let network = u32::try_from(start).map_err(|_| Error::InvalidCidr {
            cidr: format!("/{}", prefix),
            message: "allocation ran past the IPv4 address space".to_string(),
        })?;
        Ipv4Cidr::new(Ipv4Addr::from(network), prefix)
    }

    /// Largest prefix length (smallest mask value) that lets `count` equal
    /// blocks fit into the remaining space.
    pub fn even_split_mask(&self, count: u64) -> Option<u8> {
        mask_for_space(self.remaining(), count)
    }
}

/// Prefix length of the largest power-of-two block such that `count` of them
/// fit into `space` addresses.
pub fn mask_for_space(space: u64, count: u64) -> Option<u8> {
    if count == 0 {
        return None;
    }
    let per_block = space / count;
    if per_block == 0 {
        return None;
    }
    let bits = 63 - per_block.leading_zeros();
    32u32.checked_sub(bits).and_then(|m| u8::try_from(m).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.size(), 65536);
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_parse_errors() {
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.1/16".parse::<Ipv4Cidr>().is_err());
        assert!("300.0.0.0/16".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_sequential_allocation() {
        let mut alloc = CidrAllocator::new("10.0.0.0/16".parse().unwrap());
        assert_eq!(alloc.allocate(24).unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(alloc.allocate(24).unwrap().to_string(), "10.0.1.0/24");
        // Realigns to the next /20 boundary.
        assert_eq!(alloc.allocate(20).unwrap().to_string(), "10.0.16.0/20");
    }

    #[test]
    fn test_even_split() {
        let alloc = CidrAllocator::new("10.0.0.0/16".parse().unwrap());
        assert_eq!(alloc.even_split_mask(4), Some(18));
        assert_eq!(alloc.even_split_mask(6), Some(19));
        assert_eq!(alloc.even_split_mask(0), None);
    }

    #[test]
    fn test_exhaustion() {
        let mut alloc = CidrAllocator::new("10.0.0.0/24".parse().unwrap());
        alloc.allocate(25).unwrap();
        alloc.allocate(25).unwrap();
        assert!(alloc.allocate(28).is_err());
        assert!(alloc.allocate(16).is_err());
    }

    #[test]
    fn test_overlaps_and_contains() {
        let vpc: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let a: Ipv4Cidr = "10.0.0.0/24".parse().unwrap();
        let b: Ipv4Cidr = "10.0.1.0/24".parse().unwrap();
        assert!(vpc.contains(&a));
        assert!(vpc.overlaps(&a));
        assert!(!a.overlaps(&b));
        assert!(!a.contains(&vpc));
    }
}
