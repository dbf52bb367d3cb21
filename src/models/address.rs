//! Address block (CIDR prefix) arithmetic.
//!
//! Provides [`AddressBlock`] for IPv4 and IPv6 prefixes, along with the bit
//! helpers used by the subnet planner. All arithmetic is done on `u128` so the
//! same code serves both families.

use crate::error::{Error, Result};
use serde::de;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Maximum prefix length of an IPv4 block.
pub const MAX_LENGTH_V4: u8 = 32;
/// Maximum prefix length of an IPv6 block.
pub const MAX_LENGTH_V6: u8 = 128;

/// Address family of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> AddressFamily {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Longest prefix allowed for the family (32 or 128).
    pub fn max_length(self) -> u8 {
        match self {
            AddressFamily::V4 => MAX_LENGTH_V4,
            AddressFamily::V6 => MAX_LENGTH_V6,
        }
    }

    /// All address bits set, e.g. `0xFFFF_FFFF` for IPv4.
    fn all_bits(self) -> u128 {
        match self {
            AddressFamily::V4 => u32::MAX as u128,
            AddressFamily::V6 => u128::MAX,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

fn to_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(a) => u32::from(a) as u128,
        IpAddr::V6(a) => u128::from(a),
    }
}

fn from_bits(family: AddressFamily, bits: u128) -> IpAddr {
    match family {
        AddressFamily::V4 => IpAddr::V4(Ipv4Addr::from(bits as u32)),
        AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(bits)),
    }
}

/// Bits covering the host part of a prefix of length `len`.
fn host_mask(family: AddressFamily, len: u8) -> u128 {
    let host_bits = (family.max_length() - len) as u32;
    1u128
        .checked_shl(host_bits)
        .map(|b| b.wrapping_sub(1))
        .unwrap_or(u128::MAX)
}

/// Convert a prefix length to a network mask.
///
/// # Examples
/// ```
/// use edge_topology::models::{prefix_mask, AddressFamily};
/// assert_eq!(prefix_mask(AddressFamily::V4, 24).unwrap(), 0xFFFF_FF00);
/// ```
pub fn prefix_mask(family: AddressFamily, len: u8) -> Result<u128> {
    if len > family.max_length() {
        return Err(Error::InvalidAddress(format!(
            "{family} network length /{len} is too long"
        )));
    }
    Ok(family.all_bits() & !host_mask(family, len))
}

/// Get the network address for a given IP and prefix length.
pub fn cut_addr(addr: IpAddr, len: u8) -> Result<IpAddr> {
    let family = AddressFamily::of(&addr);
    let mask = prefix_mask(family, len)?;
    Ok(from_bits(family, to_bits(addr) & mask))
}

/// Last address of the block (the broadcast address for IPv4).
pub fn last_addr(addr: IpAddr, len: u8) -> Result<IpAddr> {
    let family = AddressFamily::of(&addr);
    let mask = prefix_mask(family, len)?;
    Ok(from_bits(family, (to_bits(addr) & mask) | host_mask(family, len)))
}

/// Returns the address immediately following the block, failing when the
/// block is the last one of its family.
pub fn ip_after_block(addr: IpAddr, len: u8) -> Result<IpAddr> {
    let family = AddressFamily::of(&addr);
    let last = to_bits(last_addr(addr, len)?);
    last.checked_add(1)
        .filter(|next| *next <= family.all_bits())
        .map(|next| from_bits(family, next))
        .ok_or_else(|| Error::InvalidAddress(format!("no block follows {addr}/{len}")))
}

/// Number of sub-blocks produced by extending a prefix by `new_bits`.
///
/// `None` when the count does not fit in a `u128` (`new_bits == 128`).
pub fn sub_block_count(new_bits: u8) -> Option<u128> {
    1u128.checked_shl(new_bits as u32)
}

/// An address prefix: network address plus prefix length.
///
/// Construction always clears the host bits, so `10.0.3.7/16` is stored as
/// `10.0.0.0/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressBlock {
    addr: IpAddr,
    prefix_len: u8,
}

impl AddressBlock {
    /// Parse a block from CIDR notation (e.g. "10.0.0.0/16").
    pub fn new(addr_cidr: &str) -> Result<AddressBlock> {
        let addr_cidr = addr_cidr.trim();
        let (addr, len) = addr_cidr
            .split_once('/')
            .ok_or_else(|| Error::InvalidAddress(format!("'{addr_cidr}' is not addr/len")))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("invalid address '{addr}'")))?;
        let len: u8 = len
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("invalid prefix length '{len}'")))?;
        AddressBlock::from_parts(addr, len)
    }

    /// Build a block from an address and prefix length, clearing host bits.
    pub fn from_parts(addr: IpAddr, prefix_len: u8) -> Result<AddressBlock> {
        Ok(AddressBlock {
            addr: cut_addr(addr, prefix_len)?,
            prefix_len,
        })
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.addr)
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// The network (lowest) address.
    pub fn network(&self) -> IpAddr {
        self.addr
    }

    /// The last (highest) address in the block.
    pub fn last(&self) -> IpAddr {
        let family = self.family();
        from_bits(
            family,
            to_bits(self.addr) | host_mask(family, self.prefix_len),
        )
    }

    /// Number of addresses, saturating at `u128::MAX` for an IPv6 `/0`.
    pub fn size(&self) -> u128 {
        host_mask(self.family(), self.prefix_len).saturating_add(1)
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        AddressFamily::of(&addr) == self.family()
            && to_bits(self.addr) <= to_bits(addr)
            && to_bits(addr) <= to_bits(self.last())
    }

    /// True when `other` lies entirely inside this block.
    pub fn contains_block(&self, other: &AddressBlock) -> bool {
        self.prefix_len <= other.prefix_len && self.contains(other.addr)
    }

    pub fn overlaps(&self, other: &AddressBlock) -> bool {
        self.contains_block(other) || other.contains_block(self)
    }

    /// The `index`-th sub-block at prefix length `prefix_len + new_bits`,
    /// counting from the lowest address.
    pub fn subnet(&self, new_bits: u8, index: u128) -> Result<AddressBlock> {
        let family = self.family();
        let new_len = self
            .prefix_len
            .checked_add(new_bits)
            .filter(|len| *len <= family.max_length())
            .ok_or_else(|| {
                Error::InvalidPartition(format!(
                    "{self} cannot be extended by {new_bits} bits (max /{})",
                    family.max_length()
                ))
            })?;
        if let Some(count) = sub_block_count(new_bits) {
            if index >= count {
                return Err(Error::InvalidPartition(format!(
                    "sub-block {index} out of range: {self} holds {count} blocks of /{new_len}"
                )));
            }
        }
        let host_bits = (family.max_length() - new_len) as u32;
        let offset = index.checked_shl(host_bits).unwrap_or(0);
        Ok(AddressBlock {
            addr: from_bits(family, to_bits(self.addr) | offset),
            prefix_len: new_len,
        })
    }

    /// The block of the same size directly after this one.
    pub fn next_block(&self) -> Result<AddressBlock> {
        Ok(AddressBlock {
            addr: ip_after_block(self.addr, self.prefix_len)?,
            prefix_len: self.prefix_len,
        })
    }
}

impl FromStr for AddressBlock {
    type Err = Error;

    fn from_str(s: &str) -> Result<AddressBlock> {
        AddressBlock::new(s)
    }
}

impl fmt::Display for AddressBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl Serialize for AddressBlock {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AddressBlock {
    fn deserialize<D>(deserializer: D) -> std::result::Result<AddressBlock, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AddressBlock::new(&s).map_err(de::Error::custom)
    }
}
