//! Machine state: flat memory, the pixel surface, and the RNG.
//!
//! Instructions execute against a [`Machine`]. Flat memory is a plain
//! `i32` slot array addressed by the data table; pixel channels live in a
//! separate [`PixelBuffer`] because LED hardware is not part of flat
//! memory and is only reachable through the pixel opcodes.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RuntimeError;

/// Sentinel address carried by pixel-attribute operands: "not flat
/// memory; resolve through pixel opcodes".
pub const PIXEL_ADDR: u16 = 65535;

/// One of the nine fixed channel attributes of a pixel array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelChannel {
    Hue,
    Sat,
    Val,
    HsFade,
    VFade,
    Count,
    SizeX,
    SizeY,
    Index,
}

impl PixelChannel {
    /// Wire attribute id.
    pub fn id(self) -> u16 {
        match self {
            PixelChannel::Hue => 0,
            PixelChannel::Sat => 1,
            PixelChannel::Val => 2,
            PixelChannel::HsFade => 3,
            PixelChannel::VFade => 4,
            PixelChannel::Count => 5,
            PixelChannel::SizeX => 6,
            PixelChannel::SizeY => 7,
            PixelChannel::Index => 8,
        }
    }

    /// Resolve a channel by its attribute name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "hue" => PixelChannel::Hue,
            "sat" => PixelChannel::Sat,
            "val" => PixelChannel::Val,
            "hs_fade" => PixelChannel::HsFade,
            "v_fade" => PixelChannel::VFade,
            "count" => PixelChannel::Count,
            "size_x" => PixelChannel::SizeX,
            "size_y" => PixelChannel::SizeY,
            "index" => PixelChannel::Index,
            _ => return None,
        })
    }

    /// Attribute name as written in source programs.
    pub fn name(self) -> &'static str {
        match self {
            PixelChannel::Hue => "hue",
            PixelChannel::Sat => "sat",
            PixelChannel::Val => "val",
            PixelChannel::HsFade => "hs_fade",
            PixelChannel::VFade => "v_fade",
            PixelChannel::Count => "count",
            PixelChannel::SizeX => "size_x",
            PixelChannel::SizeY => "size_y",
            PixelChannel::Index => "index",
        }
    }
}

impl fmt::Display for PixelChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// In-memory model of the pixel surface.
///
/// Five per-element channels plus the per-element `index` channel and the
/// three geometry scalars. This models just enough of the hardware for the
/// pixel opcodes to be executable and observable in tests; the real driver
/// is out of scope.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    size_x: i32,
    size_y: i32,
    count: i32,
    hue: Vec<i32>,
    sat: Vec<i32>,
    val: Vec<i32>,
    hs_fade: Vec<i32>,
    v_fade: Vec<i32>,
    index: Vec<i32>,
}

impl PixelBuffer {
    /// Create a surface of the given geometry with all channels zeroed.
    pub fn new(size_x: u16, size_y: u16) -> Self {
        let count = size_x as usize * size_y as usize;
        Self {
            size_x: size_x as i32,
            size_y: size_y as i32,
            count: count as i32,
            hue: vec![0; count],
            sat: vec![0; count],
            val: vec![0; count],
            hs_fade: vec![0; count],
            v_fade: vec![0; count],
            index: vec![0; count],
        }
    }

    /// Number of pixels on the surface.
    pub fn count(&self) -> i32 {
        self.count
    }

    /// Read-only view of a per-element channel. Geometry scalars come back
    /// as a single-element slice.
    pub fn channel(&self, channel: PixelChannel) -> &[i32] {
        match channel {
            PixelChannel::Hue => &self.hue,
            PixelChannel::Sat => &self.sat,
            PixelChannel::Val => &self.val,
            PixelChannel::HsFade => &self.hs_fade,
            PixelChannel::VFade => &self.v_fade,
            PixelChannel::Index => &self.index,
            PixelChannel::Count => std::slice::from_ref(&self.count),
            PixelChannel::SizeX => std::slice::from_ref(&self.size_x),
            PixelChannel::SizeY => std::slice::from_ref(&self.size_y),
        }
    }

    fn channel_mut(&mut self, channel: PixelChannel) -> &mut [i32] {
        match channel {
            PixelChannel::Hue => &mut self.hue,
            PixelChannel::Sat => &mut self.sat,
            PixelChannel::Val => &mut self.val,
            PixelChannel::HsFade => &mut self.hs_fade,
            PixelChannel::VFade => &mut self.v_fade,
            PixelChannel::Index => &mut self.index,
            PixelChannel::Count => std::slice::from_mut(&mut self.count),
            PixelChannel::SizeX => std::slice::from_mut(&mut self.size_x),
            PixelChannel::SizeY => std::slice::from_mut(&mut self.size_y),
        }
    }

    /// Apply a vector operation across every element of a channel.
    pub fn apply(&mut self, channel: PixelChannel, f: impl Fn(i32) -> i32) {
        for slot in self.channel_mut(channel) {
            *slot = f(*slot);
        }
    }

    /// Store one value into a channel element addressed by runtime index
    /// values. One index addresses the channel linearly; two address it as
    /// x + y * size_x. Indexes wrap at the surface bounds.
    pub fn store(&mut self, channel: PixelChannel, indexes: &[i32], value: i32) {
        let (size_x, size_y, count) = (self.size_x, self.size_y, self.count);
        let slots = self.channel_mut(channel);
        if slots.len() == 1 {
            slots[0] = value;
            return;
        }
        let element = match indexes {
            [] => 0,
            [i] => i.rem_euclid(count),
            [x, y, ..] => x.rem_euclid(size_x) + y.rem_euclid(size_y) * size_x,
        };
        slots[element as usize] = value;
    }
}

/// The state an instruction executes against.
pub struct Machine {
    memory: Vec<i32>,
    /// The pixel surface, reachable only through pixel opcodes.
    pub pixels: PixelBuffer,
    rng: SmallRng,
    /// Offset of the currently executing instruction, maintained by the
    /// run loop for fault reporting.
    pub pc: usize,
}

impl Machine {
    /// Create a machine with `size` zeroed memory slots.
    pub fn new(size: usize, pixels: PixelBuffer, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            memory: vec![0; size],
            pixels,
            rng,
            pc: 0,
        }
    }

    /// Number of memory slots.
    pub fn memory_size(&self) -> usize {
        self.memory.len()
    }

    /// The raw memory array.
    pub fn memory(&self) -> &[i32] {
        &self.memory
    }

    /// Read the slot at `addr`.
    pub fn load(&self, addr: u16) -> Result<i32, RuntimeError> {
        self.load_at(addr as i64)
    }

    /// Read a slot through a computed address, as indirect accesses do.
    pub fn load_at(&self, addr: i64) -> Result<i32, RuntimeError> {
        if addr < 0 || addr as usize >= self.memory.len() {
            return Err(RuntimeError::AddressOutOfBounds {
                addr,
                size: self.memory.len(),
            });
        }
        Ok(self.memory[addr as usize])
    }

    /// Write the slot at `addr`.
    pub fn store(&mut self, addr: u16, value: i32) -> Result<(), RuntimeError> {
        self.store_at(addr as i64, value)
    }

    /// Write a slot through a computed address.
    pub fn store_at(&mut self, addr: i64, value: i32) -> Result<(), RuntimeError> {
        if addr < 0 || addr as usize >= self.memory.len() {
            return Err(RuntimeError::AddressOutOfBounds {
                addr,
                size: self.memory.len(),
            });
        }
        self.memory[addr as usize] = value;
        Ok(())
    }

    /// Uniform random value in `[start, end]`.
    pub fn rand_range(&mut self, start: i32, end: i32) -> i32 {
        if start >= end {
            return start;
        }
        self.rng.gen_range(start..=end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_access() {
        let mut m = Machine::new(4, PixelBuffer::new(2, 2), Some(0));
        m.store(2, 7).unwrap();
        assert_eq!(m.load(2).unwrap(), 7);
        assert!(matches!(
            m.load(4),
            Err(RuntimeError::AddressOutOfBounds { addr: 4, size: 4 })
        ));
        assert!(m.store_at(-1, 0).is_err());
    }

    #[test]
    fn test_pixel_store_wraps() {
        let mut px = PixelBuffer::new(4, 4);
        px.store(PixelChannel::Hue, &[17], 9);
        assert_eq!(px.channel(PixelChannel::Hue)[1], 9);
        px.store(PixelChannel::Sat, &[1, 2], 5);
        assert_eq!(px.channel(PixelChannel::Sat)[9], 5);
    }

    #[test]
    fn test_pixel_apply_hits_every_element() {
        let mut px = PixelBuffer::new(2, 2);
        px.apply(PixelChannel::Val, |v| v + 3);
        assert!(px.channel(PixelChannel::Val).iter().all(|&v| v == 3));
    }

    #[test]
    fn test_geometry_channels_are_scalars() {
        let px = PixelBuffer::new(4, 2);
        assert_eq!(px.channel(PixelChannel::Count), &[8]);
        assert_eq!(px.channel(PixelChannel::SizeX), &[4]);
        assert_eq!(px.channel(PixelChannel::SizeY), &[2]);
    }

    #[test]
    fn test_rand_range_bounds() {
        let mut m = Machine::new(1, PixelBuffer::new(1, 1), Some(42));
        for _ in 0..100 {
            let v = m.rand_range(3, 9);
            assert!((3..=9).contains(&v));
        }
        assert_eq!(m.rand_range(5, 5), 5);
    }
}
