//! Frame primitives for the adaptive frame-of-reference codec.
//!
//! A frame is one selector byte followed by a bit-packed payload. Selectors
//! 0..=32 name a 32-integer frame of that bit width, 33..=65 a 16-integer
//! frame (width = selector - 33), 66..=98 an 8-integer frame (width =
//! selector - 66). Width 0 frames are the selector byte alone. Packing is
//! big-endian, most significant bit first, and every frame payload is a whole
//! number of bytes since the frame sizes are multiples of 8.

use once_cell::sync::Lazy;

/// Largest number of integers a single frame covers.
pub const MAX_FRAME_SIZE: usize = 32;

pub const NUM_SELECTORS: usize = 99;

/// Integers covered by each selector.
pub const FRAME_SIZES: [usize; NUM_SELECTORS] = build_frame_sizes();

/// Payload bytes following each selector.
pub const FRAME_LENGTHS: [usize; NUM_SELECTORS] = build_frame_lengths();

const fn build_frame_sizes() -> [usize; NUM_SELECTORS] {
    let mut sizes = [0usize; NUM_SELECTORS];
    let mut s = 0;
    while s < NUM_SELECTORS {
        sizes[s] = if s < 33 {
            32
        } else if s < 66 {
            16
        } else {
            8
        };
        s += 1;
    }
    sizes
}

const fn build_frame_lengths() -> [usize; NUM_SELECTORS] {
    let mut lengths = [0usize; NUM_SELECTORS];
    let mut s = 0;
    while s < NUM_SELECTORS {
        lengths[s] = if s < 33 {
            4 * s
        } else if s < 66 {
            2 * (s - 33)
        } else {
            s - 66
        };
        s += 1;
    }
    lengths
}

/// Selector byte for a frame of `frame_size` integers at `width` bits each.
pub fn selector_for(frame_size: usize, width: usize) -> u8 {
    debug_assert!(width <= 32);
    let base = match frame_size {
        32 => 0,
        16 => 33,
        8 => 66,
        _ => unreachable!("frame size {frame_size}"),
    };
    (base + width) as u8
}

pub fn bits_required(value: u32) -> usize {
    (32 - value.leading_zeros()) as usize
}

/// Packs `values` at `width` bits each, MSB first. `values.len() * width` must
/// be a multiple of 8, which holds for all frame sizes.
pub fn pack_frame(values: &[u32], width: usize, output: &mut Vec<u8>) {
    debug_assert!(values.len() * width % 8 == 0);
    let mut acc = 0u64;
    let mut pending_bits = 0usize;
    for &value in values {
        debug_assert!(width == 32 || (value as u64) < (1u64 << width));
        acc = (acc << width) | value as u64;
        pending_bits += width;
        while pending_bits >= 8 {
            pending_bits -= 8;
            output.push((acc >> pending_bits) as u8);
        }
    }
    debug_assert_eq!(pending_bits, 0);
}

#[inline(always)]
fn unpack_frame<const WIDTH: u32, const COUNT: usize>(input: &[u8], output: &mut Vec<u32>) {
    if WIDTH == 0 {
        output.resize(output.len() + COUNT, 0);
        return;
    }
    let mask = (1u64 << WIDTH) - 1;
    let mut acc = 0u64;
    let mut available = 0u32;
    let mut byte = 0usize;
    for _ in 0..COUNT {
        while available < WIDTH {
            acc = (acc << 8) | input[byte] as u64;
            byte += 1;
            available += 8;
        }
        available -= WIDTH;
        output.push(((acc >> available) & mask) as u32);
    }
}

pub type FrameDecoder = fn(&[u8], &mut Vec<u32>);

/// Frame decoders indexed by selector byte. Each entry is a monomorphic
/// routine for one (frame size, width) pair.
pub static FRAME_DECODERS: Lazy<[FrameDecoder; NUM_SELECTORS]> = Lazy::new(|| {
    let mut table: [FrameDecoder; NUM_SELECTORS] = [unpack_frame::<0, 32>; NUM_SELECTORS];
    let mut slot = 0usize;
    macro_rules! family {
        ($count:literal) => {
            family!(@widths $count;
                0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16
                17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32);
        };
        (@widths $count:literal; $($w:literal)*) => {
            $(
                table[slot] = unpack_frame::<$w, $count>;
                slot += 1;
            )*
        };
    }
    family!(32);
    family!(16);
    family!(8);
    debug_assert_eq!(slot, NUM_SELECTORS);
    table
});

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_selector_tables_are_consistent() {
        for s in 0..NUM_SELECTORS {
            let size = FRAME_SIZES[s];
            let width = match size {
                32 => s,
                16 => s - 33,
                8 => s - 66,
                _ => panic!("frame size {size}"),
            };
            assert_eq!(FRAME_LENGTHS[s], size * width / 8);
            assert_eq!(selector_for(size, width) as usize, s);
        }
    }

    #[test]
    fn test_pack_unpack_every_selector() {
        for s in 0..NUM_SELECTORS {
            let size = FRAME_SIZES[s];
            let width = FRAME_LENGTHS[s] * 8 / size.max(1);
            let max = if width == 32 {
                u32::MAX
            } else {
                (1u32 << width) - 1
            };
            let values: Vec<u32> = (0..size as u32).map(|i| i.wrapping_mul(2654435761) & max).collect();

            let mut packed = Vec::new();
            pack_frame(&values, width, &mut packed);
            assert_eq!(packed.len(), FRAME_LENGTHS[s]);

            let mut unpacked = Vec::new();
            FRAME_DECODERS[s](&packed, &mut unpacked);
            assert_eq!(unpacked, values);
        }
    }

    #[test]
    fn test_bits_required() {
        assert_eq!(bits_required(0), 0);
        assert_eq!(bits_required(1), 1);
        assert_eq!(bits_required(255), 8);
        assert_eq!(bits_required(256), 9);
        assert_eq!(bits_required(u32::MAX), 32);
    }
}
