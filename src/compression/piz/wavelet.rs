
//! Wavelet encoding and decoding.
//! A two-dimensional Haar-like transform over 16-bit integer planes.
//! Values below 2^14 use the exact basis functions, larger values
//! fall back to modulo arithmetic.

use crate::error::UnitResult;
use crate::math::Vec2;


/// Transform the buffer in place.
/// The buffer is interpreted as a 2D plane with the specified
/// element count per dimension and index offset per dimension.
pub fn encode(
    buffer: &mut [u16],
    Vec2(count_x, count_y): Vec2<usize>,
    Vec2(offset_x, offset_y): Vec2<usize>,
    max: u16, // maximum value in the buffer
) -> UnitResult
{
    let is_14_bit = max < (1 << 14);
    let count = count_x.min(count_y);

    let mut p: usize = 1; // == 1 <<  level
    let mut p2: usize = 2; // == 1 << (level + 1)

    // hierarchical loop on smaller dimension
    while p2 <= count {
        let mut position_y = 0;
        let end_y = offset_y * (count_y - p2);
        let (offset1_x, offset1_y) = (offset_x * p, offset_y * p);
        let (offset2_x, offset2_y) = (offset_x * p2, offset_y * p2);

        while position_y <= end_y {
            let mut position_x = position_y;
            let end_x = position_x + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;
                let p10 = position_x + offset1_y;
                let p11 = p10 + offset1_x;

                // 2D wavelet encoding
                if is_14_bit {
                    let (i00, i01) = encode_14bit(buffer[position_x], buffer[p01]);
                    let (i10, i11) = encode_14bit(buffer[p10], buffer[p11]);

                    let (v00, v10) = encode_14bit(i00, i10);
                    let (v01, v11) = encode_14bit(i01, i11);

                    buffer[position_x] = v00;
                    buffer[p10] = v10;
                    buffer[p01] = v01;
                    buffer[p11] = v11;
                }
                else {
                    let (i00, i01) = encode_16bit(buffer[position_x], buffer[p01]);
                    let (i10, i11) = encode_16bit(buffer[p10], buffer[p11]);

                    let (v00, v10) = encode_16bit(i00, i10);
                    let (v01, v11) = encode_16bit(i01, i11);

                    buffer[position_x] = v00;
                    buffer[p10] = v10;
                    buffer[p01] = v01;
                    buffer[p11] = v11;
                }

                position_x += offset2_x;
            }

            // encode remaining odd pixel column
            if count_x & p != 0 {
                let p10 = position_x + offset1_y;

                let (v00, v10) = {
                    if is_14_bit { encode_14bit(buffer[position_x], buffer[p10]) }
                    else { encode_16bit(buffer[position_x], buffer[p10]) }
                };

                buffer[position_x] = v00;
                buffer[p10] = v10;
            }

            position_y += offset2_y;
        }

        // encode possibly remaining odd row
        if count_y & p != 0 {
            let mut position_x = position_y;
            let end_x = position_y + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;

                let (v00, v01) = {
                    if is_14_bit { encode_14bit(buffer[position_x], buffer[p01]) }
                    else { encode_16bit(buffer[position_x], buffer[p01]) }
                };

                buffer[position_x] = v00;
                buffer[p01] = v01;

                position_x += offset2_x;
            }
        }

        p = p2;
        p2 <<= 1;
    }

    Ok(())
}


/// Reverse the transformation of `encode`.
pub fn decode(
    buffer: &mut [u16],
    Vec2(count_x, count_y): Vec2<usize>,
    Vec2(offset_x, offset_y): Vec2<usize>,
    max: u16, // maximum value in the buffer
) -> UnitResult
{
    let is_14_bit = max < (1 << 14);
    let count = count_x.min(count_y);

    let mut p: usize = 1;
    let mut p2: usize;

    // search max level
    while p <= count {
        p <<= 1;
    }

    p >>= 1;
    p2 = p;
    p >>= 1;

    // hierarchical loop on smaller dimension
    while p >= 1 {
        let mut position_y = 0;
        let end_y = offset_y * (count_y - p2);

        let (offset1_x, offset1_y) = (offset_x * p, offset_y * p);
        let (offset2_x, offset2_y) = (offset_x * p2, offset_y * p2);

        while position_y <= end_y {
            let mut position_x = position_y;
            let end_x = position_x + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;
                let p10 = position_x + offset1_y;
                let p11 = p10 + offset1_x;

                // 2D wavelet decoding
                if is_14_bit {
                    let (i00, i10) = decode_14bit(buffer[position_x], buffer[p10]);
                    let (i01, i11) = decode_14bit(buffer[p01], buffer[p11]);

                    let (v00, v01) = decode_14bit(i00, i01);
                    let (v10, v11) = decode_14bit(i10, i11);

                    buffer[position_x] = v00;
                    buffer[p10] = v10;
                    buffer[p01] = v01;
                    buffer[p11] = v11;
                }
                else {
                    let (i00, i10) = decode_16bit(buffer[position_x], buffer[p10]);
                    let (i01, i11) = decode_16bit(buffer[p01], buffer[p11]);

                    let (v00, v01) = decode_16bit(i00, i01);
                    let (v10, v11) = decode_16bit(i10, i11);

                    buffer[position_x] = v00;
                    buffer[p10] = v10;
                    buffer[p01] = v01;
                    buffer[p11] = v11;
                }

                position_x += offset2_x;
            }

            // decode remaining odd pixel column
            if count_x & p != 0 {
                let p10 = position_x + offset1_y;

                let (v00, v10) = {
                    if is_14_bit { decode_14bit(buffer[position_x], buffer[p10]) }
                    else { decode_16bit(buffer[position_x], buffer[p10]) }
                };

                buffer[position_x] = v00;
                buffer[p10] = v10;
            }

            position_y += offset2_y;
        }

        // decode possibly remaining odd row
        if count_y & p != 0 {
            let mut position_x = position_y;
            let end_x = position_x + offset_x * (count_x - p2);

            while position_x <= end_x {
                let p01 = position_x + offset1_x;

                let (v00, v01) = {
                    if is_14_bit { decode_14bit(buffer[position_x], buffer[p01]) }
                    else { decode_16bit(buffer[position_x], buffer[p01]) }
                };

                buffer[position_x] = v00;
                buffer[p01] = v01;

                position_x += offset2_x;
            }
        }

        p2 = p;
        p >>= 1;
    }

    Ok(())
}


// Wavelet basis functions without modulo arithmetic. They produce
// the best compression ratios when the wavelet-transformed data are
// huffman-encoded, but only work for 14-bit data,
// where untransformed values are less than (1 << 14).

#[inline]
fn encode_14bit(a: u16, b: u16) -> (u16, u16) {
    let (a, b) = (a as i16 as i32, b as i16 as i32);

    let m = (a + b) >> 1;
    let d = a - b;

    (m as u16, d as u16)
}

#[inline]
fn decode_14bit(l: u16, h: u16) -> (u16, u16) {
    let (l, h) = (l as i16, h as i16);

    let hi = h as i32;
    let ai = l as i32 + (hi & 1) + (hi >> 1);

    let a = ai as i16;
    let b = (ai - hi) as i16;

    (a as u16, b as u16)
}


// Wavelet basis functions with modulo arithmetic. They work with full
// 16-bit data, but huffman-encoding the wavelet-transformed data
// does not compress the data quite as well.

const BIT_COUNT: i32 = 16;
const OFFSET_A: i32 = 1 << (BIT_COUNT - 1);
const OFFSET_M: i32 = 1 << (BIT_COUNT - 1);
const MOD_MASK: i32 = (1 << BIT_COUNT) - 1;

#[inline]
fn encode_16bit(a: u16, b: u16) -> (u16, u16) {
    let (a, b) = (a as i32, b as i32);

    let a_offset = (a + OFFSET_A) & MOD_MASK;
    let mut m = (a_offset + b) >> 1;
    let d = a_offset - b;

    if d < 0 { m = (m + OFFSET_M) & MOD_MASK; }
    let d = d & MOD_MASK;

    (m as u16, d as u16)
}

#[inline]
fn decode_16bit(l: u16, h: u16) -> (u16, u16) {
    let (m, d) = (l as i32, h as i32);

    let b = (m - (d >> 1)) & MOD_MASK;
    let a = (d + b - OFFSET_A) & MOD_MASK;

    (a as u16, b as u16)
}


#[cfg(test)]
mod test {
    use crate::math::Vec2;

    #[test]
    fn roundtrip_14_bit_values(){
        let data = [
            (13, 54), (3, 123), (423, 53), (1, 23), (23, 515), (513, 43),
            (16374, 16381), (16284, 3), (2, 1), (0, 0), (0, 4), (3, 0)
        ];

        for &values in &data {
            let (l, h) = super::encode_14bit(values.0, values.1);
            let result = super::decode_14bit(l, h);
            assert_eq!(values, result);
        }
    }

    #[test]
    fn roundtrip_16_bit_values(){
        let data = [
            (13, 54), (3, 123), (423, 53), (1, 23), (23, 515), (513, 43),
            (16385, 56384), (18384, 36384), (2, 1), (0, 0), (0, 4), (3, 0)
        ];

        for &values in &data {
            let (l, h) = super::encode_16bit(values.0, values.1);
            let result = super::decode_16bit(l, h);
            assert_eq!(values, result);
        }
    }

    #[test]
    fn roundtrip_14bit_image(){
        let data: [u16; 6 * 4] = [
            13, 54, 3, 123, 423, 53,
            1, 23, 23, 515, 513, 43,
            16374, 16381, 16284, 3, 2, 1,
            0, 0, 0, 4, 3, 0,
        ];

        let max = *data.iter().max().unwrap();
        let mut transformed = data;

        super::encode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max).unwrap();
        super::decode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max).unwrap();

        assert_eq!(data, transformed);
    }

    #[test]
    fn roundtrip_16bit_image(){
        let data: [u16; 6 * 4] = [
            13, 54, 3, 123, 423, 53,
            1, 23, 23, 515, 513, 43,
            16385, 56384, 18384, 36384, 2, 1,
            0, 0, 0, 4, 3, 0,
        ];

        let max = *data.iter().max().unwrap();
        let mut transformed = data;

        super::encode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max).unwrap();
        super::decode(&mut transformed, Vec2(6, 4), Vec2(1, 6), max).unwrap();

        assert_eq!(data, transformed);
    }

    #[test]
    fn roundtrip_tall_plane(){
        let mut data = [0_u16; 7 * 11];
        for (index, value) in data.iter_mut().enumerate() {
            *value = ((index as u32).wrapping_mul(2654435761) >> 18) as u16;
        }

        let max = *data.iter().max().unwrap();
        let mut transformed = data;

        super::encode(&mut transformed, Vec2(7, 11), Vec2(1, 7), max).unwrap();
        super::decode(&mut transformed, Vec2(7, 11), Vec2(1, 7), max).unwrap();

        assert_eq!(&data[..], &transformed[..]);
    }
}
