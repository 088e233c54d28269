
//! The 8×8 orthonormal discrete cosine transform
//! and its inverse, operating on rows and columns separately.

const BLOCK_WIDTH: usize = 8;
pub const BLOCK_SIZE: usize = BLOCK_WIDTH * BLOCK_WIDTH;


/// The cosine basis, row `u` holding the weights of output coefficient `u`.
fn basis() -> [[f32; BLOCK_WIDTH]; BLOCK_WIDTH] {
    let mut table = [[0.0; BLOCK_WIDTH]; BLOCK_WIDTH];

    let normalization_dc = (1.0 / BLOCK_WIDTH as f32).sqrt();
    let normalization_ac = (2.0 / BLOCK_WIDTH as f32).sqrt();

    for (u, row) in table.iter_mut().enumerate() {
        let normalization = if u == 0 { normalization_dc } else { normalization_ac };

        for (x, weight) in row.iter_mut().enumerate() {
            let angle = ((2 * x + 1) as f32) * (u as f32) * std::f32::consts::PI / (2.0 * BLOCK_WIDTH as f32);
            *weight = normalization * angle.cos();
        }
    }

    table
}

fn transform_rows(block: &mut [f32; BLOCK_SIZE], table: &[[f32; 8]; 8], inverse: bool) {
    for row in 0..BLOCK_WIDTH {
        let mut input = [0.0_f32; BLOCK_WIDTH];
        input.copy_from_slice(&block[row * BLOCK_WIDTH .. (row + 1) * BLOCK_WIDTH]);

        for u in 0..BLOCK_WIDTH {
            let mut sum = 0.0;

            for x in 0..BLOCK_WIDTH {
                // the inverse transform uses the transposed basis
                let weight = if inverse { table[x][u] } else { table[u][x] };
                sum += weight * input[x];
            }

            block[row * BLOCK_WIDTH + u] = sum;
        }
    }
}

fn transform_columns(block: &mut [f32; BLOCK_SIZE], table: &[[f32; 8]; 8], inverse: bool) {
    for column in 0..BLOCK_WIDTH {
        let mut input = [0.0_f32; BLOCK_WIDTH];
        for y in 0..BLOCK_WIDTH {
            input[y] = block[y * BLOCK_WIDTH + column];
        }

        for u in 0..BLOCK_WIDTH {
            let mut sum = 0.0;

            for y in 0..BLOCK_WIDTH {
                let weight = if inverse { table[y][u] } else { table[u][y] };
                sum += weight * input[y];
            }

            block[u * BLOCK_WIDTH + column] = sum;
        }
    }
}

/// Transform a block of 8×8 samples into frequency coefficients, in place.
pub fn forward(block: &mut [f32; BLOCK_SIZE]) {
    let table = basis();
    transform_rows(block, &table, false);
    transform_columns(block, &table, false);
}

/// Reverse [`forward`], transforming coefficients back into samples.
pub fn inverse(block: &mut [f32; BLOCK_SIZE]) {
    let table = basis();
    transform_columns(block, &table, true);
    transform_rows(block, &table, true);
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constant_block_has_only_a_dc_coefficient(){
        let mut block = [0.5_f32; BLOCK_SIZE];
        forward(&mut block);

        // orthonormal dc gain is 8
        assert!((block[0] - 0.5 * 8.0).abs() < 1e-4);

        for &coefficient in &block[1..] {
            assert!(coefficient.abs() < 1e-4);
        }
    }

    #[test]
    fn roundtrip(){
        let mut block = [0.0_f32; BLOCK_SIZE];
        for (index, value) in block.iter_mut().enumerate() {
            *value = ((index * 7919 + 13) % 64) as f32 / 64.0 - 0.5;
        }

        let original = block;

        forward(&mut block);
        inverse(&mut block);

        for (restored, original) in block.iter().zip(original.iter()) {
            assert!((restored - original).abs() < 1e-4);
        }
    }

    #[test]
    fn transform_preserves_energy(){
        let mut block = [0.0_f32; BLOCK_SIZE];
        for (index, value) in block.iter_mut().enumerate() {
            *value = (index as f32 * 0.7).sin();
        }

        let input_energy: f32 = block.iter().map(|value| value * value).sum();
        forward(&mut block);
        let output_energy: f32 = block.iter().map(|value| value * value).sum();

        assert!((input_energy - output_energy).abs() / input_energy < 1e-4);
    }
}
