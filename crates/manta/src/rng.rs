/// Seedable xorshift64* generator used for the random initialization.
#[derive(Debug, Clone)]
pub struct XorShift64Star {
    state: u64,
}

impl XorShift64Star {
    pub fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift; mix the seed so 0 and 1 differ.
        let mixed = seed.wrapping_mul(0x9E3779B97F4A7C15_u64) ^ 0xD1B54A32D192ED03_u64;
        Self {
            state: mixed.max(1),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D_u64)
    }

    /// Uniform in `[0, 1)` with 53 bits of precision.
    pub fn next_f64_unit(&mut self) -> f64 {
        let u = self.next_u64() >> 11;
        (u as f64) / ((1u64 << 53) as f64)
    }

    /// Fills `out` with uniform samples from `[low, high)`.
    pub fn fill_uniform(&mut self, out: &mut [f64], low: f64, high: f64) {
        let span = high - low;
        for v in out {
            *v = low + span * self.next_f64_unit();
        }
    }
}
