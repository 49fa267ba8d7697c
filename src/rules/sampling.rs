use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform 31-bit random values for the sampling gate.
pub trait RandomSource: Send + Sync {
    fn next_u31(&self) -> u32;
}

/// Per-thread generator; no shared state on the packet path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    #[inline]
    fn next_u31(&self) -> u32 {
        rand::thread_rng().gen::<u32>() >> 1
    }
}

/// Deterministic generator for replays and tests.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        SeededRandom {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_u31(&self) -> u32 {
        self.rng.lock().gen::<u32>() >> 1
    }
}

/// Always returns the same value.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub u32);

#[cfg(test)]
impl RandomSource for FixedRandom {
    fn next_u31(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_fit_31_bits() {
        let sources: [&dyn RandomSource; 2] = [&ThreadRandom, &SeededRandom::new(7)];
        for source in sources {
            for _ in 0..1000 {
                assert!(source.next_u31() < 0x8000_0000);
            }
        }
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a = SeededRandom::new(42);
        let b = SeededRandom::new(42);
        for _ in 0..16 {
            assert_eq!(a.next_u31(), b.next_u31());
        }
    }
}
