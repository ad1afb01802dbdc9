/// Deterministic seed + generation random number generator.

use serde::{Deserialize, Serialize};

/// Mask applied to raw values: non-negative 31-bit integers.
pub const VALUE_MASK: u64 = 0x7FFF_FFFF;

const SEED_OFFSET: u64 = 0x5851_F42D_4C95_7F2D;
const GEN_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;
const GEN_OFFSET: u64 = 0x1405_7B7E_F767_814F;
const MIX_MULTIPLIER: u64 = 0xD6E8_FEB8_6659_FD93;

/// One `(seed, generation)` pair on the context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngContext {
    pub seed: u64,
    pub generation: i64,
}

/// A generator whose every output is a pure function of `(seed, generation)`.
///
/// Only the topmost context is active. `branch` pushes an isolated context
/// seeded from the current raw value, `merge` pops it again; the bottom
/// context is never removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rng {
    contexts: Vec<RngContext>,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self::with_generation(seed, 0)
    }

    pub fn with_generation(seed: u64, generation: i64) -> Self {
        Self {
            contexts: vec![RngContext { seed, generation }],
        }
    }

    /// The mixing function. Order-dependent: `raw(a, b) != raw(b, a)` in general.
    pub fn raw(seed: u64, generation: i64) -> u64 {
        let mut s = seed.wrapping_add(SEED_OFFSET);
        let mut g = (generation as u64)
            .wrapping_mul(GEN_MULTIPLIER)
            .wrapping_add(GEN_OFFSET);
        s ^= g.rotate_left((s >> 58) as u32);
        g ^= s.rotate_right((g >> 58) as u32);
        s = s.wrapping_mul(MIX_MULTIPLIER);
        g = g.wrapping_add(s.rotate_left((g & 63) as u32));
        s ^ g.rotate_right((s & 63) as u32)
    }

    fn top(&self) -> &RngContext {
        // The bottom context is never popped.
        &self.contexts[self.contexts.len() - 1]
    }

    fn top_mut(&mut self) -> &mut RngContext {
        let last = self.contexts.len() - 1;
        &mut self.contexts[last]
    }

    pub fn seed(&self) -> u64 {
        self.top().seed
    }

    pub fn generation(&self) -> i64 {
        self.top().generation
    }

    pub fn set_generation(&mut self, generation: i64) {
        self.top_mut().generation = generation;
    }

    /// Number of contexts on the stack (1 when nothing is branched).
    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    /// Value at the current generation, then step forward.
    pub fn next(&mut self) -> u32 {
        let value = self.peek();
        let ctx = self.top_mut();
        ctx.generation = ctx.generation.wrapping_add(1);
        value
    }

    /// Value at the current generation, then step backward.
    pub fn prev(&mut self) -> u32 {
        let value = self.peek();
        let ctx = self.top_mut();
        ctx.generation = ctx.generation.wrapping_sub(1);
        value
    }

    pub fn peek(&self) -> u32 {
        self.peek_at(self.generation())
    }

    pub fn peek_at(&self, generation: i64) -> u32 {
        (Self::raw(self.seed(), generation) & VALUE_MASK) as u32
    }

    /// Draw in `[0, max)`.
    ///
    /// # Panics
    /// Panics if `max == 0`.
    pub fn next_below(&mut self, max: u32) -> u32 {
        assert!(max > 0, "invalid range: max must be above 0");
        self.next() % max
    }

    /// Draw in `[min, max)`.
    ///
    /// # Panics
    /// Panics if `min >= max`.
    pub fn next_range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "invalid range: min ({}) must be below max ({})", min, max);
        let span = max.wrapping_sub(min) as u64;
        min.wrapping_add((self.next() as u64 % span) as i64)
    }

    /// Push a context seeded from the current raw value, starting at generation 0.
    pub fn branch(&mut self) {
        self.branch_at(0);
    }

    /// Push a context seeded from the current raw value, starting at `generation`.
    pub fn branch_at(&mut self, generation: i64) {
        let ctx = *self.top();
        self.contexts.push(RngContext {
            seed: Self::raw(ctx.seed, ctx.generation),
            generation,
        });
    }

    /// Pop the active branch. No-op when only the root context remains.
    pub fn merge(&mut self) {
        if self.contexts.len() > 1 {
            self.contexts.pop();
        }
    }
}

impl rand::RngCore for Rng {
    fn next_u32(&mut self) -> u32 {
        let ctx = *self.top();
        self.top_mut().generation = ctx.generation.wrapping_add(1);
        Self::raw(ctx.seed, ctx.generation) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let ctx = *self.top();
        self.top_mut().generation = ctx.generation.wrapping_add(1);
        Self::raw(ctx.seed, ctx.generation)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_is_pure() {
        assert_eq!(Rng::raw(42, 7), Rng::raw(42, 7));
        assert_ne!(Rng::raw(42, 7), Rng::raw(42, 8));
        assert_ne!(Rng::raw(42, 7), Rng::raw(43, 7));
    }

    #[test]
    fn raw_is_order_dependent() {
        assert_ne!(Rng::raw(3, 5), Rng::raw(5, 3));
    }

    #[test]
    fn next_advances_generation() {
        let mut rng = Rng::new(1);
        let peeked = rng.peek();
        assert_eq!(rng.next(), peeked);
        assert_eq!(rng.generation(), 1);
    }

    #[test]
    fn values_are_masked_to_31_bits() {
        let mut rng = Rng::new(99);
        for _ in 0..1000 {
            assert!(rng.next() as u64 <= VALUE_MASK);
        }
    }

    #[test]
    fn next_then_prev_restores_generation() {
        let mut rng = Rng::with_generation(5, 10);
        rng.next();
        let peeked = rng.peek();
        assert_eq!(rng.prev(), peeked);
        assert_eq!(rng.generation(), 10);
    }

    #[test]
    fn next_range_stays_in_bounds() {
        let mut rng = Rng::new(2024);
        for _ in 0..500 {
            let v = rng.next_range(-3, 4);
            assert!((-3..4).contains(&v));
        }
    }

    #[test]
    #[should_panic(expected = "invalid range")]
    fn next_range_rejects_empty_range() {
        let mut rng = Rng::new(1);
        rng.next_range(5, 5);
    }

    #[test]
    #[should_panic(expected = "invalid range")]
    fn next_below_rejects_zero() {
        let mut rng = Rng::new(1);
        rng.next_below(0);
    }

    #[test]
    fn next_below_stays_in_bounds() {
        let mut rng = Rng::new(8);
        assert!((0..500).all(|_| rng.next_below(3) < 3));
        assert_eq!(rng.next_below(1), 0);
    }

    #[test]
    fn branch_and_merge_leave_parent_untouched() {
        let mut with_branch = Rng::new(77);
        let mut without = Rng::new(77);
        with_branch.next();
        without.next();

        with_branch.branch();
        assert_eq!(with_branch.depth(), 2);
        for _ in 0..10 {
            with_branch.next();
        }
        with_branch.merge();

        assert_eq!(with_branch.next(), without.next());
    }

    #[test]
    fn merge_never_pops_root() {
        let mut rng = Rng::new(3);
        rng.merge();
        rng.merge();
        assert_eq!(rng.depth(), 1);
        assert_eq!(rng.seed(), 3);
    }

    #[test]
    fn branch_at_sets_start_generation() {
        let mut rng = Rng::new(3);
        rng.branch_at(40);
        assert_eq!(rng.generation(), 40);
        assert_eq!(rng.seed(), Rng::raw(3, 0));
    }

    #[test]
    fn rand_adaptors_are_deterministic() {
        use rand::seq::SliceRandom;
        use rand::Rng as _;

        let mut a = Rng::new(11);
        let mut b = Rng::new(11);
        let mut xs: Vec<u32> = (0..20).collect();
        let mut ys = xs.clone();
        xs.shuffle(&mut a);
        ys.shuffle(&mut b);
        assert_eq!(xs, ys);
        assert_eq!(a.gen_range(0..100), b.gen_range(0..100));
    }
}
