/// ArcFour-style keystream generator. The engine needs reproducible draws
/// whose entire state can be exported and restored byte-exactly, so the
/// classic 256-byte S-box plus two indices is the whole story.
#[derive(Clone)]
pub struct ArcFour {
    sbox: [u8; 256],
    i: u8,
    j: u8,
}

/// Serialized state length: the S-box followed by the two indices.
pub const RNG_STATE_LEN: usize = 258;

// Keystream bytes discarded after key scheduling.
const WARMUP_BYTES: usize = 1024;

impl ArcFour {
    pub fn new(key: &[u8]) -> Self {
        let mut sbox = [0u8; 256];
        for (idx, slot) in sbox.iter_mut().enumerate() {
            *slot = idx as u8;
        }

        if !key.is_empty() {
            let mut j = 0u8;
            for idx in 0..256 {
                j = j
                    .wrapping_add(sbox[idx])
                    .wrapping_add(key[idx % key.len()]);
                sbox.swap(idx, j as usize);
            }
        }

        let mut rng = Self { sbox, i: 0, j: 0 };
        for _ in 0..WARMUP_BYTES {
            rng.next_u8();
        }
        rng
    }

    pub fn next_u8(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.sbox[self.i as usize]);
        self.sbox.swap(self.i as usize, self.j as usize);
        let index = self.sbox[self.i as usize].wrapping_add(self.sbox[self.j as usize]);
        self.sbox[index as usize]
    }

    pub fn next_u32(&mut self) -> u32 {
        u32::from_le_bytes([
            self.next_u8(),
            self.next_u8(),
            self.next_u8(),
            self.next_u8(),
        ])
    }

    /// Uniform draw in `[0, 1)` built from 53 keystream bits.
    pub fn next_f64_unit(&mut self) -> f64 {
        let high = (self.next_u32() >> 6) as u64; // 26 bits
        let low = (self.next_u32() >> 5) as u64; // 27 bits
        ((high << 27) | low) as f64 / (1u64 << 53) as f64
    }

    /// Uniform draw in `[0, max_exclusive)`. `max_exclusive` must be > 0.
    pub fn next_below(&mut self, max_exclusive: usize) -> usize {
        debug_assert!(max_exclusive > 0);
        (self.next_f64_unit() * max_exclusive as f64) as usize % max_exclusive
    }

    /// Fisher-Yates shuffle driven by this keystream.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for idx in (1..items.len()).rev() {
            let other = self.next_below(idx + 1);
            items.swap(idx, other);
        }
    }

    pub fn state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RNG_STATE_LEN);
        out.extend_from_slice(&self.sbox);
        out.push(self.i);
        out.push(self.j);
        out
    }

    /// Rebuild from a `state()` export. Returns `None` on a wrong-size blob.
    pub fn restore(state: &[u8]) -> Option<Self> {
        if state.len() != RNG_STATE_LEN {
            return None;
        }
        let mut sbox = [0u8; 256];
        sbox.copy_from_slice(&state[..256]);
        Some(Self {
            sbox,
            i: state[256],
            j: state[257],
        })
    }
}

impl std::fmt::Debug for ArcFour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcFour")
            .field("i", &self.i)
            .field("j", &self.j)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_keys_produce_identical_streams() {
        let mut a = ArcFour::new(b"autoplay");
        let mut b = ArcFour::new(b"autoplay");
        for _ in 0..512 {
            assert_eq!(a.next_u8(), b.next_u8());
        }
    }

    #[test]
    fn different_keys_diverge() {
        let mut a = ArcFour::new(b"autoplay");
        let mut b = ArcFour::new(b"autoplaz");
        let same = (0..64).filter(|_| a.next_u8() == b.next_u8()).count();
        assert!(same < 64);
    }

    #[test]
    fn restore_resumes_mid_stream() {
        let mut a = ArcFour::new(b"seed");
        for _ in 0..77 {
            a.next_u8();
        }
        let saved = a.state();
        assert_eq!(saved.len(), RNG_STATE_LEN);

        let mut b = ArcFour::restore(&saved).expect("state should restore");
        for _ in 0..256 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn restore_rejects_wrong_length() {
        assert!(ArcFour::restore(&[0u8; 257]).is_none());
        assert!(ArcFour::restore(&[0u8; 259]).is_none());
    }

    #[test]
    fn unit_draws_stay_in_range() {
        let mut rng = ArcFour::new(b"unit");
        for _ in 0..1000 {
            let x = rng.next_f64_unit();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn shuffle_is_a_permutation_and_reproducible() {
        let mut a = ArcFour::new(b"perm");
        let mut b = ArcFour::new(b"perm");
        let mut first: Vec<u32> = (0..32).collect();
        let mut second = first.clone();
        a.shuffle(&mut first);
        b.shuffle(&mut second);
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..32).collect::<Vec<u32>>());
    }
}
