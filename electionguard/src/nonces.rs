use crate::*;

/// A deterministic, indexable sequence of pseudo-random elements of Z_q,
/// seeded from a nonce and a list of header strings.
pub struct Nonces<'a> {
    group: &'a GroupContext,
    internal_seed: UInt256,
    headers: Vec<String>,
}

impl<'a> Nonces<'a> {
    pub fn new(group: &'a GroupContext, seed: &ElementModQ, headers: &[&str]) -> Self {
        let seed_key = UInt256::from_slice(&group.q_to_bytes(seed)).unwrap_or_default();
        let mut h = group.hasher(&seed_key);
        for header in headers {
            h = h.string(header);
        }
        Nonces {
            group,
            internal_seed: h.finish(),
            headers: headers.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn get(&self, index: u32) -> ElementModQ {
        let mut h = self.group.hasher(&self.internal_seed).int(index);
        for header in &self.headers {
            h = h.string(header);
        }
        self.group.q_from_uint256(&h.finish())
    }

    pub fn take(&self, n: usize) -> Vec<ElementModQ> {
        (0..n as u32).map(|i| self.get(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_are_deterministic() {
        let group = GroupContext::tiny();
        let seed = group.q_from_u64(12345);
        let a = Nonces::new(&group, &seed, &["range-chaum-pedersen-proof"]);
        let b = Nonces::new(&group, &seed, &["range-chaum-pedersen-proof"]);
        let c = Nonces::new(&group, &seed, &["range-chaum-pedersen-proof-constants"]);
        assert_eq!(a.take(3), b.take(3));
        assert_ne!(a.get(0), a.get(1));
        assert_ne!(a.get(0), c.get(0));
    }
}
