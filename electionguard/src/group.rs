use crate::*;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand_core::{CryptoRng, RngCore};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

const PRODUCTION_P: &str = "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF93C467E37DB0C7A4D1BE3F810152CB56A1CECC3AF65CC0190C03DF34709AFFBD8E4B59FA03A9F0EED0649CCB621057D11056AE9132135A08E43B4673D74BAFEA58DEB878CC86D733DBE7BF38154B36CF8A96D1567899AAAE0C09D4C8B6B7B86FD2A1EA1DE62FF8643EC7C271827977225E6AC2F0BD61C746961542A3CE3BEA5DB54FE70E63E6D09F8FC28658E80567A47CFDE60EE741E5D85A7BD46931CED8220365594964B839896FCAABCCC9B31959C083F22AD3EE591C32FAB2C7448F2A057DB2DB49EE52E0182741E53865F004CC8E704B7C5C40BF304C4D8C4F13EDF6047C555302D2238D8CE11DF2424F1B66C2C5D238D0744DB679AF2890487031F9C0AEA1C4BB6FE9554EE528FDF1B05E5B256223B2F09215F3719F9C7CCC69DDF172D0D6234217FCC0037F18B93EF5389130B7A661E5C26E54214068BBCAFEA32A67818BD3075AD1F5C7E9CC3D1737FB28171BAF84DBB6612B7881C1A48E439CD03A92BF52225A2B38E6542E9F722BCE15A381B5753EA842763381CCAE83512B30511B32E5E8D80362149AD030AABA5F3A5798BB22AA7EC1B6D0F17903F4E22D840734AA85973F79A93FFB82A75C47C03D43D2F9CA02D03199BACEDDD4533A52566AFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF";
const PRODUCTION_Q: &str = "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF43";

const TINY_P: u64 = 1_879_047_647;
const TINY_Q: u64 = 134_217_689;
const TINY_R: u64 = 14;
const TINY_G: u64 = 16_384;

/// Largest tally or vote the discrete log table will search for
pub const DEFAULT_MAX_DLOG: u32 = 100_000;

/// An element of Z_p^*
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementModP(#[serde(with = "BigUintHex")] pub(crate) BigUint);

/// An element of Z_q
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementModQ(#[serde(with = "BigUintHex")] pub(crate) BigUint);

impl ElementModP {
    pub fn value(&self) -> &BigUint {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0.to_bytes_be())
    }
}

impl ElementModQ {
    pub fn value(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0.to_bytes_be())
    }
}

impl fmt::Debug for ElementModP {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ElementModP({})", self.to_hex())
    }
}

impl fmt::Debug for ElementModQ {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ElementModQ({})", self.to_hex())
    }
}

/// The published group parameters, as recorded in the election configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionConstants {
    pub name: String,
    #[serde(with = "BigUintHex")]
    pub large_prime: BigUint,
    #[serde(with = "BigUintHex")]
    pub small_prime: BigUint,
    #[serde(with = "BigUintHex")]
    pub cofactor: BigUint,
    #[serde(with = "BigUintHex")]
    pub generator: BigUint,
}

// Incrementally grown table of base^i -> i
struct DLogTable {
    table: HashMap<BigUint, u32>,
    last: BigUint,
    exponent: u32,
}

#[derive(Default)]
struct DLogCache {
    tables: HashMap<BigUint, DLogTable>,
}

/// The prime-order subgroup of Z_p^* all election values live in.
///
/// Owns the discrete log cache: every lookup and every extension of a table happens
/// under one lock, so concurrent verifiers block on each other rather than racing.
pub struct GroupContext {
    name: String,
    p: BigUint,
    q: BigUint,
    r: BigUint,
    g: BigUint,
    p_bytes: usize,
    q_bytes: usize,
    dlog: Mutex<DLogCache>,
}

impl fmt::Debug for GroupContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GroupContext({})", self.name)
    }
}

impl GroupContext {
    /// The 4096-bit production group
    pub fn production() -> Self {
        let p = BigUint::parse_bytes(PRODUCTION_P.as_bytes(), 16).unwrap_or_default();
        let q = BigUint::parse_bytes(PRODUCTION_Q.as_bytes(), 16).unwrap_or_default();
        let r = (&p - 1u32) / &q;
        let g = BigUint::from(2u32).modpow(&r, &p);
        Self::new("production-4096", p, q, r, g, 512, 32)
    }

    /// A 31-bit group for fast tests. Offers no security.
    pub fn tiny() -> Self {
        Self::new(
            "tiny-31",
            BigUint::from(TINY_P),
            BigUint::from(TINY_Q),
            BigUint::from(TINY_R),
            BigUint::from(TINY_G),
            4,
            4,
        )
    }

    fn new(name: &str, p: BigUint, q: BigUint, r: BigUint, g: BigUint, pb: usize, qb: usize) -> Self {
        GroupContext {
            name: name.to_string(),
            p,
            q,
            r,
            g,
            p_bytes: pb,
            q_bytes: qb,
            dlog: Mutex::new(DLogCache::default()),
        }
    }

    /// Rebuild the group named by published constants. Only the known groups are accepted.
    pub fn from_constants(constants: &ElectionConstants) -> Result<Self, Error> {
        for group in [GroupContext::production(), GroupContext::tiny()].iter() {
            if group.name == constants.name {
                if &group.constants() != constants {
                    return Err(Error::InvalidElement(format!(
                        "constants for {} do not match",
                        constants.name
                    )));
                }
                return Ok(Self::new(
                    &group.name,
                    group.p.clone(),
                    group.q.clone(),
                    group.r.clone(),
                    group.g.clone(),
                    group.p_bytes,
                    group.q_bytes,
                ));
            }
        }
        Err(Error::InvalidElement(format!("unknown group {}", constants.name)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constants(&self) -> ElectionConstants {
        ElectionConstants {
            name: self.name.clone(),
            large_prime: self.p.clone(),
            small_prime: self.q.clone(),
            cofactor: self.r.clone(),
            generator: self.g.clone(),
        }
    }

    pub fn p_byte_len(&self) -> usize {
        self.p_bytes
    }

    pub fn q_byte_len(&self) -> usize {
        self.q_bytes
    }

    pub fn generator(&self) -> ElementModP {
        ElementModP(self.g.clone())
    }

    pub fn one_p(&self) -> ElementModP {
        ElementModP(BigUint::one())
    }

    pub fn zero_q(&self) -> ElementModQ {
        ElementModQ(BigUint::zero())
    }

    pub fn one_q(&self) -> ElementModQ {
        ElementModQ(BigUint::one())
    }

    // ---- construction ----

    pub fn element_p(&self, value: BigUint) -> Result<ElementModP, Error> {
        if value >= self.p {
            return Err(Error::InvalidElement("value not less than P".to_string()));
        }
        Ok(ElementModP(value))
    }

    pub fn element_q(&self, value: BigUint) -> Result<ElementModQ, Error> {
        if value >= self.q {
            return Err(Error::InvalidElement("value not less than Q".to_string()));
        }
        Ok(ElementModQ(value))
    }

    /// Reduce an integer mod q
    pub fn q_from_u64(&self, value: u64) -> ElementModQ {
        ElementModQ(BigUint::from(value) % &self.q)
    }

    /// Reduce a hash output mod q
    pub fn q_from_uint256(&self, value: &UInt256) -> ElementModQ {
        ElementModQ(BigUint::from_bytes_be(value.as_bytes()) % &self.q)
    }

    /// Uniformly random element of Z_q
    pub fn random_q<R: RngCore + CryptoRng>(&self, rng: &mut R) -> ElementModQ {
        let mut bytes = vec![0u8; self.q_bytes + 16];
        rng.fill_bytes(&mut bytes);
        ElementModQ(BigUint::from_bytes_be(&bytes) % &self.q)
    }

    /// Fixed width big-endian encoding used for hashing
    pub fn p_to_bytes(&self, e: &ElementModP) -> Vec<u8> {
        left_pad(&e.0.to_bytes_be(), self.p_bytes)
    }

    pub fn q_to_bytes(&self, e: &ElementModQ) -> Vec<u8> {
        left_pad(&e.0.to_bytes_be(), self.q_bytes)
    }

    // ---- mod q ----

    pub fn add_q(&self, a: &ElementModQ, b: &ElementModQ) -> ElementModQ {
        ElementModQ((&a.0 + &b.0) % &self.q)
    }

    pub fn sub_q(&self, a: &ElementModQ, b: &ElementModQ) -> ElementModQ {
        let b = &b.0 % &self.q;
        ElementModQ((&a.0 + &self.q - b) % &self.q)
    }

    pub fn mult_q(&self, a: &ElementModQ, b: &ElementModQ) -> ElementModQ {
        ElementModQ((&a.0 * &b.0) % &self.q)
    }

    pub fn neg_q(&self, a: &ElementModQ) -> ElementModQ {
        self.sub_q(&self.zero_q(), a)
    }

    /// Multiplicative inverse mod q, None for zero
    pub fn inv_q(&self, a: &ElementModQ) -> Option<ElementModQ> {
        if (&a.0 % &self.q).is_zero() {
            return None;
        }
        let e = &self.q - 2u32;
        Some(ElementModQ(a.0.modpow(&e, &self.q)))
    }

    /// a / b mod q, None when b is zero
    pub fn div_q(&self, a: &ElementModQ, b: &ElementModQ) -> Option<ElementModQ> {
        self.inv_q(b).map(|inv| self.mult_q(a, &inv))
    }

    pub fn add_q_all<'a, I: IntoIterator<Item = &'a ElementModQ>>(&self, items: I) -> ElementModQ {
        items
            .into_iter()
            .fold(self.zero_q(), |acc, x| self.add_q(&acc, x))
    }

    pub fn in_bounds_q(&self, a: &ElementModQ) -> bool {
        a.0 < self.q
    }

    // ---- mod p ----

    pub fn mult_p(&self, a: &ElementModP, b: &ElementModP) -> ElementModP {
        ElementModP((&a.0 * &b.0) % &self.p)
    }

    pub fn mult_p_all<'a, I: IntoIterator<Item = &'a ElementModP>>(&self, items: I) -> ElementModP {
        items
            .into_iter()
            .fold(self.one_p(), |acc, x| self.mult_p(&acc, x))
    }

    pub fn inv_p(&self, a: &ElementModP) -> ElementModP {
        let e = &self.p - 2u32;
        ElementModP(a.0.modpow(&e, &self.p))
    }

    pub fn div_p(&self, a: &ElementModP, b: &ElementModP) -> ElementModP {
        self.mult_p(a, &self.inv_p(b))
    }

    pub fn pow_p(&self, base: &ElementModP, exponent: &ElementModQ) -> ElementModP {
        ElementModP(base.0.modpow(&exponent.0, &self.p))
    }

    pub fn pow_p_u64(&self, base: &ElementModP, exponent: u64) -> ElementModP {
        ElementModP(base.0.modpow(&BigUint::from(exponent), &self.p))
    }

    pub fn g_pow_p(&self, exponent: &ElementModQ) -> ElementModP {
        ElementModP(self.g.modpow(&exponent.0, &self.p))
    }

    /// True if 0 < x < p and x^q = 1 mod p
    pub fn is_valid_residue(&self, a: &ElementModP) -> bool {
        !a.0.is_zero() && a.0 < self.p && a.0.modpow(&self.q, &self.p).is_one()
    }

    // ---- discrete log ----

    /// Find e with base^e = value, searching e in [0, max]
    pub fn dlog(&self, base: &ElementModP, value: &ElementModP, max: u32) -> Option<u32> {
        let mut cache = self.dlog.lock().unwrap_or_else(|e| e.into_inner());
        let table = cache
            .tables
            .entry(base.0.clone())
            .or_insert_with(|| {
                let mut table = HashMap::new();
                table.insert(BigUint::one(), 0);
                DLogTable {
                    table,
                    last: BigUint::one(),
                    exponent: 0,
                }
            });

        if let Some(e) = table.table.get(&value.0) {
            return Some(*e);
        }
        while table.exponent < max {
            table.exponent += 1;
            table.last = (&table.last * &base.0) % &self.p;
            table.table.insert(table.last.clone(), table.exponent);
            if table.last == value.0 {
                return Some(table.exponent);
            }
        }
        None
    }
}

fn left_pad(bytes: &[u8], width: usize) -> Vec<u8> {
    if bytes.len() >= width {
        return bytes.to_vec();
    }
    let mut out = vec![0u8; width - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_group_is_consistent() {
        let group = GroupContext::tiny();
        let c = group.constants();
        assert_eq!(&c.cofactor * &c.small_prime + 1u32, c.large_prime);
        assert!(group.is_valid_residue(&group.generator()));
        assert!(!group.is_valid_residue(&ElementModP(BigUint::zero())));
    }

    #[test]
    fn production_group_is_consistent() {
        let group = GroupContext::production();
        let c = group.constants();
        assert_eq!(c.large_prime.to_bytes_be().len(), 512);
        assert_eq!(c.small_prime.to_bytes_be().len(), 32);
        assert_eq!(&c.cofactor * &c.small_prime + 1u32, c.large_prime);
    }

    #[test]
    fn mod_q_arithmetic() {
        let group = GroupContext::tiny();
        let a = group.q_from_u64(5);
        let b = group.q_from_u64(7);
        let d = group.sub_q(&a, &b);
        assert_eq!(group.add_q(&d, &b), a);
        let inv = group.inv_q(&b).unwrap();
        assert_eq!(group.mult_q(&inv, &b), group.one_q());
        assert!(group.inv_q(&group.zero_q()).is_none());
        assert_eq!(group.div_q(&group.mult_q(&a, &b), &b), Some(a.clone()));
        assert_eq!(group.add_q(&group.neg_q(&a), &a), group.zero_q());
    }

    #[test]
    fn dlog_finds_exponents() {
        let group = GroupContext::tiny();
        let k = group.g_pow_p(&group.q_from_u64(1234));
        let v = group.pow_p_u64(&k, 42);
        assert_eq!(group.dlog(&k, &v, 100), Some(42));
        // cached second lookup
        assert_eq!(group.dlog(&k, &group.pow_p_u64(&k, 7), 100), Some(7));
        assert_eq!(group.dlog(&k, &group.pow_p_u64(&k, 500), 100), None);
    }

    #[test]
    fn constants_round_trip() {
        let group = GroupContext::tiny();
        let json = serde_json::to_string(&group.constants()).unwrap();
        let constants: ElectionConstants = serde_json::from_str(&json).unwrap();
        let rebuilt = GroupContext::from_constants(&constants).unwrap();
        assert_eq!(rebuilt.name(), "tiny-31");

        let mut bad = constants.clone();
        bad.generator = BigUint::from(3u32);
        assert!(GroupContext::from_constants(&bad).is_err());
    }
}
