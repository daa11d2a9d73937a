use crate::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::convert::TryFrom;

const BLOCK_SIZE: usize = 32;
const CHOP_WRITE_INS: usize = 30;
const CONTEST_DATA_LABEL: &str = "contest_data";
const FILLER: u8 = b'*';

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum ContestDataStatus {
    Normal = 0,
    NullVote = 1,
    OverVote = 2,
    UnderVote = 3,
}

/// Voter intent that does not fit in the selection ciphertexts: the overvoted
/// selections (by sequence order) and write-ins.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContestData {
    pub status: ContestDataStatus,
    pub over_votes: Vec<i32>,
    pub write_ins: Vec<String>,
}

impl ContestData {
    /// Classify a contest from the sequence orders voted for and its write-ins
    pub fn new(votes_allowed: u32, voted_for: Vec<i32>, write_ins: Vec<String>) -> Self {
        let total = voted_for.len() + write_ins.len();
        let status = if total == 0 {
            ContestDataStatus::NullVote
        } else if total < votes_allowed as usize {
            ContestDataStatus::UnderVote
        } else if total > votes_allowed as usize {
            ContestDataStatus::OverVote
        } else {
            ContestDataStatus::Normal
        };
        let over_votes = if status == ContestDataStatus::OverVote {
            voted_for
        } else {
            Vec::new()
        };
        ContestData {
            status,
            over_votes,
            write_ins,
        }
    }

    // status | u16 count, i32 overvotes | u16 count, (u16 len, utf8) write-ins
    fn serialize(&self) -> Result<Vec<u8>, Error> {
        let mut out: Vec<u8> = vec![self.status.into()];
        let count = u16::try_from(self.over_votes.len())
            .map_err(|_| Error::ContestDataMalformed("too many overvotes".to_string()))?;
        out.extend_from_slice(&count.to_be_bytes());
        for v in &self.over_votes {
            out.extend_from_slice(&v.to_be_bytes());
        }
        let count = u16::try_from(self.write_ins.len())
            .map_err(|_| Error::ContestDataMalformed("too many write-ins".to_string()))?;
        out.extend_from_slice(&count.to_be_bytes());
        for w in &self.write_ins {
            let len = u16::try_from(w.len())
                .map_err(|_| Error::ContestDataMalformed("write-in too long".to_string()))?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(w.as_bytes());
        }
        Ok(out)
    }

    // Length of `serialize` output, without its field limits
    fn encoded_len(&self) -> usize {
        5 + 4 * self.over_votes.len() + self.write_ins.iter().map(|w| 2 + w.len()).sum::<usize>()
    }

    /// Encode to exactly (votes_allowed + 1) * 32 bytes.
    ///
    /// If too large: extra write-ins are dropped and marked with "*", then long write-ins
    /// are chopped and marked with a trailing "*", then the overvote list is cut to
    /// votes_allowed + 1 entries followed by -1, then write-ins are chopped further until
    /// the data fits. If too small, "*" filler is appended.
    pub fn encode(&self, contest_id: &str, votes_allowed: u32) -> Result<Vec<u8>, Error> {
        let limit = votes_allowed as usize;
        let target = (limit + 1) * BLOCK_SIZE;
        let mut trial = self.clone();

        if trial.encoded_len() > target && trial.write_ins.len() > limit {
            trial.write_ins.truncate(limit);
            trial.write_ins.push("*".to_string());
        }

        let write_ins = trial.write_ins.clone();
        let mut chop = CHOP_WRITE_INS;
        if trial.encoded_len() > target && !write_ins.is_empty() {
            trial.write_ins = chop_write_ins(&write_ins, chop);
        }

        if trial.encoded_len() > target && trial.over_votes.len() > limit + 1 {
            trial.over_votes.truncate(limit + 1);
            trial.over_votes.push(-1);
        }

        // At most limit + 1 one-byte write-ins and limit + 2 overvotes remain, which always fit
        while trial.encoded_len() > target && chop > 0 {
            chop -= 1;
            trial.write_ins = chop_write_ins(&write_ins, chop);
        }

        let mut bytes = trial.serialize()?;
        if bytes.len() > target {
            return Err(Error::ContestDataOverflow(contest_id.to_string(), target));
        }
        bytes.resize(target, FILLER);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<ContestData, Error> {
        let mut reader = Reader { bytes, pos: 0 };
        let status = ContestDataStatus::try_from(reader.u8()?)
            .map_err(|_| Error::ContestDataMalformed("unknown status".to_string()))?;

        let count = reader.u16()?;
        let mut over_votes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            over_votes.push(i32::from_be_bytes(reader.array4()?));
        }

        let count = reader.u16()?;
        let mut write_ins = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = reader.u16()? as usize;
            let raw = reader.take(len)?;
            let s = std::str::from_utf8(raw)
                .map_err(|_| Error::ContestDataMalformed("write-in is not utf-8".to_string()))?;
            write_ins.push(s.to_string());
        }

        if reader.rest().iter().any(|b| *b != FILLER) {
            return Err(Error::ContestDataMalformed("bad filler".to_string()));
        }

        Ok(ContestData {
            status,
            over_votes,
            write_ins,
        })
    }

    /// Hashed-ElGamal encrypt the encoded contest data for one contest of a ballot
    #[allow(clippy::too_many_arguments)]
    pub fn encrypt(
        &self,
        group: &GroupContext,
        public_key: &ElGamalPublicKey,
        extended_base_hash: &UInt256,
        contest_id: &str,
        contest_index: u32,
        ballot_nonce: &UInt256,
        votes_allowed: u32,
    ) -> Result<HashedElGamalCiphertext, Error> {
        let message = self.encode(contest_id, votes_allowed)?;
        let nonce = contest_data_nonce(group, extended_base_hash, ballot_nonce, contest_index);
        // (α, β) = (g^ξ, K^ξ)
        let alpha = group.g_pow_p(&nonce);
        let beta = group.pow_p(&public_key.0, &nonce);
        let key = contest_data_key(group, extended_base_hash, public_key, &alpha, &beta);
        Ok(hashed_elgamal_encrypt(
            group,
            &message,
            &alpha,
            key,
            contest_data_context(contest_id).as_bytes(),
        ))
    }
}

// Cut write-ins longer than `max_bytes` at a char boundary and mark them with "*"
fn chop_write_ins(write_ins: &[String], max_bytes: usize) -> Vec<String> {
    write_ins
        .iter()
        .map(|w| {
            if w.len() <= max_bytes {
                return w.clone();
            }
            let mut end = max_bytes;
            while !w.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}*", &w[..end])
        })
        .collect()
}

/// ξ = H(He; 0x20, ξB, ind(Λ), "contest_data")
pub fn contest_data_nonce(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    ballot_nonce: &UInt256,
    contest_index: u32,
) -> ElementModQ {
    let h = group
        .hasher(extended_base_hash)
        .byte(0x20)
        .uint256(ballot_nonce)
        .int(contest_index)
        .string(CONTEST_DATA_LABEL)
        .finish();
    group.q_from_uint256(&h)
}

fn contest_data_key(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    public_key: &ElGamalPublicKey,
    alpha: &ElementModP,
    beta: &ElementModP,
) -> UInt256 {
    group
        .hasher(extended_base_hash)
        .byte(0x22)
        .p(&public_key.0)
        .p(alpha)
        .p(beta)
        .finish()
}

fn contest_data_context(contest_id: &str) -> String {
    format!("{}{}", CONTEST_DATA_LABEL, contest_id)
}

impl HashedElGamalCiphertext {
    /// Decrypt contest data given β = c0^s, recovered from the guardians
    pub fn decrypt_contest_data_with_beta(
        &self,
        group: &GroupContext,
        public_key: &ElGamalPublicKey,
        extended_base_hash: &UInt256,
        contest_id: &str,
        beta: &ElementModP,
    ) -> Result<ContestData, Error> {
        let key = contest_data_key(group, extended_base_hash, public_key, &self.c0, beta);
        let bytes = self.decrypt(group, key, contest_data_context(contest_id).as_bytes())?;
        ContestData::decode(&bytes)
    }

    /// Decrypt contest data by re-deriving its nonce from the ballot nonce
    pub fn decrypt_contest_data_with_nonce(
        &self,
        group: &GroupContext,
        public_key: &ElGamalPublicKey,
        extended_base_hash: &UInt256,
        contest_id: &str,
        contest_index: u32,
        ballot_nonce: &UInt256,
    ) -> Result<ContestData, Error> {
        let nonce = contest_data_nonce(group, extended_base_hash, ballot_nonce, contest_index);
        let beta = group.pow_p(&public_key.0, &nonce);
        self.decrypt_contest_data_with_beta(group, public_key, extended_base_hash, contest_id, &beta)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::ContestDataMalformed("truncated".to_string()));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn array4(&mut self) -> Result<[u8; 4], Error> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(data: &ContestData, limit: u32) -> ContestData {
        let encoded = data.encode("contest", limit).unwrap();
        assert_eq!(encoded.len(), (limit as usize + 1) * 32);
        ContestData::decode(&encoded).unwrap()
    }

    #[test]
    fn status_classification() {
        assert_eq!(ContestData::new(2, vec![], vec![]).status, ContestDataStatus::NullVote);
        assert_eq!(ContestData::new(2, vec![1], vec![]).status, ContestDataStatus::UnderVote);
        assert_eq!(
            ContestData::new(2, vec![1], vec!["x".to_string()]).status,
            ContestDataStatus::Normal
        );
        let over = ContestData::new(1, vec![1, 2], vec![]);
        assert_eq!(over.status, ContestDataStatus::OverVote);
        assert_eq!(over.over_votes, vec![1, 2]);
        // overvotes only recorded on overvote
        assert!(ContestData::new(3, vec![1, 2], vec![]).over_votes.is_empty());
    }

    #[test]
    fn small_data_round_trips_exactly() {
        for limit in 1..5 {
            let data = ContestData::new(limit, vec![1, 3, 4, 5, 6, 7], vec!["Mickey".to_string()]);
            assert_eq!(round_trip(&data, limit), data);
        }
        let empty = ContestData::new(1, vec![], vec![]);
        assert_eq!(round_trip(&empty, 1), empty);
    }

    #[test]
    fn too_many_write_ins_are_truncated() {
        let write_ins: Vec<String> = (0..10).map(|i| format!("write in number {}", i)).collect();
        let data = ContestData::new(1, vec![], write_ins);
        let decoded = round_trip(&data, 1);
        assert_eq!(decoded.write_ins.len(), 2);
        assert_eq!(decoded.write_ins[0], "write in number 0");
        assert_eq!(decoded.write_ins[1], "*");
    }

    #[test]
    fn long_write_ins_are_chopped() {
        let long = "a".repeat(100);
        let data = ContestData::new(2, vec![], vec![long.clone(), "short".to_string()]);
        let decoded = round_trip(&data, 2);
        assert_eq!(decoded.write_ins[0], format!("{}*", "a".repeat(30)));
        assert_eq!(decoded.write_ins[1], "short");
    }

    #[test]
    fn long_overvote_list_is_cut() {
        let data = ContestData::new(1, (1..40).collect(), vec![]);
        let decoded = round_trip(&data, 1);
        assert_eq!(decoded.over_votes, vec![1, 2, -1]);
        assert_eq!(decoded.status, ContestDataStatus::OverVote);
    }

    #[test]
    fn multibyte_write_ins_are_chopped_on_char_boundaries() {
        let data = ContestData::new(1, vec![], vec!["é".repeat(31)]);
        let decoded = round_trip(&data, 1);
        let chopped = &decoded.write_ins[0];
        assert!(chopped.ends_with('*'));
        assert!(chopped.len() <= 31);
        assert!(chopped.trim_end_matches('*').chars().all(|c| c == 'é'));
    }

    #[test]
    fn large_limits_always_fit() {
        let write_ins: Vec<String> = (0..6).map(|i| format!("{}{}", i, "w".repeat(40))).collect();
        let mut data = ContestData::new(4, (1..=12).collect(), write_ins);
        data.status = ContestDataStatus::OverVote;
        let decoded = round_trip(&data, 4);
        assert_eq!(decoded.over_votes, vec![1, 2, 3, 4, 5, -1]);
        assert_eq!(decoded.write_ins.len(), 5);
        assert_eq!(decoded.write_ins[4], "*");

        for limit in 1..8 {
            let write_ins: Vec<String> = (0..20).map(|_| "ü".repeat(100)).collect();
            let data = ContestData::new(limit, (1..60).collect(), write_ins);
            round_trip(&data, limit);
        }
    }

    #[test]
    fn bad_filler_is_rejected() {
        let data = ContestData::new(1, vec![1], vec![]);
        let mut encoded = data.encode("c", 1).unwrap();
        let last = encoded.len() - 1;
        encoded[last] = b'x';
        assert!(ContestData::decode(&encoded).is_err());
    }

    #[test]
    fn encrypt_decrypt_with_nonce_and_beta() {
        let group = GroupContext::tiny();
        let secret = group.q_from_u64(424242);
        let keypair = ElGamalKeypair::from_secret(&group, secret);
        let he = UInt256([0x11; 32]);
        let ballot_nonce = UInt256([0x22; 32]);
        let data = ContestData::new(2, vec![1, 2, 3], vec!["Donald Duck".to_string()]);

        let ct = data
            .encrypt(&group, &keypair.public_key, &he, "council", 2, &ballot_nonce, 2)
            .unwrap();
        assert_eq!(ct.num_bytes, 96);

        let decrypted = ct
            .decrypt_contest_data_with_nonce(&group, &keypair.public_key, &he, "council", 2, &ballot_nonce)
            .unwrap();
        assert_eq!(decrypted, data);

        let beta = group.pow_p(&ct.c0, &keypair.secret_key.0);
        let decrypted = ct
            .decrypt_contest_data_with_beta(&group, &keypair.public_key, &he, "council", &beta)
            .unwrap();
        assert_eq!(decrypted, data);

        // wrong contest id changes the KDF context
        assert!(ct
            .decrypt_contest_data_with_beta(&group, &keypair.public_key, &he, "mayor", &beta)
            .is_err());
    }
}
