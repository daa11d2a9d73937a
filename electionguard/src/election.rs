use crate::*;
use indexmap::IndexMap;

pub const PROTOCOL_VERSION: &str = "v2.0.0";

/// Election parameters fixed before the key ceremony. Immutable once created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionConfig {
    pub config_version: String,
    pub constants: ElectionConstants,
    pub number_of_guardians: u32,
    pub quorum: u32,

    /// H_P
    pub parameter_base_hash: UInt256,
    /// H_M
    pub manifest_hash: UInt256,
    /// H_B
    pub election_base_hash: UInt256,

    #[serde(with = "BytesHex")]
    pub manifest_bytes: Vec<u8>,

    pub chain_confirmation_codes: bool,
    #[serde(with = "BytesHex")]
    pub config_baux0: Vec<u8>,

    pub metadata: IndexMap<String, String>,
}

impl ElectionConfig {
    pub fn new(
        group: &GroupContext,
        manifest: &Manifest,
        number_of_guardians: u32,
        quorum: u32,
        chain_confirmation_codes: bool,
        config_baux0: Vec<u8>,
    ) -> Result<Self, Error> {
        if quorum == 0 || quorum > number_of_guardians {
            return Err(Error::InvalidQuorum(quorum, number_of_guardians));
        }
        let manifest_bytes = manifest.to_bytes()?;
        let hp = parameter_base_hash(group);
        let hm = manifest_hash(group, &hp, &manifest_bytes);
        let hb = election_base_hash(group, &hp, &hm, number_of_guardians, quorum);

        Ok(ElectionConfig {
            config_version: PROTOCOL_VERSION.to_string(),
            constants: group.constants(),
            number_of_guardians,
            quorum,
            parameter_base_hash: hp,
            manifest_hash: hm,
            election_base_hash: hb,
            manifest_bytes,
            chain_confirmation_codes,
            config_baux0,
            metadata: IndexMap::new(),
        })
    }

    pub fn manifest(&self) -> Result<Manifest, Error> {
        Manifest::from_bytes(&self.manifest_bytes)
    }
}

/// H_P = H(ver; 0x00, p, q, g)
pub fn parameter_base_hash(group: &GroupContext) -> UInt256 {
    let mut version = [0u8; 32];
    let v = PROTOCOL_VERSION.as_bytes();
    version[..v.len()].copy_from_slice(v);

    let c = group.constants();
    let p = group.p_to_bytes(&ElementModP(c.large_prime));
    let q = group.q_to_bytes(&ElementModQ(c.small_prime));
    group
        .hasher_with_bytes(&version)
        .byte(0x00)
        .bytes(&p)
        .bytes(&q)
        .p(&group.generator())
        .finish()
}

/// H_M = H(H_P; 0x01, len, manifest)
pub fn manifest_hash(group: &GroupContext, hp: &UInt256, manifest_bytes: &[u8]) -> UInt256 {
    group
        .hasher(hp)
        .byte(0x01)
        .int(manifest_bytes.len() as u32)
        .bytes(manifest_bytes)
        .finish()
}

/// H_B = H(H_P; 0x02, H_M, n, k)
pub fn election_base_hash(
    group: &GroupContext,
    hp: &UInt256,
    hm: &UInt256,
    number_of_guardians: u32,
    quorum: u32,
) -> UInt256 {
    group
        .hasher(hp)
        .byte(0x02)
        .uint256(hm)
        .int(number_of_guardians)
        .int(quorum)
        .finish()
}

/// H_E = H(H_B; 0x12, K, K_1,0 .. K_n,k-1), guardians in x coordinate order
pub fn extended_base_hash(
    group: &GroupContext,
    hb: &UInt256,
    joint_public_key: &ElGamalPublicKey,
    guardians: &[Guardian],
) -> UInt256 {
    let mut sorted: Vec<&Guardian> = guardians.iter().collect();
    sorted.sort_by_key(|g| g.x_coordinate);
    let mut h = group.hasher(hb).byte(0x12).p(&joint_public_key.0);
    for guardian in sorted {
        h = h.ps(guardian.coefficient_commitments());
    }
    h.finish()
}

/// The public record of a guardian after the key ceremony
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Guardian {
    pub guardian_id: String,
    pub x_coordinate: u32,
    pub coefficient_proofs: Vec<SchnorrProof>,
}

impl Guardian {
    /// K_i = K_i,0
    pub fn public_key(&self) -> Option<&ElementModP> {
        self.coefficient_proofs.first().map(|p| &p.public_key)
    }

    pub fn coefficient_commitments(&self) -> Vec<&ElementModP> {
        self.coefficient_proofs.iter().map(|p| &p.public_key).collect()
    }

    /// g^P_i(x) = Π_j K_ij^(x^j), the public image of this guardian's polynomial at x
    pub fn public_share_at(&self, group: &GroupContext, x: u32) -> ElementModP {
        let x = group.q_from_u64(x as u64);
        let mut power = group.one_q();
        let mut result = group.one_p();
        for commitment in self.coefficient_commitments() {
            result = group.mult_p(&result, &group.pow_p(commitment, &power));
            power = group.mult_q(&power, &x);
        }
        result
    }
}

/// The election configuration joined with the outcome of the key ceremony
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ElectionInitialized {
    pub config: ElectionConfig,
    pub joint_public_key: ElGamalPublicKey,
    pub extended_base_hash: UInt256,
    pub guardians: Vec<Guardian>,
    pub metadata: IndexMap<String, String>,
}

impl ElectionInitialized {
    pub fn new(
        group: &GroupContext,
        config: ElectionConfig,
        mut guardians: Vec<Guardian>,
    ) -> Result<Self, Error> {
        if guardians.len() != config.number_of_guardians as usize {
            return Err(Error::GuardianCountMismatch(
                guardians.len(),
                config.number_of_guardians,
            ));
        }
        guardians.sort_by_key(|g| g.x_coordinate);

        let mut keys = Vec::with_capacity(guardians.len());
        for guardian in &guardians {
            match guardian.public_key() {
                Some(k) => keys.push(k),
                None => {
                    return Err(Error::InvalidPublicKeys(
                        guardian.guardian_id.clone(),
                        "no coefficient commitments".to_string(),
                    ))
                }
            }
        }
        let joint_public_key = ElGamalPublicKey(group.mult_p_all(keys));
        let he = extended_base_hash(
            group,
            &config.election_base_hash,
            &joint_public_key,
            &guardians,
        );

        Ok(ElectionInitialized {
            config,
            joint_public_key,
            extended_base_hash: he,
            guardians,
            metadata: IndexMap::new(),
        })
    }

    pub fn guardian(&self, guardian_id: &str) -> Option<&Guardian> {
        self.guardians.iter().find(|g| g.guardian_id == guardian_id)
    }
}

/// How far an election record has progressed
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElectionRecordStage {
    Config,
    Init,
    Encrypted,
    Tallied,
    Decrypted,
}
