use crate::*;

const CLOSE: &str = "CLOSE";

/// χ = H(He; 0x23, Λ, K, α_1, β_1, ..., α_m, β_m)
pub fn contest_hash<'a, I: IntoIterator<Item = &'a ElGamalCiphertext>>(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    contest_id: &str,
    public_key: &ElGamalPublicKey,
    ciphertexts: I,
) -> UInt256 {
    let mut h = group
        .hasher(extended_base_hash)
        .byte(0x23)
        .string(contest_id)
        .p(&public_key.0);
    for c in ciphertexts {
        h = h.ciphertext(c);
    }
    h.finish()
}

/// H(B) = H(He; 0x24, χ_1, ..., χ_m, B_aux)
pub fn confirmation_code<'a, I: IntoIterator<Item = &'a UInt256>>(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    contest_hashes: I,
    baux: &[u8],
) -> UInt256 {
    group
        .hasher(extended_base_hash)
        .byte(0x24)
        .uint256s(contest_hashes)
        .bytes(baux)
        .finish()
}

/// H_0 = H(He; 0x24, B_aux,0), the head of a device's confirmation code chain
pub fn chain_head(group: &GroupContext, extended_base_hash: &UInt256, config_baux0: &[u8]) -> UInt256 {
    group
        .hasher(extended_base_hash)
        .byte(0x24)
        .bytes(config_baux0)
        .finish()
}

/// B_aux for the next ballot: H_0 for the first, then H(B_j-1) || H_0
pub fn chained_baux(head: &UInt256, previous: Option<&UInt256>) -> Vec<u8> {
    let mut baux = Vec::with_capacity(64);
    if let Some(previous) = previous {
        baux.extend_from_slice(previous.as_bytes());
    }
    baux.extend_from_slice(head.as_bytes());
    baux
}

/// Closing B_aux = H(B_last) || H_0 || "CLOSE" and the closing hash H(He; 0x24, B_aux)
pub fn closing_hash(
    group: &GroupContext,
    extended_base_hash: &UInt256,
    head: &UInt256,
    last: Option<&UInt256>,
) -> UInt256 {
    let mut baux = chained_baux(head, last);
    baux.extend_from_slice(CLOSE.as_bytes());
    group
        .hasher(extended_base_hash)
        .byte(0x24)
        .bytes(&baux)
        .finish()
}

/// Produces the B_aux for each ballot of one encrypting device
#[derive(Debug, Clone)]
pub struct ConfirmationChain {
    chained: bool,
    config_baux0: Vec<u8>,
    head: UInt256,
    last: Option<UInt256>,
    ballot_ids: Vec<String>,
}

impl ConfirmationChain {
    pub fn new(group: &GroupContext, init: &ElectionInitialized) -> Self {
        let config = &init.config;
        ConfirmationChain {
            chained: config.chain_confirmation_codes,
            config_baux0: config.config_baux0.clone(),
            head: chain_head(group, &init.extended_base_hash, &config.config_baux0),
            last: None,
            ballot_ids: Vec::new(),
        }
    }

    pub fn is_chained(&self) -> bool {
        self.chained
    }

    pub fn next_baux(&self) -> Vec<u8> {
        if self.chained {
            chained_baux(&self.head, self.last.as_ref())
        } else {
            self.config_baux0.clone()
        }
    }

    /// Record a ballot's confirmation code, advancing the chain
    pub fn record(&mut self, ballot_id: &str, confirmation_code: UInt256) {
        self.ballot_ids.push(ballot_id.to_string());
        self.last = Some(confirmation_code);
    }

    /// Close the chain for a device
    pub fn close(self, group: &GroupContext, init: &ElectionInitialized, device: &str) -> EncryptedBallotChain {
        let closing = closing_hash(group, &init.extended_base_hash, &self.head, self.last.as_ref());
        EncryptedBallotChain {
            encrypting_device: device.to_string(),
            chained: self.chained,
            ballot_ids: self.ballot_ids,
            last_confirmation_code: self.last,
            closing_hash: closing,
        }
    }
}

/// The published record of one device's ballot chain
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EncryptedBallotChain {
    pub encrypting_device: String,
    pub chained: bool,
    /// Ballot ids in encryption order
    pub ballot_ids: Vec<String>,
    pub last_confirmation_code: Option<UInt256>,
    pub closing_hash: UInt256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_links() {
        let group = GroupContext::tiny();
        let he = UInt256([3u8; 32]);
        let head = chain_head(&group, &he, b"device-1");

        let first = chained_baux(&head, None);
        assert_eq!(first, head.as_bytes().to_vec());

        let code = UInt256([8u8; 32]);
        let second = chained_baux(&head, Some(&code));
        assert_eq!(&second[..32], code.as_bytes());
        assert_eq!(&second[32..], head.as_bytes());

        assert_ne!(
            closing_hash(&group, &he, &head, Some(&code)),
            closing_hash(&group, &he, &head, None)
        );
    }

    #[test]
    fn confirmation_code_binds_baux() {
        let group = GroupContext::tiny();
        let he = UInt256([3u8; 32]);
        let hashes = [UInt256([1u8; 32]), UInt256([2u8; 32])];
        let a = confirmation_code(&group, &he, &hashes, b"");
        let b = confirmation_code(&group, &he, &hashes, b"x");
        assert_ne!(a, b);
    }
}
