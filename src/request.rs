/*******************************************************************************
*   (c) 2020 ZondaX GmbH
*
*  Licensed under the Apache License, Version 2.0 (the "License");
*  you may not use this file except in compliance with the License.
*  You may obtain a copy of the License at
*
*      http://www.apache.org/licenses/LICENSE-2.0
*
*  Unless required by applicable law or agreed to in writing, software
*  distributed under the License is distributed on an "AS IS" BASIS,
*  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
*  See the License for the specific language governing permissions and
*  limitations under the License.
********************************************************************************/
//! Request frames: APDU construction, payload chunking and challenge packing

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ledger_transport::APDUCommand;

use crate::params::{HASH_LEN, MAX_APDU_DATA_LEN};
use crate::RadixError;

type Blake2b256 = Blake2b<U32>;

/// Phase a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationClass {
    /// Derivation path frame, or a single-shot request
    Init,
    /// Payload frame followed by more payload
    Continue,
    /// Last payload frame
    Finalize,
}

/// One APDU request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduRequest {
    /// Class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    data: Vec<u8>,
}

impl ApduRequest {
    /// Build a frame, p1 and p2 are always zero for the Radix app
    pub fn new(cla: u8, ins: u8, data: Vec<u8>) -> Result<Self, RadixError> {
        if data.len() > MAX_APDU_DATA_LEN {
            return Err(RadixError::InvalidMessageSize);
        }
        Ok(ApduRequest {
            cla,
            ins,
            p1: 0x00,
            p2: 0x00,
            data,
        })
    }

    /// Frame payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Wire form: cla | ins | p1 | p2 | len | payload
    pub fn serialize(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(5 + self.data.len());
        v.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2, self.data.len() as u8]);
        v.extend_from_slice(&self.data);
        v
    }

    /// Command understood by `ledger_transport::Exchange`
    pub fn to_command(&self) -> APDUCommand<Vec<u8>> {
        APDUCommand {
            cla: self.cla,
            ins: self.ins,
            p1: self.p1,
            p2: self.p2,
            data: self.data.clone(),
        }
    }
}

/// Slice of a payload with its continuation tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Continue for every chunk but the last one
    pub class: ContinuationClass,
    /// At most [`MAX_APDU_DATA_LEN`] bytes
    pub data: &'a [u8],
}

/// Split `payload` into frames of at most 255 bytes.
///
/// An empty payload still yields a single (empty) Finalize chunk.
pub fn chunk_payload(payload: &[u8]) -> Vec<Chunk<'_>> {
    if payload.is_empty() {
        return vec![Chunk {
            class: ContinuationClass::Finalize,
            data: payload,
        }];
    }

    let chunks = payload.chunks(MAX_APDU_DATA_LEN);
    let packet_count = chunks.len();

    chunks
        .enumerate()
        .map(|(packet_idx, data)| {
            let class = if packet_idx == packet_count - 1 {
                ContinuationClass::Finalize
            } else {
                ContinuationClass::Continue
            };
            Chunk { class, data }
        })
        .collect()
}

/// ROLA authentication challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolaChallenge {
    /// Dapp definition address
    pub dapp_definition_address: String,
    /// Origin of the dapp requesting authentication
    pub origin: String,
    /// Nonce picked by the dapp
    pub nonce: [u8; 32],
}

impl RolaChallenge {
    /// nonce ∥ address length ∥ address ∥ origin
    pub fn to_bytes(&self) -> Result<Vec<u8>, RadixError> {
        let address = self.dapp_definition_address.as_bytes();
        let address_len = u8::try_from(address.len()).map_err(|_| RadixError::InvalidMessageSize)?;

        let mut data = Vec::with_capacity(self.nonce.len() + 1 + address.len() + self.origin.len());
        data.extend_from_slice(&self.nonce);
        data.push(address_len);
        data.extend_from_slice(address);
        data.extend_from_slice(self.origin.as_bytes());
        Ok(data)
    }
}

/// Blake2b-256 digest of a pre-authorization message, as expected by SignPreAuthHash
pub fn preauth_hash(message: &[u8]) -> [u8; HASH_LEN] {
    let mut hasher = Blake2b256::new();
    hasher.update(message);

    let mut hash = [0u8; HASH_LEN];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(chunks: &[Chunk<'_>]) -> Vec<ContinuationClass> {
        chunks.iter().map(|c| c.class).collect()
    }

    #[test]
    fn chunk_600_bytes() {
        let payload = vec![0x5a; 600];
        let chunks = chunk_payload(&payload);

        let sizes: Vec<usize> = chunks.iter().map(|c| c.data.len()).collect();
        assert_eq!(sizes, vec![255, 255, 90]);
        assert_eq!(
            classes(&chunks),
            vec![
                ContinuationClass::Continue,
                ContinuationClass::Continue,
                ContinuationClass::Finalize
            ]
        );
    }

    #[test]
    fn chunk_counts() {
        for len in [0usize, 1, 254, 255, 256, 509, 510, 511, 1000, 2550] {
            let payload = vec![1u8; len];
            let chunks = chunk_payload(&payload);

            let expected = std::cmp::max(1, (len + 254) / 255);
            assert_eq!(chunks.len(), expected, "payload of {} bytes", len);
            assert!(chunks.iter().all(|c| c.data.len() <= 255));
            assert_eq!(chunks.iter().map(|c| c.data.len()).sum::<usize>(), len);

            let (last, rest) = chunks.split_last().unwrap();
            assert_eq!(last.class, ContinuationClass::Finalize);
            assert!(rest.iter().all(|c| c.class == ContinuationClass::Continue));
        }
    }

    #[test]
    fn serialize_frame() {
        let request = ApduRequest::new(0xAA, 0x21, vec![0x01, 0x02]).unwrap();
        assert_eq!(hex::encode(request.serialize()), "aa210000020102");

        let empty = ApduRequest::new(0xAA, 0x10, Vec::new()).unwrap();
        assert_eq!(hex::encode(empty.serialize()), "aa10000000");
    }

    #[test]
    fn oversized_frame() {
        assert!(ApduRequest::new(0xAB, 0x41, vec![0; 255]).is_ok());
        assert!(matches!(
            ApduRequest::new(0xAB, 0x41, vec![0; 256]),
            Err(RadixError::InvalidMessageSize)
        ));
    }

    #[test]
    fn rola_challenge_packing() {
        let nonce: [u8; 32] = hex::decode(
            "dc47fc69e9e45855addf579f398da0309c878092dd95352b9fe187a7e5a529e2",
        )
        .unwrap()
        .try_into()
        .unwrap();
        let challenge = RolaChallenge {
            dapp_definition_address: "account_tdx_b_1p9dkged3rpzy860ampt5jpmvv3yl4y6f5yppp4tnscdslvt9v3"
                .to_owned(),
            origin: "https://dashboard.rdx.works".to_owned(),
            nonce,
        };

        let bytes = challenge.to_bytes().unwrap();
        let address = challenge.dapp_definition_address.as_bytes();
        assert_eq!(&bytes[..32], &nonce);
        assert_eq!(bytes[32] as usize, address.len());
        assert_eq!(&bytes[33..33 + address.len()], address);
        assert_eq!(&bytes[33 + address.len()..], b"https://dashboard.rdx.works");
    }

    #[test]
    fn rola_challenge_address_too_long() {
        let challenge = RolaChallenge {
            dapp_definition_address: "a".repeat(256),
            origin: String::new(),
            nonce: [0; 32],
        };
        assert!(matches!(
            challenge.to_bytes(),
            Err(RadixError::InvalidMessageSize)
        ));
    }

    #[test]
    fn preauth_hash_is_blake2b_256() {
        assert_eq!(
            hex::encode(preauth_hash(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
        assert_ne!(preauth_hash(b"0"), preauth_hash(b"1"));
    }
}
