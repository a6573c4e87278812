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
//! Response decoding.
//!
//! Every fixed layout is decoded exact-length: a response that is one byte
//! short or long is a [`RadixError::LengthMismatch`], which usually means the
//! app speaks a different protocol version than this crate.

use std::fmt;
use std::str;

use ed25519_dalek::Verifier;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::config::RolaLayout;
use crate::curve::Curve;
use crate::params::{
    DEVICE_ID_LEN, ECDSA_COMPONENT_LEN, ED25519_PUBKEY_LEN, ED25519_SIGNATURE_LEN, HASH_LEN,
    SECP256K1_SIGNATURE_LEN, SETTINGS_LEN, VERSION_LEN,
};
use crate::RadixError;

fn expect_len(response: &'static str, bytes: &[u8], expected: usize) -> Result<(), RadixError> {
    if bytes.len() != expected {
        return Err(RadixError::LengthMismatch {
            response,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// RadixApp App Version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Version Major
    pub major: u8,
    /// Version Minor
    pub minor: u8,
    /// Version Patch
    pub patch: u8,
}

impl Version {
    /// Decode `major | minor | patch`
    pub fn decode(bytes: &[u8]) -> Result<Self, RadixError> {
        expect_len("version", bytes, VERSION_LEN)?;
        Ok(Version {
            major: bytes[0],
            minor: bytes[1],
            patch: bytes[2],
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Ledger device model
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    /// Nano S
    NanoS = 0x00,
    /// Nano S Plus
    NanoSPlus = 0x01,
    /// Nano X
    NanoX = 0x02,
    /// Stax
    Stax = 0x04,
}

impl DeviceModel {
    /// Decode the single model byte
    pub fn decode(bytes: &[u8]) -> Result<Self, RadixError> {
        expect_len("device model", bytes, 1)?;
        match bytes[0] {
            0x00 => Ok(DeviceModel::NanoS),
            0x01 => Ok(DeviceModel::NanoSPlus),
            0x02 => Ok(DeviceModel::NanoX),
            0x04 => Ok(DeviceModel::Stax),
            other => Err(RadixError::UnknownDeviceModel(other)),
        }
    }
}

/// Device identifier: double SHA-256 of the device id key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(pub [u8; DEVICE_ID_LEN]);

impl DeviceId {
    /// Decode the 32 byte id
    pub fn decode(bytes: &[u8]) -> Result<Self, RadixError> {
        expect_len("device id", bytes, DEVICE_ID_LEN)?;
        let mut id = [0u8; DEVICE_ID_LEN];
        id.copy_from_slice(bytes);
        Ok(DeviceId(id))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Application settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppSettings {
    /// Verbose transaction display
    pub verbose_mode: bool,
    /// Signing of payloads that cannot be fully displayed
    pub blind_signing: bool,
}

impl AppSettings {
    /// Decode `verbose_mode | blind_signing`
    pub fn decode(bytes: &[u8]) -> Result<Self, RadixError> {
        expect_len("app settings", bytes, SETTINGS_LEN)?;
        Ok(AppSettings {
            verbose_mode: bytes[0] != 0,
            blind_signing: bytes[1] != 0,
        })
    }
}

/// Public key returned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKey {
    /// Raw 32 byte key
    Ed25519(ed25519_dalek::VerifyingKey),
    /// Compressed SEC1 point
    Secp256k1(k256::PublicKey),
}

impl PublicKey {
    /// Decode a key of the expected length for `curve`
    pub fn decode(curve: Curve, bytes: &[u8]) -> Result<Self, RadixError> {
        expect_len("public key", bytes, curve.public_key_len())?;
        Self::parse(curve, bytes)
    }

    fn parse(curve: Curve, bytes: &[u8]) -> Result<Self, RadixError> {
        match curve {
            Curve::Ed25519 => {
                let mut raw = [0u8; ED25519_PUBKEY_LEN];
                raw.copy_from_slice(bytes);
                ed25519_dalek::VerifyingKey::from_bytes(&raw)
                    .map(PublicKey::Ed25519)
                    .map_err(|_| RadixError::InvalidPK)
            }
            Curve::Secp256k1 => {
                // compressed points only
                if !matches!(bytes.first(), Some(0x02) | Some(0x03)) {
                    return Err(RadixError::InvalidPK);
                }
                k256::PublicKey::from_sec1_bytes(bytes)
                    .map(PublicKey::Secp256k1)
                    .map_err(|_| RadixError::InvalidPK)
            }
        }
    }

    /// Curve of this key
    pub fn curve(&self) -> Curve {
        match self {
            PublicKey::Ed25519(_) => Curve::Ed25519,
            PublicKey::Secp256k1(_) => Curve::Secp256k1,
        }
    }

    /// Bytes in device format (32 raw bytes, or 33 byte compressed point)
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Ed25519(key) => key.to_bytes().to_vec(),
            PublicKey::Secp256k1(key) => key.to_encoded_point(true).as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

/// Secp256k1 signature (includes V, R, S and the re-encoded ECDSA signature)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Secp256k1Signature {
    /// v value (recovery id prefix)
    pub v: u8,

    /// r value
    pub r: [u8; ECDSA_COMPONENT_LEN],

    /// s value
    pub s: [u8; ECDSA_COMPONENT_LEN],

    /// (r, s) as a standard ECDSA signature
    pub sig: k256::ecdsa::Signature,
}

impl Secp256k1Signature {
    /// DER encoding of (r, s)
    pub fn to_der(&self) -> Vec<u8> {
        self.sig.to_der().as_bytes().to_vec()
    }
}

/// Signature produced by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// 64 byte EdDSA signature
    Ed25519(ed25519_dalek::Signature),
    /// Recoverable ECDSA signature
    Secp256k1(Secp256k1Signature),
}

impl Signature {
    /// Decode a signature in device layout; malformed encodings are [`RadixError::InvalidSignature`]
    pub fn decode(curve: Curve, bytes: &[u8]) -> Result<Self, RadixError> {
        expect_len("signature", bytes, curve.signature_len())?;

        match curve {
            Curve::Ed25519 => {
                let mut raw = [0u8; ED25519_SIGNATURE_LEN];
                raw.copy_from_slice(bytes);
                Ok(Signature::Ed25519(ed25519_dalek::Signature::from_bytes(&raw)))
            }
            Curve::Secp256k1 => {
                let v = bytes[0];

                let mut r = [0u8; ECDSA_COMPONENT_LEN];
                r.copy_from_slice(&bytes[1..1 + ECDSA_COMPONENT_LEN]);

                let mut s = [0u8; ECDSA_COMPONENT_LEN];
                s.copy_from_slice(&bytes[1 + ECDSA_COMPONENT_LEN..SECP256K1_SIGNATURE_LEN]);

                let sig = k256::ecdsa::Signature::from_slice(&bytes[1..])
                    .map_err(|_| RadixError::InvalidSignature)?;

                Ok(Signature::Secp256k1(Secp256k1Signature { v, r, s, sig }))
            }
        }
    }

    /// Curve of this signature
    pub fn curve(&self) -> Curve {
        match self {
            Signature::Ed25519(_) => Curve::Ed25519,
            Signature::Secp256k1(_) => Curve::Secp256k1,
        }
    }

    /// Bytes in device layout
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Signature::Ed25519(sig) => sig.to_bytes().to_vec(),
            Signature::Secp256k1(sig) => {
                let mut v = Vec::with_capacity(SECP256K1_SIGNATURE_LEN);
                v.push(sig.v);
                v.extend_from_slice(&sig.r);
                v.extend_from_slice(&sig.s);
                v
            }
        }
    }
}

/// Check `signature` over the prehashed `hash`. Mismatched curves never verify.
pub fn verify_signature(public_key: &PublicKey, signature: &Signature, hash: &[u8]) -> bool {
    match (public_key, signature) {
        (PublicKey::Ed25519(key), Signature::Ed25519(sig)) => key.verify(hash, sig).is_ok(),
        (PublicKey::Secp256k1(key), Signature::Secp256k1(sig)) => {
            let verifying_key = k256::ecdsa::VerifyingKey::from(key);
            let sig = sig.sig.normalize_s().unwrap_or(sig.sig);
            verifying_key.verify_prehash(hash, &sig).is_ok()
        }
        _ => false,
    }
}

/// Signature together with the key that produced it and the signed hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedPayload {
    /// Hash that was signed
    pub hash: [u8; HASH_LEN],
    /// Signature over `hash`
    pub signature: Signature,
    /// Key that produced `signature`
    pub public_key: PublicKey,
}

impl SignedPayload {
    /// Decode `signature ∥ public key ∥ hash` (128 bytes for Ed25519, 130 for Secp256k1)
    pub fn decode(curve: Curve, bytes: &[u8]) -> Result<Self, RadixError> {
        let params = curve.params();
        expect_len("signed payload", bytes, params.signed_payload_len())?;

        let (signature_bytes, rest) = bytes.split_at(params.signature_len);
        let (key_bytes, hash_bytes) = rest.split_at(params.public_key_len);

        let signature = Signature::decode(curve, signature_bytes)?;
        let public_key = PublicKey::parse(curve, key_bytes)?;

        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(hash_bytes);

        Ok(SignedPayload {
            hash,
            signature,
            public_key,
        })
    }

    /// Curve used for signing
    pub fn curve(&self) -> Curve {
        self.public_key.curve()
    }

    /// Verify the embedded signature against the embedded key and hash
    pub fn verify(&self) -> Result<(), RadixError> {
        if verify_signature(&self.public_key, &self.signature, &self.hash) {
            Ok(())
        } else {
            Err(RadixError::InvalidSignature)
        }
    }
}

/// Response to a ROLA (sign auth) request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolaResponse {
    /// Signature, key and hash
    Signed(SignedPayload),
    /// Signature only
    BareSignature(Signature),
}

impl RolaResponse {
    /// Decode according to `layout`
    pub fn decode(curve: Curve, layout: RolaLayout, bytes: &[u8]) -> Result<Self, RadixError> {
        match layout {
            RolaLayout::SignedPayload => SignedPayload::decode(curve, bytes).map(RolaResponse::Signed),
            RolaLayout::BareSignature => {
                Signature::decode(curve, bytes).map(RolaResponse::BareSignature)
            }
        }
    }

    /// Signature over the challenge hash
    pub fn signature(&self) -> &Signature {
        match self {
            RolaResponse::Signed(payload) => &payload.signature,
            RolaResponse::BareSignature(signature) => signature,
        }
    }

    /// Key and hash, when the layout carries them
    pub fn signed_payload(&self) -> Option<&SignedPayload> {
        match self {
            RolaResponse::Signed(payload) => Some(payload),
            RolaResponse::BareSignature(_) => None,
        }
    }

    /// Verify the signature.
    ///
    /// A bare signature cannot be checked without the key and the hash, use
    /// [`verify_signature`] directly for those.
    pub fn verify(&self) -> Result<(), RadixError> {
        match self {
            RolaResponse::Signed(payload) => payload.verify(),
            RolaResponse::BareSignature(_) => Err(RadixError::InvalidSignature),
        }
    }
}

/// Decode the bech32 address shown during address verification
pub fn decode_address(bytes: &[u8]) -> Result<String, RadixError> {
    if bytes.is_empty() {
        return Err(RadixError::LengthMismatch {
            response: "address",
            expected: 1,
            actual: 0,
        });
    }
    Ok(str::from_utf8(bytes)?.to_owned())
}
