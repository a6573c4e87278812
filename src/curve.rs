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
//! Signing curves and the instruction table

use std::fmt;

use crate::params::{
    InstructionCode, ED25519_PUBKEY_LEN, ED25519_SIGNATURE_LEN, HASH_LEN, SECP256K1_PUBKEY_LEN,
    SECP256K1_SIGNATURE_LEN,
};

/// Signing curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    /// Curve25519 / EdDSA
    Ed25519,
    /// Secp256k1 / ECDSA
    Secp256k1,
}

/// Operations understood by the Radix app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Application version
    GetVersion,
    /// Device id
    GetDeviceId,
    /// Device model
    GetDeviceModel,
    /// Application settings
    GetAppSettings,
    /// Public key for a derivation path
    GetPublicKey,
    /// Display the account address on device
    VerifyAddress,
    /// Sign a transaction intent
    SignTransaction,
    /// Sign a ROLA challenge
    SignAuth,
    /// Sign a pre-computed pre-authorization hash
    SignPreAuthHash,
    /// Sign a raw pre-authorization subintent
    SignPreAuthRaw,
}

/// Static per-curve capabilities
#[derive(Debug)]
pub struct CurveParams {
    /// Curve name as shown in logs
    pub name: &'static str,
    /// Public key length in bytes
    pub public_key_len: usize,
    /// Signature length in bytes as sent by the device
    pub signature_len: usize,
    get_public_key: InstructionCode,
    verify_address: InstructionCode,
    sign_tx: InstructionCode,
    sign_auth: InstructionCode,
    sign_preauth_hash: InstructionCode,
    sign_preauth_raw: InstructionCode,
}

static ED25519: CurveParams = CurveParams {
    name: "ed25519",
    public_key_len: ED25519_PUBKEY_LEN,
    signature_len: ED25519_SIGNATURE_LEN,
    get_public_key: InstructionCode::GetPubKeyEd25519,
    verify_address: InstructionCode::VerifyAddressEd25519,
    sign_tx: InstructionCode::SignTxEd25519,
    sign_auth: InstructionCode::SignAuthEd25519,
    sign_preauth_hash: InstructionCode::SignPreAuthHashEd25519,
    sign_preauth_raw: InstructionCode::SignPreAuthRawEd25519,
};

static SECP256K1: CurveParams = CurveParams {
    name: "secp256k1",
    public_key_len: SECP256K1_PUBKEY_LEN,
    signature_len: SECP256K1_SIGNATURE_LEN,
    get_public_key: InstructionCode::GetPubKeySecp256k1,
    verify_address: InstructionCode::VerifyAddressSecp256k1,
    sign_tx: InstructionCode::SignTxSecp256k1,
    sign_auth: InstructionCode::SignAuthSecp256k1,
    sign_preauth_hash: InstructionCode::SignPreAuthHashSecp256k1,
    sign_preauth_raw: InstructionCode::SignPreAuthRawSecp256k1,
};

impl CurveParams {
    /// signature ∥ public key ∥ hash
    pub const fn signed_payload_len(&self) -> usize {
        self.signature_len + self.public_key_len + HASH_LEN
    }
}

impl Curve {
    /// Capability table entry
    pub fn params(self) -> &'static CurveParams {
        match self {
            Curve::Ed25519 => &ED25519,
            Curve::Secp256k1 => &SECP256K1,
        }
    }

    /// Instruction implementing `op` on this curve
    pub fn instruction(self, op: Operation) -> InstructionCode {
        let params = self.params();
        match op {
            Operation::GetVersion => InstructionCode::GetAppVersion,
            Operation::GetDeviceId => InstructionCode::GetDeviceId,
            Operation::GetDeviceModel => InstructionCode::GetDeviceModel,
            Operation::GetAppSettings => InstructionCode::GetAppSettings,
            Operation::GetPublicKey => params.get_public_key,
            Operation::VerifyAddress => params.verify_address,
            Operation::SignTransaction => params.sign_tx,
            Operation::SignAuth => params.sign_auth,
            Operation::SignPreAuthHash => params.sign_preauth_hash,
            Operation::SignPreAuthRaw => params.sign_preauth_raw,
        }
    }

    /// Opcode byte for `op` on this curve
    pub fn ins(self, op: Operation) -> u8 {
        self.instruction(op) as u8
    }

    /// Public key length in bytes
    pub fn public_key_len(self) -> usize {
        self.params().public_key_len
    }

    /// Signature length in bytes
    pub fn signature_len(self) -> usize {
        self.params().signature_len
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.params().name)
    }
}

#[cfg(test)]
mod tests {
    use super::{Curve, Operation};

    #[test]
    fn opcodes() {
        assert_eq!(Curve::Ed25519.ins(Operation::GetPublicKey), 0x21);
        assert_eq!(Curve::Secp256k1.ins(Operation::GetPublicKey), 0x31);
        assert_eq!(Curve::Ed25519.ins(Operation::SignTransaction), 0x41);
        assert_eq!(Curve::Secp256k1.ins(Operation::SignTransaction), 0x51);
        assert_eq!(Curve::Ed25519.ins(Operation::SignAuth), 0x61);
        assert_eq!(Curve::Secp256k1.ins(Operation::SignAuth), 0x71);
        assert_eq!(Curve::Ed25519.ins(Operation::VerifyAddress), 0x81);
        assert_eq!(Curve::Secp256k1.ins(Operation::VerifyAddress), 0x91);
        assert_eq!(Curve::Ed25519.ins(Operation::SignPreAuthHash), 0xA1);
        assert_eq!(Curve::Secp256k1.ins(Operation::SignPreAuthHash), 0xA2);
        assert_eq!(Curve::Ed25519.ins(Operation::SignPreAuthRaw), 0xA3);
        assert_eq!(Curve::Secp256k1.ins(Operation::SignPreAuthRaw), 0xA4);
    }

    #[test]
    fn curve_independent_opcodes() {
        for curve in [Curve::Ed25519, Curve::Secp256k1] {
            assert_eq!(curve.ins(Operation::GetVersion), 0x10);
            assert_eq!(curve.ins(Operation::GetDeviceModel), 0x11);
            assert_eq!(curve.ins(Operation::GetDeviceId), 0x12);
            assert_eq!(curve.ins(Operation::GetAppSettings), 0x22);
        }
    }

    #[test]
    fn layout_lengths() {
        assert_eq!(Curve::Ed25519.public_key_len(), 32);
        assert_eq!(Curve::Secp256k1.public_key_len(), 33);
        assert_eq!(Curve::Ed25519.params().signed_payload_len(), 128);
        assert_eq!(Curve::Secp256k1.params().signed_payload_len(), 130);
        assert_eq!(Curve::Secp256k1.to_string(), "secp256k1");
    }
}
