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
//! APDU constants, instruction codes and status words

#![deny(trivial_casts, trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(missing_docs)]

/// APDU Class byte for single-shot requests and the first frame of a signing flow
pub const CLA: u8 = 0xAA;

/// APDU Class byte for intermediate payload frames
pub const CLA_CONTINUE: u8 = 0xAB;

/// APDU Class byte for the last payload frame
pub const CLA_FINALIZE: u8 = 0xAC;

/// Maximum payload carried by one APDU frame
pub const MAX_APDU_DATA_LEN: usize = 255;

/// Status word returned on success
pub const SW_OK: u16 = 0x9000;

/// Ed25519 public key length
pub const ED25519_PUBKEY_LEN: usize = 32;

/// Secp256k1 public key length (SEC1 compressed format)
pub const SECP256K1_PUBKEY_LEN: usize = 33;

/// Ed25519 signature length
pub const ED25519_SIGNATURE_LEN: usize = 64;

/// Secp256k1 signature length: v + r + s
pub const SECP256K1_SIGNATURE_LEN: usize = 65;

/// ECDSA signature component length (r and s)
pub const ECDSA_COMPONENT_LEN: usize = 32;

/// Hash length (Blake2b-256)
pub const HASH_LEN: usize = 32;

/// Device id length
pub const DEVICE_ID_LEN: usize = 32;

/// Version response length: major, minor, patch
pub const VERSION_LEN: usize = 3;

/// App settings response length: verbose mode, blind signing
pub const SETTINGS_LEN: usize = 2;

/// BIP32 hardened derivation flag
pub const BIP32_HARDENED: u32 = 0x8000_0000;

/// Deepest path whose encoding still fits a single frame (1 + 4 * 63 = 253 bytes)
pub const MAX_BIP32_PATH_LEN: usize = 63;

/// APDU instruction codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionCode {
    /// Get application version
    GetAppVersion = 0x10,
    /// Get device model
    GetDeviceModel = 0x11,
    /// Get device id
    GetDeviceId = 0x12,
    /// Get Ed25519 public key
    GetPubKeyEd25519 = 0x21,
    /// Get application settings
    GetAppSettings = 0x22,
    /// Get Secp256k1 public key
    GetPubKeySecp256k1 = 0x31,
    /// Sign transaction intent using Ed25519
    SignTxEd25519 = 0x41,
    /// Sign transaction intent using Secp256k1
    SignTxSecp256k1 = 0x51,
    /// Sign ROLA challenge using Ed25519
    SignAuthEd25519 = 0x61,
    /// Sign ROLA challenge using Secp256k1
    SignAuthSecp256k1 = 0x71,
    /// Show Ed25519 account address on device
    VerifyAddressEd25519 = 0x81,
    /// Show Secp256k1 account address on device
    VerifyAddressSecp256k1 = 0x91,
    /// Sign pre-authorization hash using Ed25519
    SignPreAuthHashEd25519 = 0xA1,
    /// Sign pre-authorization hash using Secp256k1
    SignPreAuthHashSecp256k1 = 0xA2,
    /// Sign raw pre-authorization subintent using Ed25519
    SignPreAuthRawEd25519 = 0xA3,
    /// Sign raw pre-authorization subintent using Secp256k1
    SignPreAuthRawSecp256k1 = 0xA4,
}

/// Status words reported by the Radix app
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWord {
    /// Success
    Ok = 0x9000,
    /// Empty request
    NothingReceived = 0x6982,
    /// Unknown class byte
    BadCla = 0x6E00,
    /// Bad request length
    BadLen = 0x6E01,
    /// Rejected on device
    UserCancelled = 0x6E02,
    /// Wrong number of path elements
    BadBip32PathLen = 0x6E03,
    /// Path data shorter than announced
    BadBip32PathDataLen = 0x6E04,
    /// Path does not start with 44'
    BadBip32PathLeadWord = 0x6E05,
    /// Path coin type is not 1022'
    BadBip32PathCoinType = 0x6E06,
    /// Path network id is unknown
    BadBip32PathNetworkId = 0x6E07,
    /// Path entity is neither account nor identity
    BadBip32PathEntity = 0x6E08,
    /// Path key kind is unknown
    BadBip32PathKeyType = 0x6E09,
    /// Path element must be hardened
    BadBip32PathMustBeHardened = 0x6E0A,
    /// Non-zero p1/p2
    BadParam = 0x6E0B,
    /// Instruction not implemented
    NotImplemented = 0x6EFF,
    /// Unknown instruction
    Unknown = 0x6D00,
    /// App panicked
    Panic = 0xE000,
}

impl StatusWord {
    /// Known status word for `code`, if any
    pub fn from_code(code: u16) -> Option<Self> {
        use StatusWord::*;

        let sw = match code {
            0x9000 => Ok,
            0x6982 => NothingReceived,
            0x6E00 => BadCla,
            0x6E01 => BadLen,
            0x6E02 => UserCancelled,
            0x6E03 => BadBip32PathLen,
            0x6E04 => BadBip32PathDataLen,
            0x6E05 => BadBip32PathLeadWord,
            0x6E06 => BadBip32PathCoinType,
            0x6E07 => BadBip32PathNetworkId,
            0x6E08 => BadBip32PathEntity,
            0x6E09 => BadBip32PathKeyType,
            0x6E0A => BadBip32PathMustBeHardened,
            0x6E0B => BadParam,
            0x6EFF => NotImplemented,
            0x6D00 => Unknown,
            0xE000 => Panic,
            _ => return None,
        };
        Some(sw)
    }

    /// Short human readable description
    pub fn description(self) -> &'static str {
        match self {
            StatusWord::Ok => "success",
            StatusWord::NothingReceived => "nothing received",
            StatusWord::BadCla => "unsupported class byte",
            StatusWord::BadLen => "bad request length",
            StatusWord::UserCancelled => "cancelled by user",
            StatusWord::BadBip32PathLen => "bad derivation path length",
            StatusWord::BadBip32PathDataLen => "bad derivation path data length",
            StatusWord::BadBip32PathLeadWord => "bad derivation path purpose",
            StatusWord::BadBip32PathCoinType => "bad derivation path coin type",
            StatusWord::BadBip32PathNetworkId => "bad derivation path network id",
            StatusWord::BadBip32PathEntity => "bad derivation path entity",
            StatusWord::BadBip32PathKeyType => "bad derivation path key kind",
            StatusWord::BadBip32PathMustBeHardened => "derivation path element must be hardened",
            StatusWord::BadParam => "bad p1/p2",
            StatusWord::NotImplemented => "not implemented",
            StatusWord::Unknown => "unknown instruction",
            StatusWord::Panic => "application panic",
        }
    }

    /// Describe an arbitrary status code
    pub fn describe(code: u16) -> &'static str {
        Self::from_code(code)
            .map(Self::description)
            .unwrap_or("unrecognised status word")
    }
}
