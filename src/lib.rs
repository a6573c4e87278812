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
//! Support library for the Radix Babylon Ledger Nano S/S+/X and Stax app
//!
//! [`RadixApp`] talks to the app over any [`ledger_transport::Exchange`]
//! implementation (HID, TCP to an emulator, or a test double).

#![deny(trivial_casts, trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(missing_docs)]
#![doc(html_root_url = "https://docs.rs/ledger-radix/0.1.0")]

use ledger_transport::Exchange;

pub mod bip32;
pub mod channel;
pub mod config;
pub mod curve;
pub mod params;
pub mod request;
pub mod response;
pub mod signing;

pub use bip32::{ChildIndex, DerivationPath};
pub use channel::{
    ApduResponse, ChannelSession, Checkpoint, CommandChannel, NavigationError, Navigator,
    PhysicalDevice,
};
pub use config::{ProtocolConfig, ProtocolGeneration, RolaLayout};
pub use curve::{Curve, Operation};
pub use params::{InstructionCode, StatusWord};
pub use request::{preauth_hash, ApduRequest, ContinuationClass, RolaChallenge};
pub use response::{
    verify_signature, AppSettings, DeviceId, DeviceModel, PublicKey, RolaResponse,
    Secp256k1Signature, Signature, SignedPayload, Version,
};
pub use signing::{SigningFlow, SigningState};

use params::HASH_LEN;
use request::ContinuationClass::Init;
use response::decode_address;

/// Errors that do not depend on the transport
#[derive(Debug, thiserror::Error)]
pub enum RadixError {
    /// Invalid derivation path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Frame or challenge field too large
    #[error("message size is invalid (too big)")]
    InvalidMessageSize,

    /// Response length differs from the layout of the operation
    #[error("{response} response has {actual} bytes, expected {expected}")]
    LengthMismatch {
        /// Response being decoded
        response: &'static str,
        /// Expected length
        expected: usize,
        /// Received length
        actual: usize,
    },

    /// Public Key is invalid
    #[error("received an invalid PK")]
    InvalidPK,

    /// The signature is not valid
    #[error("received an invalid signature")]
    InvalidSignature,

    /// Model byte not known
    #[error("unknown device model {0:#04x}")]
    UnknownDeviceModel(u8),

    /// Utf8 conversion related error
    #[error("UTF8Error error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

fn describe_status(code: &u16) -> &'static str {
    StatusWord::describe(*code)
}

/// Ledger App Error
#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    /// Transport failure, the operation is aborted
    #[error("Transport error: {0}")]
    Transport(#[source] E),

    /// Non-success status word
    #[error("Device returned status 0x{:04X} ({})", .code, describe_status(.code))]
    DeviceStatus {
        /// Status word
        code: u16,
    },

    /// No interactive response stored
    #[error("no response from the last interactive exchange")]
    MissingResponse,

    /// Interactive exchange started while a previous response was still stored
    #[error("a previous interactive response was not cleared")]
    StaleResponse,

    /// Navigator failed while the device waited for confirmation
    #[error("navigation failed: {0}")]
    Navigation(#[source] NavigationError),

    /// Decoding or validation error
    #[error("App error: {0}")]
    App(#[from] RadixError),
}

/// Radix App
pub struct RadixApp<E> {
    channel: CommandChannel<E>,
    config: ProtocolConfig,
}

impl<E> RadixApp<E>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    /// Create a new [`RadixApp`] speaking the current protocol
    pub fn new(transport: E) -> Self {
        Self::with_config(transport, ProtocolConfig::default())
    }

    /// Create a new [`RadixApp`] with explicit protocol options
    pub fn with_config(transport: E, config: ProtocolConfig) -> Self {
        RadixApp {
            channel: CommandChannel::new(transport, config.generation),
            config,
        }
    }

    /// Protocol options in use
    pub fn config(&self) -> ProtocolConfig {
        self.config
    }

    /// Command channel; frames go through [`CommandChannel::session`]
    pub fn channel(&self) -> &CommandChannel<E> {
        &self.channel
    }

    async fn query<T, F>(&self, ins: u8, data: Vec<u8>, decode: F) -> Result<T, Error<E::Error>>
    where
        F: FnOnce(&[u8]) -> Result<T, RadixError>,
    {
        let class = self.config.generation.class_byte(Init);
        let request = ApduRequest::new(class, ins, data)?;
        let response = self.channel.session().await.exchange(&request).await?;

        decode(response.data()).map_err(Error::from)
    }

    /// Retrieve the app version
    pub async fn version(&self) -> Result<Version, Error<E::Error>> {
        let ins = InstructionCode::GetAppVersion as u8;
        self.query(ins, Vec::new(), Version::decode).await
    }

    /// Retrieve the device id
    pub async fn device_id(&self) -> Result<DeviceId, Error<E::Error>> {
        let ins = InstructionCode::GetDeviceId as u8;
        self.query(ins, Vec::new(), DeviceId::decode).await
    }

    /// Retrieve the device model
    pub async fn device_model(&self) -> Result<DeviceModel, Error<E::Error>> {
        let ins = InstructionCode::GetDeviceModel as u8;
        self.query(ins, Vec::new(), DeviceModel::decode).await
    }

    /// Retrieve the app settings
    pub async fn app_settings(&self) -> Result<AppSettings, Error<E::Error>> {
        let ins = InstructionCode::GetAppSettings as u8;
        self.query(ins, Vec::new(), AppSettings::decode).await
    }

    /// Retrieve the public key for `path`, without confirmation
    pub async fn public_key(
        &self,
        curve: Curve,
        path: &DerivationPath,
    ) -> Result<PublicKey, Error<E::Error>> {
        let ins = curve.ins(Operation::GetPublicKey);
        self.query(ins, path.encode(), |data| PublicKey::decode(curve, data))
            .await
    }

    /// Show the address for `path` on the device and return it once confirmed
    pub async fn verify_address<N>(
        &self,
        curve: Curve,
        path: &DerivationPath,
        navigator: &N,
    ) -> Result<String, Error<E::Error>>
    where
        N: Navigator + ?Sized,
    {
        let class = self.config.generation.class_byte(Init);
        let request = ApduRequest::new(class, curve.ins(Operation::VerifyAddress), path.encode())?;

        let session = self.channel.session().await;
        session.clear_last_async_response().await;
        session
            .exchange_interactive(&request, navigator, Checkpoint::AddressDisplayed)
            .await?;
        let response = session.take_last_async_response().await?;

        decode_address(response.data()).map_err(Error::from)
    }

    async fn sign<N, T, F>(
        &self,
        curve: Curve,
        operation: Operation,
        path: &DerivationPath,
        payload: &[u8],
        navigator: &N,
        decode: F,
    ) -> Result<T, Error<E::Error>>
    where
        N: Navigator + ?Sized,
        F: FnOnce(&[u8]) -> Result<T, RadixError>,
    {
        let session = self.channel.session().await;

        let mut flow = SigningFlow::new(curve, operation);
        flow.run(&session, path, payload, navigator, decode).await
    }

    /// Sign a compiled transaction intent
    pub async fn sign_tx<N>(
        &self,
        curve: Curve,
        path: &DerivationPath,
        txn: &[u8],
        navigator: &N,
    ) -> Result<SignedPayload, Error<E::Error>>
    where
        N: Navigator + ?Sized,
    {
        self.sign(curve, Operation::SignTransaction, path, txn, navigator, |data| {
            SignedPayload::decode(curve, data)
        })
        .await
    }

    /// Sign the Blake2b-256 hash of a pre-authorization subintent
    pub async fn sign_preauth_hash<N>(
        &self,
        curve: Curve,
        path: &DerivationPath,
        hash: &[u8; HASH_LEN],
        navigator: &N,
    ) -> Result<SignedPayload, Error<E::Error>>
    where
        N: Navigator + ?Sized,
    {
        self.sign(curve, Operation::SignPreAuthHash, path, hash, navigator, |data| {
            SignedPayload::decode(curve, data)
        })
        .await
    }

    /// Sign a raw pre-authorization subintent
    pub async fn sign_preauth_raw<N>(
        &self,
        curve: Curve,
        path: &DerivationPath,
        raw: &[u8],
        navigator: &N,
    ) -> Result<SignedPayload, Error<E::Error>>
    where
        N: Navigator + ?Sized,
    {
        self.sign(curve, Operation::SignPreAuthRaw, path, raw, navigator, |data| {
            SignedPayload::decode(curve, data)
        })
        .await
    }

    /// Sign a ROLA challenge
    pub async fn sign_auth<N>(
        &self,
        curve: Curve,
        path: &DerivationPath,
        challenge: &RolaChallenge,
        navigator: &N,
    ) -> Result<RolaResponse, Error<E::Error>>
    where
        N: Navigator + ?Sized,
    {
        let payload = challenge.to_bytes()?;
        let layout = self.config.rola_layout;

        self.sign(curve, Operation::SignAuth, path, &payload, navigator, |data| {
            RolaResponse::decode(curve, layout, data)
        })
        .await
    }
}
