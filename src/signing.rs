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
//! Two-phase signing flow.
//!
//! Phase 1 sends the derivation path as a single Init frame. Phase 2 streams
//! the payload: every chunk but the last is a plain exchange, the last one is
//! interactive and its response carries the result. Any failure leaves the
//! flow in [`SigningState::Failed`]; nothing is retried and a new attempt
//! starts again from the path frame.

use ledger_transport::Exchange;
use log::trace;

use crate::bip32::DerivationPath;
use crate::channel::{ChannelSession, Checkpoint, Navigator};
use crate::curve::{Curve, Operation};
use crate::request::{chunk_payload, ApduRequest, ContinuationClass};
use crate::{Error, RadixError};

/// Progress of a signing operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningState {
    /// Nothing sent yet
    Idle,
    /// Derivation path accepted
    PathSent,
    /// Streaming payload chunks
    PayloadSending,
    /// Last chunk sent, waiting for the user
    AwaitingConfirmation,
    /// Response received and decoded
    Completed,
    /// Aborted; restart from [`SigningState::Idle`]
    Failed,
}

/// Drives one multi-frame operation inside a [`ChannelSession`]
#[derive(Debug)]
pub struct SigningFlow {
    curve: Curve,
    operation: Operation,
    state: SigningState,
}

impl SigningFlow {
    /// New flow for `operation` on `curve`
    pub fn new(curve: Curve, operation: Operation) -> Self {
        SigningFlow {
            curve,
            operation,
            state: SigningState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> SigningState {
        self.state
    }

    fn transition(&mut self, next: SigningState) {
        trace!(
            "{:?}/{}: {:?} -> {:?}",
            self.operation,
            self.curve,
            self.state,
            next
        );
        self.state = next;
    }

    /// Run both phases over `session` and decode the final response with `decode`
    pub async fn run<E, N, T, F>(
        &mut self,
        session: &ChannelSession<'_, E>,
        path: &DerivationPath,
        payload: &[u8],
        navigator: &N,
        decode: F,
    ) -> Result<T, Error<E::Error>>
    where
        E: Exchange + Send + Sync,
        E::Error: std::error::Error,
        N: Navigator + ?Sized,
        F: FnOnce(&[u8]) -> Result<T, RadixError>,
    {
        if self.state != SigningState::Idle {
            self.transition(SigningState::Idle);
        }

        match self.drive(session, path, payload, navigator, decode).await {
            Ok(result) => {
                self.transition(SigningState::Completed);
                Ok(result)
            }
            Err(e) => {
                self.transition(SigningState::Failed);
                Err(e)
            }
        }
    }

    async fn drive<E, N, T, F>(
        &mut self,
        session: &ChannelSession<'_, E>,
        path: &DerivationPath,
        payload: &[u8],
        navigator: &N,
        decode: F,
    ) -> Result<T, Error<E::Error>>
    where
        E: Exchange + Send + Sync,
        E::Error: std::error::Error,
        N: Navigator + ?Sized,
        F: FnOnce(&[u8]) -> Result<T, RadixError>,
    {
        let ins = self.curve.ins(self.operation);
        let generation = session.generation();

        // Phase 1
        session.clear_last_async_response().await;
        let request = ApduRequest::new(
            generation.class_byte(ContinuationClass::Init),
            ins,
            path.encode(),
        )?;
        session
            .exchange_interactive(&request, navigator, Checkpoint::PathSent)
            .await?;
        session.take_last_async_response().await?;
        self.transition(SigningState::PathSent);

        // Phase 2
        session.clear_last_async_response().await;
        self.transition(SigningState::PayloadSending);

        for chunk in chunk_payload(payload) {
            let class = generation.class_byte(chunk.class);
            let request = ApduRequest::new(class, ins, chunk.data.to_vec())?;

            if chunk.class == ContinuationClass::Finalize {
                self.transition(SigningState::AwaitingConfirmation);
                session
                    .exchange_interactive(&request, navigator, Checkpoint::PayloadSent)
                    .await?;
            } else {
                session.exchange(&request).await?;
            }
        }

        let response = session.take_last_async_response().await?;
        decode(response.data()).map_err(Error::from)
    }
}
