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
//! Command channel: one request in flight at a time, plus the slot holding
//! the response of the last interactive exchange.

use std::future::{poll_fn, Future};
use std::task::Poll;

use async_trait::async_trait;
use ledger_transport::Exchange;
use log::{debug, warn};
use tokio::sync::{Mutex, MutexGuard};

use crate::config::ProtocolGeneration;
use crate::params::{StatusWord, SW_OK};
use crate::request::ApduRequest;
use crate::{Error, RadixError};

/// Response data and status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    data: Vec<u8>,
    retcode: u16,
}

impl ApduResponse {
    /// Build a response from its parts
    pub fn new(data: Vec<u8>, retcode: u16) -> Self {
        ApduResponse { data, retcode }
    }

    /// Parse `data | sw1 | sw2`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RadixError> {
        if bytes.len() < 2 {
            return Err(RadixError::LengthMismatch {
                response: "apdu response",
                expected: 2,
                actual: bytes.len(),
            });
        }

        let (data, sw) = bytes.split_at(bytes.len() - 2);
        Ok(ApduResponse {
            data: data.to_vec(),
            retcode: u16::from_be_bytes([sw[0], sw[1]]),
        })
    }

    /// Response data, status word excluded
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the response, keeping the data
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Status word
    pub fn retcode(&self) -> u16 {
        self.retcode
    }

    /// Status word is 0x9000
    pub fn is_success(&self) -> bool {
        self.retcode == SW_OK
    }
}

/// Points at which the device waits for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Derivation path frame sent
    PathSent,
    /// Final payload frame sent, the device shows the review screens
    PayloadSent,
    /// Address shown on screen
    AddressDisplayed,
}

/// Error raised by a [`Navigator`]
pub type NavigationError = Box<dyn std::error::Error + Send + Sync>;

/// Drives the on-device confirmation while an interactive exchange is in flight.
///
/// Emulator harnesses press buttons here; on real hardware the user does it and
/// [`PhysicalDevice`] is enough.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Confirm whatever the device shows at `checkpoint`
    async fn navigate(&self, checkpoint: Checkpoint) -> Result<(), NavigationError>;
}

/// Navigator for a physical device: confirmation is left to the user
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicalDevice;

#[async_trait]
impl Navigator for PhysicalDevice {
    async fn navigate(&self, _checkpoint: Checkpoint) -> Result<(), NavigationError> {
        Ok(())
    }
}

/// Serialized access to a transport.
///
/// Frames are only sent through a [`ChannelSession`]; holding one keeps every
/// other caller off the device until the whole operation is over.
pub struct CommandChannel<E> {
    transport: E,
    generation: ProtocolGeneration,
    session_lock: Mutex<()>,
    last_async_response: Mutex<Option<ApduResponse>>,
}

impl<E> CommandChannel<E>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    /// Wrap `transport`, tagging frames according to `generation`
    pub fn new(transport: E, generation: ProtocolGeneration) -> Self {
        CommandChannel {
            transport,
            generation,
            session_lock: Mutex::new(()),
            last_async_response: Mutex::new(None),
        }
    }

    /// Frame tagging scheme
    pub fn generation(&self) -> ProtocolGeneration {
        self.generation
    }

    /// Underlying transport
    pub fn transport(&self) -> &E {
        &self.transport
    }

    /// Response of the last interactive exchange, if any
    pub async fn last_async_response(&self) -> Option<ApduResponse> {
        self.last_async_response.lock().await.clone()
    }

    /// Wait until no other operation uses the channel and take it over
    pub async fn session(&self) -> ChannelSession<'_, E> {
        ChannelSession {
            channel: self,
            _guard: self.session_lock.lock().await,
        }
    }

    async fn send(&self, request: &ApduRequest) -> Result<ApduResponse, Error<E::Error>> {
        debug!("=> {}", hex::encode(request.serialize()));

        let answer = self
            .transport
            .exchange(&request.to_command())
            .await
            .map_err(Error::Transport)?;

        let response = ApduResponse::new(answer.data().to_vec(), answer.retcode());
        debug!(
            "<= {} {:04X}",
            hex::encode(response.data()),
            response.retcode()
        );

        if !response.is_success() {
            warn!(
                "ins={:02X} retcode={:04X} ({})",
                request.ins,
                response.retcode(),
                StatusWord::describe(response.retcode())
            );
            return Err(Error::DeviceStatus {
                code: response.retcode(),
            });
        }

        Ok(response)
    }
}

/// Exclusive use of a [`CommandChannel`] for the length of one operation
pub struct ChannelSession<'a, E> {
    channel: &'a CommandChannel<E>,
    _guard: MutexGuard<'a, ()>,
}

impl<'a, E> ChannelSession<'a, E>
where
    E: Exchange + Send + Sync,
    E::Error: std::error::Error,
{
    /// Frame tagging scheme
    pub fn generation(&self) -> ProtocolGeneration {
        self.channel.generation
    }

    /// Send `request` and wait for the answer
    pub async fn exchange(&self, request: &ApduRequest) -> Result<ApduResponse, Error<E::Error>> {
        self.channel.send(request).await
    }

    /// Send `request` while `navigator` confirms `checkpoint` on the device.
    ///
    /// The response is stored in the last-async-response slot, which must be
    /// empty when the call starts: a leftover response fails with
    /// [`Error::StaleResponse`] before anything is sent.
    ///
    /// The exchange is polled once before `navigator` starts. The transport
    /// must write the frame during that first poll (HID and the blocking
    /// transports do); one that awaits before writing lets the navigator run
    /// ahead of the frame.
    pub async fn exchange_interactive<N>(
        &self,
        request: &ApduRequest,
        navigator: &N,
        checkpoint: Checkpoint,
    ) -> Result<(), Error<E::Error>>
    where
        N: Navigator + ?Sized,
    {
        if self.channel.last_async_response.lock().await.is_some() {
            return Err(Error::StaleResponse);
        }

        let navigate = async {
            navigator
                .navigate(checkpoint)
                .await
                .map_err(Error::<E::Error>::Navigation)
        };

        let send = self.channel.send(request);
        tokio::pin!(send);

        let first = poll_fn(|cx| Poll::Ready(send.as_mut().poll(cx))).await;
        let response = match first {
            Poll::Ready(result) => {
                let response = result?;
                navigate.await?;
                response
            }
            Poll::Pending => {
                let (response, ()) = tokio::try_join!(send.as_mut(), navigate)?;
                response
            }
        };

        *self.channel.last_async_response.lock().await = Some(response);
        Ok(())
    }

    /// Response of the last interactive exchange, if any
    pub async fn last_async_response(&self) -> Option<ApduResponse> {
        self.channel.last_async_response().await
    }

    /// Like [`ChannelSession::last_async_response`], failing with [`Error::MissingResponse`]
    pub async fn require_last_async_response(&self) -> Result<ApduResponse, Error<E::Error>> {
        self.last_async_response()
            .await
            .ok_or(Error::MissingResponse)
    }

    /// Remove and return the stored response, failing with [`Error::MissingResponse`]
    pub async fn take_last_async_response(&self) -> Result<ApduResponse, Error<E::Error>> {
        self.channel
            .last_async_response
            .lock()
            .await
            .take()
            .ok_or(Error::MissingResponse)
    }

    /// Empty the slot; required before the next interactive exchange
    pub async fn clear_last_async_response(&self) {
        *self.channel.last_async_response.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use ledger_transport::{APDUAnswer, APDUCommand, Exchange};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("mock transport failure")]
    struct MockError;

    type Log = Arc<std::sync::Mutex<Vec<String>>>;

    struct Scripted {
        replies: std::sync::Mutex<VecDeque<Option<Vec<u8>>>>,
        sent: AtomicUsize,
        log: Log,
    }

    impl Scripted {
        fn new(replies: Vec<Option<Vec<u8>>>) -> Self {
            Scripted {
                replies: std::sync::Mutex::new(replies.into()),
                sent: AtomicUsize::new(0),
                log: Log::default(),
            }
        }
    }

    #[async_trait]
    impl Exchange for Scripted {
        type Error = MockError;
        type AnswerType = Vec<u8>;

        async fn exchange<I>(
            &self,
            command: &APDUCommand<I>,
        ) -> Result<APDUAnswer<Self::AnswerType>, Self::Error>
        where
            I: std::ops::Deref<Target = [u8]> + Send + Sync,
        {
            self.sent.fetch_add(1, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push(format!("sent {:02x}", command.ins));

            // answer arrives later, as with a device waiting for the user
            tokio::task::yield_now().await;

            let reply = self.replies.lock().unwrap().pop_front().flatten();
            match reply {
                Some(bytes) => Ok(APDUAnswer::from_answer(bytes).unwrap()),
                None => Err(MockError),
            }
        }
    }

    struct Refuse;

    #[async_trait]
    impl Navigator for Refuse {
        async fn navigate(&self, _checkpoint: Checkpoint) -> Result<(), NavigationError> {
            Err("button stuck".into())
        }
    }

    struct Logger(Log);

    #[async_trait]
    impl Navigator for Logger {
        async fn navigate(&self, checkpoint: Checkpoint) -> Result<(), NavigationError> {
            self.0.lock().unwrap().push(format!("nav {:?}", checkpoint));
            Ok(())
        }
    }

    fn request() -> ApduRequest {
        ApduRequest::new(0xAA, 0x10, Vec::new()).unwrap()
    }

    fn ok() -> Option<Vec<u8>> {
        Some(vec![0x90, 0x00])
    }

    #[test]
    fn response_from_bytes() {
        let response = ApduResponse::from_bytes(&[0x00, 0x01, 0x02, 0x90, 0x00]).unwrap();
        assert_eq!(response.data(), &[0x00, 0x01, 0x02]);
        assert!(response.is_success());

        let error = ApduResponse::from_bytes(&[0x6E, 0x02]).unwrap();
        assert!(error.data().is_empty());
        assert_eq!(error.retcode(), 0x6E02);
        assert!(!error.is_success());

        assert!(ApduResponse::from_bytes(&[0x90]).is_err());
    }

    #[tokio::test]
    async fn device_status_error() {
        let channel = CommandChannel::new(
            Scripted::new(vec![Some(vec![0x6E, 0x01])]),
            ProtocolGeneration::default(),
        );
        match channel.session().await.exchange(&request()).await {
            Err(Error::DeviceStatus { code }) => assert_eq!(code, 0x6E01),
            other => panic!("unexpected {:?}", other),
        };
    }

    #[tokio::test]
    async fn transport_error() {
        let channel = CommandChannel::new(Scripted::new(vec![None]), ProtocolGeneration::default());
        assert!(matches!(
            channel.session().await.exchange(&request()).await,
            Err(Error::Transport(MockError))
        ));
    }

    #[tokio::test]
    async fn slot_must_be_cleared() {
        let channel = CommandChannel::new(
            Scripted::new(vec![Some(vec![0x01, 0x90, 0x00]), Some(vec![0x02, 0x90, 0x00])]),
            ProtocolGeneration::default(),
        );
        let session = channel.session().await;

        assert!(matches!(
            session.require_last_async_response().await,
            Err(Error::MissingResponse)
        ));

        session
            .exchange_interactive(&request(), &PhysicalDevice, Checkpoint::PathSent)
            .await
            .unwrap();
        assert!(matches!(
            session
                .exchange_interactive(&request(), &PhysicalDevice, Checkpoint::PathSent)
                .await,
            Err(Error::StaleResponse)
        ));
        assert_eq!(channel.transport().sent.load(Ordering::SeqCst), 1);
        assert_eq!(session.require_last_async_response().await.unwrap().data(), &[0x01]);

        session.clear_last_async_response().await;
        session
            .exchange_interactive(&request(), &PhysicalDevice, Checkpoint::PathSent)
            .await
            .unwrap();
        assert_eq!(session.take_last_async_response().await.unwrap().data(), &[0x02]);
        assert!(channel.last_async_response().await.is_none());
    }

    #[tokio::test]
    async fn navigation_failure_keeps_source() {
        let channel = CommandChannel::new(
            Scripted::new(vec![ok(), ok()]),
            ProtocolGeneration::default(),
        );
        let session = channel.session().await;

        let err = session
            .exchange_interactive(&request(), &Refuse, Checkpoint::PayloadSent)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Navigation(_)));
        assert_eq!(
            std::error::Error::source(&err).map(|e| e.to_string()),
            Some("button stuck".to_owned())
        );
        assert!(session.last_async_response().await.is_none());

        session.exchange(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn frame_is_written_before_navigation() {
        let transport = Scripted::new(vec![ok()]);
        let log = transport.log.clone();
        let channel = CommandChannel::new(transport, ProtocolGeneration::default());

        let request = ApduRequest::new(0xAA, 0x81, vec![0x00]).unwrap();
        channel
            .session()
            .await
            .exchange_interactive(&request, &Logger(log.clone()), Checkpoint::AddressDisplayed)
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["sent 81".to_owned(), "nav AddressDisplayed".to_owned()]
        );
    }

    #[tokio::test]
    async fn sessions_do_not_interleave() {
        let transport = Scripted::new(vec![ok(), ok(), ok()]);
        let log = transport.log.clone();
        let channel = CommandChannel::new(transport, ProtocolGeneration::default());

        let first = channel.session().await;
        let second = async {
            let session = channel.session().await;
            session
                .exchange(&ApduRequest::new(0xAA, 0x11, Vec::new()).unwrap())
                .await
                .unwrap();
        };
        let operation = async {
            for ins in [0x41, 0x42] {
                first
                    .exchange(&ApduRequest::new(0xAA, ins, Vec::new()).unwrap())
                    .await
                    .unwrap();
            }
            drop(first);
        };
        tokio::join!(second, operation);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["sent 41".to_owned(), "sent 42".to_owned(), "sent 11".to_owned()]
        );
    }
}
