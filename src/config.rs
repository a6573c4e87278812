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
//! Protocol generation selection

use crate::params::{CLA, CLA_CONTINUE, CLA_FINALIZE};
use crate::request::ContinuationClass;

/// Framing used to tag the frames of a multi-frame operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolGeneration {
    /// Every frame carries its continuation class: Init, Continue or Finalize
    #[default]
    ContinuationTagged,
    /// Older firmware: one class for phase 1, a second one for every phase 2 frame
    TwoClass {
        /// Class byte for single-shot requests and the derivation path frame
        primary: u8,
        /// Class byte for every payload frame
        continuation: u8,
    },
}

impl ProtocolGeneration {
    /// Legacy two-class framing with the stock class bytes
    pub const fn legacy() -> Self {
        ProtocolGeneration::TwoClass {
            primary: CLA,
            continuation: CLA_FINALIZE,
        }
    }

    /// Class byte for a frame tagged `class`
    pub fn class_byte(&self, class: ContinuationClass) -> u8 {
        match (self, class) {
            (ProtocolGeneration::ContinuationTagged, ContinuationClass::Init) => CLA,
            (ProtocolGeneration::ContinuationTagged, ContinuationClass::Continue) => CLA_CONTINUE,
            (ProtocolGeneration::ContinuationTagged, ContinuationClass::Finalize) => CLA_FINALIZE,
            (ProtocolGeneration::TwoClass { primary, .. }, ContinuationClass::Init) => *primary,
            (ProtocolGeneration::TwoClass { continuation, .. }, _) => *continuation,
        }
    }
}

/// Layout of the ROLA (sign auth) response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RolaLayout {
    /// signature ∥ public key ∥ hash, identical to a signed transaction
    #[default]
    SignedPayload,
    /// Signature only
    BareSignature,
}

/// Protocol options for a [`crate::RadixApp`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolConfig {
    /// Frame tagging scheme
    pub generation: ProtocolGeneration,
    /// Expected ROLA response layout
    pub rola_layout: RolaLayout,
}

impl ProtocolConfig {
    /// Settings for firmware predating continuation tagging
    pub const fn legacy() -> Self {
        ProtocolConfig {
            generation: ProtocolGeneration::legacy(),
            rola_layout: RolaLayout::BareSignature,
        }
    }

    /// Override the framing scheme
    pub fn with_generation(mut self, generation: ProtocolGeneration) -> Self {
        self.generation = generation;
        self
    }

    /// Override the ROLA response layout
    pub fn with_rola_layout(mut self, rola_layout: RolaLayout) -> Self {
        self.rola_layout = rola_layout;
        self
    }
}
