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
//! BIP32 derivation paths and their wire encoding

use std::fmt;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};

use crate::params::{BIP32_HARDENED, MAX_BIP32_PATH_LEN};
use crate::RadixError;

/// Single path element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildIndex {
    /// Index without the hardened flag, always below 2^31
    pub index: u32,
    /// Hardened derivation
    pub hardened: bool,
}

impl ChildIndex {
    /// Build an element, rejecting indices that collide with the hardened bit
    pub fn new(index: u32, hardened: bool) -> Result<Self, RadixError> {
        if index >= BIP32_HARDENED {
            return Err(RadixError::InvalidPath(format!(
                "index {} is too large (bigger than 0x8000_0000)",
                index
            )));
        }
        Ok(ChildIndex { index, hardened })
    }

    /// Value as sent on the wire
    pub fn to_u32(self) -> u32 {
        if self.hardened {
            self.index | BIP32_HARDENED
        } else {
            self.index
        }
    }

    /// Element from its wire value
    pub fn from_u32(value: u32) -> Self {
        ChildIndex {
            index: value & !BIP32_HARDENED,
            hardened: value & BIP32_HARDENED != 0,
        }
    }
}

/// BIP32 derivation path, e.g. `m/44'/1022'/12'/525'/1460'/0'`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    elements: Vec<ChildIndex>,
}

impl DerivationPath {
    /// Build a path from its elements
    pub fn new(elements: Vec<ChildIndex>) -> Result<Self, RadixError> {
        if elements.is_empty() {
            return Err(RadixError::InvalidPath("path is empty".to_owned()));
        }
        if elements.len() > MAX_BIP32_PATH_LEN {
            return Err(RadixError::InvalidPath(format!(
                "path has {} elements, at most {} are supported",
                elements.len(),
                MAX_BIP32_PATH_LEN
            )));
        }
        Ok(DerivationPath { elements })
    }

    /// Build a path from raw wire values (hardened bit included)
    pub fn from_u32_slice(values: &[u32]) -> Result<Self, RadixError> {
        Self::new(values.iter().copied().map(ChildIndex::from_u32).collect())
    }

    /// Path elements
    pub fn elements(&self) -> &[ChildIndex] {
        &self.elements
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Always false, paths are never empty
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Element count followed by every element as big endian u32
    pub fn encode(&self) -> Vec<u8> {
        let mut m = vec![0u8; 1 + 4 * self.elements.len()];
        m[0] = self.elements.len() as u8;

        for (element, chunk) in self.elements.iter().zip(m[1..].chunks_exact_mut(4)) {
            BigEndian::write_u32(chunk, element.to_u32());
        }

        m
    }

    /// Inverse of [`DerivationPath::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self, RadixError> {
        let (count, body) = bytes
            .split_first()
            .ok_or_else(|| RadixError::InvalidPath("encoded path is empty".to_owned()))?;

        if body.len() != *count as usize * 4 {
            return Err(RadixError::InvalidPath(format!(
                "encoded path announces {} elements but carries {} bytes",
                count,
                body.len()
            )));
        }

        let values: Vec<u32> = body.chunks_exact(4).map(BigEndian::read_u32).collect();
        Self::from_u32_slice(&values)
    }
}

impl FromStr for DerivationPath {
    type Err = RadixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RadixError::InvalidPath(format!("{}: {}", s, reason));

        let body = s
            .strip_prefix("m/")
            .ok_or_else(|| invalid("path must start with \"m/\""))?;

        let mut elements = Vec::new();
        for component in body.split('/') {
            let (digits, hardened) = match component.strip_suffix(&['\'', 'H', 'h'][..]) {
                Some(digits) => (digits, true),
                None => (component, false),
            };

            if digits.is_empty() || !digits.bytes().all(|c| c.is_ascii_digit()) {
                return Err(invalid("expected a number between '/' separators"));
            }

            let index: u32 = digits.parse().map_err(|_| invalid("index out of range"))?;
            elements.push(ChildIndex::new(index, hardened)?);
        }

        DerivationPath::new(elements)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for element in &self.elements {
            write!(f, "/{}", element.index)?;
            if element.hardened {
                f.write_str("'")?;
            }
        }
        Ok(())
    }
}
