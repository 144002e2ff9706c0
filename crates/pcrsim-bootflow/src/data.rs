// SPDX-License-Identifier: MIT OR Apache-2.0

//! Measured payloads and their provenance

use std::fmt;
use std::sync::Arc;

use crate::action::ActionCoordinates;
use crate::artifact::Artifacts;
use crate::datasource::DataSource;
use crate::error::{BootflowError, TpmCommandReason};
use crate::reference::References;
use crate::tpm::TpmAlg;
use crate::trustchain::TrustChainKind;

/// A named pure transformation applied to data when its bytes are requested.
#[derive(Clone)]
pub struct Converter {
    name: String,
    func: Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
}

impl Converter {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Replace the data with its digest.
    pub fn digest(alg: TpmAlg) -> Result<Self, TpmCommandReason> {
        if !alg.is_hash() {
            return Err(TpmCommandReason::UnsupportedHashAlgorithm { alg });
        }
        Ok(Self::new(format!("digest:{}", alg), move |data| {
            alg.hash(data).unwrap_or_default()
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, data: &[u8]) -> Vec<u8> {
        (self.func)(data)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Converter").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataContent {
    /// Bytes given by value
    Forced(Vec<u8>),
    /// Bytes given by location
    References(References),
}

/// Some bytes, by value or by reference, with an optional converter.
#[derive(Debug, Clone)]
pub struct Data {
    pub content: DataContent,
    pub converter: Option<Converter>,
}

impl Data {
    pub fn forced(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            content: DataContent::Forced(bytes.into()),
            converter: None,
        }
    }

    pub fn references(refs: impl Into<References>) -> Self {
        Self {
            content: DataContent::References(refs.into()),
            converter: None,
        }
    }

    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn get_references(&self) -> Option<&References> {
        match &self.content {
            DataContent::References(refs) => Some(refs),
            DataContent::Forced(_) => None,
        }
    }

    pub fn has_converter(&self) -> bool {
        self.converter.is_some()
    }

    /// Bytes before the converter is applied.
    pub fn raw_bytes(&self, artifacts: &Artifacts) -> Result<Vec<u8>, BootflowError> {
        match &self.content {
            DataContent::Forced(bytes) => Ok(bytes.clone()),
            DataContent::References(refs) => refs.bytes(artifacts),
        }
    }

    pub fn bytes(&self, artifacts: &Artifacts) -> Result<Vec<u8>, BootflowError> {
        let raw = self.raw_bytes(artifacts)?;
        Ok(match &self.converter {
            Some(converter) => converter.apply(&raw),
            None => raw,
        })
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            DataContent::Forced(bytes) => write!(f, "bytes:{}", hex::encode(bytes))?,
            DataContent::References(refs) => write!(f, "{}", refs)?,
        }
        if let Some(converter) = &self.converter {
            write!(f, " ({})", converter.name())?;
        }
        Ok(())
    }
}

// =============================================================================
// Measured data
// =============================================================================

/// The step that caused a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub step: String,
    pub coords: ActionCoordinates,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.step, self.coords)
    }
}

/// Data fed into a trust chain, with its provenance.
#[derive(Debug, Clone)]
pub struct MeasuredData {
    pub data: Data,
    pub data_source: Option<DataSource>,
    pub actor: Actor,
    pub trust_chain: TrustChainKind,
}

impl fmt::Display for MeasuredData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data_source {
            Some(source) => write!(
                f,
                "[{}] {} <- {} by {}",
                self.trust_chain, self.data, source, self.actor
            ),
            None => write!(f, "[{}] {} by {}", self.trust_chain, self.data, self.actor),
        }
    }
}

/// Append-only log of everything measured during a run.
#[derive(Debug, Clone, Default)]
pub struct MeasuredDataSlice(Vec<MeasuredData>);

impl MeasuredDataSlice {
    pub fn push(&mut self, measured: MeasuredData) {
        self.0.push(measured);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MeasuredData> {
        self.0.iter()
    }

    /// All references of all entries, in measurement order.
    pub fn references(&self) -> References {
        self.0
            .iter()
            .filter_map(|m| m.data.get_references())
            .flat_map(|refs| refs.iter().cloned())
            .collect()
    }
}

impl FromIterator<MeasuredData> for MeasuredDataSlice {
    fn from_iter<I: IntoIterator<Item = MeasuredData>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a MeasuredDataSlice {
    type Item = &'a MeasuredData;
    type IntoIter = std::slice::Iter<'a, MeasuredData>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for MeasuredDataSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, m) in self.0.iter().enumerate() {
            writeln!(f, "{:4}. {}", idx, m)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactKind, BiosImage};
    use crate::range::Range;
    use crate::reference::Reference;

    #[test]
    fn test_converter_runs_lazily_on_current_bytes() {
        let mut artifacts = Artifacts::new();
        artifacts
            .include(BiosImage::new(b"hello world".to_vec()).into())
            .unwrap();
        let data = Data::references(Reference::new(
            ArtifactKind::BiosImage,
            None,
            Range::new(0, 5),
        ))
        .with_converter(Converter::new("upper", |b| b.to_ascii_uppercase()));
        assert_eq!(data.raw_bytes(&artifacts).unwrap(), b"hello");
        assert_eq!(data.bytes(&artifacts).unwrap(), b"HELLO");

        artifacts.replace(BiosImage::new(b"HeLLo".to_vec()).into());
        assert_eq!(data.raw_bytes(&artifacts).unwrap(), b"HeLLo");
    }

    #[test]
    fn test_digest_converter() {
        let artifacts = Artifacts::new();
        let data = Data::forced(b"abc".to_vec())
            .with_converter(Converter::digest(TpmAlg::Sha256).unwrap());
        assert_eq!(
            data.bytes(&artifacts).unwrap(),
            TpmAlg::Sha256.hash(b"abc").unwrap()
        );
        assert!(Converter::digest(TpmAlg::Rsa).is_err());
        assert_eq!(data.to_string(), "bytes:616263 (digest:sha256)");
    }
}
