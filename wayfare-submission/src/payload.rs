//! Versioned encodings of the wizard's partial state.
//!
//! Each saved step is stored as an envelope: four magic bytes, a schema
//! version, a step tag and the `bincode` body. Anything that does not carry
//! the expected magic, version and tag is rejected; bytes are never
//! reinterpreted under a guessed schema.

use bincode::Options;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use wayfare_core::{AgencyKey, Category, CitiesAndCountries, Platform};

/// Magic bytes opening every envelope.
pub const STEP_MAGIC: [u8; 4] = *b"WFST";
/// Schema version written by this build.
pub const STEP_VERSION: u16 = 1;
/// Largest envelope accepted or produced.
pub const MAX_STEP_BYTES: u64 = 1 << 20;

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_STEP_BYTES)
}

/// Errors raised while encoding or decoding a step envelope.
#[derive(Debug, Error)]
pub enum StepPayloadError {
    /// The bytes are not an envelope at all.
    #[error("step payload is not a valid envelope")]
    Malformed(#[source] bincode::Error),
    /// The envelope does not start with [`STEP_MAGIC`].
    #[error("step payload has unknown magic {found:?}")]
    UnknownMagic {
        /// Magic bytes found.
        found: [u8; 4],
    },
    /// The envelope was written under another schema.
    #[error("step payload version {found} is not supported (expected {expected})")]
    UnsupportedVersion {
        /// Version found.
        found: u16,
        /// Version this build reads.
        expected: u16,
    },
    /// The envelope holds a different step.
    #[error("expected a {expected} payload, found {found}")]
    WrongStep {
        /// Step requested.
        expected: &'static str,
        /// Step stored.
        found: String,
    },
    /// The body does not decode as the step.
    #[error("{step} payload body is corrupt")]
    Body {
        /// Step being decoded.
        step: &'static str,
        /// Decoding failure.
        #[source]
        source: bincode::Error,
    },
    /// The step could not be encoded.
    #[error("failed to encode {step} payload")]
    Encode {
        /// Step being encoded.
        step: &'static str,
        /// Encoding failure.
        #[source]
        source: bincode::Error,
    },
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    magic: [u8; 4],
    version: u16,
    step: String,
    body: Vec<u8>,
}

/// A wizard step that can be saved between requests.
pub trait StepPayload: Serialize + DeserializeOwned {
    /// Tag identifying the step inside an envelope.
    const STEP: &'static str;

    /// Encode into a versioned envelope.
    fn encode(&self) -> Result<Vec<u8>, StepPayloadError> {
        let encode_error = |source| StepPayloadError::Encode {
            step: Self::STEP,
            source,
        };
        let body = codec().serialize(self).map_err(encode_error)?;
        codec()
            .serialize(&Envelope {
                magic: STEP_MAGIC,
                version: STEP_VERSION,
                step: Self::STEP.to_owned(),
                body,
            })
            .map_err(encode_error)
    }

    /// Decode from an envelope written by [`StepPayload::encode`].
    fn decode(bytes: &[u8]) -> Result<Self, StepPayloadError> {
        let envelope: Envelope = codec()
            .deserialize(bytes)
            .map_err(StepPayloadError::Malformed)?;
        if envelope.magic != STEP_MAGIC {
            return Err(StepPayloadError::UnknownMagic {
                found: envelope.magic,
            });
        }
        if envelope.version != STEP_VERSION {
            return Err(StepPayloadError::UnsupportedVersion {
                found: envelope.version,
                expected: STEP_VERSION,
            });
        }
        if envelope.step != Self::STEP {
            return Err(StepPayloadError::WrongStep {
                expected: Self::STEP,
                found: envelope.step,
            });
        }
        codec()
            .deserialize(&envelope.body)
            .map_err(|source| StepPayloadError::Body {
                step: Self::STEP,
                source,
            })
    }
}

/// General information about the app being submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoStep {
    /// App title; the slug is derived from it.
    pub title: String,
    /// One-line description.
    pub description: String,
    /// App home page.
    pub url: Option<String>,
    /// Price in cents.
    pub price_cents: u64,
    /// Author's name.
    pub author_name: Option<String>,
    /// Author's contact address.
    pub author_email: Option<String>,
    /// Longer description.
    pub long_description: String,
    /// Platforms the app runs on.
    pub platforms: Vec<Platform>,
    /// Kinds of travel the app helps with.
    pub categories: Vec<Category>,
    /// Free-form tags.
    pub extra_tags: Vec<String>,
}

impl InfoStep {
    /// Extra tags, then platform labels, then category labels, each once.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        let labels = self
            .extra_tags
            .iter()
            .map(String::as_str)
            .chain(self.platforms.iter().map(|platform| platform.label()))
            .chain(self.categories.iter().map(|category| category.label()));
        for label in labels {
            if !tags.iter().any(|tag| tag == label) {
                tags.push(label.to_owned());
            }
        }
        tags
    }
}

impl StepPayload for InfoStep {
    const STEP: &'static str = "info";
}

/// Which agencies a new app supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgencySupport {
    /// No agency support.
    #[default]
    Nothing,
    /// The listed agencies; must not be empty.
    Specific(Vec<AgencyKey>),
    /// Every public agency, now and in future.
    AllPublicAgencies,
}

/// The agency selection step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyStep {
    /// Chosen support.
    pub support: AgencySupport,
}

impl StepPayload for AgencyStep {
    const STEP: &'static str = "agencies";
}

/// The location step. It triggers finalization and is never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationStep {
    /// Cities and countries the app declares.
    pub places: CitiesAndCountries,
    /// Whether the app is useful everywhere.
    pub available_globally: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn info() -> InfoStep {
        InfoStep {
            title: "Bus Buddy".into(),
            platforms: vec![Platform::Iphone, Platform::Web],
            categories: vec![Category::PublicTransit],
            extra_tags: vec!["Public Transit".into(), "realtime".into()],
            ..InfoStep::default()
        }
    }

    #[rstest]
    fn info_survives_an_envelope() {
        let bytes = info().encode().expect("encode");
        assert_eq!(InfoStep::decode(&bytes).expect("decode"), info());
    }

    #[rstest]
    fn tags_union_labels_without_repeats() {
        let tags = info().tags();
        assert_eq!(
            tags,
            [
                "Public Transit",
                "realtime",
                Platform::Iphone.label(),
                Platform::Web.label()
            ]
        );
    }

    #[rstest]
    fn rejects_other_steps() {
        let bytes = AgencyStep::default().encode().expect("encode");
        assert!(matches!(
            InfoStep::decode(&bytes),
            Err(StepPayloadError::WrongStep { expected: "info", .. })
        ));
    }

    #[rstest]
    fn rejects_other_versions() {
        let envelope = Envelope {
            magic: STEP_MAGIC,
            version: STEP_VERSION + 1,
            step: "agencies".into(),
            body: Vec::new(),
        };
        let bytes = codec().serialize(&envelope).expect("encode envelope");
        assert!(matches!(
            AgencyStep::decode(&bytes),
            Err(StepPayloadError::UnsupportedVersion { found: 2, expected: 1 })
        ));
    }

    #[rstest]
    fn rejects_foreign_magic() {
        let envelope = Envelope {
            magic: *b"PKL2",
            version: STEP_VERSION,
            step: "agencies".into(),
            body: Vec::new(),
        };
        let bytes = codec().serialize(&envelope).expect("encode envelope");
        assert!(matches!(
            AgencyStep::decode(&bytes),
            Err(StepPayloadError::UnknownMagic { .. })
        ));
    }

    #[rstest]
    #[case(&[])]
    #[case(b"WFST")]
    fn rejects_bytes_that_are_not_envelopes(#[case] bytes: &[u8]) {
        assert!(AgencyStep::decode(bytes).is_err());
    }
}
