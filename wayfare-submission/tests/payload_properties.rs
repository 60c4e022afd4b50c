//! Property tests for step envelopes.

use proptest::prelude::*;
use wayfare_core::AgencyKey;
use wayfare_submission::{
    AgencyStep, AgencySupport, InfoStep, ProgressToken, StepPayload, TOKEN_LEN,
};

proptest! {
    #[test]
    fn arbitrary_bytes_never_decode_as_a_step(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        prop_assume!(!bytes.starts_with(b"WFST"));
        prop_assert!(InfoStep::decode(&bytes).is_err());
        prop_assert!(AgencyStep::decode(&bytes).is_err());
    }

    #[test]
    fn agency_selections_survive_an_envelope(keys in proptest::collection::vec(1u64..10_000, 1..20)) {
        let step = AgencyStep {
            support: AgencySupport::Specific(keys.into_iter().map(AgencyKey).collect()),
        };
        let bytes = step.encode().expect("encode");
        prop_assert_eq!(AgencyStep::decode(&bytes).expect("decode"), step);
    }

    #[test]
    fn only_32_character_tokens_parse(raw in "[0-9a-f]{0,40}") {
        prop_assert_eq!(ProgressToken::parse(&raw).is_some(), raw.len() == TOKEN_LEN);
    }
}
