//! Facade crate for the Wayfare transit app directory.
//!
//! This crate re-exports the directory model, resolvers and submission wizard,
//! and exposes the SQLite store behind the `store-sqlite` feature.

#![forbid(unsafe_code)]

pub use wayfare_core::{
    Agency, AgencyKey, AppFilter, AppKey, CacheInvalidator, CacheScope, Category,
    CitiesAndCountries, CityInfo, Dedup, DirectoryStore, EntityStream, LocationKey,
    LocationResolver, MembershipResolver, MemoryDirectoryStore, NearbyQuery, NearbyQueryError,
    NoopCache, Platform, ProgressRecord, SearchSettings, StoreError, TransitApp,
    TransitAppLocation, Visibility,
};

#[cfg(feature = "store-sqlite")]
pub use wayfare_core::{SqliteDirectoryStore, SqliteDirectoryStoreError};

pub use wayfare_submission::{
    AgencyStep, AgencySupport, FinalizeOrder, InfoStep, LocationConsistency, LocationStep,
    MemorySession, ProgressSession, ProgressToken, StepRequest, SubmissionError, SubmissionState,
    SubmissionWizard, WizardSettings,
};
