//! Platform and category choices offered to app submitters.
//!
//! Both tables are constant and sorted by code, so form layers can render
//! them directly without building or caching anything at runtime.
//!
//! # Examples
//! ```
//! use wayfare_core::{Category, Platform};
//!
//! assert_eq!(Platform::Iphone.label(), "iPhone App");
//! assert_eq!("public_transit".parse::<Category>(), Ok(Category::PublicTransit));
//! assert_eq!(Platform::CHOICES[0], ("android", "Android App"));
//! ```

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown choice code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{code}'")]
pub struct UnknownChoice {
    /// Which table was consulted.
    pub kind: &'static str,
    /// The rejected code.
    pub code: String,
}

macro_rules! choice_table {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => ($code:literal, $label:literal),)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// `(code, label)` pairs sorted by code.
            pub const CHOICES: &'static [(&'static str, &'static str)] = &[$(($code, $label),)+];

            /// Every variant in table order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Return the short code.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            /// Return the display label, which doubles as a tag.
            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok(Self::$variant),)+
                    _ => Err(UnknownChoice { kind: $kind, code: s.to_owned() }),
                }
            }
        }
    };
}

choice_table!(
    /// Platform an app runs on.
    Platform, "platform" {
        /// Native Android application.
        Android => ("android", "Android App"),
        /// Native BlackBerry application.
        Blackberry => ("blackberry", "Blackberry App"),
        /// Native iPhone application.
        Iphone => ("iphone", "iPhone App"),
        /// Mobile web site tuned for small screens.
        MobileWeb => ("mobile_web", "Website (Mobile-Optimized)"),
        /// Anything else.
        Other => ("other", "Other"),
        /// Native Palm webOS application.
        PalmWebos => ("palm_webos", "Palm WebOS App"),
        /// Text-message service.
        Sms => ("sms", "SMS"),
        /// Desktop web site.
        Web => ("web", "Website (Desktop/Laptop)"),
    }
);

choice_table!(
    /// Kind of travel an app helps with.
    Category, "category" {
        /// Cycling.
        Biking => ("biking", "Biking"),
        /// Driving.
        Driving => ("driving", "Driving"),
        /// Buses, trains and ferries.
        PublicTransit => ("public_transit", "Public Transit"),
        /// Walking.
        Walking => ("walking", "Walking"),
    }
);
