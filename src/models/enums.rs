use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(RouterMode {
    Off => "off",
    Shadow => "shadow",
    Enforce => "enforce",
});

str_enum!(RoutingOutcome {
    Confirmed => "confirmed",
    Unknown => "unknown",
    Ambiguous => "ambiguous",
});

str_enum!(RoutingAction {
    Routed => "routed",
    Quarantined => "quarantined",
    ShadowLogged => "shadow_logged",
    Skipped => "skipped",
});

str_enum!(RecordStatus {
    Valid => "valid",
    Invalid => "invalid",
});

str_enum!(ErrorReason {
    TooShort => "too_short",
    TooLong => "too_long",
    NonNumeric => "non_numeric",
    MissingPrefix => "missing_prefix",
    PatternMismatch => "pattern_mismatch",
});

str_enum!(ValidationStatus {
    Passed => "passed",
    Failed => "failed",
});

str_enum!(LedgerOutcome {
    Validated => "validated",
    Quarantined => "quarantined",
});

impl Default for RouterMode {
    fn default() -> Self {
        Self::Off
    }
}
