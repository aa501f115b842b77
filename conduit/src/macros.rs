/// Creates a [`crate::error::ConduitError`] from error kind, description, and optional detail.
///
/// The detail accepts anything implementing [`ToString`].
#[macro_export]
macro_rules! conduit_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::ConduitError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::ConduitError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::ConduitError`] from the current function.
///
/// Supports the same optional detail argument as [`conduit_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::conduit_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::conduit_error!($kind, $desc, $detail))
    };
}
