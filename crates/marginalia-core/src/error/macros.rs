//! Error macros for marginalia

/// Macro for creating invalid value errors
#[macro_export]
macro_rules! bail_invalid {
    ($context:expr, $value:expr) => {
        return Err($crate::error::MarginaliaError::invalid_value(
            $context, $value,
        ))
    };
}

/// Macro for mapping database errors
#[macro_export]
macro_rules! map_db_err {
    ($op:expr, $error:expr) => {
        $crate::error::MarginaliaError::db_operation($op, $error)
    };
}
