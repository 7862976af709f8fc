use std::{borrow::Cow, sync::Arc};

use thiserror::Error;

use crate::error::{XMLError, XMLErrorLevel};

#[derive(Debug, Clone, Error)]
#[error("{system_id}[line:{line},column:{column}]:{level}:{message}")]
pub struct SAXParseError {
    #[source]
    pub error: XMLError,
    pub level: XMLErrorLevel,
    pub line: usize,
    pub column: usize,
    pub system_id: Arc<str>,
    pub public_id: Option<Arc<str>>,
    pub message: Cow<'static, str>,
}

/// Build a [`SAXParseError`] positioned at the current location of `$reader`.
macro_rules! parse_error {
    ($reader:expr, $code:expr, $level:expr, $message:literal, $( $args:expr ),+) => {
        $crate::sax::error::SAXParseError {
            error: $code,
            level: $level,
            line: $reader.locator.line(),
            column: $reader.locator.column(),
            system_id: $reader.locator.system_id(),
            public_id: $reader.locator.public_id(),
            message: ::std::borrow::Cow::Owned(format!($message, $( $args ),+)),
        }
    };
    ($reader:expr, $code:expr, $level:expr, $message:literal) => {
        $crate::sax::error::SAXParseError {
            error: $code,
            level: $level,
            line: $reader.locator.line(),
            column: $reader.locator.column(),
            system_id: $reader.locator.system_id(),
            public_id: $reader.locator.public_id(),
            message: ::std::borrow::Cow::Borrowed($message),
        }
    };
}

/// Report a fatal error to the handler and evaluate to the [`XMLError`].
///
/// ```ignore
/// return Err(fatal_error!(self, ParserInvalidComment, "'--' is not allowed in comments."));
/// ```
macro_rules! fatal_error {
    ($reader:expr, $code:ident, $message:literal $(, $args:expr )* $(,)?) => {{
        let error = $crate::error::XMLError::$code;
        let report = $crate::sax::error::parse_error!(
            $reader,
            error.clone(),
            $crate::error::XMLErrorLevel::FatalError,
            $message $(, $args )*
        );
        $reader.report_fatal_error(report);
        error
    }};
}

/// Report a recoverable error to the handler.
///
/// Evaluates to `Result<(), XMLError>`. `Err` means the handler escalated the error.
macro_rules! error {
    ($reader:expr, $code:ident, $message:literal $(, $args:expr )* $(,)?) => {{
        let report = $crate::sax::error::parse_error!(
            $reader,
            $crate::error::XMLError::$code,
            $crate::error::XMLErrorLevel::Error,
            $message $(, $args )*
        );
        $reader.report_error(report)
    }};
}

/// Report a warning to the handler.
///
/// Evaluates to `Result<(), XMLError>`. `Err` means the handler escalated the warning.
macro_rules! warning {
    ($reader:expr, $code:ident, $message:literal $(, $args:expr )* $(,)?) => {{
        let report = $crate::sax::error::parse_error!(
            $reader,
            $crate::error::XMLError::$code,
            $crate::error::XMLErrorLevel::Warning,
            $message $(, $args )*
        );
        $reader.report_warning(report)
    }};
}

pub(crate) use {error, fatal_error, parse_error, warning};
