use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CalcResult<T> = Result<T, CalcError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalcErrorCategory {
    InvalidParameter,
    UnsupportedFeature,
    SetupError,
    ComputationError,
    NotFound,
    CorruptRecord,
    IoSystemError,
    InternalError,
}

impl CalcErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParameter => "InvalidParameter",
            Self::UnsupportedFeature => "UnsupportedFeature",
            Self::SetupError => "SetupError",
            Self::ComputationError => "ComputationError",
            Self::NotFound => "NotFound",
            Self::CorruptRecord => "CorruptRecord",
            Self::IoSystemError => "IoSystemError",
            Self::InternalError => "InternalError",
        }
    }

    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InvalidParameter | Self::UnsupportedFeature | Self::SetupError => 2,
            Self::NotFound | Self::CorruptRecord | Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    /// Errors raised before the solver is reached: bad or unsupported inputs.
    pub const fn is_input_error(self) -> bool {
        matches!(
            self,
            Self::InvalidParameter | Self::UnsupportedFeature | Self::SetupError
        )
    }
}

impl Display for CalcErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalcError {
    category: CalcErrorCategory,
    placeholder: &'static str,
    message: String,
    parameter: Option<String>,
}

impl CalcError {
    pub fn new(
        category: CalcErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
            parameter: None,
        }
    }

    /// A recognized option holds a value outside its supported domain.
    ///
    /// `value` is rendered verbatim into the message, so callers pass the
    /// JSON form of the offending value.
    pub fn invalid_parameter(key: &str, value: impl Display) -> Self {
        Self {
            category: CalcErrorCategory::InvalidParameter,
            placeholder: "INPUT.PARAMETER",
            message: format!("invalid value for parameter '{}': {}", key, value),
            parameter: Some(key.to_string()),
        }
    }

    pub fn unsupported(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CalcErrorCategory::UnsupportedFeature, placeholder, message)
    }

    pub fn setup(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CalcErrorCategory::SetupError, placeholder, message)
    }

    pub fn computation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CalcErrorCategory::ComputationError, placeholder, message)
    }

    pub fn not_found(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CalcErrorCategory::NotFound, placeholder, message)
    }

    pub fn corrupt_record(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CalcErrorCategory::CorruptRecord, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CalcErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(CalcErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> CalcErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The offending key, for `InvalidParameter` errors.
    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> String {
        format!("FATAL EXIT CODE: {}", self.exit_code())
    }
}

impl Display for CalcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for CalcError {}

#[cfg(test)]
mod tests {
    use super::{CalcError, CalcErrorCategory};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (CalcErrorCategory::InvalidParameter, 2),
            (CalcErrorCategory::UnsupportedFeature, 2),
            (CalcErrorCategory::SetupError, 2),
            (CalcErrorCategory::NotFound, 3),
            (CalcErrorCategory::CorruptRecord, 3),
            (CalcErrorCategory::IoSystemError, 3),
            (CalcErrorCategory::ComputationError, 4),
            (CalcErrorCategory::InternalError, 5),
        ];

        for (category, exit_code) in cases {
            assert_eq!(category.exit_code(), exit_code, "{category}");
        }
    }

    #[test]
    fn invalid_parameter_names_key_and_value() {
        let error = CalcError::invalid_parameter("xc", "\"B3LYP\"");

        assert_eq!(error.category(), CalcErrorCategory::InvalidParameter);
        assert_eq!(error.parameter(), Some("xc"));
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [INPUT.PARAMETER] invalid value for parameter 'xc': \"B3LYP\""
        );
        assert_eq!(error.fatal_exit_line(), "FATAL EXIT CODE: 2");
    }

    #[test]
    fn display_includes_category_and_placeholder() {
        let error = CalcError::computation("RUN.SCF", "SCF did not converge");
        assert_eq!(
            error.to_string(),
            "ComputationError [RUN.SCF] SCF did not converge"
        );
        assert!(!error.category().is_input_error());
        assert_eq!(error.parameter(), None);
    }
}
