pub mod native;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use once_cell::sync::Lazy;
use parse_display::{Display, FromStr};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use self::native::*;

/// The scalar family of an element, independent of its width.
#[derive(Debug, Display, FromStr, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(style = "lowercase")]
pub enum ScalarKind {
    Int,
    UInt,
    Float,
}

/// Element data type of a buffer: scalar kind, complex-ness and bit width
/// of one component.
///
/// The canonical name is `[complex_]<kind><bits>`, e.g. `int32` or
/// `complex_float64`. A complex element holds two components, so its
/// size is twice the component size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DType {
    kind: ScalarKind,
    complex: bool,
    bits: u8,
}

impl DType {
    pub const INT8: DType = DType::real(ScalarKind::Int, 8);
    pub const INT16: DType = DType::real(ScalarKind::Int, 16);
    pub const INT32: DType = DType::real(ScalarKind::Int, 32);
    pub const INT64: DType = DType::real(ScalarKind::Int, 64);
    pub const UINT8: DType = DType::real(ScalarKind::UInt, 8);
    pub const UINT16: DType = DType::real(ScalarKind::UInt, 16);
    pub const UINT32: DType = DType::real(ScalarKind::UInt, 32);
    pub const UINT64: DType = DType::real(ScalarKind::UInt, 64);
    pub const FLOAT32: DType = DType::real(ScalarKind::Float, 32);
    pub const FLOAT64: DType = DType::real(ScalarKind::Float, 64);

    pub const COMPLEX_INT8: DType = DType::INT8.to_complex();
    pub const COMPLEX_INT16: DType = DType::INT16.to_complex();
    pub const COMPLEX_INT32: DType = DType::INT32.to_complex();
    pub const COMPLEX_INT64: DType = DType::INT64.to_complex();
    pub const COMPLEX_FLOAT32: DType = DType::FLOAT32.to_complex();
    pub const COMPLEX_FLOAT64: DType = DType::FLOAT64.to_complex();

    const fn real(kind: ScalarKind, bits: u8) -> Self {
        DType {
            kind,
            complex: false,
            bits,
        }
    }

    const fn to_complex(self) -> Self {
        DType {
            complex: true,
            ..self
        }
    }

    pub fn new(kind: ScalarKind, bits: u8, complex: bool) -> Result<Self, ParseDTypeError> {
        let supported = match kind {
            ScalarKind::Int | ScalarKind::UInt => matches!(bits, 8 | 16 | 32 | 64),
            ScalarKind::Float => matches!(bits, 32 | 64),
        };
        if !supported {
            return Err(ParseDTypeError::UnsupportedWidth { kind, bits });
        }
        Ok(DType {
            kind,
            complex,
            bits,
        })
    }

    pub const fn kind(&self) -> ScalarKind {
        self.kind
    }

    pub const fn bits(&self) -> u8 {
        self.bits
    }

    pub const fn is_complex(&self) -> bool {
        self.complex
    }

    pub const fn is_float(&self) -> bool {
        matches!(self.kind, ScalarKind::Float)
    }

    /// Size in bytes of one element.
    pub const fn size(&self) -> usize {
        let component = self.bits as usize / 8;
        if self.complex {
            component * 2
        } else {
            component
        }
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.complex {
            write!(f, "complex_")?;
        }
        write!(f, "{}{}", self.kind, self.bits)
    }
}

static DTYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(complex_)?(int|uint|float)(\d+)?$").unwrap());

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseDTypeError {
    #[error("unknown data type name {0:?}")]
    UnknownName(String),
    #[error("unsupported width {bits} for {kind}")]
    UnsupportedWidth { kind: ScalarKind, bits: u8 },
}

impl FromStr for DType {
    type Err = ParseDTypeError;

    /// Parses a canonical name. A missing width means the C default:
    /// `int`/`uint` are 32 bits and `float` is 32 bits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        if name == "double" {
            return Ok(DType::FLOAT64);
        }
        let cap = DTYPE_RE
            .captures(&name)
            .ok_or_else(|| ParseDTypeError::UnknownName(s.to_string()))?;
        let complex = cap.get(1).is_some();
        let kind: ScalarKind = cap[2]
            .parse()
            .map_err(|_| ParseDTypeError::UnknownName(s.to_string()))?;
        let bits = match cap.get(3) {
            Some(bits) => bits
                .as_str()
                .parse()
                .map_err(|_| ParseDTypeError::UnknownName(s.to_string()))?,
            None => 32,
        };
        DType::new(kind, bits, complex)
    }
}

impl TryFrom<String> for DType {
    type Error = ParseDTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DType> for String {
    fn from(dtype: DType) -> Self {
        dtype.to_string()
    }
}
