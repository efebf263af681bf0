//! Instance classes and sizes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Instance family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceClass {
    /// `t2`
    Burstable2,
    /// `t3`
    Burstable3,
    /// `t4g`
    Burstable4Graviton,
    /// `m5`
    Standard5,
    /// `m6g`
    Standard6Graviton,
    /// `m6i`
    Standard6Intel,
    /// `r5`
    Memory5,
    /// `r6g`
    Memory6Graviton,
    /// `r6i`
    Memory6Intel,
}

impl InstanceClass {
    const ALL: [InstanceClass; 9] = [
        InstanceClass::Burstable2,
        InstanceClass::Burstable3,
        InstanceClass::Burstable4Graviton,
        InstanceClass::Standard5,
        InstanceClass::Standard6Graviton,
        InstanceClass::Standard6Intel,
        InstanceClass::Memory5,
        InstanceClass::Memory6Graviton,
        InstanceClass::Memory6Intel,
    ];

    /// Short family name used in instance type strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceClass::Burstable2 => "t2",
            InstanceClass::Burstable3 => "t3",
            InstanceClass::Burstable4Graviton => "t4g",
            InstanceClass::Standard5 => "m5",
            InstanceClass::Standard6Graviton => "m6g",
            InstanceClass::Standard6Intel => "m6i",
            InstanceClass::Memory5 => "r5",
            InstanceClass::Memory6Graviton => "r6g",
            InstanceClass::Memory6Intel => "r6i",
        }
    }

    /// Descriptive name (`BURSTABLE3`).
    pub fn long_name(&self) -> &'static str {
        match self {
            InstanceClass::Burstable2 => "BURSTABLE2",
            InstanceClass::Burstable3 => "BURSTABLE3",
            InstanceClass::Burstable4Graviton => "BURSTABLE4_GRAVITON",
            InstanceClass::Standard5 => "STANDARD5",
            InstanceClass::Standard6Graviton => "STANDARD6_GRAVITON",
            InstanceClass::Standard6Intel => "STANDARD6_INTEL",
            InstanceClass::Memory5 => "MEMORY5",
            InstanceClass::Memory6Graviton => "MEMORY6_GRAVITON",
            InstanceClass::Memory6Intel => "MEMORY6_INTEL",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s) || c.long_name().eq_ignore_ascii_case(s))
    }
}

/// Instance size within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceSize {
    /// `micro`
    Micro,
    /// `small`
    Small,
    /// `medium`
    Medium,
    /// `large`
    Large,
    /// `xlarge`
    Xlarge,
    /// `2xlarge`
    Xlarge2,
    /// `4xlarge`
    Xlarge4,
    /// `8xlarge`
    Xlarge8,
}

impl InstanceSize {
    const ALL: [InstanceSize; 8] = [
        InstanceSize::Micro,
        InstanceSize::Small,
        InstanceSize::Medium,
        InstanceSize::Large,
        InstanceSize::Xlarge,
        InstanceSize::Xlarge2,
        InstanceSize::Xlarge4,
        InstanceSize::Xlarge8,
    ];

    /// Size suffix used in instance type strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceSize::Micro => "micro",
            InstanceSize::Small => "small",
            InstanceSize::Medium => "medium",
            InstanceSize::Large => "large",
            InstanceSize::Xlarge => "xlarge",
            InstanceSize::Xlarge2 => "2xlarge",
            InstanceSize::Xlarge4 => "4xlarge",
            InstanceSize::Xlarge8 => "8xlarge",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let s = s.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|size| size.as_str() == s)
    }
}

/// A class and size pair, e.g. `t3.micro`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceType {
    /// Family
    pub class: InstanceClass,
    /// Size
    pub size: InstanceSize,
}

impl InstanceType {
    /// Combine a class and a size.
    pub fn of(class: InstanceClass, size: InstanceSize) -> Self {
        Self { class, size }
    }

    /// The RDS spelling, `db.t3.micro`.
    pub fn rds_class(&self) -> String {
        format!("db.{}", self)
    }

    /// Whether the family is burstable.
    pub fn is_burstable(&self) -> bool {
        matches!(
            self.class,
            InstanceClass::Burstable2 | InstanceClass::Burstable3 | InstanceClass::Burstable4Graviton
        )
    }
}

impl Default for InstanceType {
    fn default() -> Self {
        Self::of(InstanceClass::Burstable3, InstanceSize::Micro)
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class.as_str(), self.size.as_str())
    }
}

impl FromStr for InstanceType {
    type Err = Error;

    /// Accepts `t3.micro`, `db.t3.micro` and `BURSTABLE3.MICRO`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("db.")
            .or_else(|| trimmed.strip_prefix("DB."))
            .unwrap_or(trimmed);
        let (class, size) = body
            .split_once('.')
            .ok_or_else(|| Error::InvalidInstanceType(s.to_string()))?;
        let class =
            InstanceClass::parse(class).ok_or_else(|| Error::InvalidInstanceType(s.to_string()))?;
        let size =
            InstanceSize::parse(size).ok_or_else(|| Error::InvalidInstanceType(s.to_string()))?;
        Ok(Self::of(class, size))
    }
}

impl TryFrom<String> for InstanceType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<InstanceType> for String {
    fn from(t: InstanceType) -> Self {
        t.to_string()
    }
}
