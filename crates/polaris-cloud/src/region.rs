//! AWS regions

use crate::error::CloudError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

macro_rules! regions {
    ($($variant:ident => $code:literal, $remote:literal;)+) => {
        /// AWS region supported by the control plane
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum Region {
            $($variant,)+
        }

        impl Region {
            /// All known regions
            pub const ALL: &'static [Region] = &[$(Region::$variant,)+];

            /// Region code as used by AWS, e.g. `us-east-2`
            pub fn code(&self) -> &'static str {
                match self {
                    $(Region::$variant => $code,)+
                }
            }

            /// Region enum value as used by the control plane, e.g. `US_EAST_2`
            pub fn remote_name(&self) -> &'static str {
                match self {
                    $(Region::$variant => $remote,)+
                }
            }

            /// Parse the control plane enum value
            pub fn from_remote(name: &str) -> Option<Region> {
                match name {
                    $($remote => Some(Region::$variant),)+
                    _ => None,
                }
            }
        }

        impl FromStr for Region {
            type Err = CloudError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($code => Ok(Region::$variant),)+
                    _ => Region::from_remote(s.trim())
                        .ok_or_else(|| CloudError::InvalidRegion(s.to_string())),
                }
            }
        }
    };
}

regions! {
    AfSouth1 => "af-south-1", "AF_SOUTH_1";
    ApEast1 => "ap-east-1", "AP_EAST_1";
    ApNortheast1 => "ap-northeast-1", "AP_NORTHEAST_1";
    ApNortheast2 => "ap-northeast-2", "AP_NORTHEAST_2";
    ApNortheast3 => "ap-northeast-3", "AP_NORTHEAST_3";
    ApSouth1 => "ap-south-1", "AP_SOUTH_1";
    ApSouth2 => "ap-south-2", "AP_SOUTH_2";
    ApSoutheast1 => "ap-southeast-1", "AP_SOUTHEAST_1";
    ApSoutheast2 => "ap-southeast-2", "AP_SOUTHEAST_2";
    ApSoutheast3 => "ap-southeast-3", "AP_SOUTHEAST_3";
    ApSoutheast4 => "ap-southeast-4", "AP_SOUTHEAST_4";
    CaCentral1 => "ca-central-1", "CA_CENTRAL_1";
    CnNorth1 => "cn-north-1", "CN_NORTH_1";
    CnNorthwest1 => "cn-northwest-1", "CN_NORTHWEST_1";
    EuCentral1 => "eu-central-1", "EU_CENTRAL_1";
    EuCentral2 => "eu-central-2", "EU_CENTRAL_2";
    EuNorth1 => "eu-north-1", "EU_NORTH_1";
    EuSouth1 => "eu-south-1", "EU_SOUTH_1";
    EuSouth2 => "eu-south-2", "EU_SOUTH_2";
    EuWest1 => "eu-west-1", "EU_WEST_1";
    EuWest2 => "eu-west-2", "EU_WEST_2";
    EuWest3 => "eu-west-3", "EU_WEST_3";
    IlCentral1 => "il-central-1", "IL_CENTRAL_1";
    MeCentral1 => "me-central-1", "ME_CENTRAL_1";
    MeSouth1 => "me-south-1", "ME_SOUTH_1";
    SaEast1 => "sa-east-1", "SA_EAST_1";
    UsEast1 => "us-east-1", "US_EAST_1";
    UsEast2 => "us-east-2", "US_EAST_2";
    UsGovEast1 => "us-gov-east-1", "US_GOV_EAST_1";
    UsGovWest1 => "us-gov-west-1", "US_GOV_WEST_1";
    UsWest1 => "us-west-1", "US_WEST_1";
    UsWest2 => "us-west-2", "US_WEST_2";
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<String> for Region {
    type Error = CloudError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.code().to_string()
    }
}

/// Parse a list of region codes, failing on the first unknown one
pub fn parse_regions<S: AsRef<str>>(regions: &[S]) -> crate::Result<Vec<Region>> {
    regions.iter().map(|r| r.as_ref().parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region_code() {
        assert_eq!("us-east-2".parse::<Region>().unwrap(), Region::UsEast2);
        assert_eq!(" EU-WEST-1 ".parse::<Region>().unwrap(), Region::EuWest1);
        assert_eq!("US_GOV_WEST_1".parse::<Region>().unwrap(), Region::UsGovWest1);
    }

    #[test]
    fn test_unknown_region() {
        let err = "us-east-9".parse::<Region>().unwrap_err();
        assert!(matches!(err, CloudError::InvalidRegion(r) if r == "us-east-9"));
    }

    #[test]
    fn test_parse_regions_fails_fast() {
        assert!(parse_regions(&["us-east-1", "bogus", "us-west-2"]).is_err());
        assert_eq!(
            parse_regions(&["us-east-1", "us-west-2"]).unwrap(),
            vec![Region::UsEast1, Region::UsWest2]
        );
    }
}
