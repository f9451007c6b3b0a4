//! Coordinate Reference System handling

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG codes of the geographic (lon/lat) systems commonly delivered by
/// imagery providers.
const GEOGRAPHIC_EPSG: [u32; 4] = [4326, 4269, 4258, 4283];

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether coordinates are longitude/latitude degrees.
    ///
    /// Geographic grids have cells whose ground area shrinks with latitude.
    pub fn is_geographic(&self) -> bool {
        if let Some(code) = self.epsg {
            return GEOGRAPHIC_EPSG.contains(&code);
        }
        match &self.wkt {
            Some(wkt) => {
                let upper = wkt.to_ascii_uppercase();
                (upper.starts_with("GEOGCS") || upper.starts_with("GEOGCRS"))
                    && !upper.contains("PROJCS")
            }
            None => false,
        }
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", &wkt[..wkt.len().min(50)]);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}
