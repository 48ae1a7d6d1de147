//! Coordinate reference system tags.
//!
//! Datasets carry a [`Crs`] parsed from whatever declaration accompanied
//! them: a shapefile `.prj` (WKT), an `EPSG:n` code, an OGC URN, or a
//! proj4 string. Only the systems the atlas can transform between are
//! recognized; anything else is kept verbatim as [`Crs::Unknown`] so the
//! failure surfaces when a transform is actually attempted.

use std::fmt;

/// A coordinate reference system tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    /// Geographic longitude/latitude on WGS84 (EPSG:4326).
    Wgs84,
    /// Spherical Web Mercator (EPSG:3857).
    WebMercator,
    /// OSGB36 / British National Grid (EPSG:27700).
    BritishNationalGrid,
    /// A declaration that could not be recognized. Empty when the dataset
    /// declared nothing at all.
    Unknown(String),
}

impl Crs {
    /// Parses a CRS declaration.
    ///
    /// Never fails: unrecognized input becomes [`Crs::Unknown`].
    #[must_use]
    pub fn from_declaration(declaration: &str) -> Self {
        let trimmed = declaration.trim();
        if trimmed.is_empty() {
            return Self::Unknown(String::new());
        }

        let upper = trimmed.to_ascii_uppercase();
        let compact: String = upper.chars().filter(|c| !c.is_whitespace()).collect();

        if upper.contains("BRITISH_NATIONAL_GRID")
            || upper.contains("BRITISH NATIONAL GRID")
            || (compact.contains("+PROJ=TMERC")
                && compact.contains("+LAT_0=49")
                && compact.contains("+LON_0=-2"))
        {
            return Self::BritishNationalGrid;
        }

        if upper.contains("PSEUDO-MERCATOR")
            || upper.contains("PSEUDO_MERCATOR")
            || upper.contains("WEB_MERCATOR")
            || (compact.contains("+PROJ=MERC")
                && compact.contains("+A=6378137")
                && compact.contains("+B=6378137"))
        {
            return Self::WebMercator;
        }

        let projected = upper.contains("PROJCS") || upper.contains("PROJCRS");
        if !projected
            && (upper.contains("CRS84")
                || (upper.starts_with("GEOGCS") && upper.contains("WGS_1984"))
                || (upper.starts_with("GEOGCS") && upper.contains("WGS 84"))
                || (compact.contains("+PROJ=LONGLAT") && compact.contains("WGS84")))
        {
            return Self::Wgs84;
        }

        // Bare codes only: inside WKT the first EPSG authority usually
        // belongs to the ellipsoid, not the CRS.
        if !upper.contains('[') {
            match epsg_code(&upper) {
                Some(4326) => return Self::Wgs84,
                Some(3857 | 900_913) => return Self::WebMercator,
                Some(27700) => return Self::BritishNationalGrid,
                _ => {}
            }
        }

        Self::Unknown(trimmed.to_string())
    }

    /// The EPSG code of a recognized system.
    #[must_use]
    pub const fn epsg(&self) -> Option<u32> {
        match self {
            Self::Wgs84 => Some(4326),
            Self::WebMercator => Some(3857),
            Self::BritishNationalGrid => Some(27700),
            Self::Unknown(_) => None,
        }
    }

    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Whether coordinates are longitude/latitude degrees.
    #[must_use]
    pub const fn is_geographic(&self) -> bool {
        matches!(self, Self::Wgs84)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(declaration) if declaration.is_empty() => f.write_str("undeclared CRS"),
            Self::Unknown(declaration) => write!(f, "unknown CRS ({declaration})"),
            known => write!(f, "EPSG:{}", known.epsg().unwrap_or_default()),
        }
    }
}

/// Extracts the numeric code following `EPSG` in forms like `EPSG:4326`,
/// `urn:ogc:def:crs:EPSG::27700` or `+init=epsg:3857`.
fn epsg_code(upper: &str) -> Option<u32> {
    let start = upper.find("EPSG")? + "EPSG".len();
    let rest = upper[start..].trim_start_matches([':', ' ', '"', ',']);
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BNG_PRJ: &str = r#"PROJCS["British_National_Grid",GEOGCS["GCS_OSGB_1936",DATUM["D_OSGB_1936",SPHEROID["Airy_1830",6377563.396,299.3249646]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",400000.0],PARAMETER["False_Northing",-100000.0],PARAMETER["Central_Meridian",-2.0],PARAMETER["Scale_Factor",0.9996012717],PARAMETER["Latitude_Of_Origin",49.0],UNIT["Meter",1.0]]"#;

    const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    const WEB_MERCATOR_PRJ: &str = r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]]],PROJECTION["Mercator_Auxiliary_Sphere"]]"#;

    #[test]
    fn recognizes_esri_wkt() {
        assert_eq!(Crs::from_declaration(BNG_PRJ), Crs::BritishNationalGrid);
        assert_eq!(Crs::from_declaration(WGS84_PRJ), Crs::Wgs84);
        assert_eq!(Crs::from_declaration(WEB_MERCATOR_PRJ), Crs::WebMercator);
    }

    #[test]
    fn recognizes_proj4_strings() {
        let bng = "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 \
                   +y_0=-100000 +datum=OSGB36 +units=m +no_defs +ellps=airy";
        assert_eq!(Crs::from_declaration(bng), Crs::BritishNationalGrid);
        assert_eq!(
            Crs::from_declaration("+proj=longlat +datum=WGS84 +no_defs"),
            Crs::Wgs84
        );
    }

    #[test]
    fn recognizes_codes_and_urns() {
        assert_eq!(Crs::from_declaration("EPSG:4326"), Crs::Wgs84);
        assert_eq!(Crs::from_declaration("epsg:3857"), Crs::WebMercator);
        assert_eq!(
            Crs::from_declaration("urn:ogc:def:crs:EPSG::27700"),
            Crs::BritishNationalGrid
        );
        assert_eq!(
            Crs::from_declaration("urn:ogc:def:crs:OGC:1.3:CRS84"),
            Crs::Wgs84
        );
    }

    #[test]
    fn keeps_unrecognized_declarations() {
        assert_eq!(
            Crs::from_declaration("EPSG:2154"),
            Crs::Unknown("EPSG:2154".to_string())
        );
        assert_eq!(Crs::from_declaration("  "), Crs::Unknown(String::new()));
        assert!(!Crs::from_declaration("nonsense").is_known());
    }

    #[test]
    fn display_uses_epsg_codes() {
        assert_eq!(Crs::BritishNationalGrid.to_string(), "EPSG:27700");
        assert_eq!(Crs::Unknown(String::new()).to_string(), "undeclared CRS");
    }
}
